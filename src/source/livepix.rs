//! HTTP client for the LivePix proxy.
//!
//! The proxy owns the OAuth2 client credentials. This client only asks it for
//! an access token, keeps that token as an opaque string and forwards it as a
//! bearer credential when listing donation messages.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{DonationSource, FetchRange, SourceError};
use crate::models::donation::RawDonation;

pub struct LivePixClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_records: usize,
    token: Mutex<Option<String>>,
}

impl LivePixClient {
    pub fn new(base_url: &str, timeout: Duration, max_records: usize) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(anyhow!("LivePix proxy base URL must be provided"));
        }
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );
        assert!(max_records > 0, "Record limit must be positive");

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("raffle-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| format!("Failed to build LivePix client for {base_url}"))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            timeout,
            max_records,
            token: Mutex::new(None),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[cfg(test)]
    fn has_token(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Requests a fresh access token and caches it.
    pub async fn acquire_token(&self) -> Result<String, SourceError> {
        let response = self
            .client
            .post(self.url("/token"))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|err| SourceError::Unavailable(format!("POST /token failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(status, &response.text().await.unwrap_or_default());
            return Err(if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                SourceError::Unauthorized(message)
            } else {
                SourceError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| SourceError::Malformed(format!("token response: {err}")))?;
        let token = payload.access_token.trim().to_string();
        if token.is_empty() {
            return Err(SourceError::Malformed(
                "token response carried an empty access_token".to_string(),
            ));
        }

        info!("Obtained LivePix access token");
        *self.token.lock() = Some(token.clone());
        Ok(token)
    }

    async fn bearer(&self) -> Result<String, SourceError> {
        let cached = self.token.lock().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.acquire_token().await,
        }
    }

    async fn fetch_messages(
        &self,
        token: &str,
        range: &FetchRange,
    ) -> Result<Vec<RawDonation>, SourceError> {
        let response = self
            .client
            .get(self.url("/messages"))
            .query(&range.query_pairs())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| SourceError::Unavailable(format!("GET /messages failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unauthorized(error_message(status, &body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Rejected {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let payload: MessagesResponse = response
            .json()
            .await
            .map_err(|err| SourceError::Malformed(format!("messages response: {err}")))?;
        if payload.data.len() > self.max_records {
            return Err(SourceError::BatchTooLarge {
                observed: payload.data.len(),
                limit: self.max_records,
            });
        }
        debug!(records = payload.data.len(), "Fetched LivePix messages");
        Ok(payload
            .data
            .into_iter()
            .map(RawDonation::from_value_lossy)
            .collect())
    }
}

#[async_trait]
impl DonationSource for LivePixClient {
    fn name(&self) -> &'static str {
        "livepix"
    }

    async fn fetch(&self, range: &FetchRange) -> Result<Vec<RawDonation>, SourceError> {
        let token = self.bearer().await?;
        match self.fetch_messages(&token, range).await {
            Err(SourceError::Unauthorized(reason)) => {
                warn!("LivePix token refused ({reason}), refreshing once");
                self.token.lock().take();
                let token = self.acquire_token().await?;
                self.fetch_messages(&token, range).await
            }
            other => other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    message: Option<String>,
}

fn error_message(status: StatusCode, body: &str) -> String {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();
    payload
        .error
        .or(payload.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        })
}
