use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::draw::DrawStateView;
use crate::session::SessionError;
use crate::state::AppState;

mod donations;
mod draw;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let donations_router = donations::router().with_state(state.clone());
    let draw_router = draw::router().with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/session/reset", post(reset_session))
        .nest("/donations", donations_router)
        .nest("/draw", draw_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "live",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn health_ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let session = &state.session;
    Json(ReadyResponse {
        status: "ready",
        source: session.source_name(),
        simulator_enabled: session.simulator_enabled(),
        ledger_count: session.count(),
        total_tickets: session.total_tickets(),
        draw: session.state().to_view(),
    })
}

async fn reset_session(State(state): State<AppState>) -> Json<ResetResponse> {
    state.session.reset();
    Json(ResetResponse {
        status: "reset",
        message: "Session restarted. The ledger is empty.".to_string(),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    source: &'static str,
    simulator_enabled: bool,
    ledger_count: usize,
    total_tickets: u64,
    draw: DrawStateView,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }
}

impl From<SessionError> for HttpError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::SourceUnavailable(_) => StatusCode::BAD_GATEWAY,
            SessionError::FetchInProgress => StatusCode::CONFLICT,
            SessionError::SimulatorDisabled => StatusCode::NOT_FOUND,
        };
        let message = match &err {
            SessionError::SourceUnavailable(source) => {
                format!("Failed to fetch donations: {source}")
            }
            other => other.to_string(),
        };
        HttpError::new(status, message)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}
