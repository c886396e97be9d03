//! Ledger endpoints: listing, direct batch merges and source pulls.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::info;

use crate::ledger::MergeResult;
use crate::models::donation::{
    LedgerView, MergeResponse, RawDonation, RefreshRequest, RejectionView, SimulateRequest,
};
use crate::source::FetchRange;
use crate::source::simulator::DEFAULT_BATCH_SIZE;
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_donations).post(merge_donations))
        .route("/refresh", post(refresh_donations))
        .route("/simulate", post(simulate_donations))
}

async fn list_donations(State(state): State<AppState>) -> Json<LedgerView> {
    let session = &state.session;
    let snapshot = session.snapshot();
    Json(LedgerView {
        count: snapshot.len(),
        total_tickets: session.total_tickets(),
        donations: snapshot.iter().map(|record| record.to_view()).collect(),
    })
}

/// Accepts a raw JSON array so one malformed element cannot fail the batch.
async fn merge_donations(
    State(state): State<AppState>,
    Json(batch): Json<Vec<Value>>,
) -> Json<MergeResponse> {
    let batch: Vec<RawDonation> = batch.into_iter().map(RawDonation::from_value_lossy).collect();
    let merge = state.session.merge(&batch);
    let message = format!(
        "Received {} donations. Added {}, skipped {} duplicates, rejected {}.",
        merge.received(),
        merge.added.len(),
        merge.skipped,
        merge.rejected
    );
    info!("{message}");
    Json(merge_response(&state, merge, message))
}

async fn refresh_donations(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<MergeResponse>, HttpError> {
    let range = FetchRange::parse(request.start_date.as_deref(), request.end_date.as_deref())
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let report = state.session.refresh(&range).await?;
    let message = report.message();
    Ok(Json(merge_response(&state, report.merge, message)))
}

async fn simulate_donations(
    State(state): State<AppState>,
    Json(request): Json<SimulateRequest>,
) -> Result<Json<MergeResponse>, HttpError> {
    let count = request.count.unwrap_or(DEFAULT_BATCH_SIZE);
    let report = state.session.simulate(count)?;
    let message = report.message();
    Ok(Json(merge_response(&state, report.merge, message)))
}

fn merge_response(state: &AppState, merge: MergeResult, message: String) -> MergeResponse {
    MergeResponse {
        added: merge.added.iter().map(|record| record.to_view()).collect(),
        skipped: merge.skipped,
        rejected: merge.rejected,
        rejections: merge
            .rejections
            .iter()
            .map(|rejection| RejectionView {
                position: rejection.position,
                reason: rejection.reason.to_string(),
            })
            .collect(),
        ledger_count: state.session.count(),
        message,
    }
}
