use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;

use crate::draw::DrawOutcome;
use crate::models::draw::{DrawStartedResponse, DrawStatusResponse};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_draw).get(draw_status))
        .route("/acknowledge", post(acknowledge_winner))
        .route("/cancel", post(cancel_draw))
}

async fn start_draw(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<DrawStartedResponse>), HttpError> {
    match state.session.draw() {
        DrawOutcome::Started(started) => {
            info!(
                draw_id = started.draw_id,
                pool_size = started.pool_size,
                "Draw accepted"
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(DrawStartedResponse {
                    draw_id: started.draw_id,
                    ticks: started.ticks,
                    pool_size: started.pool_size,
                    message: format!("Drawing... {}...", started.ticks),
                }),
            ))
        }
        DrawOutcome::DrawInProgress => Err(HttpError::new(
            StatusCode::CONFLICT,
            "A draw is already in progress".to_string(),
        )),
        DrawOutcome::NoEligibleDonors(reason) => Err(HttpError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            reason.message(),
        )),
    }
}

async fn draw_status(State(state): State<AppState>) -> Json<DrawStatusResponse> {
    Json(status_response(&state))
}

async fn acknowledge_winner(
    State(state): State<AppState>,
) -> Result<Json<DrawStatusResponse>, HttpError> {
    if !state.session.acknowledge() {
        return Err(HttpError::new(
            StatusCode::CONFLICT,
            "There is no winner to acknowledge".to_string(),
        ));
    }
    Ok(Json(status_response(&state)))
}

async fn cancel_draw(
    State(state): State<AppState>,
) -> Result<Json<DrawStatusResponse>, HttpError> {
    if !state.session.cancel_draw() {
        return Err(HttpError::new(
            StatusCode::CONFLICT,
            "There is no draw in progress".to_string(),
        ));
    }
    Ok(Json(status_response(&state)))
}

fn status_response(state: &AppState) -> DrawStatusResponse {
    let draw = state.session.state();
    DrawStatusResponse {
        drawing: draw.is_drawing(),
        state: draw.to_view(),
        message: draw.message(),
    }
}
