use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use crate::errors::AppError;
use crate::ranking::models::RankingResponse;
use crate::state::AppState;

/// POST /report
/// Renders a ranking returned by /analyze with the configured exporter.
pub async fn handle_report(
    State(state): State<AppState>,
    body: Result<Json<RankingResponse>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(ranking) = body.map_err(|e| AppError::Input(e.body_text()))?;
    let report = state.exporter.render(&ranking, Utc::now());
    Ok(([(header::CONTENT_TYPE, state.exporter.content_type())], report))
}
