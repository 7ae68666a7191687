use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::errors::AppError;
use crate::ranking::models::{Document, RankingOutcome};
use crate::ranking::pipeline::RankingRequest;
use crate::state::AppState;

const RESUMES_FIELD: &str = "resumes";
const CRITERIA_FIELD: &str = "criteria";

/// GET /
pub async fn handle_banner() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Resume ranking API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /analyze
/// Multipart upload: repeated `resumes` file parts plus an optional `criteria` text part.
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RankingOutcome>, AppError> {
    let multipart = multipart.map_err(|e| AppError::Input(e.body_text()))?;
    let request = read_ranking_request(multipart).await?;
    let outcome = state.pipeline.rank(request).await?;
    Ok(Json(outcome))
}

async fn read_ranking_request(mut multipart: Multipart) -> Result<RankingRequest, AppError> {
    let mut request = RankingRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Input(format!("Malformed upload: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            RESUMES_FIELD => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Input(format!("Malformed upload: {}", e.body_text())))?;
                // Browsers send an empty part when the file input was left blank.
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                request.documents.push(Document::new(filename, bytes));
            }
            CRITERIA_FIELD => {
                let criteria = field
                    .text()
                    .await
                    .map_err(|e| AppError::Input(format!("Malformed upload: {}", e.body_text())))?;
                request.criteria = Some(criteria);
            }
            other => warn!("Ignoring unexpected multipart field '{other}'"),
        }
    }

    Ok(request)
}
