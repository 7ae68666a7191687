//! Ranking Pipeline: orchestrates one ranking request.
//!
//! Flow: extract (blocking pool) → abort if nothing usable → build prompt →
//!       gateway completion (retry/fallback live inside the gateway) →
//!       normalize → merge diagnostics → return.
//!
//! The pipeline itself never retries. Any failure here is terminal for the request.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::llm_client::gateway::{GatewayError, ModelGateway};
use crate::ranking::extract::{extract_batch, BatchLimits};
use crate::ranking::models::{Document, RankingOutcome};
use crate::ranking::normalize::normalize_response;
use crate::ranking::prompts::build_ranking_prompt;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("extraction task failed: {0}")]
    Internal(#[from] tokio::task::JoinError),
}

/// Everything the pipeline needs from the upload boundary.
#[derive(Debug, Default)]
pub struct RankingRequest {
    pub documents: Vec<Document>,
    pub criteria: Option<String>,
}

pub struct RankingPipeline {
    gateway: Arc<ModelGateway>,
    limits: BatchLimits,
}

impl RankingPipeline {
    pub fn new(gateway: Arc<ModelGateway>, limits: BatchLimits) -> Self {
        Self { gateway, limits }
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    pub async fn rank(&self, request: RankingRequest) -> Result<RankingOutcome, PipelineError> {
        let request_id = Uuid::new_v4();
        self.run(request)
            .instrument(info_span!("rank", %request_id))
            .await
    }

    async fn run(&self, request: RankingRequest) -> Result<RankingOutcome, PipelineError> {
        if request.documents.is_empty() {
            return Err(PipelineError::Input("No files uploaded".to_string()));
        }

        // Step 1: Extract text (PDF/DOCX parsing is CPU-bound)
        let received = request.documents.len();
        let limits = self.limits;
        let documents = request.documents;
        let batch = tokio::task::spawn_blocking(move || extract_batch(documents, &limits)).await?;

        if batch.resumes.is_empty() {
            return Err(PipelineError::Input(
                "Could not extract text from any of the uploaded files".to_string(),
            ));
        }
        info!(
            "Extracted {} of {} uploaded resume(s)",
            batch.resumes.len(),
            received
        );

        // Step 2: Build prompt
        let criteria = request.criteria.as_deref().unwrap_or_default();
        let prompt = build_ranking_prompt(criteria, &batch.resumes);

        // Step 3: Model call
        info!("Sending ranking request with {} resumes", batch.resumes.len());
        let completion = self.gateway.complete(&prompt).await?;
        debug!(
            "Model {} replied: {}...",
            completion.model,
            completion.text.chars().take(200).collect::<String>()
        );

        // Step 4: Normalize and surface every silent drop
        let mut outcome = normalize_response(&completion.text, &completion.model, &batch.resumes);
        let mut diagnostics = batch.diagnostics;
        diagnostics.append(outcome.diagnostics_mut());
        *outcome.diagnostics_mut() = diagnostics;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm_client::gateway::testing::{timeouts, Reply, ScriptedClient, ScriptedFallback};
    use crate::ranking::extract::fixtures::pdf_with_pages;
    use crate::ranking::models::{DiagnosticKind, RAW_RESPONSE_NOTE};
    use crate::ranking::prompts::DEFAULT_CRITERIA;

    const MODEL: &str = "gemini-1.5-flash";

    fn limits() -> BatchLimits {
        BatchLimits {
            max_resumes: 10,
            max_chars: 8000,
        }
    }

    fn pipeline_replying(reply: Reply) -> (RankingPipeline, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new().backend(MODEL, true, reply));
        let gateway = Arc::new(ModelGateway::new([MODEL], client.clone(), timeouts()));
        (RankingPipeline::new(gateway, limits()), client)
    }

    fn reply_ranking(ids: &[u32]) -> Reply {
        let entries: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| json!({"rank": i + 1, "resume_id": id, "score": 90 - i}))
            .collect();
        Reply::Text(json!({"top_candidates": entries, "summary": "done"}).to_string())
    }

    fn text_docs(n: usize) -> Vec<Document> {
        (1..=n)
            .map(|i| Document::new(format!("r{i}.txt"), format!("Candidate {i} resume text")))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_upload_is_input_error() {
        let (pipeline, client) = pipeline_replying(reply_ranking(&[]));
        let err = pipeline.rank(RankingRequest::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
        assert_eq!(client.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_all_documents_failing_never_reaches_the_model() {
        let (pipeline, client) = pipeline_replying(reply_ranking(&[1]));
        let request = RankingRequest {
            documents: vec![
                Document::new("a.pdf", b"not a pdf".to_vec()),
                Document::new("b.docx", b"not a docx".to_vec()),
                Document::new("c.png", b"\x89PNG".to_vec()),
                Document::new("d.txt", "   "),
            ],
            criteria: None,
        };

        let err = pipeline.rank(request).await.unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
        assert_eq!(client.probe_count(), 0);
        assert_eq!(client.completion_count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_docx_shrinks_batch_and_pipeline_proceeds() {
        let (pipeline, client) = pipeline_replying(reply_ranking(&[2, 1]));
        let request = RankingRequest {
            documents: vec![
                Document::new("alice.pdf", pdf_with_pages(&["Alice Rust"])),
                Document::new("bob.pdf", pdf_with_pages(&["Bob Go"])),
                Document::new("carol.docx", b"broken".to_vec()),
            ],
            criteria: Some("Rust".to_string()),
        };

        let outcome = pipeline.rank(request).await.unwrap();
        let RankingOutcome::Ranked(ranking) = outcome else {
            panic!("expected a ranking");
        };
        assert_eq!(ranking.top_candidates.len(), 2);
        assert_eq!(ranking.top_candidates[0].filename, "bob.pdf");
        assert_eq!(ranking.model, MODEL);
        assert!(ranking
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::UnreadableDocument));

        let prompt = client.last_prompt().unwrap();
        assert!(prompt.contains("--- RESUME #1 (File: alice.pdf) ---"));
        assert!(prompt.contains("--- RESUME #2 (File: bob.pdf) ---"));
        assert!(!prompt.contains("carol.docx"));
    }

    #[tokio::test]
    async fn test_only_first_ten_resumes_are_sent() {
        let (pipeline, client) = pipeline_replying(reply_ranking(&[1, 2, 3]));
        let request = RankingRequest {
            documents: text_docs(12),
            criteria: None,
        };

        let outcome = pipeline.rank(request).await.unwrap();
        let prompt = client.last_prompt().unwrap();
        assert!(prompt.contains("--- RESUME #10 (File: r10.txt) ---"));
        assert!(!prompt.contains("RESUME #11"));
        assert!(!prompt.contains("RESUME #12"));
        assert!(prompt.contains(DEFAULT_CRITERIA));

        let RankingOutcome::Ranked(ranking) = outcome else {
            panic!("expected a ranking");
        };
        let capped = ranking
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::BatchCapped)
            .count();
        assert_eq!(capped, 2);
    }

    #[tokio::test]
    async fn test_apology_reply_is_raw_envelope() {
        let (pipeline, _) =
            pipeline_replying(Reply::Text("Sorry, I can't help with that.".to_string()));
        let request = RankingRequest {
            documents: text_docs(2),
            criteria: None,
        };

        let outcome = pipeline.rank(request).await.unwrap();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["raw_response"], "Sorry, I can't help with that.");
        assert_eq!(value["note"], RAW_RESPONSE_NOTE);
    }

    #[tokio::test]
    async fn test_unreachable_backends_without_secondary_is_gateway_error() {
        let client = Arc::new(ScriptedClient::new());
        let gateway = Arc::new(ModelGateway::new(
            ["gemini-1.5-flash", "gemini-1.5-pro"],
            client.clone(),
            timeouts(),
        ));
        let pipeline = RankingPipeline::new(gateway, limits());

        let err = pipeline
            .rank(RankingRequest {
                documents: text_docs(3),
                criteria: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Gateway(GatewayError::NoBackendReachable { .. })
        ));
        assert_eq!(client.probe_count(), 2);
        assert_eq!(client.completion_count(), 0);
    }

    #[tokio::test]
    async fn test_secondary_reply_is_normalized_with_its_model_id() {
        let client = Arc::new(ScriptedClient::new());
        let fallback = Arc::new(ScriptedFallback::ok(
            r#"```json
{"top_candidates": [{"rank": 1, "resume_id": 1, "score": 70}]}
```"#,
        ));
        let gateway = Arc::new(
            ModelGateway::new([MODEL], client, timeouts()).with_secondary(fallback),
        );
        let pipeline = RankingPipeline::new(gateway, limits());

        let outcome = pipeline
            .rank(RankingRequest {
                documents: text_docs(1),
                criteria: None,
            })
            .await
            .unwrap();
        let RankingOutcome::Ranked(ranking) = outcome else {
            panic!("expected a ranking");
        };
        assert_eq!(ranking.model, "claude-sonnet-4-5");
        assert_eq!(ranking.top_candidates[0].filename, "r1.txt");
    }
}
