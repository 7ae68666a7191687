//! Request-scoped data model for the ranking pipeline.
//!
//! Nothing here is persisted. Documents live for one request; the outcome is
//! serialized straight back to the caller.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Maximum number of candidates a ranking may contain.
pub const MAX_TOP_CANDIDATES: usize = 5;

/// Note attached to every raw envelope.
pub const RAW_RESPONSE_NOTE: &str = "Response returned as plain text (could not parse JSON)";

/// Declared document type. Detection is by filename extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
    Unknown,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            DocumentKind::Pdf
        } else if lower.ends_with(".docx") {
            DocumentKind::Docx
        } else if lower.ends_with(".txt") {
            DocumentKind::Text
        } else {
            DocumentKind::Unknown
        }
    }
}

/// An uploaded document, consumed once by the extractor.
#[derive(Debug, Clone)]
pub struct Document {
    pub filename: String,
    pub kind: DocumentKind,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        Self {
            kind: DocumentKind::from_filename(&filename),
            filename,
            bytes: bytes.into(),
        }
    }
}

/// A resume that yielded usable text.
///
/// `id` is the 1-based upload position, so documents dropped earlier in the
/// batch leave gaps rather than shifting later ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedResume {
    pub id: u32,
    pub filename: String,
    pub text: String,
}

/// A single ranked candidate after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub rank: u32,
    pub resume_id: u32,
    pub filename: String,
    pub score: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub reasons: String,
    #[serde(default)]
    pub key_skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
}

/// What kind of silent repair or drop a diagnostic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnsupportedDocument,
    UnreadableDocument,
    EmptyDocument,
    BatchCapped,
    MalformedCandidate,
    UnknownResumeId,
    DuplicateResumeId,
    ScoreClamped,
    CandidatesTruncated,
    RanksRenumbered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// A structurally valid ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResponse {
    pub top_candidates: Vec<CandidateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Degrade-gracefully shape used when the reply is not a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponseEnvelope {
    pub raw_response: String,
    pub note: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Successful pipeline result. Serialized untagged so callers see either
/// `{ "top_candidates": .. }` or `{ "raw_response": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RankingOutcome {
    Ranked(RankingResponse),
    Raw(RawResponseEnvelope),
}

impl RankingOutcome {
    pub fn diagnostics_mut(&mut self) -> &mut Vec<Diagnostic> {
        match self {
            RankingOutcome::Ranked(r) => &mut r.diagnostics,
            RankingOutcome::Raw(r) => &mut r.diagnostics,
        }
    }
}
