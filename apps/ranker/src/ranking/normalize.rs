//! Response Normalizer: turns a free-form model reply into a bounded ranking.
//!
//! Never fails outward: anything that is not a JSON object degrades to a
//! `RawResponseEnvelope`. Every entry that gets dropped or repaired on the way
//! leaves a diagnostic.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ranking::models::{
    CandidateResult, Diagnostic, DiagnosticKind, ExtractedResume, RankingOutcome,
    RankingResponse, RawResponseEnvelope, MAX_TOP_CANDIDATES, RAW_RESPONSE_NOTE,
};

/// Candidate entry as the model wrote it. Numeric fields stay loose because
/// models alternate between `3`, `3.0` and `"3"`.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    rank: Option<Value>,
    #[serde(default)]
    resume_id: Option<Value>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    strengths: Option<Vec<String>>,
    #[serde(default)]
    reasons: Option<String>,
    #[serde(default)]
    key_skills: Option<Vec<String>>,
    #[serde(default)]
    candidate_name: Option<String>,
    #[serde(default)]
    experience_years: Option<Value>,
    #[serde(default)]
    education: Option<String>,
}

/// Strips a single leading ```` ```json ```` / ```` ``` ```` marker and a
/// single trailing ```` ``` ```` marker. Content is never touched.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Normalizes a raw completion against the batch that produced it.
pub fn normalize_response(raw: &str, model: &str, resumes: &[ExtractedResume]) -> RankingOutcome {
    let cleaned = strip_code_fences(raw);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            warn!("Model reply is not valid JSON ({e}); returning raw envelope");
            debug!("Raw reply: {}", cleaned.chars().take(200).collect::<String>());
            return raw_envelope(cleaned, model);
        }
    };

    let Value::Object(mut object) = value else {
        warn!("Model reply is JSON but not an object; returning raw envelope");
        return raw_envelope(cleaned, model);
    };

    let mut diagnostics = Vec::new();
    let entries = match object.remove("top_candidates") {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::MalformedCandidate,
                "top_candidates is not a list; treated as empty",
            ));
            Vec::new()
        }
    };

    let top_candidates = validate_candidates(entries, resumes, &mut diagnostics);

    RankingOutcome::Ranked(RankingResponse {
        top_candidates,
        summary: object.remove("summary"),
        model: model.to_string(),
        diagnostics,
    })
}

fn raw_envelope(cleaned: &str, model: &str) -> RankingOutcome {
    RankingOutcome::Raw(RawResponseEnvelope {
        raw_response: cleaned.to_string(),
        note: RAW_RESPONSE_NOTE.to_string(),
        model: model.to_string(),
        diagnostics: Vec::new(),
    })
}

/// Schema-checks each entry, drops references to resumes outside the batch,
/// truncates to the top five, and renumbers ranks to 1..=n.
fn validate_candidates(
    entries: Vec<Value>,
    resumes: &[ExtractedResume],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<CandidateResult> {
    let filenames: HashMap<u32, &str> = resumes
        .iter()
        .map(|r| (r.id, r.filename.as_str()))
        .collect();
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut model_ranks = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let position = index + 1;
        let raw: RawCandidate = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::MalformedCandidate,
                    format!("candidate entry {position} dropped: {e}"),
                ));
                continue;
            }
        };

        let Some(resume_id) = raw.resume_id.as_ref().and_then(as_u32) else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::MalformedCandidate,
                format!("candidate entry {position} dropped: missing or non-numeric resume_id"),
            ));
            continue;
        };

        let Some(filename) = filenames.get(&resume_id) else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnknownResumeId,
                format!("candidate entry {position} dropped: resume #{resume_id} was not submitted"),
            ));
            continue;
        };

        let Some(raw_score) = raw.score.as_ref().and_then(as_f64) else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::MalformedCandidate,
                format!("candidate entry {position} dropped: missing or non-numeric score"),
            ));
            continue;
        };

        if !seen.insert(resume_id) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::DuplicateResumeId,
                format!("candidate entry {position} dropped: resume #{resume_id} already ranked"),
            ));
            continue;
        }

        let clamped = raw_score.clamp(0.0, 100.0);
        if clamped != raw_score {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::ScoreClamped,
                format!("resume #{resume_id} score {raw_score} clamped to {clamped}"),
            ));
        }

        if raw.filename.as_deref() != Some(*filename) {
            debug!("Replacing model filename {:?} for resume #{resume_id}", raw.filename);
        }

        model_ranks.push(raw.rank.as_ref().and_then(as_u32));
        accepted.push(CandidateResult {
            rank: 0,
            resume_id,
            filename: filename.to_string(),
            score: clamped.round() as u8,
            strengths: raw.strengths.unwrap_or_default(),
            reasons: raw.reasons.unwrap_or_default(),
            key_skills: raw.key_skills.unwrap_or_default(),
            candidate_name: raw.candidate_name,
            experience_years: raw.experience_years.as_ref().and_then(as_f64),
            education: raw.education,
        });
    }

    if accepted.len() > MAX_TOP_CANDIDATES {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::CandidatesTruncated,
            format!(
                "{} candidates returned; keeping the first {MAX_TOP_CANDIDATES}",
                accepted.len()
            ),
        ));
        accepted.truncate(MAX_TOP_CANDIDATES);
        model_ranks.truncate(MAX_TOP_CANDIDATES);
    }

    let contiguous = model_ranks
        .iter()
        .enumerate()
        .all(|(i, rank)| *rank == Some(i as u32 + 1));
    if !contiguous {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::RanksRenumbered,
            "ranks renumbered 1..n in reply order",
        ));
    }
    for (i, candidate) in accepted.iter_mut().enumerate() {
        candidate.rank = i as u32 + 1;
    }

    accepted
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    let n = as_f64(value)?;
    if n.fract() == 0.0 && n >= 0.0 && n <= u32::MAX as f64 {
        Some(n as u32)
    } else {
        None
    }
}
