//! Report export: renders a finished ranking for humans.
//!
//! Consumes a `RankingResponse` only; it knows nothing about extraction or
//! the model calls that produced it.

use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ranking::models::RankingResponse;

pub mod handlers;

pub trait ReportExporter: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn render(&self, ranking: &RankingResponse, generated_at: DateTime<Utc>) -> String;
}

/// Markdown report: one section per candidate, summary last.
pub struct MarkdownReport;

impl ReportExporter for MarkdownReport {
    fn content_type(&self) -> &'static str {
        "text/markdown; charset=utf-8"
    }

    fn render(&self, ranking: &RankingResponse, generated_at: DateTime<Utc>) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        match write_markdown(&mut out, ranking, generated_at) {
            Ok(()) => out,
            Err(fmt::Error) => String::new(),
        }
    }
}

fn write_markdown(
    out: &mut String,
    ranking: &RankingResponse,
    generated_at: DateTime<Utc>,
) -> fmt::Result {
    writeln!(out, "# Candidate Ranking Report\n")?;
    writeln!(out, "- Generated: {}", generated_at.format("%Y-%m-%d %H:%M UTC"))?;
    if !ranking.model.is_empty() {
        writeln!(out, "- Model: {}", ranking.model)?;
    }
    writeln!(out, "- Candidates ranked: {}", ranking.top_candidates.len())?;

    if ranking.top_candidates.is_empty() {
        writeln!(out, "\nNo candidates were ranked.")?;
    }

    for candidate in &ranking.top_candidates {
        let title = candidate
            .candidate_name
            .as_deref()
            .unwrap_or(candidate.filename.as_str());
        writeln!(out, "\n## {}. {} (score {}/100)\n", candidate.rank, title, candidate.score)?;
        writeln!(out, "- File: {} (resume #{})", candidate.filename, candidate.resume_id)?;
        if let Some(years) = candidate.experience_years {
            writeln!(out, "- Experience: {years} years")?;
        }
        if let Some(education) = &candidate.education {
            writeln!(out, "- Education: {education}")?;
        }
        if !candidate.key_skills.is_empty() {
            writeln!(out, "- Key skills: {}", candidate.key_skills.join(", "))?;
        }
        if !candidate.strengths.is_empty() {
            writeln!(out, "\n**Strengths**\n")?;
            for strength in &candidate.strengths {
                writeln!(out, "- {strength}")?;
            }
        }
        if !candidate.reasons.is_empty() {
            writeln!(out, "\n**Why in the top**\n\n{}", candidate.reasons)?;
        }
    }

    if let Some(summary) = ranking.summary.as_ref().and_then(summary_text) {
        writeln!(out, "\n## Summary\n\n{summary}")?;
    }

    Ok(())
}

fn summary_text(summary: &Value) -> Option<String> {
    match summary {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
