//! Prompt Builder: deterministic assembly of the single ranking prompt.

use std::fmt::Write;

use crate::ranking::models::{ExtractedResume, MAX_TOP_CANDIDATES};

/// Substituted when the caller leaves the criteria blank.
pub const DEFAULT_CRITERIA: &str = "General qualifications, work experience, education, skills";

/// Role and task framing. Replace `{top_n}` and `{criteria}`.
const RANKING_FRAMING_TEMPLATE: &str = "You are an expert recruiter. \
Analyze the following resumes and select the TOP {top_n} candidates.

Selection criteria: {criteria}

Resumes:";

/// Output schema section. Replace `{top_n}`.
const OUTPUT_SCHEMA_TEMPLATE: &str = r#"

Respond STRICTLY in JSON (no markdown, no comments) using this schema:
{
  "top_candidates": [
    {
      "rank": 1,
      "resume_id": 1,
      "filename": "file name exactly as given above",
      "score": 95,
      "strengths": ["strength 1", "strength 2"],
      "reasons": "Short explanation of why this candidate is in the top",
      "key_skills": ["skill 1", "skill 2"],
      "candidate_name": "optional, if stated in the resume",
      "experience_years": 5,
      "education": "optional, highest degree and institution"
    }
  ],
  "summary": "Overall summary of the top candidates"
}

Rules:
- Return at most {top_n} entries in "top_candidates", ordered by rank starting at 1.
- "resume_id" MUST be one of the RESUME # numbers above. Never invent ids.
- "score" is an integer from 0 to 100.

Return JSON only, no surrounding formatting. Nothing else."#;

/// Returns the caller's criteria, or the default when blank.
pub fn effective_criteria(criteria: &str) -> &str {
    let trimmed = criteria.trim();
    if trimmed.is_empty() {
        DEFAULT_CRITERIA
    } else {
        trimmed
    }
}

/// Builds the ranking prompt: framing, one block per resume in input order,
/// then the fixed output schema.
pub fn build_ranking_prompt(criteria: &str, resumes: &[ExtractedResume]) -> String {
    let top_n = resumes.len().min(MAX_TOP_CANDIDATES).to_string();

    let mut prompt = RANKING_FRAMING_TEMPLATE
        .replace("{top_n}", &top_n)
        .replace("{criteria}", effective_criteria(criteria));

    for resume in resumes {
        // Writing into a String cannot fail.
        let _ = write!(
            prompt,
            "\n\n--- RESUME #{} (File: {}) ---\n{}\n",
            resume.id, resume.filename, resume.text
        );
    }

    prompt.push_str(&OUTPUT_SCHEMA_TEMPLATE.replace("{top_n}", &top_n));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resume(id: u32, filename: &str, text: &str) -> ExtractedResume {
        ExtractedResume {
            id,
            filename: filename.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_blank_criteria_uses_default() {
        assert_eq!(effective_criteria(""), DEFAULT_CRITERIA);
        assert_eq!(effective_criteria("   \n"), DEFAULT_CRITERIA);
        assert_eq!(effective_criteria(" Rust, 5+ years "), "Rust, 5+ years");
    }

    #[test]
    fn test_prompt_contains_blocks_in_input_order() {
        let resumes = vec![
            resume(1, "alice.pdf", "Alice knows Rust"),
            resume(3, "carol.txt", "Carol knows Go"),
        ];
        let prompt = build_ranking_prompt("Backend engineers", &resumes);

        let first = prompt.find("--- RESUME #1 (File: alice.pdf) ---").unwrap();
        let second = prompt.find("--- RESUME #3 (File: carol.txt) ---").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Alice knows Rust"));
        assert!(prompt.contains("Selection criteria: Backend engineers"));
    }

    #[test]
    fn test_prompt_names_every_schema_field() {
        let prompt = build_ranking_prompt("", &[resume(1, "a.txt", "text")]);
        for field in [
            "top_candidates",
            "rank",
            "resume_id",
            "filename",
            "score",
            "strengths",
            "reasons",
            "key_skills",
            "candidate_name",
            "experience_years",
            "education",
            "summary",
        ] {
            assert!(prompt.contains(&format!("\"{field}\"")), "missing {field}");
        }
        assert!(prompt.contains("Return JSON only, no surrounding formatting"));
        assert!(prompt.contains(DEFAULT_CRITERIA));
    }

    #[test]
    fn test_requested_count_is_capped_by_batch_size() {
        let two = build_ranking_prompt("", &[resume(1, "a", "x"), resume(2, "b", "y")]);
        assert!(two.contains("select the TOP 2 candidates"));

        let many: Vec<_> = (1..=8).map(|i| resume(i, "f", "t")).collect();
        let eight = build_ranking_prompt("", &many);
        assert!(eight.contains("select the TOP 5 candidates"));
    }

    #[test]
    fn test_placeholders_in_user_text_are_not_expanded() {
        let prompt = build_ranking_prompt("{top_n}", &[resume(1, "a", "{criteria}")]);
        assert!(prompt.contains("Selection criteria: {top_n}"));
        assert!(prompt.contains("{criteria}"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let resumes = vec![resume(1, "a.txt", "one"), resume(2, "b.txt", "two")];
        assert_eq!(
            build_ranking_prompt("x", &resumes),
            build_ranking_prompt("x", &resumes)
        );
    }
}
