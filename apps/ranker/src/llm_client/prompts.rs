// Shared prompt constants for every provider behind the gateway.
// Ranking-specific prompt assembly lives in ranking::prompts.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Minimal completion used to check that a backend answers at all.
pub const PROBE_PROMPT: &str = "Reply with the single word OK.";

/// Output budget for probe completions.
pub const PROBE_MAX_TOKENS: u32 = 16;
