use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_GEMINI_MODELS: &str =
    "gemini-1.5-flash,gemini-1.5-flash-latest,gemini-1.5-pro,gemini-pro";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    /// Candidate model ids in priority order.
    pub gemini_models: Vec<String>,
    /// Enables the secondary provider when set.
    pub anthropic_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub max_resumes: usize,
    pub max_resume_chars: usize,
    pub model_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let gemini_models = parse_model_list(
            &std::env::var("GEMINI_MODELS").unwrap_or_else(|_| DEFAULT_GEMINI_MODELS.to_string()),
        );
        if gemini_models.is_empty() {
            anyhow::bail!("GEMINI_MODELS must name at least one model");
        }

        Ok(Config {
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_models,
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            port: env_or("PORT", 10000)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_resumes: env_or("MAX_RESUMES", 10)?,
            max_resume_chars: env_or("MAX_RESUME_CHARS", 8000)?,
            model_timeout: Duration::from_secs(env_or("MODEL_TIMEOUT_SECS", 90)?),
            probe_timeout: Duration::from_secs(env_or("PROBE_TIMEOUT_SECS", 15)?),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
        })
    }
}

/// Splits a comma-separated model list, dropping blanks and repeats.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !models.iter().any(|m| m == id) {
            models.push(id.to_string());
        }
    }
    models
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_list_order() {
        assert_eq!(
            parse_model_list(DEFAULT_GEMINI_MODELS),
            vec![
                "gemini-1.5-flash",
                "gemini-1.5-flash-latest",
                "gemini-1.5-pro",
                "gemini-pro"
            ]
        );
    }

    #[test]
    fn test_model_list_drops_blanks_and_repeats() {
        assert_eq!(
            parse_model_list(" gemini-pro , ,gemini-1.5-pro,gemini-pro,"),
            vec!["gemini-pro", "gemini-1.5-pro"]
        );
        assert!(parse_model_list(" , ").is_empty());
    }

    #[test]
    fn test_parse_value_reports_key() {
        assert_eq!(parse_value::<u16>("PORT", " 8080 ").unwrap(), 8080);
        let err = parse_value::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
