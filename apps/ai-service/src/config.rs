use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::LlmConfig;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-haiku";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout_seconds: u64,
    pub database_path: PathBuf,
    pub database_timeout_seconds: f64,
    pub prompt_template_dir: PathBuf,
    pub max_retry_attempts: u32,
    pub pricing_cache_ttl_seconds: u64,
    pub fallback_prompt_price: f64,
    pub fallback_completion_price: f64,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            openrouter_api_key: require(&lookup, "AI_SERVICE_OPENROUTER_API_KEY")?,
            openrouter_base_url: lookup("AI_SERVICE_OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            llm_model: lookup("AI_SERVICE_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llm_temperature: parse_or(&lookup, "AI_SERVICE_LLM_TEMPERATURE", 0.7)?,
            llm_max_tokens: parse_or(&lookup, "AI_SERVICE_LLM_MAX_TOKENS", 500)?,
            llm_timeout_seconds: parse_or(&lookup, "AI_SERVICE_LLM_TIMEOUT_SECONDS", 30)?,
            database_path: lookup("AI_SERVICE_DATABASE_PATH")
                .unwrap_or_else(|| "db.sqlite3".to_string())
                .into(),
            database_timeout_seconds: parse_or(
                &lookup,
                "AI_SERVICE_DATABASE_TIMEOUT_SECONDS",
                10.0,
            )?,
            prompt_template_dir: lookup("AI_SERVICE_PROMPT_TEMPLATE_DIR")
                .unwrap_or_else(|| "templates".to_string())
                .into(),
            max_retry_attempts: parse_or(&lookup, "AI_SERVICE_MAX_RETRY_ATTEMPTS", 0)?,
            pricing_cache_ttl_seconds: parse_or(
                &lookup,
                "AI_SERVICE_PRICING_CACHE_TTL_SECONDS",
                3600,
            )?,
            fallback_prompt_price: parse_or(
                &lookup,
                "AI_SERVICE_FALLBACK_PROMPT_PRICE",
                0.000_000_25,
            )?,
            fallback_completion_price: parse_or(
                &lookup,
                "AI_SERVICE_FALLBACK_COMPLETION_PRICE",
                0.000_001_25,
            )?,
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 8001)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.openrouter_api_key.clone(),
            base_url: self.openrouter_base_url.clone(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout: Duration::from_secs(self.llm_timeout_seconds),
            fallback_prompt_price: self.fallback_prompt_price,
            fallback_completion_price: self.fallback_completion_price,
        }
    }

    pub fn pricing_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.pricing_cache_ttl_seconds)
    }

    pub fn database_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.database_timeout_seconds)
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
