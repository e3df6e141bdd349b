//! Analyzer configuration.
//!
//! Loaded from a JSON file (every field optional) and then overridden from
//! the environment. In tests, use `AnalyzerConfig::default_test()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 1800; // 30 minutes
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const ENV_API_KEY: &str = "GEMINI_API_KEY";
const ENV_MODEL: &str = "GEMINI_MODEL";
const ENV_CACHE_TTL: &str = "ANALYSIS_CACHE_TTL_SECS";

/// Sampling parameters handed to the model with every prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub summary_max_output_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 60,
            max_output_tokens: 1500,
            temperature: 0.2,
            top_p: 0.9,
            top_k: 40,
            summary_max_output_tokens: 400,
        }
    }
}

impl LlmConfig {
    /// An empty or whitespace key counts as not configured.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn analysis_params(&self) -> GenerationParams {
        GenerationParams {
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }

    pub fn summary_params(&self) -> GenerationParams {
        GenerationParams {
            max_output_tokens: self.summary_max_output_tokens,
            ..self.analysis_params()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Record cap for frequent_pairs and round_amounts.
    pub primary_record_cap: usize,
    /// Record cap for every other kind.
    pub secondary_record_cap: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            primary_record_cap: 25,
            secondary_record_cap: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub cache_ttl_secs: u64,
    pub llm: LlmConfig,
    pub prompt: PromptConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            llm: LlmConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load from a JSON file, then apply environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalyzerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {path}: {e}"))?;
        Ok(config.with_env_overrides())
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
        if let Ok(ttl) = std::env::var(ENV_CACHE_TTL) {
            match ttl.trim().parse() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(_) => log::warn!("Ignoring invalid {ENV_CACHE_TTL}={ttl}"),
            }
        }
        self
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs.min(u32::MAX as u64) as i64)
    }

    /// No API key, default thresholds. Never reads the environment.
    pub fn default_test() -> Self {
        Self::default()
    }
}
