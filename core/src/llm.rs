//! The model capability: prompt text in, free text out.
//!
//! `LlmClient` is the seam. `GeminiClient` talks to the Gemini REST API;
//! tests substitute scripted clients. Every call made by the orchestrator
//! goes through `generate_with_timeout`, so a hung client can delay a run
//! by at most the configured timeout.

use crate::config::{GenerationParams, LlmConfig};
use serde::{Deserialize, Serialize};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM capability is not configured")]
    NotConfigured,

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("LLM API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("Could not decode LLM response: {0}")]
    Decode(String),

    #[error("LLM worker failed: {0}")]
    Worker(String),
}

pub trait LlmClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;
}

/// Run `client.generate` on a worker thread and give up after `timeout`.
///
/// On timeout the worker is abandoned; its eventual result is discarded.
pub fn generate_with_timeout(
    client: Arc<dyn LlmClient>,
    prompt: String,
    params: GenerationParams,
    timeout: Duration,
) -> Result<String, LlmError> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("llm-call".into())
        .spawn(move || {
            let result = client.generate(&prompt, &params);
            // Receiver may have given up already.
            let _ = tx.send(result);
        })
        .map_err(|e| LlmError::Worker(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(LlmError::Timeout {
            secs: timeout.as_secs(),
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(LlmError::Worker("model call panicked".into()))
        }
    }
}

// ── Gemini ───────────────────────────────────────────────────────────────────

/// Blocking HTTP client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        if !config.is_configured() {
            return Err(LlmError::NotConfigured);
        }
        let api_key = config.api_key.as_deref().unwrap_or_default().trim().to_string();

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn response_text(response: GenerateResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(LlmError::EmptyResponse)
    } else {
        Ok(text)
    }
}

impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: params.max_output_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        response_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    impl LlmClient for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok("late".into())
        }
    }

    struct Echo;

    impl LlmClient for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
            Ok(prompt.to_string())
        }
    }

    fn params() -> GenerationParams {
        LlmConfig::default().analysis_params()
    }

    #[test]
    fn timeout_returns_instead_of_stalling() {
        let result = generate_with_timeout(
            Arc::new(Slow),
            "p".into(),
            params(),
            Duration::from_millis(20),
        );
        assert!(matches!(result, Err(LlmError::Timeout { .. })));
    }

    #[test]
    fn fast_call_passes_through() {
        let result =
            generate_with_timeout(Arc::new(Echo), "hello".into(), params(), Duration::from_secs(5));
        assert_eq!(result.unwrap(), "hello");
    }

    #[test]
    fn gemini_requires_a_non_blank_key() {
        let mut config = LlmConfig::default();
        assert!(matches!(GeminiClient::new(&config), Err(LlmError::NotConfigured)));
        config.api_key = Some(" \t ".into());
        assert!(matches!(GeminiClient::new(&config), Err(LlmError::NotConfigured)));
        config.api_key = Some("  key  ".into());
        assert_eq!(GeminiClient::new(&config).unwrap().api_key, "key");
    }

    #[test]
    fn gemini_endpoint_trims_trailing_slash() {
        let config = LlmConfig {
            api_key: Some("k".into()),
            base_url: "http://localhost:8080/v1beta/".into(),
            model: "m1".into(),
            ..LlmConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1beta/models/m1:generateContent");
    }

    #[test]
    fn response_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(parsed).unwrap(), "{\"a\":1}");

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(response_text(empty), Err(LlmError::EmptyResponse));
    }
}
