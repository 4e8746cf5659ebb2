//! Gemini (Generative Language API) text backend.
//!
//! Notes:
//! - One request per `generate` call; model fallback lives in `veracity_core::fallback`.
//! - The key travels as the `key` query parameter, like the upstream samples. It is never
//!   logged.
//! - Error bodies are mined for the provider's message because the fallback classifier
//!   keys off it ("not found", "quota", "retry in 12s").

use serde::Serialize;
use veracity_core::fallback::{ModelBackend, ModelFailure};
use veracity_core::{Error, Result};

/// Models tried in order when nothing is configured.
pub const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-1.5-flash-8b", "gemini-2.0-flash"];

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn gemini_api_key_from_env() -> Option<String> {
    env("VERACITY_GEMINI_API_KEY").or_else(|| env("GEMINI_API_KEY"))
}

pub fn gemini_models_from_env() -> Vec<String> {
    env("VERACITY_GEMINI_MODELS")
        .map(|s| parse_model_list(&s))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MODELS.iter().map(|s| s.to_string()).collect())
}

pub fn gemini_base_url_from_env() -> String {
    env("VERACITY_GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

pub fn gemini_timeout_ms_from_env() -> u64 {
    clamp_timeout_ms(
        env("VERACITY_GEMINI_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60_000),
    )
}

pub fn clamp_timeout_ms(ms: u64) -> u64 {
    ms.clamp(1_000, 300_000)
}

/// Comma-separated model names; blanks dropped, order kept.
pub fn parse_model_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub models: Vec<String>,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl GeminiConfig {
    /// Credential is required; everything else has a default.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(Error::MissingCredential);
        }
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|s| s.to_string()).collect(),
            timeout_ms: 60_000,
            temperature: 0.3,
            max_output_tokens: 4096,
        })
    }

    pub fn from_env() -> Result<Self> {
        let key = gemini_api_key_from_env().ok_or(Error::MissingCredential)?;
        let mut cfg = Self::new(key)?;
        cfg.base_url = gemini_base_url_from_env();
        cfg.models = gemini_models_from_env();
        cfg.timeout_ms = gemini_timeout_ms_from_env();
        Ok(cfg)
    }
}

#[derive(Debug, Serialize)]
struct ReqPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct ReqContent {
    parts: Vec<ReqPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenCfg {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiReq {
    contents: Vec<ReqContent>,
    generation_config: GenCfg,
}

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{base}/v1beta/models/{model}:generateContent",
            base = self.config.base_url.trim_end_matches('/')
        )
    }
}

/// `error.message`, else `error` as a string.
fn provider_error_message(v: &serde_json::Value) -> Option<String> {
    let err = v.get("error")?;
    err.get("message")
        .and_then(|m| m.as_str())
        .or_else(|| err.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

/// `candidates[0].content.parts[*].text`, newline-joined.
fn reply_text(v: &serde_json::Value) -> String {
    let mut out = String::new();
    let parts = v
        .get("candidates")
        .and_then(|x| x.as_array())
        .and_then(|c| c.first())
        .and_then(|c0| c0.get("content"))
        .and_then(|x| x.get("parts"))
        .and_then(|x| x.as_array());
    for p in parts.into_iter().flatten() {
        if let Some(t) = p.get("text").and_then(|x| x.as_str()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    out
}

#[async_trait::async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
    ) -> std::result::Result<String, ModelFailure> {
        let req = GeminiReq {
            contents: vec![ReqContent {
                parts: vec![ReqPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenCfg {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(std::time::Duration::from_millis(self.config.timeout_ms))
            .json(&req)
            .send()
            .await
            .map_err(|e| ModelFailure::transport(e.without_url().to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ModelFailure::transport(e.without_url().to_string()))?;
        let parsed: Option<serde_json::Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let msg = parsed
                .as_ref()
                .and_then(provider_error_message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ModelFailure::http(status.as_u16(), msg));
        }

        let v = parsed.ok_or_else(|| {
            ModelFailure::transport(format!("{model}: response body was not JSON"))
        })?;
        Ok(reply_text(&v))
    }
}
