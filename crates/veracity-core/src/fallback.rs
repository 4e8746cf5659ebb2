//! Ordered model fallback.
//!
//! The candidate models are tried strictly in order, one request at a time. Each failure
//! is classified as retryable (try the next model) or terminal (stop and surface it):
//! - rate limit / quota: terminal, with a wait hint parsed from the provider message
//! - model not found / not supported: retryable
//! - transport failures (connect, timeout, unreadable body): retryable
//! - anything else: terminal

use crate::parse::parse_response;
use crate::{Error, Result, Verdict};
use regex::Regex;
use std::sync::LazyLock;

static RATE_LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)quota|rate limit|limit: 0").expect("rate limit regex"));
static NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)not found|not supported").expect("not found regex"));
static RETRY_IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in (\d+(?:\.\d+)?)\s*s").expect("retry hint regex")
});

/// Wait hint used when a rate-limit message carries none.
pub const DEFAULT_RETRY_AFTER_S: u64 = 60;

/// Why a single model call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFailure {
    /// HTTP status when the provider answered; `None` for transport failures.
    pub status: Option<u16>,
    pub message: String,
}

impl ModelFailure {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

/// A text-generation provider addressed by model name.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send `prompt` to `model` and return the reply text (possibly empty).
    async fn generate(&self, model: &str, prompt: &str)
        -> std::result::Result<String, ModelFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Try the next model; the message is kept in case every model fails.
    Retryable(String),
    Terminal(Error),
}

pub fn classify(failure: &ModelFailure) -> Outcome {
    let msg = failure.message.as_str();
    if failure.status.is_none() {
        let msg = if msg.trim().is_empty() {
            "Network or request failed"
        } else {
            msg
        };
        return Outcome::Retryable(msg.to_string());
    }
    if failure.status == Some(429) || RATE_LIMIT_RE.is_match(msg) {
        return Outcome::Terminal(Error::RateLimited {
            retry_after_s: retry_after_hint(msg),
        });
    }
    if NOT_FOUND_RE.is_match(msg) {
        return Outcome::Retryable(msg.to_string());
    }
    Outcome::Terminal(Error::Provider(msg.to_string()))
}

/// Seconds from a "retry in 12.3s" fragment, rounded up; default otherwise.
pub fn retry_after_hint(message: &str) -> u64 {
    RETRY_IN_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s.ceil() as u64)
        .unwrap_or(DEFAULT_RETRY_AFTER_S)
}

/// Run `prompt` against `models` in order and parse the first usable reply.
pub async fn analyze<B>(backend: &B, models: &[String], prompt: &str) -> Result<Verdict>
where
    B: ModelBackend + ?Sized,
{
    let mut last_error = String::new();
    for model in models {
        tracing::info!(backend = backend.name(), model = %model, "requesting analysis");
        let reply = match backend.generate(model, prompt).await {
            Ok(reply) => reply,
            Err(failure) => match classify(&failure) {
                Outcome::Retryable(msg) => {
                    tracing::warn!(model = %model, status = ?failure.status, error = %msg, "model failed; trying next");
                    last_error = msg;
                    continue;
                }
                Outcome::Terminal(err) => {
                    tracing::warn!(model = %model, status = ?failure.status, error = %err, "model failed; giving up");
                    return Err(err);
                }
            },
        };

        if reply.trim().is_empty() {
            return Err(Error::EmptyResponse);
        }
        let verdict = parse_response(&reply);
        if verdict.score.is_none() {
            tracing::warn!(model = %model, reply_chars = reply.chars().count(), "reply had no score");
            return Err(Error::Unparseable);
        }
        tracing::info!(model = %model, score = ?verdict.score, quotes = verdict.quotes.len(), "analysis parsed");
        return Ok(verdict);
    }

    if last_error.is_empty() {
        last_error = "All models failed".to_string();
    }
    Err(Error::AllModelsFailed(last_error))
}
