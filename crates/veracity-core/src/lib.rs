//! Backend-agnostic types and algorithms for `veracity`.
//!
//! Nothing in this crate performs IO. Network and page access live in `veracity-local`;
//! this crate owns the parts that must stay deterministic:
//! - [`parse`]: model reply text -> [`Verdict`]
//! - [`highlight`] + [`dom`]: re-locating a verdict's quotes inside a text-node tree
//! - [`fallback`]: the ordered model-fallback driver behind the [`fallback::ModelBackend`] trait

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod dom;
pub mod fallback;
pub mod highlight;
pub mod parse;

pub use highlight::{Highlighter, TextTree};
pub use parse::parse_response;

/// Reason attached to quotes that arrive without one.
pub const DEFAULT_REASON: &str = "Flagged as potentially problematic.";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Could not find article text on this page.")]
    NoArticle,
    #[error("No API key. Set VERACITY_GEMINI_API_KEY (or GEMINI_API_KEY).")]
    MissingCredential,
    #[error(
        "Rate limit reached. Try again in {retry_after_s} seconds. See ai.google.dev/gemini-api/docs/rate-limits"
    )]
    RateLimited { retry_after_s: u64 },
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    Transport(String),
    #[error("Empty or invalid response from model")]
    EmptyResponse,
    #[error("Could not parse score from response")]
    Unparseable,
    #[error("{0}")]
    AllModelsFailed(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Political/editorial direction of a bias assessment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Leaning {
    Left,
    Center,
    Right,
}

impl Leaning {
    /// Map a free-text token onto a leaning by containment.
    ///
    /// "Left" wins over "Right", which wins over "Center" ("Center-Left" is Left).
    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.to_lowercase();
        if t.contains("left") {
            Some(Self::Left)
        } else if t.contains("right") {
            Some(Self::Right)
        } else if t.contains("center") {
            Some(Self::Center)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Center => "Center",
            Self::Right => "Right",
        }
    }
}

impl fmt::Display for Leaning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bias {
    pub leaning: Leaning,
    /// Free text as the model wrote it ("Low", "Moderate", "High", ...).
    pub strength: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub text: String,
    pub reason: String,
}

impl Quote {
    pub fn new(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reason: reason.into(),
        }
    }
}

/// Structured result of parsing a model reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    /// 1..=10 when present.
    pub score: Option<u8>,
    pub bias: Option<Bias>,
    /// Empty is a valid answer ("None identified"); entries never have empty text.
    pub quotes: Vec<Quote>,
    /// Whitespace-collapsed; empty when the reply had no summary.
    pub summary: String,
}

impl Verdict {
    pub fn level(&self) -> Option<ScoreLevel> {
        self.score.map(ScoreLevel::from_score)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLevel {
    High,
    Medium,
    Low,
}

impl ScoreLevel {
    pub fn from_score(score: u8) -> Self {
        if score >= 8 {
            Self::High
        } else if score >= 4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Wire shape handed to presentation: either a scored verdict or an error string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerdictEnvelope {
    pub ok: bool,
    pub score: Option<u8>,
    pub bias: Option<Bias>,
    #[serde(default)]
    pub quotes: Vec<Quote>,
    #[serde(default)]
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerdictEnvelope {
    pub fn failure(err: &Error) -> Self {
        Self {
            ok: false,
            score: None,
            bias: None,
            quotes: Vec::new(),
            summary: String::new(),
            error: Some(err.to_string()),
        }
    }

    /// The verdict carried by a successful envelope.
    pub fn verdict(&self) -> Option<Verdict> {
        self.ok.then(|| Verdict {
            score: self.score,
            bias: self.bias.clone(),
            quotes: self.quotes.clone(),
            summary: self.summary.clone(),
        })
    }
}

impl From<Verdict> for VerdictEnvelope {
    fn from(v: Verdict) -> Self {
        // A verdict without a score is unusable for the caller.
        if v.score.is_none() {
            return Self::failure(&Error::Unparseable);
        }
        Self {
            ok: true,
            score: v.score,
            bias: v.bias,
            quotes: v.quotes,
            summary: v.summary,
            error: None,
        }
    }
}

impl From<Result<Verdict>> for VerdictEnvelope {
    fn from(r: Result<Verdict>) -> Self {
        match r {
            Ok(v) => v.into(),
            Err(e) => Self::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaning_precedence_prefers_left_then_right() {
        assert_eq!(Leaning::from_token("Center-Left"), Some(Leaning::Left));
        assert_eq!(Leaning::from_token("center right"), Some(Leaning::Right));
        assert_eq!(Leaning::from_token("CENTER"), Some(Leaning::Center));
        assert_eq!(Leaning::from_token("Purple"), None);
    }

    #[test]
    fn score_levels_match_thresholds() {
        assert_eq!(ScoreLevel::from_score(10), ScoreLevel::High);
        assert_eq!(ScoreLevel::from_score(8), ScoreLevel::High);
        assert_eq!(ScoreLevel::from_score(7), ScoreLevel::Medium);
        assert_eq!(ScoreLevel::from_score(4), ScoreLevel::Medium);
        assert_eq!(ScoreLevel::from_score(3), ScoreLevel::Low);
    }

    #[test]
    fn envelope_promotes_missing_score_to_error() {
        let env = VerdictEnvelope::from(Verdict::default());
        assert!(!env.ok);
        assert_eq!(
            env.error.as_deref(),
            Some("Could not parse score from response")
        );
    }

    #[test]
    fn envelope_json_shape_is_stable() {
        let v = Verdict {
            score: Some(7),
            bias: Some(Bias {
                leaning: Leaning::Left,
                strength: "High".to_string(),
            }),
            quotes: vec![Quote::new("Cats can fly.", "No evidence.")],
            summary: "Mostly fine.".to_string(),
        };
        let js = serde_json::to_value(VerdictEnvelope::from(v.clone())).unwrap();
        assert_eq!(js["ok"], true);
        assert_eq!(js["score"], 7);
        assert_eq!(js["bias"]["leaning"], "Left");
        assert_eq!(js["bias"]["strength"], "High");
        assert_eq!(js["quotes"][0]["text"], "Cats can fly.");
        assert!(js.get("error").is_none());

        let back: VerdictEnvelope = serde_json::from_value(js).unwrap();
        assert_eq!(back.verdict(), Some(v));
    }

    #[test]
    fn rate_limit_message_embeds_wait_hint() {
        let e = Error::RateLimited { retry_after_s: 42 };
        assert!(e.to_string().starts_with("Rate limit reached. Try again in 42 seconds."));
    }
}
