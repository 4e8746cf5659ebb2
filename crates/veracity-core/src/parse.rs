//! Model reply -> [`Verdict`].
//!
//! The reply format is a loose contract with a language model, not a machine format:
//!
//! ```text
//! SCORE: <int 1-10>
//! BIAS: <Left|Center|Right>, <Low|Moderate|High>
//! QUOTES:
//! - "<quote>" — <reason>
//! SUMMARY: <free text>
//! ```
//!
//! Every section is parsed by its own pure function so a missing or malformed section
//! degrades to an absent/empty field without touching the others. Nothing here errors;
//! the caller decides that a missing score is fatal.

use crate::{Bias, Leaning, Quote, Verdict, DEFAULT_REASON};
use regex::Regex;
use std::sync::LazyLock;

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SCORE:\s*(-?[0-9]+)").expect("score regex"));
static BIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)BIAS:\s*([^\n,]+),\s*([^\n]*)").expect("bias regex"));
static NEXT_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:QUOTES|SUMMARY):").expect("label regex"));
static QUOTES_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bQUOTES:\s*").expect("quotes regex"));
static SUMMARY_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSUMMARY:\s*").expect("summary regex"));
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[—–-]\s+").expect("separator regex"));

const BULLETS: &[char] = &['-', '*', '•', '‣', '◦'];
const QUOTE_MARKS: &[char] = &['"', '\'', '“', '”', '‘', '’'];

/// Parse a full model reply. Total: garbage in, empty verdict out.
pub fn parse_response(raw: &str) -> Verdict {
    Verdict {
        score: parse_score(raw),
        bias: parse_bias(raw),
        quotes: parse_quotes(raw),
        summary: parse_summary(raw),
    }
}

/// `None` stands in for a missing reply body.
pub fn parse_response_opt(raw: Option<&str>) -> Verdict {
    raw.map(parse_response).unwrap_or_default()
}

/// First integer after `SCORE:`, clamped into 1..=10.
pub fn parse_score(text: &str) -> Option<u8> {
    let tok = SCORE_RE.captures(text)?.get(1)?.as_str();
    Some(clamp_score(tok))
}

fn clamp_score(tok: &str) -> u8 {
    match tok.parse::<i64>() {
        Ok(n) => n.clamp(1, 10) as u8,
        // The regex only admits digit runs, so this is overflow.
        Err(_) if tok.starts_with('-') => 1,
        Err(_) => 10,
    }
}

/// `BIAS: <leaning>, <strength>` on one line.
///
/// Returns `None` unless the leaning token names Left, Center or Right; a malformed bias
/// line must never leak into the sections that follow it.
pub fn parse_bias(text: &str) -> Option<Bias> {
    let caps = BIAS_RE.captures(text)?;
    let leaning = Leaning::from_token(caps.get(1)?.as_str().trim())?;

    let mut strength = caps.get(2)?.as_str();
    if let Some(m) = NEXT_LABEL_RE.find(strength) {
        strength = &strength[..m.start()];
    }
    let strength = strength.trim();
    if strength.is_empty() {
        return None;
    }
    Some(Bias {
        leaning,
        strength: strength.to_string(),
    })
}

/// Lines between `QUOTES:` and the following `SUMMARY:` (or end of text).
pub fn parse_quotes(text: &str) -> Vec<Quote> {
    let Some(label) = QUOTES_LABEL_RE.find(text) else {
        return Vec::new();
    };
    let rest = &text[label.end()..];
    let block = match SUMMARY_LABEL_RE.find(rest) {
        Some(m) => &rest[..m.start()],
        None => rest,
    };
    block.lines().filter_map(parse_quote_line).collect()
}

fn parse_quote_line(line: &str) -> Option<Quote> {
    let line = strip_bullet(line);
    if line.is_empty() || is_none_sentinel(line) {
        return None;
    }
    let (quote, reason) = match SEPARATOR_RE.find(line) {
        Some(sep) => (&line[..sep.start()], line[sep.end()..].trim()),
        None => (line, ""),
    };
    let text = strip_quote_marks(quote.trim()).trim();
    if text.is_empty() {
        return None;
    }
    let reason = if reason.is_empty() {
        DEFAULT_REASON
    } else {
        reason
    };
    Some(Quote::new(text, reason))
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim_start();
    line.strip_prefix(BULLETS).unwrap_or(line).trim()
}

fn is_none_sentinel(line: &str) -> bool {
    let l = line.trim_end_matches('.').trim();
    l.eq_ignore_ascii_case("none identified")
}

/// Remove at most one quotation mark from each end.
fn strip_quote_marks(s: &str) -> &str {
    let s = s.strip_prefix(QUOTE_MARKS).unwrap_or(s);
    s.strip_suffix(QUOTE_MARKS).unwrap_or(s)
}

/// Everything after `SUMMARY:`, whitespace-collapsed.
pub fn parse_summary(text: &str) -> String {
    match SUMMARY_LABEL_RE.find(text) {
        Some(m) => collapse_whitespace(&text[m.end()..]),
        None => String::new(),
    }
}

/// Trim and collapse every whitespace run (newlines, NBSP, tabs) to one space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
