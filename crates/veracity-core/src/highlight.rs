//! Re-locating a verdict's quotes inside a text-node tree.
//!
//! Model-echoed quotes rarely match the page byte for byte: the model collapses line
//! breaks, NBSPs and double spaces. Matching is therefore two-step per text node: an
//! exact substring search for the whitespace-normalised quote (the "search key"), then a
//! whitespace-tolerant regex where every space in the key matches `\s+`.
//!
//! Limits:
//! - only the first matching text node per distinct key is wrapped
//! - a quote that spans two text nodes (e.g. split by `<em>`) is not recovered
//! - a key that matches nowhere is skipped silently; it is not an error

use crate::parse::collapse_whitespace;
use crate::{Quote, DEFAULT_REASON};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;

/// Class carried by every highlight marker element.
pub const MARKER_CLASS: &str = "veracity-highlight";

/// The tree surface the matcher needs: read-only traversal plus two mutations.
pub trait TextTree {
    type Node: Copy + Eq + std::fmt::Debug;

    /// Text-bearing leaves under `root`, in document order.
    fn text_nodes(&self, root: Self::Node) -> Vec<Self::Node>;

    fn node_text(&self, node: Self::Node) -> &str;

    /// True when some ancestor of `node` is a highlight marker.
    fn is_inside_marker(&self, node: Self::Node) -> bool;

    /// Replace `node` with `[before?, marker(range), after?]`; `range` is in bytes.
    ///
    /// Returns the marker, or `None` when the range is empty/out of bounds.
    fn split_and_wrap(
        &mut self,
        node: Self::Node,
        range: Range<usize>,
        reason: &str,
    ) -> Option<Self::Node>;

    /// Turn every marker under `root` back into plain text, merging adjacent text nodes.
    /// Returns how many markers were removed.
    fn unwrap_all(&mut self, root: Self::Node) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    WhitespaceTolerant,
}

/// One located occurrence of a search key: `len` bytes of `node`'s text from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchableSpan<N> {
    pub node: N,
    pub start: usize,
    pub len: usize,
    pub kind: MatchKind,
}

impl<N> MatchableSpan<N> {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Whitespace-normalised form of a quote used to drive matching.
pub fn search_key(text: &str) -> String {
    collapse_whitespace(text)
}

/// Compiled matcher for one search key.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    key: String,
    tolerant: Option<Regex>,
}

impl KeyMatcher {
    /// `None` for keys that normalise to nothing.
    pub fn new(text: &str) -> Option<Self> {
        let key = search_key(text);
        if key.is_empty() {
            return None;
        }
        let pattern = key
            .split(' ')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        // A pattern that fails to compile (size limits) just loses the fallback.
        let tolerant = Regex::new(&pattern).ok();
        Some(Self { key, tolerant })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Byte range + kind of the first match in `content`.
    pub fn find_in(&self, content: &str) -> Option<(Range<usize>, MatchKind)> {
        if let Some(i) = content.find(&self.key) {
            return Some((i..i + self.key.len(), MatchKind::Exact));
        }
        let m = self.tolerant.as_ref()?.find(content)?;
        Some((m.range(), MatchKind::WhitespaceTolerant))
    }
}

/// First span under `root` matching `matcher`, ignoring text already inside a marker.
pub fn find_span<T: TextTree>(
    tree: &T,
    root: T::Node,
    matcher: &KeyMatcher,
) -> Option<MatchableSpan<T::Node>> {
    for node in tree.text_nodes(root) {
        let Some((range, kind)) = matcher.find_in(tree.node_text(node)) else {
            continue;
        };
        if range.is_empty() || tree.is_inside_marker(node) {
            continue;
        }
        return Some(MatchableSpan {
            node,
            start: range.start,
            len: range.len(),
            kind,
        });
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrappedQuote {
    pub key: String,
    pub reason: String,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HighlightReport {
    /// Markers from an earlier pass that were unwound first.
    pub unwrapped: usize,
    pub wrapped: Vec<WrappedQuote>,
    /// Keys that matched no text node.
    pub not_found: Vec<String>,
    /// Quotes skipped because an identical key was already handled (or was empty).
    pub skipped: usize,
}

/// Highlighting context: created once and reused across passes.
#[derive(Debug, Clone)]
pub struct Highlighter {
    default_reason: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            default_reason: DEFAULT_REASON.to_string(),
        }
    }

    pub fn with_default_reason(mut self, reason: impl Into<String>) -> Self {
        self.default_reason = reason.into();
        self
    }

    /// Remove every marker under `root`.
    pub fn clear<T: TextTree>(&self, tree: &mut T, root: T::Node) -> usize {
        tree.unwrap_all(root)
    }

    /// Unwind the previous pass, then wrap the first occurrence of each distinct quote.
    pub fn highlight<T: TextTree>(
        &self,
        tree: &mut T,
        root: T::Node,
        quotes: &[Quote],
    ) -> HighlightReport {
        let mut report = HighlightReport {
            unwrapped: tree.unwrap_all(root),
            ..HighlightReport::default()
        };

        let mut seen: HashSet<String> = HashSet::new();
        for q in quotes {
            let Some(matcher) = KeyMatcher::new(&q.text) else {
                report.skipped += 1;
                continue;
            };
            if seen.contains(matcher.key()) {
                report.skipped += 1;
                continue;
            }
            let reason = match q.reason.trim() {
                "" => self.default_reason.as_str(),
                r => r,
            };

            let wrapped = find_span(tree, root, &matcher)
                .and_then(|span| tree.split_and_wrap(span.node, span.range(), reason).map(|_| span));
            match wrapped {
                Some(span) => {
                    tracing::debug!(key = matcher.key(), kind = ?span.kind, "quote highlighted");
                    report.wrapped.push(WrappedQuote {
                        key: matcher.key().to_string(),
                        reason: reason.to_string(),
                        kind: span.kind,
                    });
                    seen.insert(matcher.key().to_string());
                }
                None => {
                    tracing::debug!(key = matcher.key(), "quote not found in page text");
                    report.not_found.push(matcher.key().to_string());
                }
            }
        }

        tracing::debug!(
            wrapped = report.wrapped.len(),
            not_found = report.not_found.len(),
            unwrapped = report.unwrapped,
            "highlight pass done"
        );
        report
    }
}
