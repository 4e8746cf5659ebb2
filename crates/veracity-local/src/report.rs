//! Presenting a verdict: a plain-text report for terminals and an in-page overlay for the
//! annotated HTML.

use std::fmt::Write as _;
use veracity_core::dom::{Document, Element, NodeId};
use veracity_core::{Leaning, ScoreLevel, VerdictEnvelope};

pub const TOOLTIP_ID: &str = "veracity-highlight-tooltip";
pub const PANEL_ID: &str = "article-accuracy-box";
const STYLE_ID: &str = "veracity-overlay-style";

const STYLESHEET: &str = ".veracity-highlight{background:rgba(255,196,0,.35);border-bottom:2px solid #e0a800;cursor:help}\
.accuracy-box{position:fixed;right:16px;bottom:16px;max-width:360px;padding:12px;background:#fff;border:1px solid #ccc;font:14px/1.4 sans-serif;z-index:2147483647}\
.accuracy-box--high{border-color:#2e7d32}.accuracy-box--medium{border-color:#f9a825}.accuracy-box--low{border-color:#c62828}\
.accuracy-box__quote{margin:4px 0;padding-left:8px;border-left:3px solid #c62828}";

/// Display label for a leaning; anything not Left/Right reads as Center.
pub fn bias_label(leaning: Leaning) -> &'static str {
    match leaning {
        Leaning::Left => "Left",
        Leaning::Right => "Right",
        Leaning::Center => "Center",
    }
}

/// Terminal rendering of an envelope.
pub fn render_text(env: &VerdictEnvelope) -> String {
    let mut out = String::new();
    if !env.ok {
        let err = env.error.as_deref().unwrap_or("unknown error");
        let _ = writeln!(out, "Fact check failed: {err}");
        return out;
    }

    match env.score {
        Some(s) => {
            let level = ScoreLevel::from_score(s);
            let _ = writeln!(out, "Factual accuracy: {s}/10 ({})", level.as_str());
        }
        None => {
            let _ = writeln!(out, "Factual accuracy: —");
        }
    }
    match &env.bias {
        Some(b) if b.strength.is_empty() => {
            let _ = writeln!(out, "Bias: {}", bias_label(b.leaning));
        }
        Some(b) => {
            let _ = writeln!(out, "Bias: {} ({})", bias_label(b.leaning), b.strength);
        }
        None => {
            let _ = writeln!(out, "Bias: —");
        }
    }
    out.push_str("False or biased quotes:\n");
    if env.quotes.is_empty() {
        out.push_str("  None identified\n");
    }
    for q in &env.quotes {
        let _ = writeln!(out, "  - \"{}\" — {}", q.text, q.reason);
    }
    if !env.summary.is_empty() {
        let _ = writeln!(out, "Summary: {}", env.summary);
    }
    out
}

/// Handles to the overlay elements inside one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlay {
    tooltip: NodeId,
    panel: NodeId,
}

impl Overlay {
    /// Find or create the tooltip, panel and stylesheet. Attaching twice reuses them.
    pub fn attach(doc: &mut Document) -> Self {
        let body = ensure_body(doc);

        if doc.element_by_id(STYLE_ID).is_none() {
            let root = doc.root();
            let host = doc.first_element_by_tag(root, "head").unwrap_or(body);
            let style = doc.append_element(host, Element::new("style").with_attr("id", STYLE_ID));
            doc.append_text(style, STYLESHEET);
        }

        let tooltip = match doc.element_by_id(TOOLTIP_ID) {
            Some(t) => t,
            None => doc.append_element(
                body,
                Element::new("div")
                    .with_attr("id", TOOLTIP_ID)
                    .with_attr("class", "veracity-highlight-tooltip")
                    .with_attr("role", "tooltip"),
            ),
        };
        let panel = match doc.element_by_id(PANEL_ID) {
            Some(p) => p,
            None => doc.append_element(
                body,
                Element::new("div")
                    .with_attr("id", PANEL_ID)
                    .with_attr("class", "accuracy-box accuracy-box--hidden"),
            ),
        };
        Self { tooltip, panel }
    }

    /// Take any overlay elements out of the document. Returns how many were removed.
    pub fn remove(doc: &mut Document) -> usize {
        let mut removed = 0;
        for id in [TOOLTIP_ID, PANEL_ID, STYLE_ID] {
            if let Some(n) = doc.element_by_id(id) {
                doc.detach(n);
                removed += 1;
            }
        }
        removed
    }

    pub fn tooltip(&self) -> NodeId {
        self.tooltip
    }

    pub fn panel(&self) -> NodeId {
        self.panel
    }

    /// Replace the panel contents with `env`.
    pub fn render(&self, doc: &mut Document, env: &VerdictEnvelope) {
        for c in doc.children(self.panel).to_vec() {
            doc.detach(c);
        }

        let mut class = String::from("accuracy-box");
        if let Some(s) = env.score.filter(|_| env.ok) {
            class.push_str(" accuracy-box--");
            class.push_str(ScoreLevel::from_score(s).as_str());
        }
        if let Some(el) = doc.element_mut(self.panel) {
            el.set_attr("class", class);
        }

        let header = doc.append_element(
            self.panel,
            Element::new("div").with_attr("class", "accuracy-box__header"),
        );
        let title = doc.append_element(
            header,
            Element::new("span").with_attr("class", "accuracy-box__title"),
        );
        doc.append_text(title, "Fact check");

        let body = doc.append_element(
            self.panel,
            Element::new("div").with_attr("class", "accuracy-box__body"),
        );

        let score = doc.append_element(
            body,
            Element::new("p").with_attr("class", "accuracy-box__score"),
        );
        doc.append_text(score, "Factual accuracy: ");
        let value = doc.append_element(
            score,
            Element::new("span").with_attr("id", "accuracy-score-value"),
        );
        match env.score.filter(|_| env.ok) {
            Some(s) => {
                doc.append_text(value, s.to_string());
                doc.append_text(score, "/10");
            }
            None => {
                doc.append_text(value, "—");
            }
        }

        let bias = doc.append_element(
            body,
            Element::new("p").with_attr("class", "accuracy-box__bias"),
        );
        doc.append_text(bias, "Bias: ");
        match env.bias.as_ref().filter(|_| env.ok) {
            Some(b) => {
                let label = bias_label(b.leaning);
                let v = doc.append_element(
                    bias,
                    Element::new("span")
                        .with_attr("id", "bias-value")
                        .with_attr(
                            "class",
                            format!("accuracy-box__bias--{}", label.to_ascii_lowercase()),
                        ),
                );
                doc.append_text(v, label);
                if !b.strength.is_empty() {
                    doc.append_text(bias, format!(" ({})", b.strength));
                }
            }
            None => {
                let v = doc.append_element(bias, Element::new("span").with_attr("id", "bias-value"));
                doc.append_text(v, "—");
            }
        }

        let status = doc.append_element(
            body,
            Element::new("p")
                .with_attr("id", "accuracy-status")
                .with_attr("class", "accuracy-box__status"),
        );
        let status_text = match (&env.error, env.ok) {
            (Some(e), false) => e.as_str(),
            _ => env.summary.as_str(),
        };
        doc.append_text(status, status_text);

        let quotes_title = doc.append_element(
            body,
            Element::new("span").with_attr("class", "accuracy-box__quotes-title"),
        );
        doc.append_text(quotes_title, "False or biased quotes");
        let quotes = doc.append_element(
            body,
            Element::new("div").with_attr("id", "accuracy-quotes"),
        );
        if env.ok && !env.quotes.is_empty() {
            if let Some(el) = doc.element_mut(quotes) {
                el.set_attr("class", "accuracy-box__quotes");
            }
            for q in &env.quotes {
                let bq = doc.append_element(
                    quotes,
                    Element::new("blockquote")
                        .with_attr("class", "accuracy-box__quote")
                        .with_attr("title", q.reason.as_str()),
                );
                doc.append_text(bq, q.text.as_str());
            }
        } else {
            if let Some(el) = doc.element_mut(quotes) {
                el.set_attr("class", "accuracy-box__quotes accuracy-box__quotes--empty");
            }
            let p = doc.append_element(
                quotes,
                Element::new("p").with_attr("class", "accuracy-box__quotes-empty"),
            );
            doc.append_text(p, "None identified");
        }
    }
}

/// The document's `body`, created (under `html` when present) if missing.
fn ensure_body(doc: &mut Document) -> NodeId {
    let root = doc.root();
    if let Some(b) = doc.first_element_by_tag(root, "body") {
        return b;
    }
    let host = doc.first_element_by_tag(root, "html").unwrap_or(root);
    doc.append_element(host, Element::new("body"))
}
