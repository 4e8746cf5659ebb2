//! Locating the article on a page.
//!
//! Pages are parsed once with `scraper` (html5ever) and mirrored into a
//! [`veracity_core::dom::Document`], which is the tree that later gets highlighted. CSS
//! selection happens against the scraper tree while it is still alive; only the matching
//! arena node ids are kept.
//!
//! Strategy (first hit wins):
//! 1. a fixed priority list of article-body selectors, accepting the first match whose
//!    inner text is longer than `min_article_chars`
//! 2. element fallback: `main` (else `body`) if it contains any `<p>`
//! 3. text fallback: every `<p>` under `main`/`body` longer than `min_paragraph_chars`,
//!    joined with blank lines, accepted if longer than `min_article_chars`

use serde::Serialize;
use std::collections::HashMap;
use veracity_core::dom::{Document, Element, NodeData, NodeId};
use veracity_core::{Error, Result};

/// Article-body selectors seen across common news sites, in priority order.
pub const ARTICLE_SELECTORS: &[&str] = &[
    "article",
    "[role=\"article\"]",
    ".article-body",
    ".article__body",
    ".post-content",
    ".entry-content",
    ".content-body",
    ".story-body",
    ".article-content",
    "main article",
    ".ArticleBody",
    ".article-body__content",
    "[data-testid=\"article-body\"]",
    ".wysiwyg",
    ".rich-text",
    ".post__content",
    ".story-content",
    ".js-article__body",
    ".article__content",
    ".article-body-content",
    ".article-body-text",
    ".content__body",
    ".article__main",
    ".story-body__inner",
    ".article-body-wrapper",
    ".Prose",
    ".prose",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tr",
    "ul",
];

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// A parsed page: the mutable tree plus the selector hits computed at parse time.
#[derive(Debug, Clone)]
pub struct Page {
    doc: Document,
    selector_hits: Vec<(&'static str, NodeId)>,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        let parsed = html_scraper::Html::parse_document(html);
        let mut doc = Document::new();

        // scraper node id -> arena node id. Pre-order guarantees parents come first.
        let mut ids = HashMap::new();
        let root = parsed.tree.root();
        ids.insert(root.id(), doc.root());
        for node in root.descendants().skip(1) {
            let Some(parent) = node.parent().and_then(|p| ids.get(&p.id()).copied()) else {
                continue;
            };
            let data = match node.value() {
                html_scraper::Node::Element(e) => {
                    let mut el = Element::new(e.name());
                    for (k, v) in e.attrs() {
                        el.set_attr(k, v);
                    }
                    NodeData::Element(el)
                }
                html_scraper::Node::Text(t) => NodeData::Text(String::from(&**t)),
                html_scraper::Node::Comment(c) => NodeData::Comment(String::from(&**c)),
                html_scraper::Node::Doctype(d) => NodeData::Doctype(d.name().to_string()),
                // Document/fragment roots and processing instructions carry no content.
                _ => continue,
            };
            let id = doc.create(data);
            doc.append(parent, id);
            ids.insert(node.id(), id);
        }

        let mut selector_hits = Vec::new();
        for src in ARTICLE_SELECTORS {
            let Ok(sel) = html_scraper::Selector::parse(src) else {
                continue;
            };
            if let Some(id) = parsed
                .select(&sel)
                .next()
                .and_then(|el| ids.get(&el.id()).copied())
            {
                selector_hits.push((*src, id));
            }
        }

        Self { doc, selector_hits }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn to_html(&self) -> String {
        self.doc.to_html()
    }

    /// `main` if present, else `body`.
    pub fn main_region(&self) -> Option<NodeId> {
        let root = self.doc.root();
        self.doc
            .first_element_by_tag(root, "main")
            .or_else(|| self.doc.first_element_by_tag(root, "body"))
    }

    fn paragraphs(&self, under: NodeId) -> Vec<NodeId> {
        self.doc
            .descendants(under)
            .filter(|n| self.doc.tag_name(*n) == Some("p"))
            .collect()
    }
}

/// Rendered text of `node`, roughly what a browser's `innerText` yields.
///
/// Block elements and `<br>` start new lines; whitespace inside a line is collapsed and
/// blank lines are dropped.
pub fn inner_text(doc: &Document, node: NodeId) -> String {
    let mut raw = String::new();
    collect_text(doc, node, &mut raw);
    raw.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(doc: &Document, node: NodeId, out: &mut String) {
    match doc.data(node) {
        NodeData::Text(t) => out.push_str(&t.replace('\n', " ")),
        NodeData::Element(e) => {
            let name = e.name.as_str();
            if SKIPPED_ELEMENTS.contains(&name) {
                return;
            }
            if name == "br" {
                out.push('\n');
                return;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push('\n');
            }
            for c in doc.children(node) {
                collect_text(doc, *c, out);
            }
            if block {
                out.push('\n');
            }
        }
        NodeData::Document => {
            for c in doc.children(node) {
                collect_text(doc, *c, out);
            }
        }
        NodeData::Comment(_) | NodeData::Doctype(_) => {}
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "selector", rename_all = "snake_case")]
pub enum Strategy {
    Selector(&'static str),
    Paragraphs,
}

/// What the rest of the pipeline needs: text to send, element to highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Highlight root; `None` when only the text fallback produced anything.
    pub element: Option<NodeId>,
    pub text: String,
    pub strategy: Strategy,
}

#[derive(Debug, Clone)]
pub struct ArticleLocator {
    pub min_article_chars: usize,
    pub min_paragraph_chars: usize,
}

impl Default for ArticleLocator {
    fn default() -> Self {
        Self {
            min_article_chars: 200,
            min_paragraph_chars: 50,
        }
    }
}

impl ArticleLocator {
    fn selector_hit(&self, page: &Page) -> Option<(&'static str, NodeId, String)> {
        page.selector_hits.iter().find_map(|(sel, id)| {
            let text = inner_text(&page.doc, *id);
            (text.chars().count() > self.min_article_chars).then(|| (*sel, *id, text))
        })
    }

    /// The element to highlight in.
    pub fn article_element(&self, page: &Page) -> Option<NodeId> {
        if let Some((_, id, _)) = self.selector_hit(page) {
            return Some(id);
        }
        let main = page.main_region()?;
        (!page.paragraphs(main).is_empty()).then_some(main)
    }

    /// The text to analyse.
    pub fn article_text(&self, page: &Page) -> Option<(String, Strategy)> {
        if let Some((sel, _, text)) = self.selector_hit(page) {
            return Some((text, Strategy::Selector(sel)));
        }
        let main = page.main_region()?;
        let parts: Vec<String> = page
            .paragraphs(main)
            .into_iter()
            .map(|p| inner_text(&page.doc, p))
            .filter(|t| t.chars().count() > self.min_paragraph_chars)
            .collect();
        let text = parts.join("\n\n");
        (text.chars().count() > self.min_article_chars).then_some((text, Strategy::Paragraphs))
    }

    pub fn locate(&self, page: &Page) -> Result<Article> {
        let Some((text, strategy)) = self.article_text(page) else {
            tracing::info!("no article text found");
            return Err(Error::NoArticle);
        };
        let element = self.article_element(page);
        tracing::info!(strategy = ?strategy, chars = text.chars().count(), has_element = element.is_some(), "article located");
        Ok(Article {
            element,
            text,
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_sentence(word: &str) -> String {
        format!("{word} reported that the committee reviewed the budget line by line and found several discrepancies worth noting. ")
    }

    #[test]
    fn article_tag_wins_when_long_enough() {
        let body = long_sentence("The paper").repeat(3);
        let html = format!(
            "<html><body><nav>Home News</nav><article><h1>Title</h1><p>{body}</p></article></body></html>"
        );
        let page = Page::parse(&html);
        let art = ArticleLocator::default().locate(&page).unwrap();
        assert_eq!(art.strategy, Strategy::Selector("article"));
        assert!(art.text.starts_with("Title\nThe paper reported"));
        assert!(!art.text.contains("Home"));
        let el = art.element.unwrap();
        assert_eq!(page.document().tag_name(el), Some("article"));
    }

    #[test]
    fn short_article_falls_through_to_class_selector() {
        let body = long_sentence("Reuters").repeat(3);
        let html = format!(
            "<body><article>tiny teaser</article><div class=\"story-body\"><p>{body}</p></div></body>"
        );
        let page = Page::parse(&html);
        let art = ArticleLocator::default().locate(&page).unwrap();
        assert_eq!(art.strategy, Strategy::Selector(".story-body"));
    }

    #[test]
    fn paragraph_fallback_joins_long_paragraphs() {
        let p1 = long_sentence("First");
        let p2 = long_sentence("Second");
        let html = format!(
            "<body><main><div><p>{p1}</p><p>short</p><p>{p2}</p></div></main></body>"
        );
        let page = Page::parse(&html);
        let art = ArticleLocator::default().locate(&page).unwrap();
        assert_eq!(art.strategy, Strategy::Paragraphs);
        assert_eq!(art.text, format!("{}\n\n{}", p1.trim(), p2.trim()));
        assert!(!art.text.contains("short"));
        assert_eq!(page.document().tag_name(art.element.unwrap()), Some("main"));
    }

    #[test]
    fn too_little_text_is_no_article() {
        let page = Page::parse("<body><p>Just a line.</p></body>");
        assert_eq!(ArticleLocator::default().locate(&page), Err(Error::NoArticle));
        // The element fallback alone still finds the body.
        assert!(ArticleLocator::default().article_element(&page).is_some());
    }

    #[test]
    fn inner_text_skips_scripts_and_breaks_blocks() {
        let page = Page::parse(
            "<body><div>one <b>two</b><script>var x = 1;</script></div><p>three<br>four</p></body>",
        );
        let body = page.main_region().unwrap();
        assert_eq!(inner_text(page.document(), body), "one two\nthree\nfour");
    }

    proptest::proptest! {
        #[test]
        fn locating_never_panics(body in "[ a-z<>/p.é]{0,400}") {
            let page = Page::parse(&format!("<html><body>{body}</body></html>"));
            let loc = ArticleLocator::default();
            if let Ok(a) = loc.locate(&page) {
                proptest::prop_assert!(a.text.chars().count() > loc.min_article_chars);
            }
        }
    }

    #[test]
    fn round_trips_through_the_arena() {
        let page = Page::parse("<!DOCTYPE html><html><head><title>t</title></head><body><p class=\"x\">a &amp; b</p><!--c--></body></html>");
        let html = page.to_html();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<p class=\"x\">a &amp; b</p>"));
        assert!(html.contains("<!--c-->"));

        // html5ever parses with scripting on, so noscript content is raw text.
        let page = Page::parse("<body><noscript><img src=\"x.gif\"></noscript><p>hi</p></body>");
        assert!(page
            .to_html()
            .contains("<noscript><img src=\"x.gif\"></noscript>"));
    }
}
