//! A small arena-allocated HTML-like tree.
//!
//! This is what [`crate::highlight`] mutates. It is deliberately minimal: elements with
//! ordered attributes, text, comments and a doctype, plus just enough tree surgery to
//! split a text node around a match and to unwind the result again. `veracity-local`
//! builds one from a parsed page and serialises it back with [`Document::to_html`].
//!
//! Detached nodes stay in the arena; a `Document` is short-lived (one page, one pass or
//! a handful of passes), so there is no compaction.

use crate::highlight::{TextTree, MARKER_CLASS};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Comment(String),
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Elements whose text never counts as readable page text.
const NON_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script",
    "style",
    "xmp",
    "iframe",
    "noembed",
    "noframes",
    "noscript",
    "plaintext",
];

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Allocate a detached node.
    pub fn create(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn append_element(&mut self, parent: NodeId, el: Element) -> NodeId {
        let id = self.create(NodeData::Element(el));
        self.append(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = self.create(NodeData::Text(text.into()));
        self.append(parent, id);
        id
    }

    pub fn detach(&mut self, node: NodeId) {
        if let Some(p) = self.nodes[node.0].parent.take() {
            self.nodes[p.0].children.retain(|c| *c != node);
        }
    }

    /// Put `replacements` where `node` was (in order) and detach `node`.
    ///
    /// A node without a parent is left untouched.
    pub fn replace_with(&mut self, node: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };
        for r in replacements {
            self.detach(*r);
        }
        let Some(pos) = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == node)
        else {
            return;
        };
        self.nodes[node.0].parent = None;
        for r in replacements {
            self.nodes[r.0].parent = Some(parent);
        }
        self.nodes[parent.0]
            .children
            .splice(pos..pos + 1, replacements.iter().copied());
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0].data
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match &self.nodes[node.0].data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node.0].data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.name.as_str())
    }

    /// Pre-order walk of `node` and everything below it.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![node],
        }
    }

    /// `node`'s parent, grandparent, ... up to the root.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |n| self.parent(*n))
    }

    /// Concatenated text of every descendant text node (like DOM `textContent`).
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|n| self.element(*n).and_then(|e| e.attr("id")) == Some(id))
    }

    pub fn first_element_by_tag(&self, under: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(under)
            .find(|n| self.tag_name(*n) == Some(tag))
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        node == self.root() || self.ancestors(node).any(|a| a == self.root())
    }

    /// Merge adjacent text nodes and drop empty ones everywhere under `node`.
    pub fn normalize(&mut self, node: NodeId) {
        let mut merged: Vec<NodeId> = Vec::with_capacity(self.nodes[node.0].children.len());
        let children = std::mem::take(&mut self.nodes[node.0].children);
        for child in children {
            let NodeData::Text(t) = &self.nodes[child.0].data else {
                merged.push(child);
                continue;
            };
            if t.is_empty() {
                self.nodes[child.0].parent = None;
                continue;
            }
            let t = t.clone();
            match merged.last().copied() {
                Some(prev) if matches!(self.nodes[prev.0].data, NodeData::Text(_)) => {
                    if let NodeData::Text(p) = &mut self.nodes[prev.0].data {
                        p.push_str(&t);
                    }
                    self.nodes[child.0].parent = None;
                }
                _ => merged.push(child),
            }
        }
        self.nodes[node.0].children = merged;

        let elements: Vec<NodeId> = self.nodes[node.0]
            .children
            .iter()
            .copied()
            .filter(|c| self.element(*c).is_some())
            .collect();
        for el in elements {
            self.normalize(el);
        }
    }

    fn in_non_text_element(&self, node: NodeId) -> bool {
        self.ancestors(node).any(|a| {
            self.tag_name(a)
                .is_some_and(|t| NON_TEXT_ELEMENTS.contains(&t))
        })
    }

    /// Serialise the whole document.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for c in self.children(self.root()) {
            self.write_html(*c, &mut out);
        }
        out
    }

    /// Serialise one node including its own tag.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].data {
            NodeData::Document => {
                for c in self.children(node) {
                    self.write_html(*c, out);
                }
            }
            NodeData::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            NodeData::Text(t) => {
                let raw = self
                    .parent(node)
                    .and_then(|p| self.tag_name(p))
                    .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
                if raw {
                    out.push_str(t);
                } else {
                    escape_into(t, false, out);
                }
            }
            NodeData::Element(e) => {
                out.push('<');
                out.push_str(&e.name);
                for (k, v) in &e.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    escape_into(v, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&e.name.as_str()) {
                    return;
                }
                for c in self.children(node) {
                    self.write_html(*c, out);
                }
                out.push_str("</");
                out.push_str(&e.name);
                out.push('>');
            }
        }
    }
}

fn escape_into(s: &str, attr: bool, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attr => out.push_str("&quot;"),
            '<' if !attr => out.push_str("&lt;"),
            '>' if !attr => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let n = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(n).iter().rev().copied());
        Some(n)
    }
}

impl TextTree for Document {
    type Node = NodeId;

    fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            match &self.nodes[n.0].data {
                NodeData::Text(_) if n == root && self.in_non_text_element(n) => {}
                NodeData::Text(_) => out.push(n),
                NodeData::Element(e) if NON_TEXT_ELEMENTS.contains(&e.name.as_str()) => {}
                _ => stack.extend(self.children(n).iter().rev().copied()),
            }
        }
        out
    }

    fn node_text(&self, node: NodeId) -> &str {
        self.text(node).unwrap_or("")
    }

    fn is_inside_marker(&self, node: NodeId) -> bool {
        self.ancestors(node)
            .any(|a| self.element(a).is_some_and(|e| e.has_class(MARKER_CLASS)))
    }

    fn split_and_wrap(&mut self, node: NodeId, range: Range<usize>, reason: &str) -> Option<NodeId> {
        let text = self.text(node)?;
        if range.start >= range.end
            || range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            return None;
        }
        let before = text[..range.start].to_string();
        let matched = text[range.clone()].to_string();
        let after = text[range.end..].to_string();

        let mut parts = Vec::with_capacity(3);
        if !before.is_empty() {
            parts.push(self.create(NodeData::Text(before)));
        }
        let marker = self.create(NodeData::Element(
            Element::new("span")
                .with_attr("class", MARKER_CLASS)
                .with_attr("data-reason", reason)
                .with_attr("title", reason),
        ));
        self.append_text(marker, matched);
        parts.push(marker);
        if !after.is_empty() {
            parts.push(self.create(NodeData::Text(after)));
        }
        self.replace_with(node, &parts);
        Some(marker)
    }

    fn unwrap_all(&mut self, root: NodeId) -> usize {
        let mut unwrapped = 0usize;
        loop {
            let next = self.descendants(root).skip(1).find(|n| {
                self.element(*n)
                    .is_some_and(|e| e.has_class(MARKER_CLASS))
            });
            let Some(marker) = next else {
                break;
            };
            let Some(parent) = self.parent(marker) else {
                break;
            };
            let text = self.text_content(marker);
            let plain = self.create(NodeData::Text(text));
            self.replace_with(marker, &[plain]);
            self.normalize(parent);
            unwrapped += 1;
        }
        unwrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let html = doc.append_element(root, Element::new("html"));
        let body = doc.append_element(html, Element::new("body"));
        let article = doc.append_element(body, Element::new("article").with_attr("id", "a"));
        let p = doc.append_element(article, Element::new("p"));
        doc.append_text(p, "Hello ");
        let em = doc.append_element(p, Element::new("em"));
        doc.append_text(em, "big");
        doc.append_text(p, " world & <friends>");
        let script = doc.append_element(article, Element::new("script"));
        doc.append_text(script, "var a = 1 < 2;");
        (doc, article)
    }

    #[test]
    fn serialises_with_escaping_and_raw_text() {
        let (doc, _) = sample();
        assert_eq!(
            doc.to_html(),
            "<html><body><article id=\"a\"><p>Hello <em>big</em> world &amp; &lt;friends&gt;</p><script>var a = 1 < 2;</script></article></body></html>"
        );
    }

    #[test]
    fn text_nodes_are_in_document_order_and_skip_scripts() {
        let (doc, article) = sample();
        let texts: Vec<&str> = doc
            .text_nodes(article)
            .into_iter()
            .map(|n| doc.node_text(n))
            .collect();
        assert_eq!(texts, vec!["Hello ", "big", " world & <friends>"]);
    }

    #[test]
    fn element_lookup_by_id_and_tag() {
        let (doc, article) = sample();
        assert_eq!(doc.element_by_id("a"), Some(article));
        assert!(doc.first_element_by_tag(doc.root(), "em").is_some());
        assert_eq!(doc.element_by_id("missing"), None);
    }

    #[test]
    fn normalize_merges_adjacent_text_and_drops_empty() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, Element::new("p"));
        doc.append_text(p, "a");
        doc.append_text(p, "");
        doc.append_text(p, "b");
        let b = doc.append_element(p, Element::new("b"));
        doc.append_text(b, "x");
        doc.append_text(b, "y");
        doc.append_text(p, "c");
        doc.normalize(p);
        assert_eq!(doc.children(p).len(), 3);
        assert_eq!(doc.text(doc.children(p)[0]), Some("ab"));
        assert_eq!(doc.children(b).len(), 1);
        assert_eq!(doc.text_content(p), "abxyc");
    }

    #[test]
    fn split_and_wrap_then_unwrap_restores_text() {
        let (mut doc, article) = sample();
        let before = doc.text_content(article);
        let first = doc.text_nodes(article)[2];
        let marker = doc.split_and_wrap(first, 1..6, "because").unwrap();
        assert_eq!(doc.text_content(marker), "world");
        assert_eq!(doc.element(marker).unwrap().attr("data-reason"), Some("because"));
        assert_eq!(doc.text_content(article), before);
        assert!(doc.to_html().contains(
            "<span class=\"veracity-highlight\" data-reason=\"because\" title=\"because\">world</span>"
        ));

        assert_eq!(doc.unwrap_all(article), 1);
        assert_eq!(doc.text_content(article), before);
        assert!(!doc.to_html().contains(MARKER_CLASS));
        // Adjacent text was merged back into a single node.
        let p = doc.first_element_by_tag(article, "p").unwrap();
        assert_eq!(doc.children(p).len(), 3);
    }

    #[test]
    fn split_and_wrap_rejects_bad_ranges() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, Element::new("p"));
        let t = doc.append_text(p, "héllo");
        assert!(doc.split_and_wrap(t, 2..3, "r").is_none());
        assert!(doc.split_and_wrap(t, 0..99, "r").is_none());
        assert!(doc.split_and_wrap(t, 2..2, "r").is_none());
        assert_eq!(doc.children(p), &[t]);
    }

    #[test]
    fn replace_with_keeps_sibling_order() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, Element::new("p"));
        let a = doc.append_text(p, "a");
        let b = doc.append_text(p, "b");
        let x = doc.create(NodeData::Text("x".into()));
        let y = doc.create(NodeData::Text("y".into()));
        doc.replace_with(a, &[x, y]);
        assert_eq!(doc.children(p), &[x, y, b]);
        assert!(!doc.is_attached(a));
        assert!(doc.is_attached(y));
    }
}
