//! In-memory [`ContentTree`]: an arena of element, text and raw-markup nodes.
//!
//! Entries are elements with the `thing` class. Author occurrences are
//! elements with the `author` class or a `data-user` attribute. Markup handed
//! to `set_inner_html` is kept as an opaque raw node, so it serializes back
//! byte for byte.

use std::collections::BTreeMap;

use crate::tree::{ContentTree, Entry, NodeId, Offset};

const ENTRY_CLASS: &str = "thing";

#[derive(Debug, Clone)]
enum Kind {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        style: BTreeMap<String, String>,
    },
    Text(String),
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    offset: Option<Offset>,
}

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<Node>,
    root: NodeId,
    client_width: f64,
    clicks: Vec<NodeId>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            client_width: 1024.0,
            clicks: Vec::new(),
        };
        doc.root = doc.push(element_kind("body"));
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Append `<tag class="classes">` under `parent`.
    pub fn element(&mut self, parent: NodeId, tag: &str, classes: &str) -> NodeId {
        let id = self.push(element_kind(tag));
        self.set_class_name(id, classes);
        self.append_child(parent, id);
        id
    }

    /// Append `<a class="classes" href="href">text</a>` under `parent`.
    pub fn link(&mut self, parent: NodeId, classes: &str, href: &str, text: &str) -> NodeId {
        let id = self.element(parent, "a", classes);
        if !href.is_empty() {
            self.set_attr(id, "href", href);
        }
        if !text.is_empty() {
            self.text_node(id, text);
        }
        id
    }

    pub fn text_node(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    pub fn set_offset(&mut self, node: NodeId, offset: Offset) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.offset = Some(offset);
        }
    }

    pub fn set_client_width(&mut self, width: f64) {
        self.client_width = width;
    }

    /// Every node passed to [`ContentTree::click`], in order.
    pub fn clicks(&self) -> &[NodeId] {
        &self.clicks
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.kind {
            Kind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn push(&mut self, kind: Kind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            offset: None,
        });
        id
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get(node.0).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != node);
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = None;
        }
    }

    fn clear_children(&mut self, node: NodeId) {
        let old = match self.nodes.get_mut(node.0) {
            Some(n) => std::mem::take(&mut n.children),
            None => return,
        };
        for child in old {
            if let Some(c) = self.nodes.get_mut(child.0) {
                c.parent = None;
            }
        }
    }

    fn is_element(&self, node: NodeId) -> bool {
        matches!(
            self.nodes.get(node.0).map(|n| &n.kind),
            Some(Kind::Element { .. })
        )
    }

    /// Preorder walk below `root`, skipping subtrees `prune` rejects.
    fn walk(&self, root: NodeId, prune: impl Fn(NodeId) -> bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            if prune(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).into_iter().rev());
        }
        out
    }

    /// First node inside entry `thing` matching `pred`, not looking into nested entries.
    fn find_in_entry(&self, thing: NodeId, pred: impl Fn(NodeId) -> bool) -> Option<NodeId> {
        self.walk(thing, |n| self.has_class(n, ENTRY_CLASS))
            .into_iter()
            .find(|n| pred(*n))
    }

    fn is_tag(&self, node: NodeId, tag: &str) -> bool {
        self.tag_name(node) == Some(tag)
    }

    fn is_occurrence(&self, node: NodeId) -> bool {
        self.is_element(node)
            && (self.has_class(node, "author")
                || self.attr(node, "data-user").is_some_and(|u| !u.is_empty()))
    }

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let children = self.children(parent);
        let idx = children.iter().position(|c| *c == node)?;
        idx.checked_sub(1).map(|i| children[i])
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        match &n.kind {
            Kind::Element { tag, attrs, style } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push_str(&format!(" {}=\"{}\"", name, escape(value, true)));
                }
                if !style.is_empty() {
                    let decls: Vec<String> =
                        style.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                    out.push_str(&format!(" style=\"{}\"", escape(&decls.join("; "), true)));
                }
                out.push('>');
                for child in &n.children {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{}>", tag));
            }
            Kind::Text(text) => out.push_str(&escape(text, false)),
            Kind::Raw(markup) => out.push_str(markup),
        }
    }

    fn write_text(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        match &n.kind {
            Kind::Element { .. } => {
                for child in &n.children {
                    self.write_text(*child, out);
                }
            }
            Kind::Text(text) => out.push_str(text),
            Kind::Raw(markup) => out.push_str(&strip_tags(markup)),
        }
    }
}

fn element_kind(tag: &str) -> Kind {
    Kind::Element {
        tag: tag.to_string(),
        attrs: BTreeMap::new(),
        style: BTreeMap::new(),
    }
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn strip_tags(markup: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

impl ContentTree for MemoryDocument {
    fn author_occurrences(&self, within: Option<NodeId>) -> Vec<NodeId> {
        self.walk(within.unwrap_or(self.root), |_| false)
            .into_iter()
            .filter(|n| self.is_occurrence(*n))
            .collect()
    }

    fn entry_of(&self, node: NodeId) -> Option<Entry> {
        let mut cursor = Some(node);
        let thing = loop {
            let current = cursor?;
            if self.has_class(current, ENTRY_CLASS) {
                break current;
            }
            cursor = self.parent(current);
        };

        let mut entry = Entry::new(thing);
        entry.author = self.find_in_entry(thing, |n| self.has_class(n, "author"));
        entry.body = self.find_in_entry(thing, |n| self.has_class(n, "usertext"));
        entry.message = self.find_in_entry(thing, |n| self.has_class(n, "md"));
        entry.subject = self.find_in_entry(thing, |n| self.has_class(n, "subject"));
        entry.title =
            self.find_in_entry(thing, |n| self.is_tag(n, "p") && self.has_class(n, "title"));
        entry.title_link =
            self.find_in_entry(thing, |n| self.is_tag(n, "a") && self.has_class(n, "title"));
        entry.comments_link =
            self.find_in_entry(thing, |n| self.is_tag(n, "a") && self.has_class(n, "bylink"));
        entry.permalink = self.find_in_entry(thing, |n| {
            self.is_tag(n, "a")
                && self.parent(n).is_some_and(|li| {
                    self.is_tag(li, "li")
                        && self.has_class(li, "first")
                        && self
                            .parent(li)
                            .is_some_and(|ul| self.has_class(ul, "buttons"))
                })
        });
        entry.collapse_toggle =
            self.find_in_entry(thing, |n| self.is_tag(n, "a") && self.has_class(n, "expand"));
        entry.vote_block = self.previous_sibling(thing);
        entry.was_comment = self.has_class(thing, "was-comment");
        Some(entry)
    }

    fn nodes_with_class(&self, within: Option<NodeId>, class: &str) -> Vec<NodeId> {
        self.walk(within.unwrap_or(self.root), |_| false)
            .into_iter()
            .filter(|n| self.has_class(*n, class))
            .collect()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.nodes.get(node.0)?.kind {
            Kind::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(Node {
            kind: Kind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(node.0)
        {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(Node {
            kind: Kind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(node.0)
        {
            attrs.remove(name);
        }
    }

    fn class_name(&self, node: NodeId) -> String {
        self.attr(node, "class").unwrap_or_default()
    }

    fn set_class_name(&mut self, node: NodeId, classes: &str) {
        if classes.is_empty() {
            self.remove_attr(node, "class");
        } else {
            self.set_attr(node, "class", classes);
        }
    }

    fn style(&self, node: NodeId, property: &str) -> Option<String> {
        match &self.nodes.get(node.0)?.kind {
            Kind::Element { style, .. } => style.get(property).cloned(),
            _ => None,
        }
    }

    fn set_style(&mut self, node: NodeId, property: &str, value: Option<&str>) {
        if let Some(Node {
            kind: Kind::Element { style, .. },
            ..
        }) = self.nodes.get_mut(node.0)
        {
            match value {
                Some(v) => {
                    style.insert(property.to_string(), v.to_string());
                }
                None => {
                    style.remove(property);
                }
            }
        }
    }

    fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_text(node, &mut out);
        out
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.clear_children(node);
        if !text.is_empty() {
            let id = self.create_text(text);
            self.append_child(node, id);
        }
    }

    fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn set_inner_html(&mut self, node: NodeId, markup: &str) {
        self.clear_children(node);
        if !markup.is_empty() {
            let id = self.push(Kind::Raw(markup.to_string()));
            self.append_child(node, id);
        }
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(element_kind(tag))
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.push(Kind::Text(text.to_string()))
    }

    fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        let Some(parent) = self.parent(anchor) else {
            tracing::debug!(?anchor, "insert_after on a detached anchor");
            return;
        };
        self.detach(node);
        if let Some(p) = self.nodes.get_mut(parent.0) {
            let idx = p
                .children
                .iter()
                .position(|c| *c == anchor)
                .map_or(p.children.len(), |i| i + 1);
            p.children.insert(idx, node);
        }
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.parent = Some(parent);
        }
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            return;
        }
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn click(&mut self, node: NodeId) {
        self.clicks.push(node);
        // The host's collapse toggle folds the enclosing thread.
        if self.is_tag(node, "a") && self.has_class(node, "expand") {
            if let Some(entry) = self.entry_of(node) {
                if self.has_class(entry.thing, "collapsed") {
                    self.remove_class(entry.thing, "collapsed");
                } else {
                    self.add_class(entry.thing, "collapsed");
                }
            }
        }
    }

    fn offset(&self, node: NodeId) -> Option<Offset> {
        self.nodes.get(node.0)?.offset
    }

    fn client_width(&self) -> f64 {
        self.client_width
    }
}
