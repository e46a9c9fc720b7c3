//! The content tree the engine decorates.
//!
//! The host page owns the nodes. The engine only holds [`NodeId`]s, never
//! the nodes themselves, so content removed by the host needs no cleanup here.

use serde::{Deserialize, Serialize};

/// Identity of one node in the host tree. Stable for the node's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    pub top: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
}

/// The post, comment or message enclosing a node, with the parts the
/// annotation logic reaches for.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The whole entry block.
    pub thing: NodeId,
    /// Tagline author link.
    pub author: Option<NodeId>,
    /// Discussion body text.
    pub body: Option<NodeId>,
    /// Message body (inbox).
    pub message: Option<NodeId>,
    /// Message subject line (inbox).
    pub subject: Option<NodeId>,
    /// Title paragraph of a listing entry.
    pub title: Option<NodeId>,
    pub title_link: Option<NodeId>,
    pub comments_link: Option<NodeId>,
    pub permalink: Option<NodeId>,
    /// The host's own collapse affordance for a discussion thread.
    pub collapse_toggle: Option<NodeId>,
    /// Voting control rendered next to a listing entry.
    pub vote_block: Option<NodeId>,
    /// An inbox entry that is a reply to a comment rather than a private message.
    pub was_comment: bool,
}

impl Entry {
    pub fn new(thing: NodeId) -> Self {
        Self {
            thing,
            author: None,
            body: None,
            message: None,
            subject: None,
            title: None,
            title_link: None,
            comments_link: None,
            permalink: None,
            collapse_toggle: None,
            vote_block: None,
            was_comment: false,
        }
    }
}

/// Query and mutation primitives over the host document.
pub trait ContentTree {
    /// Author occurrences below `within` (the whole document when `None`), in document order.
    fn author_occurrences(&self, within: Option<NodeId>) -> Vec<NodeId>;

    /// The entry enclosing `node`, if any.
    fn entry_of(&self, node: NodeId) -> Option<Entry>;

    /// Elements carrying `class` below `within`, in document order.
    fn nodes_with_class(&self, within: Option<NodeId>, class: &str) -> Vec<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn attr(&self, node: NodeId, name: &str) -> Option<String>;
    fn set_attr(&mut self, node: NodeId, name: &str, value: &str);
    fn remove_attr(&mut self, node: NodeId, name: &str);

    fn class_name(&self, node: NodeId) -> String;
    /// Replace the class list. An empty string removes the attribute.
    fn set_class_name(&mut self, node: NodeId, classes: &str);

    fn style(&self, node: NodeId, property: &str) -> Option<String>;
    fn set_style(&mut self, node: NodeId, property: &str, value: Option<&str>);

    fn text(&self, node: NodeId) -> String;
    /// Replace all children with a single text node.
    fn set_text(&mut self, node: NodeId, text: &str);
    fn inner_html(&self, node: NodeId) -> String;
    fn set_inner_html(&mut self, node: NodeId, markup: &str);

    fn create_element(&mut self, tag: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    /// Move `node` to directly after `anchor`.
    fn insert_after(&mut self, anchor: NodeId, node: NodeId);
    fn append_child(&mut self, parent: NodeId, child: NodeId);

    /// Activate a host affordance as if the user clicked it.
    fn click(&mut self, node: NodeId);

    fn offset(&self, node: NodeId) -> Option<Offset>;
    fn client_width(&self) -> f64;

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.class_name(node).split_whitespace().any(|c| c == class)
    }

    fn add_class(&mut self, node: NodeId, class: &str) {
        if !self.has_class(node, class) {
            let mut classes = self.class_name(node);
            if !classes.is_empty() {
                classes.push(' ');
            }
            classes.push_str(class);
            self.set_class_name(node, &classes);
        }
    }

    fn remove_class(&mut self, node: NodeId, class: &str) {
        let remaining: Vec<String> = self
            .class_name(node)
            .split_whitespace()
            .filter(|c| *c != class)
            .map(str::to_string)
            .collect();
        self.set_class_name(node, &remaining.join(" "));
    }

    /// Siblings after `node`, nearest first.
    fn next_siblings(&self, node: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(node) else {
            return Vec::new();
        };
        self.children(parent)
            .into_iter()
            .skip_while(|n| *n != node)
            .skip(1)
            .collect()
    }

    /// First sibling of `node` (excluding itself) that carries `class`.
    fn sibling_with_class(&self, node: NodeId, class: &str) -> Option<NodeId> {
        let parent = self.parent(node)?;
        self.children(parent)
            .into_iter()
            .find(|n| *n != node && self.has_class(*n, class))
    }
}
