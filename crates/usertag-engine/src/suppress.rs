//! Content suppression for ignored authors.
//!
//! Soft suppression swaps the entry text for a placeholder and keeps the
//! original markup so "show anyway" can put it back exactly. Hard suppression
//! also collapses threads and hides listing entries outright.

use std::collections::HashMap;

use usertag_core::{AuthorKey, PageKind, TaggerOptions};

use crate::tree::{ContentTree, NodeId};

pub const SHOW_ANYWAY_TEXT: &str = "show anyway?";
pub const SHOW_ANYWAY_CLASS: &str = "RESShowIgnored";
pub const IGNORED_COMMENT_CLASS: &str = "ignoredUserComment";
pub const IGNORED_POST_CLASS: &str = "ignoredUserPost";
pub const IGNORED_SUBJECT: &str = "Ignored message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Soft,
    Hard,
}

impl Severity {
    pub fn from_options(options: &TaggerOptions) -> Self {
        if options.hard_ignore {
            Severity::Hard
        } else {
            Severity::Soft
        }
    }
}

/// What a suppression did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Text swapped for a placeholder; `link` restores it.
    Replaced { target: NodeId, link: NodeId },
    /// Replaced, then the thread was collapsed through `toggle`.
    Collapsed {
        target: NodeId,
        link: NodeId,
        toggle: NodeId,
    },
    /// The entry and its voting control were hidden.
    Hidden { entry: NodeId },
}

#[derive(Debug, Clone)]
struct Saved {
    markup: String,
    class_name: String,
    subject: Option<(NodeId, String)>,
    link: NodeId,
}

#[derive(Debug, Default)]
pub struct Suppressor {
    saved: HashMap<NodeId, Saved>,
    links: HashMap<NodeId, NodeId>,
}

impl Suppressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self, target: NodeId) -> bool {
        self.saved.contains_key(&target)
    }

    /// The suppressed node a "show anyway" link restores.
    pub fn target_of_link(&self, link: NodeId) -> Option<NodeId> {
        self.links.get(&link).copied()
    }

    /// Suppress the entry `occurrence` belongs to.
    pub fn suppress(
        &mut self,
        tree: &mut dyn ContentTree,
        occurrence: NodeId,
        author: &AuthorKey,
        page: PageKind,
        severity: Severity,
    ) -> Option<Suppression> {
        let entry = tree.entry_of(occurrence)?;
        match (severity, page) {
            (_, PageKind::Comments) => {
                let target = entry.body?;
                let link = self.replace(tree, target, author, IGNORED_COMMENT_CLASS, None)?;
                match (severity, entry.collapse_toggle) {
                    (Severity::Hard, Some(toggle)) => {
                        tree.click(toggle);
                        Some(Suppression::Collapsed {
                            target,
                            link,
                            toggle,
                        })
                    }
                    _ => Some(Suppression::Replaced { target, link }),
                }
            }
            (Severity::Hard, _) => {
                tree.set_style(entry.thing, "display", Some("none"));
                if let Some(votes) = entry.vote_block {
                    tree.set_style(votes, "display", Some("none"));
                }
                tracing::debug!(author = %author, entry = ?entry.thing, "entry hidden");
                Some(Suppression::Hidden { entry: entry.thing })
            }
            (Severity::Soft, PageKind::Inbox) => {
                let target = entry.message?;
                let subject = entry.subject.filter(|_| !entry.was_comment);
                let link = self.replace(tree, target, author, IGNORED_POST_CLASS, subject)?;
                Some(Suppression::Replaced { target, link })
            }
            (Severity::Soft, _) => {
                let target = entry.title?;
                let link = self.replace(tree, target, author, IGNORED_POST_CLASS, None)?;
                Some(Suppression::Replaced { target, link })
            }
        }
    }

    /// Put back the original content of `target`. A second call does nothing.
    pub fn restore(&mut self, tree: &mut dyn ContentTree, target: NodeId) -> bool {
        let Some(saved) = self.saved.remove(&target) else {
            return false;
        };
        self.links.remove(&saved.link);
        tree.set_inner_html(target, &saved.markup);
        tree.set_class_name(target, &saved.class_name);
        if let Some((subject, text)) = saved.subject {
            tree.set_text(subject, &text);
        }
        tracing::debug!(?target, "suppressed content restored");
        true
    }

    /// Handle a click on a "show anyway" link.
    pub fn restore_from_link(&mut self, tree: &mut dyn ContentTree, link: NodeId) -> bool {
        match self.target_of_link(link) {
            Some(target) => self.restore(tree, target),
            None => false,
        }
    }

    /// Drop saved content for everything under `root`, which the host has taken off the page.
    pub fn forget_within(&mut self, tree: &dyn ContentTree, root: NodeId) -> usize {
        let gone: Vec<NodeId> = self
            .saved
            .keys()
            .copied()
            .filter(|t| is_within(tree, *t, root))
            .collect();
        for target in &gone {
            if let Some(saved) = self.saved.remove(target) {
                self.links.remove(&saved.link);
            }
        }
        gone.len()
    }

    fn replace(
        &mut self,
        tree: &mut dyn ContentTree,
        target: NodeId,
        author: &AuthorKey,
        class: &str,
        subject: Option<NodeId>,
    ) -> Option<NodeId> {
        if self.saved.contains_key(&target) {
            return None;
        }
        let markup = tree.inner_html(target);
        let class_name = tree.class_name(target);
        let subject = subject.map(|s| {
            let text = tree.text(s);
            tree.set_text(s, IGNORED_SUBJECT);
            (s, text)
        });

        tree.set_text(target, &format!("{} is an ignored user. ", author));
        let link = tree.create_element("a");
        tree.set_class_name(link, SHOW_ANYWAY_CLASS);
        tree.set_attr(link, "href", "#");
        tree.set_text(link, SHOW_ANYWAY_TEXT);
        tree.append_child(target, link);
        tree.add_class(target, class);

        self.saved.insert(
            target,
            Saved {
                markup,
                class_name,
                subject,
                link,
            },
        );
        self.links.insert(link, target);
        tracing::debug!(author = %author, ?target, "content suppressed");
        Some(link)
    }
}

fn is_within(tree: &dyn ContentTree, node: NodeId, root: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == root {
            return true;
        }
        current = tree.parent(n);
    }
    false
}
