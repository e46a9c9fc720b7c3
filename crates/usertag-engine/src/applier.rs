//! Decorates author occurrences exactly once each.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

use usertag_core::{AuthorKey, PageContext, PageKind, TagRecord, TagStore, TaggerOptions};

use crate::marker::{self, Markers};
use crate::suppress::{Severity, Suppressor};
use crate::tree::{ContentTree, NodeId};

static USERNAME_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?:u|user)/([\w\-]+)"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no username in reference {0:?}")]
    Unmatched(String),
    #[error("occurrence carries no identity")]
    Missing,
    #[error("username pattern: {0}")]
    Pattern(String),
}

/// Whether markers may be used to edit tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Editable,
    /// Chips only for tagged authors, no vote weights, no suppression.
    ReadOnly,
}

/// Resolve the author an occurrence refers to.
///
/// A link target wins over a `data-user` attribute, which wins over the visible text.
pub fn resolve_author(tree: &dyn ContentTree, node: NodeId) -> Result<AuthorKey, IdentityError> {
    if let Some(href) = tree.attr(node, "href").filter(|h| !h.is_empty()) {
        let re = USERNAME_RE
            .as_ref()
            .map_err(|e| IdentityError::Pattern(e.to_string()))?;
        return re
            .captures(&href)
            .and_then(|c| c.get(1))
            .map(|m| AuthorKey::new(m.as_str()))
            .ok_or(IdentityError::Unmatched(href));
    }
    let name = tree
        .attr(node, "data-user")
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| tree.text(node).trim().to_string());
    if name.is_empty() {
        return Err(IdentityError::Missing);
    }
    Ok(AuthorKey::new(&name))
}

#[derive(Debug, Default)]
pub struct AnnotationApplier {
    decorated: HashSet<NodeId>,
    mode: Mode,
}

impl AnnotationApplier {
    pub fn new(mode: Mode) -> Self {
        Self {
            decorated: HashSet::new(),
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_decorated(&self, node: NodeId) -> bool {
        self.decorated.contains(&node)
    }

    pub fn decorated_count(&self) -> usize {
        self.decorated.len()
    }

    /// Decorate every occurrence not seen before. Returns how many were newly marked.
    pub fn apply_to(
        &mut self,
        tree: &mut dyn ContentTree,
        occurrences: &[NodeId],
        store: &TagStore,
        options: &TaggerOptions,
        page: &PageContext,
        suppressor: &mut Suppressor,
    ) -> usize {
        let mut count = 0;
        for &node in occurrences {
            // Mark before resolving so a failing occurrence is not retried forever.
            if !self.decorated.insert(node) {
                continue;
            }
            count += 1;
            let author = match resolve_author(tree, node) {
                Ok(author) => author,
                Err(e) => {
                    tracing::warn!(?node, error = %e, "skipping occurrence");
                    continue;
                }
            };
            let record = store.get(&author);
            self.render(tree, node, &author, record, options, page);

            if self.mode == Mode::Editable
                && record.is_some_and(|r| r.ignore)
                && page.kind != PageKind::Profile
                && tree.has_class(node, "author")
            {
                suppressor.suppress(
                    tree,
                    node,
                    &author,
                    page.kind,
                    Severity::from_options(options),
                );
            }
        }
        if count > 0 {
            tracing::debug!(count, total = self.decorated.len(), "occurrences decorated");
        }
        count
    }

    /// Insert whichever markers `occurrence` is missing and mark it decorated.
    pub fn ensure_markers(
        &mut self,
        tree: &mut dyn ContentTree,
        occurrence: NodeId,
        author: &AuthorKey,
        record: Option<&TagRecord>,
        options: &TaggerOptions,
        page: &PageContext,
    ) -> Markers {
        self.decorated.insert(occurrence);
        self.render(tree, occurrence, author, record, options, page)
    }

    fn render(
        &self,
        tree: &mut dyn ContentTree,
        occurrence: NodeId,
        author: &AuthorKey,
        record: Option<&TagRecord>,
        options: &TaggerOptions,
        page: &PageContext,
    ) -> Markers {
        let mut markers = marker::markers_after(tree, occurrence);
        let tag = record.and_then(|r| r.tag.as_deref());
        let color = record.and_then(|r| r.color.as_deref());

        if self.mode == Mode::ReadOnly {
            if markers.chip.is_none() && tag.is_some() {
                let (wrapper, chip) = marker::create_chip(tree, author, tag, color, false);
                tree.insert_after(occurrence, wrapper);
                markers.chip = Some(chip);
            }
            return markers;
        }

        // The chip goes in first so the indicator lands between it and the name.
        if markers.chip.is_none() && (options.show_tagging_icon || record.is_some()) {
            let (wrapper, chip) = marker::create_chip(tree, author, tag, color, true);
            tree.insert_after(occurrence, wrapper);
            markers.chip = Some(chip);
        }
        if markers.vote_weight.is_none() && options.track_vote_weight {
            let votes = record.map_or(0, |r| r.votes);
            let vw = marker::create_vote_weight(tree, author, votes, options, page.night_mode);
            tree.insert_after(occurrence, vw);
            markers.vote_weight = Some(vw);
        }
        markers
    }
}
