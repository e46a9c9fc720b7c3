//! Vote weight: a running score per author built from the viewer's own votes.
//!
//! Clicks must be seen before the host flips the arrow classes, since the
//! delta is read off the pre-click state of both arrows.

use usertag_core::{PageContext, TagStore, TaggerOptions};

use crate::applier::{resolve_author, AnnotationApplier};
use crate::marker;
use crate::tree::{ContentTree, MouseButton, NodeId};

pub const ARROW_CLASS: &str = "arrow";
pub const ARCHIVED_CLASS: &str = "archived";

/// State of the arrow that was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    /// Up arrow already active; clicking undoes the upvote.
    Upvoted,
    Down,
    Downvoted,
}

impl Arrow {
    pub fn of(tree: &dyn ContentTree, node: NodeId) -> Option<Self> {
        if tree.has_class(node, "upmod") {
            Some(Arrow::Upvoted)
        } else if tree.has_class(node, "downmod") {
            Some(Arrow::Downvoted)
        } else if tree.has_class(node, "up") {
            Some(Arrow::Up)
        } else if tree.has_class(node, "down") {
            Some(Arrow::Down)
        } else {
            None
        }
    }
}

/// State of the other arrow in the same voting control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sibling {
    Upvoted,
    Downvoted,
    Neutral,
}

impl Sibling {
    pub fn of(tree: &dyn ContentTree, node: Option<NodeId>) -> Self {
        match node {
            Some(n) if tree.has_class(n, "upmod") => Sibling::Upvoted,
            Some(n) if tree.has_class(n, "downmod") => Sibling::Downvoted,
            _ => Sibling::Neutral,
        }
    }
}

pub fn vote_delta(clicked: Arrow, sibling: Sibling) -> i64 {
    match (clicked, sibling) {
        (Arrow::Up, Sibling::Downvoted) => 2,
        (Arrow::Up, _) => 1,
        (Arrow::Upvoted, _) => -1,
        (Arrow::Down, Sibling::Upvoted) => -2,
        (Arrow::Down, _) => -1,
        (Arrow::Downvoted, _) => 1,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoteWeightTracker {
    enabled: bool,
}

impl VoteWeightTracker {
    /// Tracking needs the option and a signed-in viewer.
    pub fn new(options: &TaggerOptions, page: &PageContext) -> Self {
        Self {
            enabled: options.track_vote_weight && page.logged_in_user.is_some(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a vote click on `target`. Returns the author's new total when the click counted.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_click(
        &self,
        tree: &mut dyn ContentTree,
        target: NodeId,
        button: MouseButton,
        store: &mut TagStore,
        applier: &mut AnnotationApplier,
        options: &TaggerOptions,
        page: &PageContext,
    ) -> Option<i64> {
        if !self.enabled || button != MouseButton::Primary {
            return None;
        }
        if !tree.has_class(target, ARROW_CLASS) || tree.has_class(target, ARCHIVED_CLASS) {
            return None;
        }
        let clicked = Arrow::of(tree, target)?;
        let sibling = Sibling::of(tree, tree.sibling_with_class(target, ARROW_CLASS));

        let occurrence = tree.entry_of(target)?.author?;
        let author = match resolve_author(tree, occurrence) {
            Ok(author) => author,
            Err(e) => {
                tracing::debug!(error = %e, "vote on entry without a resolvable author");
                return None;
            }
        };
        if page.is_viewer(&author) {
            return None;
        }

        let delta = vote_delta(clicked, sibling);
        let votes = store.adjust_votes(&author, delta);
        tracing::debug!(author = %author, delta, votes, "vote weight adjusted");

        if marker::markers_after(tree, occurrence).vote_weight.is_none() {
            applier.ensure_markers(tree, occurrence, &author, store.get(&author), options, page);
        }
        marker::recolor_vote_weights(tree, &author, votes, options, page.night_mode);
        Some(votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Arrow::Up, Sibling::Downvoted, 2)]
    #[case(Arrow::Up, Sibling::Neutral, 1)]
    #[case(Arrow::Upvoted, Sibling::Neutral, -1)]
    #[case(Arrow::Down, Sibling::Upvoted, -2)]
    #[case(Arrow::Down, Sibling::Neutral, -1)]
    #[case(Arrow::Downvoted, Sibling::Neutral, 1)]
    fn transition_table(#[case] clicked: Arrow, #[case] sibling: Sibling, #[case] delta: i64) {
        assert_eq!(vote_delta(clicked, sibling), delta);
    }

    #[test]
    fn tracking_needs_a_signed_in_viewer() {
        let opts = TaggerOptions::default();
        assert!(!VoteWeightTracker::new(&opts, &PageContext::default()).is_enabled());
        let page = PageContext {
            logged_in_user: Some("me".into()),
            ..Default::default()
        };
        assert!(VoteWeightTracker::new(&opts, &page).is_enabled());
        let off = TaggerOptions {
            track_vote_weight: false,
            ..Default::default()
        };
        assert!(!VoteWeightTracker::new(&off, &page).is_enabled());
    }
}
