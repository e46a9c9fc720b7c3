//! One page's worth of tagging: the store plus every controller, wired behind the startup load.

use std::sync::Arc;

use usertag_core::{AuthorKey, Backend, PageContext, PageKind, TagRecord, TagStore, TaggerOptions};

use crate::applier::{AnnotationApplier, Mode};
use crate::dialog::{DialogError, DialogKey, DialogSurface, TagDialog};
use crate::marker::{self, CHIP_CLASS, VOTE_WEIGHT_CLASS};
use crate::suppress::Suppressor;
use crate::table::TagTable;
use crate::tree::{ContentTree, MouseButton, NodeId};
use crate::votes::VoteWeightTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Unhandled,
    /// A vote was counted; the author's new total.
    Voted(i64),
    DialogOpened(AuthorKey),
    /// Suppressed content was shown again.
    Restored(NodeId),
}

#[derive(Debug)]
pub struct Session {
    store: TagStore,
    options: TaggerOptions,
    page: PageContext,
    applier: AnnotationApplier,
    suppressor: Suppressor,
    votes: VoteWeightTracker,
    dialog: TagDialog,
    table: Option<TagTable>,
}

impl Session {
    /// Load the tag store, then build the controllers. Nothing runs before the load finishes.
    pub async fn start(
        backend: Arc<dyn Backend>,
        options: TaggerOptions,
        page: PageContext,
        mode: Mode,
        surface: Box<dyn DialogSurface>,
    ) -> Self {
        let store = TagStore::load(backend).await;
        Self::with_store(store, options, page, mode, surface)
    }

    pub fn with_store(
        store: TagStore,
        options: TaggerOptions,
        page: PageContext,
        mode: Mode,
        surface: Box<dyn DialogSurface>,
    ) -> Self {
        let votes = VoteWeightTracker::new(&options, &page);
        tracing::info!(
            page = ?page.kind,
            tags = store.len(),
            vote_tracking = votes.is_enabled(),
            "tagging session started"
        );
        Self {
            store,
            options,
            page,
            applier: AnnotationApplier::new(mode),
            suppressor: Suppressor::new(),
            votes,
            dialog: TagDialog::new(surface),
            table: None,
        }
    }

    /// Decorate the whole document, and draw the tag table on the dashboard.
    pub fn go(&mut self, tree: &mut dyn ContentTree) -> usize {
        if self.page.kind == PageKind::Dashboard && self.table.is_none() {
            let mut table = TagTable::new(self.options.tags_per_page);
            table.draw(&self.store);
            self.table = Some(table);
        }
        self.apply_tags(tree, None)
    }

    /// Decorate content the host added after load.
    pub fn on_new_content(&mut self, tree: &mut dyn ContentTree, root: NodeId) -> usize {
        self.apply_tags(tree, Some(root))
    }

    /// The host took `root` off the page; drop what was saved for restoring it.
    pub fn on_content_removed(&mut self, tree: &dyn ContentTree, root: NodeId) -> usize {
        self.suppressor.forget_within(tree, root)
    }

    fn apply_tags(&mut self, tree: &mut dyn ContentTree, within: Option<NodeId>) -> usize {
        let occurrences = tree.author_occurrences(within);
        self.applier.apply_to(
            tree,
            &occurrences,
            &self.store,
            &self.options,
            &self.page,
            &mut self.suppressor,
        )
    }

    pub fn handle_click(
        &mut self,
        tree: &mut dyn ContentTree,
        target: NodeId,
        button: MouseButton,
    ) -> ClickOutcome {
        if let Some(votes) = self.votes.handle_click(
            tree,
            target,
            button,
            &mut self.store,
            &mut self.applier,
            &self.options,
            &self.page,
        ) {
            return ClickOutcome::Voted(votes);
        }
        if button != MouseButton::Primary {
            return ClickOutcome::Unhandled;
        }
        if let Some(restored) = self.suppressor.target_of_link(target) {
            self.suppressor.restore(tree, restored);
            return ClickOutcome::Restored(restored);
        }
        if self.applier.mode() == Mode::ReadOnly {
            return ClickOutcome::Unhandled;
        }
        let Some(username) = tree.attr(target, "username") else {
            return ClickOutcome::Unhandled;
        };

        let chip = if tree.has_class(target, CHIP_CLASS) {
            target
        } else if tree.has_class(target, VOTE_WEIGHT_CLASS) {
            self.chip_beside(tree, target, &username)
        } else {
            return ClickOutcome::Unhandled;
        };
        self.dialog
            .open(&*tree, &self.store, &self.options, chip, &username);
        ClickOutcome::DialogOpened(AuthorKey::new(&username))
    }

    // Vote-weight clicks edit through the chip next to them, made on the spot if needed.
    fn chip_beside(&mut self, tree: &mut dyn ContentTree, vote_weight: NodeId, username: &str) -> NodeId {
        if let Some(chip) = marker::markers_after(tree, vote_weight).chip {
            return chip;
        }
        let author = AuthorKey::new(username);
        let record = self.store.get(&author);
        let (wrapper, chip) = marker::create_chip(
            tree,
            &author,
            record.and_then(|r| r.tag.as_deref()),
            record.and_then(|r| r.color.as_deref()),
            true,
        );
        tree.insert_after(vote_weight, wrapper);
        chip
    }

    pub fn handle_key(&mut self, key: DialogKey) -> bool {
        self.dialog.handle_key(key, &self.page)
    }

    pub fn save_dialog(&mut self, tree: &mut dyn ContentTree) -> Result<Option<TagRecord>, DialogError> {
        let saved = self
            .dialog
            .save(tree, &mut self.store, &self.options, &self.page)?;
        if let Some(table) = self.table.as_mut() {
            table.draw(&self.store);
        }
        Ok(saved)
    }

    pub fn cancel_dialog(&mut self) {
        self.dialog.cancel(&self.page);
    }

    /// Ignore or stop ignoring `name` without touching rendered content.
    pub fn ignore_user(&mut self, name: &str, ignore: bool) -> Option<TagRecord> {
        let record = self.store.ignore_user(name, ignore).cloned();
        tracing::info!(author = %name, ignore, "ignore toggled");
        record
    }

    pub fn store(&self) -> &TagStore {
        &self.store
    }

    pub fn options(&self) -> &TaggerOptions {
        &self.options
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn applier(&self) -> &AnnotationApplier {
        &self.applier
    }

    pub fn suppressor(&self) -> &Suppressor {
        &self.suppressor
    }

    pub fn dialog(&self) -> &TagDialog {
        &self.dialog
    }

    pub fn dialog_mut(&mut self) -> &mut TagDialog {
        &mut self.dialog
    }

    pub fn table(&self) -> Option<&TagTable> {
        self.table.as_ref()
    }

    /// The table together with the store it reads, for sorting, paging and deletes.
    pub fn table_mut(&mut self) -> Option<(&mut TagTable, &mut TagStore)> {
        self.table.as_mut().map(|t| (t, &mut self.store))
    }

    /// End the session. Persisted data is untouched.
    pub fn dispose(self) {
        self.store.dispose();
    }
}
