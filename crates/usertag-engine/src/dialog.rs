//! The tag editing dialog: one author at a time, reused between edits.

use thiserror::Error;

use usertag_core::{coerce_int, AuthorKey, PageContext, TagEdit, TagRecord, TagStore, TaggerOptions};

use crate::marker::{self, ChipStyle};
use crate::tree::{ContentTree, NodeId, Offset};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DialogError {
    #[error("tag dialog is not open")]
    NotOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    Closed,
    Open {
        author: AuthorKey,
        /// The chip that opened the dialog; refreshed in place on save.
        anchor: NodeId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Side {
    Left(f64),
    Right(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub top: f64,
    pub side: Side,
}

impl Placement {
    /// Left-align on the anchor unless that leaves less room than the right side does.
    pub fn beside(anchor: Offset, client_width: f64) -> Self {
        let side = if anchor.left < client_width - anchor.left {
            Side::Left(anchor.left)
        } else {
            Side::Right(client_width - anchor.left)
        };
        Self {
            top: anchor.top,
            side,
        }
    }
}

/// Field values of the dialog form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogForm {
    pub username: String,
    pub tag: String,
    pub color: String,
    pub link: String,
    pub ignore: bool,
    pub votes: String,
}

impl Default for DialogForm {
    fn default() -> Self {
        Self {
            username: String::new(),
            tag: String::new(),
            color: "none".to_string(),
            link: String::new(),
            ignore: false,
            votes: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipPreview {
    pub text: String,
    pub style: ChipStyle,
}

/// Where the dialog is drawn. Layout is up to the host.
pub trait DialogSurface {
    fn show(&mut self, placement: Placement, form: &DialogForm);
    fn hide(&mut self);
    /// Blur dialog controls so page keyboard navigation gets keys again.
    fn release_focus(&mut self);
    fn preview(&mut self, _chip: &ChipPreview) {}
}

/// A surface that draws nothing.
#[derive(Debug, Default)]
pub struct HeadlessSurface;

impl DialogSurface for HeadlessSurface {
    fn show(&mut self, _placement: Placement, _form: &DialogForm) {}
    fn hide(&mut self) {}
    fn release_focus(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKey {
    Escape,
    Other,
}

pub struct TagDialog {
    state: DialogState,
    form: Option<DialogForm>,
    placement: Option<Placement>,
    surface: Box<dyn DialogSurface>,
}

impl std::fmt::Debug for TagDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagDialog")
            .field("state", &self.state)
            .field("form", &self.form)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

impl TagDialog {
    pub fn new(surface: Box<dyn DialogSurface>) -> Self {
        Self {
            state: DialogState::Closed,
            form: None,
            placement: None,
            surface,
        }
    }

    pub fn state(&self) -> &DialogState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, DialogState::Open { .. })
    }

    /// Whether the form has been built. It is built on the first open and kept.
    pub fn is_constructed(&self) -> bool {
        self.form.is_some()
    }

    pub fn form(&self) -> Option<&DialogForm> {
        self.form.as_ref()
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    /// Open for the author `anchor` belongs to and prefill the form.
    pub fn open(
        &mut self,
        tree: &dyn ContentTree,
        store: &TagStore,
        options: &TaggerOptions,
        anchor: NodeId,
        username: &str,
    ) -> &DialogForm {
        let author = AuthorKey::new(username);
        let mut form = DialogForm {
            username: author.to_string(),
            ..Default::default()
        };
        match store.get(&author) {
            Some(record) => {
                form.tag = record.tag.clone().unwrap_or_default();
                form.color = record.color.clone().unwrap_or_else(|| "none".to_string());
                form.ignore = record.ignore;
                form.link = match (&record.tag, &record.link) {
                    (None, None) => source_link(tree, anchor, options).unwrap_or_default(),
                    (_, link) => link.clone().unwrap_or_default(),
                };
                if record.votes != 0 {
                    form.votes = record.votes.to_string();
                }
            }
            None if options.store_source_link => {
                form.link = source_link(tree, anchor, options).unwrap_or_default();
            }
            None => {}
        }

        if self.form.is_none() {
            tracing::debug!("building tag dialog");
        }
        let offset = tree.offset(anchor).unwrap_or_default();
        let placement = Placement::beside(offset, tree.client_width());
        self.surface.show(placement, &form);
        self.placement = Some(placement);
        self.state = DialogState::Open { author, anchor };
        let form = self.form.insert(form);
        self.surface.preview(&preview_of(form));
        form
    }

    /// The chip as it would look with the current label and color.
    pub fn preview(&self) -> Option<ChipPreview> {
        self.form.as_ref().map(preview_of)
    }

    pub fn set_label(&mut self, text: &str) {
        self.edit(|f| f.tag = text.to_string());
    }

    pub fn set_color(&mut self, color: &str) {
        self.edit(|f| f.color = color.to_string());
    }

    pub fn set_link(&mut self, link: &str) {
        self.edit(|f| f.link = link.to_string());
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.edit(|f| f.ignore = ignore);
    }

    pub fn set_votes(&mut self, votes: &str) {
        self.edit(|f| f.votes = votes.to_string());
    }

    /// Target of the "open link" affordance: the first token of the link field.
    pub fn open_link_target(&self) -> Option<String> {
        self.open_all_links().into_iter().next()
    }

    pub fn open_all_links(&self) -> Vec<String> {
        self.form
            .as_ref()
            .map(|f| f.link.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Write the form through the store, refresh the anchor chip and close.
    pub fn save(
        &mut self,
        tree: &mut dyn ContentTree,
        store: &mut TagStore,
        options: &TaggerOptions,
        page: &PageContext,
    ) -> Result<Option<TagRecord>, DialogError> {
        let DialogState::Open { author, anchor } = std::mem::take(&mut self.state) else {
            return Err(DialogError::NotOpen);
        };
        let form = self.form.clone().unwrap_or_default();
        let edit = TagEdit {
            tag: form.tag,
            color: form.color,
            ignore: form.ignore,
            link: form.link,
            votes: coerce_int(&form.votes),
        };
        let record = store.set_tag(&author, &edit).cloned();
        tracing::info!(author = %author, tagged = record.as_ref().is_some_and(TagRecord::is_tagged), "tag saved");

        match record.as_ref().filter(|r| r.is_tagged()) {
            Some(r) => marker::paint_chip(tree, anchor, r.tag.as_deref(), r.color.as_deref()),
            None => marker::paint_chip(tree, anchor, None, None),
        }
        let votes = record.as_ref().map_or(0, |r| r.votes);
        marker::recolor_vote_weights(tree, &author, votes, options, page.night_mode);

        self.close(page);
        Ok(record)
    }

    /// Close without touching the store.
    pub fn cancel(&mut self, page: &PageContext) {
        if self.is_open() {
            self.state = DialogState::Closed;
            self.close(page);
        }
    }

    /// Returns whether the key was consumed.
    pub fn handle_key(&mut self, key: DialogKey, page: &PageContext) -> bool {
        match key {
            DialogKey::Escape if self.is_open() => {
                self.cancel(page);
                true
            }
            _ => false,
        }
    }

    fn close(&mut self, page: &PageContext) {
        self.surface.hide();
        if page.keyboard_nav {
            self.surface.release_focus();
        }
    }

    fn edit(&mut self, change: impl FnOnce(&mut DialogForm)) {
        if !self.is_open() {
            return;
        }
        if let Some(form) = self.form.as_mut() {
            change(form);
            self.surface.preview(&preview_of(form));
        }
    }
}

fn preview_of(form: &DialogForm) -> ChipPreview {
    ChipPreview {
        text: form.tag.clone(),
        style: ChipStyle::for_color(&form.color),
    }
}

/// Guess a link to the content the author was tagged on.
pub fn source_link(tree: &dyn ContentTree, anchor: NodeId, options: &TaggerOptions) -> Option<String> {
    let entry = tree.entry_of(anchor)?;
    let title = if options.use_comments_link_as_source {
        None
    } else {
        entry.title_link
    };
    title
        .or(entry.comments_link)
        .or(entry.permalink)
        .and_then(|n| tree.attr(n, "href"))
}
