//! Sortable, paged table over every stored record.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use usertag_core::{AuthorKey, TagRecord, TagStore};

use crate::marker::ChipStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Username,
    Tag,
    Ignore,
    Color,
    Votes,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "username" => Ok(SortKey::Username),
            "tag" => Ok(SortKey::Tag),
            "ignore" => Ok(SortKey::Ignore),
            "color" => Ok(SortKey::Color),
            "votes" => Ok(SortKey::Votes),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Username => "username",
            SortKey::Tag => "tag",
            SortKey::Ignore => "ignore",
            SortKey::Color => "color",
            SortKey::Votes => "votes",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFilter {
    /// Only authors with a label.
    #[default]
    Tagged,
    /// Every record, including vote-only ones.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub username: String,
    pub tag: String,
    pub ignored: bool,
    pub color: String,
    pub votes: i64,
}

impl TableRow {
    fn new(key: &AuthorKey, record: &TagRecord) -> Self {
        Self {
            username: key.to_string(),
            tag: record.tag.clone().unwrap_or_default(),
            ignored: record.ignore,
            color: record.color.clone().unwrap_or_default(),
            votes: record.votes,
        }
    }

    pub fn chip_style(&self) -> Option<ChipStyle> {
        (!self.color.is_empty()).then(|| ChipStyle::for_color(&self.color))
    }
}

const MISSING_TEXT: &str = "zzzzz";

fn sort_text(value: Option<&str>) -> String {
    value.unwrap_or(MISSING_TEXT).to_lowercase()
}

fn compare(key: SortKey, a: (&AuthorKey, &TagRecord), b: (&AuthorKey, &TagRecord)) -> Ordering {
    match key {
        SortKey::Username => a.0.as_str().cmp(b.0.as_str()),
        SortKey::Tag => sort_text(a.1.tag.as_deref()).cmp(&sort_text(b.1.tag.as_deref())),
        // Ignored authors come first.
        SortKey::Ignore => {
            let rank = |r: &TagRecord| if r.ignore { "a" } else { "z" };
            rank(a.1).cmp(rank(b.1))
        }
        SortKey::Color => sort_text(a.1.color.as_deref()).cmp(&sort_text(b.1.color.as_deref())),
        SortKey::Votes => a
            .1
            .votes
            .cmp(&b.1.votes)
            .then_with(|| a.0.as_str().cmp(b.0.as_str())),
    }
}

/// Authors in table order.
pub fn sorted_keys(store: &TagStore, filter: TableFilter, key: SortKey, descending: bool) -> Vec<AuthorKey> {
    let mut entries: Vec<(&AuthorKey, &TagRecord)> = store
        .iter()
        .filter(|(_, r)| filter == TableFilter::All || r.is_tagged())
        .collect();
    entries.sort_by(|a, b| compare(key, *a, *b));
    if descending {
        entries.reverse();
    }
    entries.into_iter().map(|(k, _)| k.clone()).collect()
}

/// A pending row delete. Dropping it cancels.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a delete only happens once confirmed"]
pub struct DeleteConfirmation {
    author: AuthorKey,
    message: String,
}

impl DeleteConfirmation {
    pub fn new(username: &str) -> Self {
        Self {
            author: AuthorKey::new(username),
            message: format!("Are you sure you want to delete the tag for user: {}?", username),
        }
    }

    pub fn author(&self) -> &AuthorKey {
        &self.author
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone)]
pub struct TagTable {
    sort: SortKey,
    descending: bool,
    filter: TableFilter,
    page_size: Option<usize>,
    page: usize,
    page_count: usize,
    rows: Vec<TableRow>,
}

impl TagTable {
    /// A `page_size` of 0 shows every row on one page.
    pub fn new(page_size: usize) -> Self {
        Self {
            sort: SortKey::default(),
            descending: false,
            filter: TableFilter::default(),
            page_size: (page_size > 0).then_some(page_size),
            page: 1,
            page_count: 1,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn sort(&self) -> (SortKey, bool) {
        (self.sort, self.descending)
    }

    pub fn filter(&self) -> TableFilter {
        self.filter
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// `"{page} of {pages}"`, or `None` when paging is off.
    pub fn page_label(&self) -> Option<String> {
        self.page_size
            .map(|_| format!("{} of {}", self.page, self.page_count))
    }

    /// Rebuild the visible rows from the store.
    pub fn draw(&mut self, store: &TagStore) -> &[TableRow] {
        let keys = sorted_keys(store, self.filter, self.sort, self.descending);
        let (start, end) = match self.page_size {
            Some(size) => {
                self.page_count = keys.len().div_ceil(size).max(1);
                self.page = self.page.clamp(1, self.page_count);
                let start = (size * (self.page - 1)).min(keys.len());
                (start, (start + size).min(keys.len()))
            }
            None => {
                self.page = 1;
                self.page_count = 1;
                (0, keys.len())
            }
        };
        self.rows = keys[start..end]
            .iter()
            .filter_map(|k| store.get(k).map(|r| TableRow::new(k, r)))
            .collect();
        &self.rows
    }

    /// Header click: the active key flips direction, another key sorts ascending.
    pub fn click_header(&mut self, key: SortKey, store: &TagStore) -> &[TableRow] {
        if key == self.sort {
            self.descending = !self.descending;
        } else {
            self.sort = key;
            self.descending = false;
        }
        self.draw(store)
    }

    pub fn set_sort(&mut self, key: SortKey, descending: bool, store: &TagStore) -> &[TableRow] {
        self.sort = key;
        self.descending = descending;
        self.draw(store)
    }

    pub fn set_filter(&mut self, filter: TableFilter, store: &TagStore) -> &[TableRow] {
        self.filter = filter;
        self.draw(store)
    }

    pub fn go_to_page(&mut self, page: usize, store: &TagStore) -> &[TableRow] {
        self.page = page;
        self.draw(store)
    }

    pub fn next_page(&mut self, store: &TagStore) -> &[TableRow] {
        self.page = if self.page >= self.page_count {
            1
        } else {
            self.page + 1
        };
        self.draw(store)
    }

    pub fn previous_page(&mut self, store: &TagStore) -> &[TableRow] {
        self.page = if self.page <= 1 {
            self.page_count
        } else {
            self.page - 1
        };
        self.draw(store)
    }

    pub fn request_delete(&self, username: &str) -> DeleteConfirmation {
        DeleteConfirmation::new(username)
    }

    /// Carry out a confirmed delete. Returns the removed record.
    pub fn confirm_delete(&mut self, confirmation: DeleteConfirmation, store: &mut TagStore) -> Option<TagRecord> {
        let removed = store.remove(&confirmation.author);
        self.rows.retain(|r| r.username != confirmation.author.as_str());
        tracing::info!(author = %confirmation.author, "tag deleted");
        removed
    }
}
