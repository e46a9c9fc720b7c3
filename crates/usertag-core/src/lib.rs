pub mod backend;
pub mod error;
pub mod rules;
pub mod store;

pub use backend::{Backend, BackendOp, JsonFileBackend, MemoryBackend};
pub use error::StoreError;
pub use rules::{applies, NoToggles, ScopeMode, ScopeRule, Toggles};
pub use store::{TagStore, TAGS_STORAGE_KEY};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

// --- Types ---

/// Author identity, case-folded. Two occurrences are the same user iff their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AuthorKey(String);

impl AuthorKey {
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AuthorKey {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<&str> for AuthorKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<AuthorKey> for String {
    fn from(key: AuthorKey) -> Self {
        key.0
    }
}

impl fmt::Display for AuthorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag label used when an author is ignored without a label of their own.
pub const IGNORED_SENTINEL: &str = "ignored";

/// Annotation attached to one author. Every field is optional on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "de_flag")]
    pub ignore: bool,
    #[serde(default, skip_serializing_if = "is_zero", deserialize_with = "de_votes")]
    pub votes: i64,
}

impl TagRecord {
    /// A record with nothing worth keeping. Empty records never stay in the store.
    pub fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.ignore
            && self.color.is_none()
            && self.link.is_none()
            && self.votes == 0
    }

    pub fn is_tagged(&self) -> bool {
        self.tag.is_some()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let val = serde_json::Value::deserialize(d)?;
    Ok(match val {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s == "true",
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

// Older stores kept vote weights as strings.
fn de_votes<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let val = serde_json::Value::deserialize(d)?;
    Ok(match val {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        serde_json::Value::String(s) => coerce_int(&s),
        _ => 0,
    })
}

/// Integer-prefix parse: `"7abc"` is 7, `" -3"` is -3, anything without leading digits is 0.
pub fn coerce_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for ch in digits.chars() {
        let Some(d) = ch.to_digit(10) else { break };
        value = value.saturating_mul(10).saturating_add(i64::from(d));
    }
    if negative {
        -value
    } else {
        value
    }
}

/// Partial update for a [`TagRecord`]. `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPatch {
    pub tag: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub link: Option<Option<String>>,
    pub ignore: Option<bool>,
    pub votes: Option<i64>,
}

impl TagPatch {
    pub fn votes(votes: i64) -> Self {
        Self {
            votes: Some(votes),
            ..Default::default()
        }
    }

    /// Clears everything except the vote weight.
    pub fn clear_tag() -> Self {
        Self {
            tag: Some(None),
            color: Some(None),
            link: Some(None),
            ignore: Some(false),
            votes: None,
        }
    }

    pub fn apply(&self, record: &mut TagRecord) {
        if let Some(tag) = &self.tag {
            record.tag = non_empty(tag);
        }
        if let Some(color) = &self.color {
            record.color = non_empty(color);
        }
        if let Some(link) = &self.link {
            record.link = non_empty(link);
        }
        if let Some(ignore) = self.ignore {
            record.ignore = ignore;
        }
        if let Some(votes) = self.votes {
            record.votes = votes;
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// A full tag edit as submitted from the tag dialog or the management server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEdit {
    pub tag: String,
    pub color: String,
    pub ignore: bool,
    pub link: String,
    pub votes: i64,
}

impl Default for TagEdit {
    fn default() -> Self {
        Self {
            tag: String::new(),
            color: "none".to_string(),
            ignore: false,
            link: String::new(),
            votes: 0,
        }
    }
}

// --- Palette ---

/// Tag background colors and the text color that stays readable on each.
pub const PALETTE: &[(&str, &str)] = &[
    ("none", "inherit"),
    ("aqua", "black"),
    ("black", "white"),
    ("blue", "white"),
    ("cornflowerblue", "white"),
    ("fuchsia", "white"),
    ("pink", "black"),
    ("gray", "white"),
    ("green", "white"),
    ("lime", "black"),
    ("maroon", "white"),
    ("navy", "white"),
    ("olive", "white"),
    ("orange", "white"),
    ("orangered", "white"),
    ("purple", "white"),
    ("red", "white"),
    ("silver", "black"),
    ("teal", "white"),
    ("white", "black"),
    ("yellow", "black"),
];

pub fn text_color_for(color: &str) -> Option<&'static str> {
    PALETTE
        .iter()
        .find(|(bg, _)| *bg == color)
        .map(|(_, text)| *text)
}

pub fn background_for(color: &str) -> &str {
    if color == "none" {
        "transparent"
    } else {
        color
    }
}

// --- Page context ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageKind {
    #[default]
    Listing,
    Comments,
    Inbox,
    Profile,
    Dashboard,
    Other,
}

/// What the host page is showing, plus the state of neighbouring display modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    #[serde(default)]
    pub kind: PageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multireddit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in_user: Option<String>,
    /// High-contrast mode: vote colors go on the text instead of the background.
    #[serde(default)]
    pub night_mode: bool,
    /// Page-level keyboard navigation is running and wants focus back after dialogs close.
    #[serde(default)]
    pub keyboard_nav: bool,
}

impl PageContext {
    /// The place scope rules are evaluated against, lowercased. `None` on global feeds.
    pub fn active_place(&self) -> Option<String> {
        self.subreddit
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn is_viewer(&self, key: &AuthorKey) -> bool {
        self.logged_in_user
            .as_deref()
            .is_some_and(|me| me.to_lowercase() == key.as_str())
    }
}

// --- Settings ---

pub const TAGGER_SECTION: &str = "userTagger";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaggerOptions {
    /// Always show a tag tool icon after every username.
    pub show_tagging_icon: bool,
    /// Hide whole posts and collapse comments instead of replacing their text.
    pub hard_ignore: bool,
    /// Prefill the dialog link with the post or comment the user was tagged on.
    pub store_source_link: bool,
    pub use_comments_link_as_source: bool,
    pub track_vote_weight: bool,
    /// Show `[+6]` rather than `[vw]`.
    pub vw_number: bool,
    pub vw_tooltip: bool,
    /// Rows per page in the tag table; 0 disables paging.
    pub tags_per_page: usize,
}

impl Default for TaggerOptions {
    fn default() -> Self {
        Self {
            show_tagging_icon: true,
            hard_ignore: false,
            store_source_link: true,
            use_comments_link_as_source: true,
            track_vote_weight: true,
            vw_number: true,
            vw_tooltip: true,
            tags_per_page: 0,
        }
    }
}

/// Resolve the data directory (`$USERTAG_HOME`, else `~/.usertag/`).
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("USERTAG_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".usertag")
}

fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Read one section of `settings.json`. Missing or malformed settings yield defaults.
pub fn read_settings_section<T: DeserializeOwned + Default>(section: &str) -> T {
    read_section_at(&settings_path(), section)
}

fn read_section_at<T: DeserializeOwned + Default>(path: &Path, section: &str) -> T {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .and_then(|mut v| v.get_mut(section).map(serde_json::Value::take))
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Replace one section of `settings.json`, keeping the others.
pub fn write_settings_section<T: Serialize>(section: &str, value: &T) -> Result<(), StoreError> {
    write_section_at(&settings_path(), section, value)
}

fn write_section_at<T: Serialize>(path: &Path, section: &str, value: &T) -> Result<(), StoreError> {
    let mut root = fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .filter(serde_json::Value::is_object)
        .unwrap_or_else(|| serde_json::json!({}));
    root[section] = serde_json::to_value(value)?;
    write_atomic(path, &serde_json::to_string_pretty(&root)?)
}

pub fn read_tagger_options() -> TaggerOptions {
    read_settings_section(TAGGER_SECTION)
}

pub fn write_tagger_options(options: &TaggerOptions) -> Result<(), StoreError> {
    write_settings_section(TAGGER_SECTION, options)
}

/// Write a file via temp file + rename so readers never see a half-written file.
pub fn write_atomic(path: &Path, data: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", name));
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_key_is_case_folded() {
        assert_eq!(AuthorKey::new("SomeUser"), AuthorKey::new("someuser"));
        assert_eq!(AuthorKey::from("MiXeD").as_str(), "mixed");
        let key: AuthorKey = serde_json::from_str("\"LOUD\"").unwrap();
        assert_eq!(key.as_str(), "loud");
    }

    #[test]
    fn coerce_int_takes_leading_integer() {
        assert_eq!(coerce_int("42"), 42);
        assert_eq!(coerce_int("  -3"), -3);
        assert_eq!(coerce_int("7abc"), 7);
        assert_eq!(coerce_int("3.9"), 3);
        assert_eq!(coerce_int("abc"), 0);
        assert_eq!(coerce_int(""), 0);
        assert_eq!(coerce_int("-"), 0);
    }

    #[test]
    fn record_decodes_legacy_shapes() {
        let rec: TagRecord =
            serde_json::from_str(r#"{"tag":"friend","votes":"12","ignore":true}"#).unwrap();
        assert_eq!(rec.tag.as_deref(), Some("friend"));
        assert_eq!(rec.votes, 12);
        assert!(rec.ignore);

        let rec: TagRecord = serde_json::from_str(r#"{"votes":"nope","ignore":null}"#).unwrap();
        assert_eq!(rec.votes, 0);
        assert!(!rec.ignore);
        assert!(rec.is_empty());
    }

    #[test]
    fn record_serializes_only_present_fields() {
        let rec = TagRecord {
            tag: Some("x".into()),
            votes: 0,
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&rec).unwrap(), r#"{"tag":"x"}"#);
    }

    #[test]
    fn patch_treats_empty_strings_as_cleared() {
        let mut rec = TagRecord {
            link: Some("https://example.com".into()),
            ..Default::default()
        };
        TagPatch {
            link: Some(Some(String::new())),
            tag: Some(Some("t".into())),
            ..Default::default()
        }
        .apply(&mut rec);
        assert_eq!(rec.link, None);
        assert_eq!(rec.tag.as_deref(), Some("t"));
    }

    #[test]
    fn palette_lookup() {
        assert_eq!(text_color_for("yellow"), Some("black"));
        assert_eq!(text_color_for("none"), Some("inherit"));
        assert_eq!(text_color_for("chartreuse"), None);
        assert_eq!(background_for("none"), "transparent");
        assert_eq!(background_for("red"), "red");
    }

    #[test]
    fn page_context_viewer_is_case_insensitive() {
        let page = PageContext {
            logged_in_user: Some("Me".into()),
            subreddit: Some("Rust".into()),
            ..Default::default()
        };
        assert!(page.is_viewer(&AuthorKey::new("me")));
        assert!(!page.is_viewer(&AuthorKey::new("you")));
        assert_eq!(page.active_place().as_deref(), Some("rust"));
    }

    #[test]
    fn settings_sections_round_trip_and_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let missing: TaggerOptions = read_section_at(&path, TAGGER_SECTION);
        assert_eq!(missing, TaggerOptions::default());

        let opts = TaggerOptions {
            hard_ignore: true,
            tags_per_page: 25,
            ..Default::default()
        };
        write_section_at(&path, TAGGER_SECTION, &opts).unwrap();
        write_section_at(&path, "other", &serde_json::json!({"a": 1})).unwrap();
        let back: TaggerOptions = read_section_at(&path, TAGGER_SECTION);
        assert_eq!(back, opts);

        fs::write(&path, "not json").unwrap();
        let broken: TaggerOptions = read_section_at(&path, TAGGER_SECTION);
        assert_eq!(broken, TaggerOptions::default());
    }

    #[test]
    fn partial_options_fill_defaults() {
        let opts: TaggerOptions = serde_json::from_str(r#"{"hardIgnore":true}"#).unwrap();
        assert!(opts.hard_ignore);
        assert!(opts.show_tagging_icon);
        assert!(opts.track_vote_weight);
    }
}
