pub mod effects;
pub mod engine;

pub use effects::{body_classes, desired_effects, page_classes, sanitize_stylesheet_url, Effect};
pub use engine::{StyleDiff, StyleEngine, StyleHost, StyleSession};

use serde::{Deserialize, Serialize};
use usertag_core::{ScopeMode, ScopeRule, Toggles};

pub const STYLE_SECTION: &str = "stylesheet";
pub const UPDATES_STYLESHEET: &str = "https://cdn.redditenhancementsuite.com/updates.css";

/// One row of a style table: a resource and where it applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRow {
    /// Stylesheet URL or subreddit, CSS text, or class names, depending on the table.
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub apply_to: ScopeMode,
    /// Comma-separated subreddit names.
    #[serde(default)]
    pub places: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<String>,
}

impl StyleRow {
    pub fn new(resource: &str, apply_to: ScopeMode, places: &str) -> Self {
        Self {
            resource: resource.to_string(),
            apply_to,
            places: places.to_string(),
            toggle: None,
        }
    }

    pub fn with_toggle(mut self, toggle: &str) -> Self {
        self.toggle = Some(toggle.to_string());
        self
    }

    pub fn applies(&self, active_place: Option<&str>, toggles: &dyn Toggles) -> bool {
        ScopeRule::new(self.apply_to, &self.places, self.toggle.as_deref())
            .applies(active_place, toggles)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleOptions {
    /// External or subreddit stylesheets to load.
    pub load_stylesheets: Vec<StyleRow>,
    /// CSS text injected as-is.
    pub snippets: Vec<StyleRow>,
    /// Classes added to the page body.
    pub body_classes: Vec<StyleRow>,
    pub subreddit_class: bool,
    pub multireddit_class: bool,
    pub username_class: bool,
    pub logged_in_user_class: bool,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            load_stylesheets: vec![StyleRow::new(UPDATES_STYLESHEET, ScopeMode::Everywhere, "")],
            snippets: Vec::new(),
            body_classes: Vec::new(),
            subreddit_class: true,
            multireddit_class: true,
            username_class: true,
            logged_in_user_class: false,
        }
    }
}

pub fn read_style_options() -> StyleOptions {
    usertag_core::read_settings_section(STYLE_SECTION)
}

pub fn write_style_options(options: &StyleOptions) -> Result<(), usertag_core::StoreError> {
    usertag_core::write_settings_section(STYLE_SECTION, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use usertag_core::NoToggles;

    #[test]
    fn defaults_load_the_updates_stylesheet_everywhere() {
        let opts = StyleOptions::default();
        assert_eq!(opts.load_stylesheets.len(), 1);
        assert_eq!(opts.load_stylesheets[0].resource, UPDATES_STYLESHEET);
        assert!(opts.load_stylesheets[0].applies(None, &NoToggles));
        assert!(!opts.logged_in_user_class);
    }

    #[test]
    fn rows_parse_from_settings_json() {
        let opts: StyleOptions = serde_json::from_str(
            r#"{"snippets":[{"resource":"a{}","applyTo":"include","places":"Foo,bar"}],"usernameClass":false}"#,
        )
        .unwrap();
        let row = &opts.snippets[0];
        assert_eq!(row.apply_to, ScopeMode::Include);
        assert!(row.applies(Some("foo"), &NoToggles));
        assert!(!row.applies(Some("baz"), &NoToggles));
        assert!(!opts.username_class);
        assert!(opts.subreddit_class);
        assert_eq!(opts.load_stylesheets, StyleOptions::default().load_stylesheets);
    }
}
