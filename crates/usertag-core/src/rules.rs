//! Scope rules: whether a labeled effect applies on the current page.
//!
//! The same truth table gates stylesheet injection, CSS snippets, body
//! classes, and any other behavior that is limited to some places.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Scope-list entry that matches every place.
pub const WILDCARD_PLACE: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ScopeMode {
    /// Also what any unrecognized mode string turns into.
    #[default]
    Everywhere,
    Include,
    Exclude,
}

impl From<&str> for ScopeMode {
    fn from(s: &str) -> Self {
        match s {
            "include" => ScopeMode::Include,
            "exclude" => ScopeMode::Exclude,
            _ => ScopeMode::Everywhere,
        }
    }
}

impl From<String> for ScopeMode {
    fn from(s: String) -> Self {
        ScopeMode::from(s.as_str())
    }
}

/// Named custom toggles the user can switch on and off.
pub trait Toggles {
    fn is_active(&self, name: &str) -> bool;
}

impl Toggles for BTreeSet<String> {
    fn is_active(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl Toggles for HashSet<String> {
    fn is_active(&self, name: &str) -> bool {
        self.contains(name)
    }
}

/// No toggle is ever active.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToggles;

impl Toggles for NoToggles {
    fn is_active(&self, _name: &str) -> bool {
        false
    }
}

/// Decide whether an effect applies.
///
/// `toggle_active` is `None` when the rule names no toggle. Place names are
/// compared case-insensitively; `active_place` is `None` on global feeds.
pub fn applies(
    mode: ScopeMode,
    places: &[String],
    active_place: Option<&str>,
    toggle_active: Option<bool>,
) -> bool {
    if toggle_active == Some(false) {
        return false;
    }

    let Some(place) = active_place else {
        return mode != ScopeMode::Include;
    };

    let place = place.to_lowercase();
    let listed = places
        .iter()
        .any(|p| p.to_lowercase() == place || p.eq_ignore_ascii_case(WILDCARD_PLACE));

    match mode {
        ScopeMode::Include => listed,
        ScopeMode::Exclude => !listed,
        ScopeMode::Everywhere => true,
    }
}

/// A (mode, place list, toggle) triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRule {
    #[serde(default)]
    pub mode: ScopeMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub places: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<String>,
}

impl ScopeRule {
    pub fn everywhere() -> Self {
        Self::default()
    }

    pub fn new(mode: ScopeMode, places: &str, toggle: Option<&str>) -> Self {
        Self {
            mode,
            places: parse_places(places),
            toggle: toggle.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    pub fn applies(&self, active_place: Option<&str>, toggles: &dyn Toggles) -> bool {
        let toggle_active = self
            .toggle
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| toggles.is_active(t));
        applies(self.mode, &self.places, active_place, toggle_active)
    }
}

/// Split a comma-separated place list into lowercased, trimmed names.
pub fn parse_places(list: &str) -> Vec<String> {
    list.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}
