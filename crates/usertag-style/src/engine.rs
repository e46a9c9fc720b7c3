//! Keeps the page's injected effects equal to what the style tables ask for.

use std::collections::BTreeSet;

use usertag_core::PageContext;

use crate::effects::{desired_effects, Effect};
use crate::StyleOptions;

/// The page side of style injection.
pub trait StyleHost {
    fn add(&mut self, effect: &Effect);
    fn remove(&mut self, effect: &Effect);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDiff {
    pub added: Vec<Effect>,
    pub removed: Vec<Effect>,
}

impl StyleDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn apply(&self, host: &mut dyn StyleHost) {
        for effect in &self.removed {
            host.remove(effect);
        }
        for effect in &self.added {
            host.add(effect);
        }
    }
}

/// Tracks which effects are currently injected.
#[derive(Debug, Clone, Default)]
pub struct StyleEngine {
    applied: BTreeSet<Effect>,
}

impl StyleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> &BTreeSet<Effect> {
        &self.applied
    }

    /// Move from what is applied to `desired`, touching only the difference.
    pub fn reconcile(&mut self, desired: BTreeSet<Effect>) -> StyleDiff {
        let diff = StyleDiff {
            added: desired.difference(&self.applied).cloned().collect(),
            removed: self.applied.difference(&desired).cloned().collect(),
        };
        if !diff.is_empty() {
            tracing::debug!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                "style effects reconciled"
            );
        }
        self.applied = desired;
        diff
    }

    /// Take every effect back off the page.
    pub fn clear(&mut self) -> StyleDiff {
        self.reconcile(BTreeSet::new())
    }
}

/// Style options evaluated against one page and the user's active toggles.
#[derive(Debug, Clone)]
pub struct StyleSession {
    options: StyleOptions,
    page: PageContext,
    toggles: BTreeSet<String>,
    engine: StyleEngine,
}

impl StyleSession {
    pub fn new(options: StyleOptions, page: PageContext) -> Self {
        Self {
            options,
            page,
            toggles: BTreeSet::new(),
            engine: StyleEngine::new(),
        }
    }

    pub fn engine(&self) -> &StyleEngine {
        &self.engine
    }

    /// Evaluate every row and return what changed.
    pub fn refresh(&mut self) -> StyleDiff {
        let desired = desired_effects(&self.options, &self.page, &self.toggles);
        self.engine.reconcile(desired)
    }

    /// Record a toggle flip and re-evaluate.
    pub fn set_toggle(&mut self, name: &str, active: bool) -> StyleDiff {
        let changed = if active {
            self.toggles.insert(name.to_string())
        } else {
            self.toggles.remove(name)
        };
        if !changed {
            return StyleDiff::default();
        }
        tracing::debug!(toggle = name, active, "custom toggle changed");
        self.refresh()
    }

    pub fn set_options(&mut self, options: StyleOptions) -> StyleDiff {
        self.options = options;
        self.refresh()
    }
}
