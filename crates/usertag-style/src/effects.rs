//! What the style tables ask for on a given page.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use usertag_core::{PageContext, Toggles};

use crate::{StyleOptions, StyleRow};

static SUBREDDIT_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(?:/?r/)?([\w_]+)/?$"));
static URL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(?:https?://[\w\.]+)?/\w+"));

/// A single injected change to the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Effect {
    Stylesheet(String),
    Snippet(String),
    BodyClass(String),
}

/// Turn a stylesheet row into a loadable URL.
///
/// A bare subreddit name becomes that subreddit's stylesheet. URLs and
/// absolute paths pass through. Anything else is dropped.
pub fn sanitize_stylesheet_url(raw: &str) -> Option<String> {
    let (Ok(subreddit), Ok(url)) = (SUBREDDIT_RE.as_ref(), URL_RE.as_ref()) else {
        tracing::warn!("stylesheet patterns failed to compile");
        return None;
    };
    if let Some(name) = subreddit.captures(raw).and_then(|c| c.get(1)) {
        return Some(format!("/r/{}/stylesheet.css", name.as_str()));
    }
    url.is_match(raw).then(|| raw.to_string())
}

/// Class names of a body-class row, split on whitespace and commas.
pub fn body_classes(resource: &str) -> Vec<String> {
    resource
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Body classes naming the current subreddit, multireddit, profile and viewer.
pub fn page_classes(page: &PageContext, options: &StyleOptions) -> BTreeSet<String> {
    let named = |name: &Option<String>| -> Option<String> {
        name.as_deref()
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase)
    };
    let mut classes = BTreeSet::new();
    if options.subreddit_class {
        if let Some(name) = named(&page.subreddit) {
            classes.insert(format!("res-r-{}", name));
        }
    }
    if options.multireddit_class {
        if let Some(name) = named(&page.multireddit) {
            classes.insert(format!("res-{}", name.replace('/', "-")));
        }
    }
    if options.username_class {
        if let Some(name) = named(&page.user_profile) {
            classes.insert(format!("res-user-{}", name));
        }
    }
    if options.logged_in_user_class {
        if let Some(name) = named(&page.logged_in_user) {
            classes.insert(format!("res-me-{}", name));
        }
    }
    classes
}

/// Effects of one table, where a failing row vetoes the same effect from a passing one.
fn table_effects(
    rows: &[StyleRow],
    place: Option<&str>,
    toggles: &dyn Toggles,
    expand: impl Fn(&str) -> Vec<Effect>,
) -> BTreeSet<Effect> {
    let (passing, failing): (Vec<&StyleRow>, Vec<&StyleRow>) =
        rows.iter().partition(|row| row.applies(place, toggles));
    let vetoed: BTreeSet<Effect> = failing.iter().flat_map(|r| expand(&r.resource)).collect();
    passing
        .iter()
        .flat_map(|r| expand(&r.resource))
        .filter(|e| !vetoed.contains(e))
        .collect()
}

/// Every effect that should be on the page right now.
pub fn desired_effects(
    options: &StyleOptions,
    page: &PageContext,
    toggles: &dyn Toggles,
) -> BTreeSet<Effect> {
    let place = page.active_place();
    let place = place.as_deref();

    let mut effects = table_effects(&options.load_stylesheets, place, toggles, |r| {
        sanitize_stylesheet_url(r)
            .map(Effect::Stylesheet)
            .into_iter()
            .collect()
    });
    effects.extend(table_effects(&options.snippets, place, toggles, |r| {
        if r.is_empty() {
            Vec::new()
        } else {
            vec![Effect::Snippet(r.to_string())]
        }
    }));
    effects.extend(table_effects(&options.body_classes, place, toggles, |r| {
        body_classes(r).into_iter().map(Effect::BodyClass).collect()
    }));
    effects.extend(page_classes(page, options).into_iter().map(Effect::BodyClass));
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use usertag_core::{NoToggles, ScopeMode};

    #[rstest]
    #[case("foo", Some("/r/foo/stylesheet.css"))]
    #[case("r/foo", Some("/r/foo/stylesheet.css"))]
    #[case("/r/foo/", Some("/r/foo/stylesheet.css"))]
    #[case("https://example.com/theme.css", Some("https://example.com/theme.css"))]
    #[case("/static/site.css", Some("/static/site.css"))]
    #[case("ftp://example.com/x.css", None)]
    #[case("", None)]
    #[case("not a url", None)]
    fn stylesheet_sanitizing(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(sanitize_stylesheet_url(raw).as_deref(), expected);
    }

    #[test]
    fn body_class_rows_split_on_space_and_comma() {
        assert_eq!(body_classes("a b,c  ,d"), ["a", "b", "c", "d"]);
        assert!(body_classes(" , ").is_empty());
    }

    #[test]
    fn page_classes_follow_options() {
        let page = PageContext {
            subreddit: Some("Rust".into()),
            multireddit: Some("user/Me/m/Langs".into()),
            user_profile: Some("Someone".into()),
            logged_in_user: Some("Me".into()),
            ..Default::default()
        };
        let classes = page_classes(&page, &StyleOptions::default());
        assert_eq!(
            classes.into_iter().collect::<Vec<_>>(),
            ["res-r-rust", "res-user-me-m-langs", "res-user-someone"]
        );

        let opts = StyleOptions {
            subreddit_class: false,
            logged_in_user_class: true,
            ..Default::default()
        };
        let classes = page_classes(&page, &opts);
        assert!(classes.contains("res-me-me"));
        assert!(!classes.contains("res-r-rust"));
    }

    #[test]
    fn failing_row_vetoes_a_passing_one() {
        let opts = StyleOptions {
            load_stylesheets: vec![
                StyleRow::new("foo", ScopeMode::Everywhere, ""),
                StyleRow::new("/r/foo", ScopeMode::Exclude, "rust"),
                StyleRow::new("bar", ScopeMode::Everywhere, ""),
            ],
            body_classes: vec![
                StyleRow::new("wide dark", ScopeMode::Everywhere, ""),
                StyleRow::new("dark", ScopeMode::Include, "python"),
            ],
            subreddit_class: false,
            ..Default::default()
        };
        let page = PageContext {
            subreddit: Some("rust".into()),
            ..Default::default()
        };
        let effects = desired_effects(&opts, &page, &NoToggles);
        assert_eq!(
            effects.into_iter().collect::<Vec<_>>(),
            vec![
                Effect::Stylesheet("/r/bar/stylesheet.css".into()),
                Effect::BodyClass("wide".into()),
            ]
        );
    }
}
