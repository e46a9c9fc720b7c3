use std::collections::BTreeSet;
use usertag_core::{PageContext, ScopeMode};
use usertag_style::{Effect, StyleHost, StyleOptions, StyleRow, StyleSession, UPDATES_STYLESHEET};

#[derive(Default)]
struct Head {
    present: BTreeSet<Effect>,
    adds: usize,
}

impl StyleHost for Head {
    fn add(&mut self, effect: &Effect) {
        assert!(self.present.insert(effect.clone()), "duplicate injection of {:?}", effect);
        self.adds += 1;
    }

    fn remove(&mut self, effect: &Effect) {
        assert!(self.present.remove(effect), "removing {:?} which was never injected", effect);
    }
}

fn options() -> StyleOptions {
    StyleOptions {
        snippets: vec![
            StyleRow::new(".side { display: none }", ScopeMode::Everywhere, "").with_toggle("noSidebar"),
        ],
        body_classes: vec![StyleRow::new("compact", ScopeMode::Include, "rust,golang")],
        ..Default::default()
    }
}

#[test]
fn toggle_flips_add_and_remove_exactly() {
    let page = PageContext {
        subreddit: Some("Rust".into()),
        ..Default::default()
    };
    let mut session = StyleSession::new(options(), page);
    let mut head = Head::default();

    session.refresh().apply(&mut head);
    let expected: BTreeSet<Effect> = [
        Effect::Stylesheet(UPDATES_STYLESHEET.into()),
        Effect::BodyClass("compact".into()),
        Effect::BodyClass("res-r-rust".into()),
    ]
    .into();
    assert_eq!(head.present, expected);

    let diff = session.set_toggle("noSidebar", true);
    assert_eq!(diff.added, vec![Effect::Snippet(".side { display: none }".into())]);
    diff.apply(&mut head);

    assert!(session.set_toggle("noSidebar", true).is_empty());

    let diff = session.set_toggle("noSidebar", false);
    assert_eq!(diff.removed, vec![Effect::Snippet(".side { display: none }".into())]);
    diff.apply(&mut head);
    assert_eq!(head.present, expected);
    assert_eq!(&head.present, session.engine().applied());
}

#[test]
fn global_feed_skips_include_rows() {
    let mut session = StyleSession::new(options(), PageContext::default());
    let mut head = Head::default();
    session.refresh().apply(&mut head);
    assert_eq!(
        head.present.into_iter().collect::<Vec<_>>(),
        vec![Effect::Stylesheet(UPDATES_STYLESHEET.into())]
    );
}

#[test]
fn changing_options_swaps_stylesheets() {
    let mut session = StyleSession::new(StyleOptions::default(), PageContext::default());
    let mut head = Head::default();
    session.refresh().apply(&mut head);

    let opts = StyleOptions {
        load_stylesheets: vec![StyleRow::new("r/foo", ScopeMode::Everywhere, "")],
        ..Default::default()
    };
    let diff = session.set_options(opts);
    assert_eq!(diff.removed, vec![Effect::Stylesheet(UPDATES_STYLESHEET.into())]);
    assert_eq!(diff.added, vec![Effect::Stylesheet("/r/foo/stylesheet.css".into())]);
    diff.apply(&mut head);
    assert_eq!(head.adds, 2);
}
