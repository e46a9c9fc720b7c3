use serde_json::json;
use std::sync::Arc;
use usertag_core::{AuthorKey, MemoryBackend, PageContext, PageKind, TaggerOptions, TAGS_STORAGE_KEY};
use usertag_engine::marker::{self, CHIP_CLASS, VOTE_WEIGHT_CLASS};
use usertag_engine::suppress::SHOW_ANYWAY_CLASS;
use usertag_engine::{
    command, ClickOutcome, ContentTree, DialogKey, HeadlessSurface, MemoryDocument, Mode,
    MouseButton, NodeId, Session, SortKey,
};

struct Comment {
    author: NodeId,
    up: NodeId,
    down: NodeId,
    body: NodeId,
}

fn comment(doc: &mut MemoryDocument, parent: NodeId, name: &str, text: &str) -> Comment {
    let thing = doc.element(parent, "div", "thing comment");
    let midcol = doc.element(thing, "div", "midcol");
    let up = doc.element(midcol, "div", "arrow up");
    let down = doc.element(midcol, "div", "arrow down");
    let tagline = doc.element(thing, "p", "tagline");
    doc.link(tagline, "expand", "", "[-]");
    let author = doc.link(tagline, "author", &format!("/user/{}", name), name);
    let body = doc.element(thing, "div", "usertext");
    let md = doc.element(body, "div", "md");
    doc.text_node(md, text);
    Comment {
        author,
        up,
        down,
        body,
    }
}

fn signed_in() -> PageContext {
    PageContext {
        kind: PageKind::Comments,
        logged_in_user: Some("Me".into()),
        ..Default::default()
    }
}

async fn session(tags: serde_json::Value, page: PageContext) -> (Session, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::with_value(TAGS_STORAGE_KEY, tags));
    let session = Session::start(
        backend.clone(),
        TaggerOptions::default(),
        page,
        Mode::Editable,
        Box::new(HeadlessSurface),
    )
    .await;
    (session, backend)
}

#[tokio::test]
async fn streamed_content_is_decorated_once() {
    let (mut session, _) = session(json!({"bob": {"tag": "friend"}}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    comment(&mut doc, root, "bob", "first");
    assert_eq!(session.go(&mut doc), 1);

    let more = doc.element(root, "div", "sitetable");
    comment(&mut doc, more, "bob", "second");
    comment(&mut doc, more, "amy", "third");
    assert_eq!(session.on_new_content(&mut doc, more), 2);
    assert_eq!(session.go(&mut doc), 0);

    assert_eq!(doc.nodes_with_class(None, CHIP_CLASS).len(), 3);
    assert_eq!(doc.nodes_with_class(None, VOTE_WEIGHT_CLASS).len(), 3);
}

#[tokio::test]
async fn vote_transition_updates_store_and_every_indicator() {
    let (mut session, backend) = session(json!({"bob": {"votes": 3}}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let first = comment(&mut doc, root, "bob", "one");
    comment(&mut doc, root, "Bob", "two");
    session.go(&mut doc);

    doc.set_class_name(first.up, "arrow upmod");
    let out = session.handle_click(&mut doc, first.down, MouseButton::Primary);
    assert_eq!(out, ClickOutcome::Voted(1));
    assert_eq!(session.store().get(&AuthorKey::new("bob")).unwrap().votes, 1);
    assert_eq!(
        backend.value(TAGS_STORAGE_KEY),
        Some(json!({"bob": {"votes": 1}}))
    );

    let indicators = doc.nodes_with_class(None, VOTE_WEIGHT_CLASS);
    assert_eq!(indicators.len(), 2);
    for vw in indicators {
        assert_eq!(doc.text(vw), "[+1]");
        assert_eq!(doc.style(vw, "background-color").as_deref(), Some("rgb(247, 255, 247)"));
    }
}

#[tokio::test]
async fn votes_that_do_not_count() {
    let (mut session, _) = session(json!({}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let mine = comment(&mut doc, root, "me", "my own");
    let other = comment(&mut doc, root, "bob", "theirs");
    session.go(&mut doc);

    assert_eq!(
        session.handle_click(&mut doc, mine.up, MouseButton::Primary),
        ClickOutcome::Unhandled
    );
    assert_eq!(
        session.handle_click(&mut doc, other.up, MouseButton::Middle),
        ClickOutcome::Unhandled
    );
    doc.set_class_name(other.up, "arrow up archived");
    assert_eq!(
        session.handle_click(&mut doc, other.up, MouseButton::Primary),
        ClickOutcome::Unhandled
    );
    assert!(session.store().is_empty());
}

#[tokio::test]
async fn vote_on_undecorated_entry_creates_marker_once() {
    let (mut session, _) = session(json!({}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let c = comment(&mut doc, root, "bob", "late arrival");

    assert_eq!(
        session.handle_click(&mut doc, c.up, MouseButton::Primary),
        ClickOutcome::Voted(1)
    );
    assert!(session.applier().is_decorated(c.author));
    let vw = marker::markers_after(&doc, c.author).vote_weight.unwrap();
    assert_eq!(doc.text(vw), "[+1]");

    session.go(&mut doc);
    assert_eq!(doc.nodes_with_class(None, VOTE_WEIGHT_CLASS).len(), 1);
}

#[tokio::test]
async fn tagging_through_the_dialog() {
    let (mut session, backend) = session(json!({"bob": {"votes": 2}}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let c = comment(&mut doc, root, "bob", "hi");
    session.go(&mut doc);
    let markers = marker::markers_after(&doc, c.author);
    let chip = markers.chip.unwrap();

    // The vote-weight indicator opens the same dialog as the chip.
    let out = session.handle_click(&mut doc, markers.vote_weight.unwrap(), MouseButton::Primary);
    assert_eq!(out, ClickOutcome::DialogOpened(AuthorKey::new("bob")));
    assert_eq!(session.dialog().form().unwrap().votes, "2");
    assert!(session.handle_key(DialogKey::Escape));

    session.handle_click(&mut doc, chip, MouseButton::Primary);
    let dialog = session.dialog_mut();
    dialog.set_label("pal");
    dialog.set_color("green");
    dialog.set_votes("7");
    let saved = session.save_dialog(&mut doc).unwrap().unwrap();
    assert_eq!(saved.tag.as_deref(), Some("pal"));

    assert_eq!(doc.text(chip), "pal");
    assert_eq!(doc.text(markers.vote_weight.unwrap()), "[+7]");
    assert_eq!(
        backend.value(TAGS_STORAGE_KEY),
        Some(json!({"bob": {"tag": "pal", "color": "green", "votes": 7}}))
    );
}

#[tokio::test]
async fn show_anyway_restores_exact_markup() {
    let (mut session, _) = session(
        json!({"troll": {"tag": "ignored", "ignore": true}}),
        signed_in(),
    )
    .await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let c = comment(&mut doc, root, "troll", "bait <b>here</b> & there");
    let before = doc.outer_html(c.body);
    session.go(&mut doc);
    assert_ne!(doc.outer_html(c.body), before);

    let link = doc.nodes_with_class(Some(c.body), SHOW_ANYWAY_CLASS)[0];
    assert_eq!(
        session.handle_click(&mut doc, link, MouseButton::Primary),
        ClickOutcome::Restored(c.body)
    );
    assert_eq!(doc.outer_html(c.body), before);
}

#[tokio::test]
async fn removed_content_releases_suppression_state() {
    let (mut session, _) = session(json!({"troll": {"ignore": true, "tag": "ignored"}}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let listing = doc.element(root, "div", "sitetable");
    let c = comment(&mut doc, listing, "troll", "bait");
    session.go(&mut doc);
    assert!(session.suppressor().is_suppressed(c.body));

    assert_eq!(session.on_content_removed(&doc, listing), 1);
    assert!(!session.suppressor().is_suppressed(c.body));
}

#[tokio::test]
async fn read_only_session_ignores_chip_clicks() {
    let backend = Arc::new(MemoryBackend::with_value(
        TAGS_STORAGE_KEY,
        json!({"bob": {"tag": "x"}}),
    ));
    let mut session = Session::start(
        backend,
        TaggerOptions::default(),
        signed_in(),
        Mode::ReadOnly,
        Box::new(HeadlessSurface),
    )
    .await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let c = comment(&mut doc, root, "bob", "hi");
    session.go(&mut doc);
    let chip = marker::markers_after(&doc, c.author).chip.unwrap();
    assert_eq!(
        session.handle_click(&mut doc, chip, MouseButton::Primary),
        ClickOutcome::Unhandled
    );
    assert!(!session.dialog().is_open());
}

#[tokio::test]
async fn dashboard_shows_the_table() {
    let page = PageContext {
        kind: PageKind::Dashboard,
        ..Default::default()
    };
    let (mut session, _) = session(
        json!({"bob": {"tag": "b", "votes": 4}, "amy": {"tag": "a", "votes": -1}, "cal": {"votes": 2}}),
        page,
    )
    .await;
    let mut doc = MemoryDocument::new();
    session.go(&mut doc);
    let rows: Vec<&str> = session
        .table()
        .unwrap()
        .rows()
        .iter()
        .map(|r| r.username.as_str())
        .collect();
    assert_eq!(rows, ["amy", "bob"]);

    let (table, store) = session.table_mut().unwrap();
    table.click_header(SortKey::Votes, store);
    table.click_header(SortKey::Votes, store);
    assert_eq!(table.rows()[0].username, "bob");
    let confirm = table.request_delete("bob");
    table.confirm_delete(confirm, store);
    assert_eq!(table.rows().len(), 1);
    assert!(!session.store().contains(&AuthorKey::new("bob")));
}

#[tokio::test(start_paused = true)]
async fn console_command_opens_and_fills_dialog() {
    let (mut session, _) = session(json!({}), signed_in()).await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    assert_eq!(command::preview(&doc, None, ""), command::NO_SELECTION);

    let thing = doc.element(root, "div", "thing");
    let tagline = doc.element(thing, "p", "tagline");
    doc.link(tagline, "author", "/user/Bob", "Bob");
    session.go(&mut doc);

    assert_eq!(command::preview(&doc, Some(thing), ""), "tag user bob");
    assert_eq!(
        command::preview(&doc, Some(thing), "nice"),
        "tag user bob as: nice"
    );

    let author = command::execute(&mut session, &mut doc, Some(thing), "buddy")
        .await
        .unwrap();
    assert_eq!(author, AuthorKey::new("bob"));
    assert_eq!(session.dialog().form().unwrap().tag, "buddy");
}

#[tokio::test]
async fn console_command_stays_inside_the_selected_entry() {
    let backend = Arc::new(MemoryBackend::with_value(
        TAGS_STORAGE_KEY,
        json!({"bob": {"tag": "pal"}}),
    ));
    let options = TaggerOptions {
        show_tagging_icon: false,
        ..Default::default()
    };
    let mut session = Session::start(
        backend,
        options,
        signed_in(),
        Mode::Editable,
        Box::new(HeadlessSurface),
    )
    .await;
    let mut doc = MemoryDocument::new();
    let root = doc.root();
    let bare = doc.element(root, "div", "thing");
    let tagline = doc.element(bare, "p", "tagline");
    doc.link(tagline, "author", "/user/amy", "amy");
    let tagged = doc.element(root, "div", "thing");
    let tagline = doc.element(tagged, "p", "tagline");
    doc.link(tagline, "author", "/user/bob", "bob");
    session.go(&mut doc);

    assert_eq!(command::preview(&doc, Some(bare), "x"), command::NO_SELECTION);
    assert_eq!(
        command::execute(&mut session, &mut doc, Some(bare), "x").await,
        Err(command::NO_SELECTION.to_string())
    );
    assert!(!session.dialog().is_open());
    assert_eq!(command::preview(&doc, None, ""), "tag user bob");
}
