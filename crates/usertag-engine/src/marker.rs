//! Rendering of tag chips and vote-weight indicators.

use usertag_core::{background_for, text_color_for, AuthorKey, TaggerOptions};

use crate::tree::{ContentTree, NodeId};

pub const WRAPPER_CLASS: &str = "RESUserTag";
pub const CHIP_CLASS: &str = "userTagLink";
pub const HAS_TAG_CLASS: &str = "hasTag";
pub const PLACEHOLDER_CLASS: &str = "RESUserTagImage";
pub const VOTE_WEIGHT_CLASS: &str = "voteWeight";
pub const CHIP_TITLE: &str = "set a tag";

/// Background and text color of a chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipStyle {
    pub background: String,
    pub text: Option<String>,
}

impl ChipStyle {
    pub fn for_color(color: &str) -> Self {
        Self {
            background: background_for(color).to_string(),
            text: text_color_for(color).map(str::to_string),
        }
    }
}

/// Paint `chip` with `tag`, or turn it into the empty placeholder.
pub fn paint_chip(tree: &mut dyn ContentTree, chip: NodeId, tag: Option<&str>, color: Option<&str>) {
    match tag.filter(|t| !t.is_empty()) {
        Some(tag) => {
            tree.set_class_name(chip, &format!("{} {}", CHIP_CLASS, HAS_TAG_CLASS));
            tree.set_text(chip, tag);
        }
        None => {
            tree.set_class_name(chip, &format!("{} {}", CHIP_CLASS, PLACEHOLDER_CLASS));
            tree.set_text(chip, "");
        }
    }
    match color.filter(|c| !c.is_empty()) {
        Some(color) => {
            let style = ChipStyle::for_color(color);
            tree.set_style(chip, "background-color", Some(&style.background));
            tree.set_style(chip, "color", style.text.as_deref());
        }
        None => {
            tree.set_style(chip, "background-color", None);
            tree.set_style(chip, "color", None);
        }
    }
}

/// Build a detached `span.RESUserTag > a.userTagLink`. Returns `(wrapper, chip)`.
pub fn create_chip(
    tree: &mut dyn ContentTree,
    author: &AuthorKey,
    tag: Option<&str>,
    color: Option<&str>,
    editable: bool,
) -> (NodeId, NodeId) {
    let wrapper = tree.create_element("span");
    tree.set_class_name(wrapper, WRAPPER_CLASS);
    let chip = tree.create_element("a");
    paint_chip(tree, chip, tag, color);
    if editable {
        tree.set_attr(chip, "username", author.as_str());
        tree.set_attr(chip, "title", CHIP_TITLE);
        tree.set_attr(chip, "href", "javascript:void 0");
    }
    tree.append_child(wrapper, chip);
    (wrapper, chip)
}

/// Indicator tint and label for a vote weight. `None` when there is nothing to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub label: String,
}

impl VoteColor {
    pub fn for_votes(votes: i64) -> Option<Self> {
        let dim = dimmed(votes);
        match votes {
            0 => None,
            v if v > 0 => Some(Self {
                red: dim,
                green: 255,
                blue: dim,
                label: format!("+{}", v),
            }),
            v => Some(Self {
                red: 255,
                green: dim,
                blue: dim,
                label: v.to_string(),
            }),
        }
    }

    pub fn rgb(&self) -> String {
        format!("rgb({}, {}, {})", self.red, self.green, self.blue)
    }
}

fn dimmed(votes: i64) -> u8 {
    let fade = votes.unsigned_abs().saturating_mul(8);
    u8::try_from(255u64.saturating_sub(fade)).unwrap_or(0)
}

/// Build a detached `a.voteWeight` indicator and paint it.
pub fn create_vote_weight(
    tree: &mut dyn ContentTree,
    author: &AuthorKey,
    votes: i64,
    options: &TaggerOptions,
    night_mode: bool,
) -> NodeId {
    let node = tree.create_element("a");
    tree.set_class_name(node, VOTE_WEIGHT_CLASS);
    tree.set_attr(node, "href", "#");
    tree.set_attr(node, "username", author.as_str());
    tree.set_text(node, "[vw]");
    paint_vote_weight(tree, node, author, votes, options, night_mode);
    node
}

pub fn paint_vote_weight(
    tree: &mut dyn ContentTree,
    node: NodeId,
    author: &AuthorKey,
    votes: i64,
    options: &TaggerOptions,
    night_mode: bool,
) {
    if !options.track_vote_weight {
        return;
    }
    let Some(color) = VoteColor::for_votes(votes) else {
        tree.set_style(node, "display", Some("none"));
        return;
    };
    tree.set_style(node, "display", Some("inline"));
    let property = if night_mode {
        "color"
    } else {
        "background-color"
    };
    tree.set_style(node, property, Some(&color.rgb()));
    if options.vw_number {
        tree.set_text(node, &format!("[{}]", color.label));
    }
    if options.vw_tooltip {
        tree.set_attr(
            node,
            "title",
            &format!("your votes for {}: {}", author, color.label),
        );
    }
}

/// Repaint every rendered indicator belonging to `author`.
pub fn recolor_vote_weights(
    tree: &mut dyn ContentTree,
    author: &AuthorKey,
    votes: i64,
    options: &TaggerOptions,
    night_mode: bool,
) -> usize {
    let nodes: Vec<NodeId> = tree
        .nodes_with_class(None, VOTE_WEIGHT_CLASS)
        .into_iter()
        .filter(|n| tree.attr(*n, "username").as_deref() == Some(author.as_str()))
        .collect();
    for node in &nodes {
        paint_vote_weight(tree, *node, author, votes, options, night_mode);
    }
    nodes.len()
}

/// Markers already rendered right after an occurrence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Markers {
    pub vote_weight: Option<NodeId>,
    pub chip: Option<NodeId>,
}

/// Scan the siblings after `occurrence` up to the next occurrence.
pub fn markers_after(tree: &dyn ContentTree, occurrence: NodeId) -> Markers {
    let mut found = Markers::default();
    for sibling in tree.next_siblings(occurrence) {
        if tree.has_class(sibling, "author") || tree.attr(sibling, "data-user").is_some() {
            break;
        }
        if found.vote_weight.is_none() && tree.has_class(sibling, VOTE_WEIGHT_CLASS) {
            found.vote_weight = Some(sibling);
        }
        if found.chip.is_none() && tree.has_class(sibling, WRAPPER_CLASS) {
            found.chip = tree
                .children(sibling)
                .into_iter()
                .find(|c| tree.has_class(*c, CHIP_CLASS));
        }
    }
    found
}
