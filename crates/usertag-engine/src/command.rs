//! The `tag [text]` console command.

use std::time::Duration;

use usertag_core::AuthorKey;

use crate::marker::CHIP_CLASS;
use crate::session::{ClickOutcome, Session};
use crate::tree::{ContentTree, MouseButton, NodeId};

pub const TAG_COMMAND: &str = "tag";
pub const TAG_COMMAND_HELP: &str =
    "tag [text] - tags author of currently selected link/comment as text";
pub const NO_SELECTION: &str = "can't set tag - no post/comment selected";

/// How long the dialog gets to open before the label is filled in.
pub const FILL_DELAY: Duration = Duration::from_millis(20);

/// The editable chip in the selected entry, or the first one on the page when nothing is selected.
pub fn find_tag_link(tree: &dyn ContentTree, selected: Option<NodeId>) -> Option<NodeId> {
    tree.nodes_with_class(selected, CHIP_CLASS)
        .into_iter()
        .find(|n| tree.attr(*n, "username").is_some())
}

/// What running the command would do right now.
pub fn preview(tree: &dyn ContentTree, selected: Option<NodeId>, text: &str) -> String {
    let username = find_tag_link(tree, selected).and_then(|chip| tree.attr(chip, "username"));
    match username {
        Some(name) if text.is_empty() => format!("tag user {}", name),
        Some(name) => format!("tag user {} as: {}", name, text),
        None => NO_SELECTION.to_string(),
    }
}

/// Open the tag dialog for the selected author and, given `text`, fill the label.
pub async fn execute(
    session: &mut Session,
    tree: &mut dyn ContentTree,
    selected: Option<NodeId>,
    text: &str,
) -> Result<AuthorKey, String> {
    let chip = find_tag_link(&*tree, selected).ok_or_else(|| NO_SELECTION.to_string())?;
    let ClickOutcome::DialogOpened(author) = session.handle_click(tree, chip, MouseButton::Primary)
    else {
        return Err(NO_SELECTION.to_string());
    };
    if !text.is_empty() {
        tokio::time::sleep(FILL_DELAY).await;
        session.dialog_mut().set_label(text);
    }
    Ok(author)
}
