pub mod applier;
pub mod command;
pub mod dialog;
pub mod marker;
pub mod memory;
pub mod session;
pub mod suppress;
pub mod table;
pub mod tree;
pub mod votes;

pub use applier::{resolve_author, AnnotationApplier, IdentityError, Mode};
pub use dialog::{
    DialogError, DialogForm, DialogKey, DialogState, DialogSurface, HeadlessSurface, Placement,
    Side, TagDialog,
};
pub use marker::{ChipStyle, Markers, VoteColor};
pub use memory::MemoryDocument;
pub use session::{ClickOutcome, Session};
pub use suppress::{Severity, Suppression, Suppressor};
pub use table::{sorted_keys, DeleteConfirmation, SortKey, TableFilter, TableRow, TagTable};
pub use tree::{ContentTree, Entry, MouseButton, NodeId, Offset};
pub use votes::{vote_delta, Arrow, Sibling, VoteWeightTracker};
