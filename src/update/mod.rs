//! Update layer
//! - view.rs: Per-document view model, annotations and summaries
//! - mutator.rs: Writes accepted updates back into manifest text

pub mod mutator;
pub mod view;

pub use mutator::{MutationError, Replacement, UpdateFilter};
pub use view::{Annotation, DocumentView, RefreshSummary, UpdateAction};
