//! In-memory document model.
//!
//! The runtime mutates a single UI tree in place. [`Document`] is an arena of
//! nodes with `innerHTML`-style markup replacement, class and attribute helpers
//! and CSS selector matching for component declarations and event delegation.

mod document;
pub mod markup;
mod selector;

pub use document::{Ancestors, Document, NodeData, NodeId};
pub use selector::Selector;
