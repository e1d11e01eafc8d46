//! Note tools: add, list and sync.

pub mod add;
pub mod list;
pub mod sync;

pub use add::{NotesAddParams, add_impl};
pub use list::{NotesListParams, list_impl};
pub use sync::sync_impl;
