//! SQLite-backed local record store.
//!
//! One database file holds every persistent collection of the runtime:
//!
//! - versioned response buckets (see [`crate::cache::Bucket`])
//! - URL-keyed resource records (see [`crate::cache::RecordStore`])
//! - the note store
//!
//! Access is async through tokio-rusqlite; schema changes go through
//! numbered migrations.

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod notes;
pub mod ready;

pub use connection::LocalDb;
pub use notes::Note;
pub use ready::{ReadyHandle, RetryPolicy, retry};
