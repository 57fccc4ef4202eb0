//! Storage backends
//!
//! Wikis persist through the `WikiStore` trait. `SqliteStore` is the
//! primary implementation; `to_blob`/`from_blob` give a single-file
//! snapshot of the same data.

mod snapshot;
mod sqlite;
mod traits;

pub use snapshot::{from_blob, to_blob, SNAPSHOT_FORMAT};
pub use sqlite::SqliteStore;
pub use traits::{OpenStore, StorageError, StorageResult, StoredWiki, WikiStore};
