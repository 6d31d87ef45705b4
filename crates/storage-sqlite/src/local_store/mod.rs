//! SQLite persistence for cached reference data, progress and the outbox.

mod model;
mod repository;

pub use model::{LocalCollectionDB, LocalRecordDB};
pub use repository::SqliteLocalStore;
