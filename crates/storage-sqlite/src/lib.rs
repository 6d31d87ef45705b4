//! SQLite implementation of the quiz platform's `LocalStore`.
//!
//! Reads go through an r2d2 pool; writes are serialized through a single
//! writer thread (see [`db::WriteHandle`]).

pub mod db;
pub mod errors;
pub mod local_store;
pub mod schema;

pub use errors::StorageError;
pub use local_store::SqliteLocalStore;
