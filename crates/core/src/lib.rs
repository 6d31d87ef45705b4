//! Offline persistence and synchronization core for the quiz platform.
//!
//! The crate is split the way the runtime uses it:
//! - [`store`]: the `LocalStore` contract and an in-memory implementation
//! - [`sync`]: the durable outbox, connectivity monitor and drain coordinator
//! - [`offline`]: the `CacheService` façade consumed by the UI layer

pub mod errors;
pub mod offline;
pub mod store;
pub mod sync;

pub use errors::{Error, Result, StorageError};
pub use offline::{CacheService, StoreSnapshot};
pub use store::{Collection, InMemoryLocalStore, LocalStore, Record, ALL_COLLECTIONS};
pub use sync::{
    ConnectivityMonitor, ConnectivityState, MutationKind, PendingMutation, SyncConfig,
    SyncCoordinator, SyncOutbox,
};
