//! Outbox, connectivity and drain coordination.

mod connectivity;
mod coordinator;
mod model;
mod outbox;
mod retry;
mod scheduler;
mod transport;

pub use connectivity::*;
pub use coordinator::*;
pub use model::*;
pub use outbox::*;
pub use retry::*;
pub use scheduler::*;
pub use transport::*;
