//! Client for the quiz platform REST API.
//!
//! Delivers queued mutations (quiz results, progress, badges), fetches
//! reference data and answers connectivity probes.

mod client;
mod error;
mod transport;
mod types;

pub use client::{QuizApiClient, IDEMPOTENCY_KEY_HEADER};
pub use error::{RemoteApiError, Result};
pub use transport::HttpConnectivityProbe;
pub use types::ApiErrorResponse;
