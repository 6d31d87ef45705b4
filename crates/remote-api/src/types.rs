use serde::{Deserialize, Serialize};

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: String,
    pub message: String,
}

/// Reference lists come back either bare or wrapped in `{"data": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ReferenceListResponse {
    Bare(Vec<serde_json::Value>),
    Wrapped { data: Vec<serde_json::Value> },
}

impl ReferenceListResponse {
    pub(crate) fn into_items(self) -> Vec<serde_json::Value> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}
