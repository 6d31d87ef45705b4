//! Sync-engine ports backed by the HTTP client.

use async_trait::async_trait;
use log::debug;

use quizsync_core::sync::{
    ConnectivityProbe, PendingMutation, ReferenceDataSource, SyncTransport, TransportError,
};
use quizsync_core::Collection;

use crate::client::QuizApiClient;

#[async_trait]
impl SyncTransport for QuizApiClient {
    async fn deliver(&self, mutation: &PendingMutation) -> Result<(), TransportError> {
        self.deliver_mutation(mutation)
            .await
            .map_err(TransportError::from)
    }
}

#[async_trait]
impl ReferenceDataSource for QuizApiClient {
    async fn fetch_reference_data(
        &self,
        collection: Collection,
        token: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, TransportError> {
        self.fetch_reference_list(collection, token)
            .await
            .map_err(TransportError::from)
    }
}

/// Reachability check against `GET /health`.
#[derive(Debug, Clone)]
pub struct HttpConnectivityProbe {
    client: QuizApiClient,
}

impl HttpConnectivityProbe {
    pub fn new(client: QuizApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn probe(&self) -> bool {
        match self.client.health().await {
            Ok(()) => true,
            Err(err) => {
                debug!("[QuizSync] Health probe failed: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{respond, start_mock_server};
    use quizsync_core::sync::{MutationKind, SyncRetryClass};
    use serde_json::json;

    #[tokio::test]
    async fn transport_failures_carry_status_and_class() {
        let (base_url, _captured, server) =
            start_mock_server(vec![respond(500, r#"{"message":"boom"}"#)]).await;
        let client = QuizApiClient::new(&base_url).expect("client");
        let mutation = PendingMutation::new(3, MutationKind::QuizResult, json!({}), "t");

        let err = client.deliver(&mutation).await.expect_err("500");
        assert_eq!(err.status, Some(500));
        assert_eq!(err.retry_class, SyncRetryClass::Retryable);
        server.abort();
    }

    #[tokio::test]
    async fn unsupported_collection_is_permanent() {
        let client = QuizApiClient::new("http://127.0.0.1:9").expect("client");
        let err = client
            .fetch_reference_data(Collection::PendingSync, None)
            .await
            .expect_err("no endpoint");
        assert_eq!(err.retry_class, SyncRetryClass::Permanent);
    }

    #[tokio::test]
    async fn probe_reports_reachability() {
        let (base_url, captured, server) = start_mock_server(vec![respond(200, "ok")]).await;
        let probe = HttpConnectivityProbe::new(QuizApiClient::new(&base_url).expect("client"));
        assert!(probe.probe().await);
        assert_eq!(captured.lock().await[0].path, "/health");
        server.abort();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let closed = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);
        let probe = HttpConnectivityProbe::new(QuizApiClient::new(&closed).expect("client"));
        assert!(!probe.probe().await);
    }
}
