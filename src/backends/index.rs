//! # IndexBackend - forwards events to a search/indexing store
//!
//! Speaks the Elasticsearch document API over HTTP: each event becomes one
//! document `{"type": "success"|"failure", "payload": {...}}` posted to
//! `{endpoint}/{index_name}/_doc`.
//!
//! ## Construction
//! [`IndexBackend::connect`] validates the configuration and, when
//! `verify_connection` is set, probes `GET {endpoint}/_cluster/health` on each
//! endpoint. If none answers with a success status, construction fails with
//! [`AdapterError::BackendUnavailable`] and no backend exists to register.
//!
//! ## Submission
//! ```text
//! handle_*(event) ─► serialize once ─► POST endpoint[0] ─► 2xx ─► Ok
//!                                         │ transport error / 5xx / 429
//!                                         ├─► sleep(retry.delay(n)) ─► POST endpoint[1] ...
//!                                         │ other 4xx
//!                                         └─► Err(Rejected) (not retried)
//! ```
//! After `retry.attempts` attempts the last error is returned to the
//! dispatcher, which records it without affecting other backends.
//!
//! The backend asks the dispatcher for a handler timeout covering its whole
//! retry budget, so the final attempt's error is reported rather than a
//! dispatcher timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backends::retry::{RetryPolicy, millis};
use crate::backends::{Backend, Identity};
use crate::error::{AdapterError, BackendError};
use crate::events::{Event, EventKind};

/// Longest response body kept in a [`BackendError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

/// Headroom over the retry budget for serialization and scheduling.
const HANDLER_SLACK: Duration = Duration::from_secs(1);

/// Configuration of an [`IndexBackend`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URLs of the store's nodes, tried in order.
    pub endpoints: Vec<String>,
    /// Index (collection) receiving the documents.
    pub index_name: String,
    /// Probe the endpoints at construction time.
    pub verify_connection: bool,
    /// Per-request timeout (probe and submission).
    #[serde(rename = "request_timeout_ms", deserialize_with = "millis")]
    pub request_timeout: Duration,
    /// Internal retry of one submission.
    pub retry: RetryPolicy,
}

impl Default for IndexConfig {
    /// `http://localhost:9200`, index `locust`, probe on, 10s timeout, default retry.
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:9200".to_string()],
            index_name: "locust".to_string(),
            verify_connection: true,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Indexed document shape.
#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "type")]
    kind: EventKind,
    payload: &'a Event,
}

/// Backend forwarding every event to an indexing store.
pub struct IndexBackend {
    client: reqwest::Client,
    endpoints: Vec<String>,
    index_name: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl IndexBackend {
    /// Builds the backend, probing connectivity when the config asks for it.
    pub async fn connect(config: IndexConfig) -> Result<Self, AdapterError> {
        let endpoints: Vec<String> = config
            .endpoints
            .iter()
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if endpoints.is_empty() {
            return Err(AdapterError::InvalidConfig {
                reason: "no endpoints configured".to_string(),
            });
        }
        if config.index_name.trim().is_empty() {
            return Err(AdapterError::InvalidConfig {
                reason: "index name is empty".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AdapterError::Client {
                reason: e.to_string(),
            })?;

        let me = Self {
            client,
            endpoints,
            index_name: config.index_name,
            request_timeout: config.request_timeout,
            retry: config.retry,
        };
        if config.verify_connection {
            me.probe().await?;
        }
        Ok(me)
    }

    /// Index receiving the documents.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn probe(&self) -> Result<(), AdapterError> {
        let mut last = String::new();
        for endpoint in &self.endpoints {
            match self
                .client
                .get(format!("{endpoint}/_cluster/health"))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(%endpoint, index = %self.index_name, "index store reachable");
                    return Ok(());
                }
                Ok(resp) => last = format!("{endpoint}: status {}", resp.status()),
                Err(e) => last = format!("{endpoint}: {e}"),
            }
            tracing::debug!(%endpoint, reason = %last, "index store probe failed");
        }
        Err(AdapterError::BackendUnavailable {
            endpoints: self.endpoints.clone(),
            reason: last,
        })
    }

    async fn submit(&self, ev: &Event) -> Result<(), BackendError> {
        let body = serde_json::to_vec(&Document {
            kind: ev.kind(),
            payload: ev,
        })?;

        let attempts = self.retry.max_attempts();
        let mut attempt = 0;
        loop {
            let endpoint = &self.endpoints[attempt as usize % self.endpoints.len()];
            let err = match self.post(endpoint, &body).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= attempts || !is_retryable(&err) {
                return Err(err);
            }
            tracing::debug!(%endpoint, attempt, error = %err, "index submission failed, retrying");
            tokio::time::sleep(self.retry.delay(attempt - 1)).await;
        }
    }

    async fn post(&self, endpoint: &str, body: &[u8]) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(format!("{endpoint}/{}/_doc", self.index_name))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let mut text = resp.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Err(BackendError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

/// Transport failures, throttling and server errors may succeed on retry.
fn is_retryable(err: &BackendError) -> bool {
    match err {
        BackendError::Transport { .. } => true,
        BackendError::Rejected { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl Backend for IndexBackend {
    /// `index:{index_name}`, so one backend per target index.
    fn identity(&self) -> Identity {
        Identity::from(format!("index:{}", self.index_name))
    }

    fn handler_timeout(&self) -> Option<Duration> {
        Some(
            self.retry
                .budget(self.request_timeout)
                .saturating_add(HANDLER_SLACK),
        )
    }

    async fn handle_success(&self, ev: &Event) -> Result<(), BackendError> {
        self.submit(ev).await
    }

    async fn handle_failure(&self, ev: &Event) -> Result<(), BackendError> {
        self.submit(ev).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nothing listens on the discard port in test environments.
    const DEAD_ENDPOINT: &str = "http://127.0.0.1:9";

    fn dead_config(verify: bool) -> IndexConfig {
        IndexConfig {
            endpoints: vec![DEAD_ENDPOINT.to_string()],
            verify_connection: verify,
            request_timeout: Duration::from_secs(2),
            retry: RetryPolicy::never(),
            ..IndexConfig::default()
        }
    }

    #[tokio::test]
    async fn rejects_empty_configuration() {
        let cfg = IndexConfig {
            endpoints: vec!["  ".to_string()],
            ..IndexConfig::default()
        };
        let err = IndexBackend::connect(cfg).await.err().unwrap();
        assert_eq!(err.as_label(), "adapter_invalid_config");

        let cfg = IndexConfig {
            index_name: String::new(),
            ..IndexConfig::default()
        };
        assert!(matches!(
            IndexBackend::connect(cfg).await,
            Err(AdapterError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn failed_probe_prevents_construction() {
        let err = IndexBackend::connect(dead_config(true)).await.err().unwrap();
        match err {
            AdapterError::BackendUnavailable { endpoints, .. } => {
                assert_eq!(endpoints, vec![DEAD_ENDPOINT.to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unverified_backend_reports_submission_failures() {
        let backend = IndexBackend::connect(dead_config(false)).await.unwrap();
        assert_eq!(backend.identity().as_str(), "index:locust");

        let err = backend
            .handle_success(&Event::success("GET", "/", 1.0, 1))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "backend_transport");
    }

    #[tokio::test]
    async fn handler_timeout_outlasts_the_default_retry_budget() {
        let cfg = IndexConfig {
            verify_connection: false,
            ..IndexConfig::default()
        };
        let backend = IndexBackend::connect(cfg).await.unwrap();

        // 3 x 10s requests + 200ms + 400ms of backoff
        let timeout = backend.handler_timeout().unwrap();
        assert_eq!(timeout, Duration::from_millis(30_600) + HANDLER_SLACK);
        assert!(timeout > crate::core::ForwarderConfig::default().handler_timeout);
    }

    #[test]
    fn only_transient_errors_are_retried() {
        assert!(is_retryable(&BackendError::Transport {
            reason: "refused".into()
        }));
        assert!(is_retryable(&BackendError::Rejected {
            status: 503,
            body: String::new()
        }));
        assert!(is_retryable(&BackendError::Rejected {
            status: 429,
            body: String::new()
        }));
        assert!(!is_retryable(&BackendError::Rejected {
            status: 400,
            body: String::new()
        }));
        assert!(!is_retryable(&BackendError::other("x")));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: IndexConfig = serde_json::from_str(
            r#"{ "endpoints": ["http://es:9200/"], "verify_connection": false, "request_timeout_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(cfg.endpoints, vec!["http://es:9200/".to_string()]);
        assert_eq!(cfg.index_name, "locust");
        assert!(!cfg.verify_connection);
        assert_eq!(cfg.request_timeout, Duration::from_millis(250));
    }
}
