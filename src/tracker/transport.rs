//! Request/response transport to the tracker backend
//!
//! The session and book controllers only see the [`TransportClient`] trait.
//! [`HttpTransport`] is the reqwest-backed implementation used by the CLI.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Successful response: HTTP status plus the decoded JSON body
/// (`Value::Null` when the body is empty).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub data: Value,
}

/// Rejection raised by a transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {data}")]
    Status { status: u16, data: Value },
    /// No response was obtained.
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Backend transport with a mutable default-header map.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Sends one request. Single-shot: no retry, no extra timeout.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportResponse, TransportError>;

    /// Sets a header sent with every subsequent request.
    fn set_default_header(&self, name: &str, value: &str);

    /// Removes a default header; removing an absent header is a no-op.
    fn remove_default_header(&self, name: &str);

    fn default_header(&self, name: &str) -> Option<String>;

    async fn get(&self, path: &str) -> Result<TransportResponse, TransportError> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<TransportResponse, TransportError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<TransportResponse, TransportError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<TransportResponse, TransportError> {
        self.request(Method::DELETE, path, None).await
    }
}

/// reqwest-backed transport.
///
/// Headers live outside the reqwest client because `ClientBuilder`
/// default headers cannot change after `build()`; they are applied per request.
pub struct HttpTransport {
    client: reqwest::Client,
    api_base_url: String,
    headers: RwLock<HashMap<String, String>>,
}

impl HttpTransport {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_base_url)
    }

    pub fn with_client(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_base_url,
            headers: RwLock::new(HashMap::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    fn header_snapshot(&self) -> Vec<(String, String)> {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportResponse, TransportError> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url(path);

        info!("[Transport] 📡 {} {}", method, path);
        debug!("[Transport]   URL: {}, operationID: {}", url, operation_id);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header("Accept", "application/json")
            .header("operationID", &operation_id);
        for (name, value) in self.header_snapshot() {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            error!("[Transport] {} {} failed to send: {}", method, path, e);
            TransportError::Connection(e.to_string())
        })?;

        let status = response.status();
        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(format!("reading body: {e}")))?;
        let data = if body_bytes.is_empty() {
            Value::Null
        } else {
            // Non-JSON bodies (plain-text errors, "ok") are kept as a string.
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
            })
        };
        debug!("[Transport] {} {} -> {}", method, path, status);

        if !status.is_success() {
            error!(
                "[Transport] {} {} rejected, HTTP status: {}, body: {}",
                method, path, status, data
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                data,
            });
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            data,
        })
    }

    fn set_default_header(&self, name: &str, value: &str) {
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
    }

    fn remove_default_header(&self, name: &str) {
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn default_header(&self, name: &str) -> Option<String> {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}
