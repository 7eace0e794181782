//! Shared fakes for unit tests.

use crate::tracker::store::{CredentialStore, MemoryCredentialStore};
use crate::tracker::transport::{TransportClient, TransportError, TransportResponse};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,booktrack_client=debug,sqlx=info");

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// A request as the fake saw it, including the Authorization header at send time.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub authorization: Option<String>,
}

/// Scripted transport: replays queued responses in order and records requests.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    headers: Mutex<HashMap<String, String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, data: Value) {
        self.push(Ok(TransportResponse { status: 200, data }));
    }

    pub fn push_status(&self, status: u16, data: Value) {
        self.push(Err(TransportError::Status { status, data }));
    }

    pub fn push_connection_error(&self) {
        self.push(Err(TransportError::Connection("connection refused".into())));
    }

    fn push(&self, response: Result<TransportResponse, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Makes subsequent requests wait until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TransportClient for FakeTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportResponse, TransportError> {
        let recorded = RecordedRequest {
            method,
            path: path.to_string(),
            body,
            authorization: self.default_header("Authorization"),
        };
        self.requests.lock().unwrap().push(recorded);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connection("no scripted response".into())))
    }

    fn set_default_header(&self, name: &str, value: &str) {
        self.headers
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_default_header(&self, name: &str) {
        self.headers.lock().unwrap().remove(name);
    }

    fn default_header(&self, name: &str) -> Option<String> {
        self.headers.lock().unwrap().get(name).cloned()
    }
}

/// Memory-backed store whose writes and removals can be switched to fail.
#[derive(Default)]
pub struct FailingCredentialStore {
    inner: MemoryCredentialStore,
    fail_writes: AtomicBool,
}

impl FailingCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk is read-only");
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FailingCredentialStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.check()?;
        self.inner.remove(key).await
    }
}
