//! Tracker client core
//!
//! Wires transport, credential store, session and notices together and hands
//! out per-screen book collections and forms.

use crate::tracker::auth::SessionManager;
use crate::tracker::book::{BookCollection, BookListener, FormModeController};
use crate::tracker::error::ClientError;
use crate::tracker::notice::{NoticeBoard, DEFAULT_NOTICE_TTL};
use crate::tracker::store::{CredentialStore, SqliteCredentialStore};
use crate::tracker::transport::{HttpTransport, TransportClient};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `http://localhost:3000`
    pub api_base_url: String,
    /// SQLite URL of the credential store
    ///
    /// e.g. `sqlite://booktrack.db?mode=rwc`
    pub credential_db_url: String,
    /// Stamp today's date on read books submitted without a completion date
    pub auto_stamp_completion: bool,
    /// How long a failure notice stays visible
    pub notice_ttl: Duration,
}

impl ClientConfig {
    /// Creates a config with defaults for everything but the base URL.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            credential_db_url: "sqlite://booktrack.db?mode=rwc".to_string(),
            auto_stamp_completion: false,
            notice_ttl: DEFAULT_NOTICE_TTL,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

/// Reading-tracker client
pub struct TrackerClient {
    config: ClientConfig,
    session: Arc<SessionManager>,
    notices: Arc<NoticeBoard>,
}

impl TrackerClient {
    /// Opens the SQLite credential store, builds the HTTP transport and
    /// restores any stored session.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        info!("[Client] connecting to {}", config.api_base_url);
        let store = SqliteCredentialStore::connect(&config.credential_db_url)
            .await
            .with_context(|| format!("opening credential store {}", config.credential_db_url))?;
        let transport = HttpTransport::new(config.api_base_url.clone());

        let client = Self::with_parts(config, Arc::new(transport), Arc::new(store))
            .await
            .context("restoring stored session")?;
        Ok(client)
    }

    /// Builds the client on caller-supplied collaborators.
    pub async fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn TransportClient>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, ClientError> {
        let session = Arc::new(SessionManager::new(transport, store));
        if session.bootstrap().await? {
            info!("[Client] ✅ stored session restored");
        }
        let notices = Arc::new(NoticeBoard::new(config.notice_ttl));
        Ok(Self {
            config,
            session,
            notices,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn notices(&self) -> &Arc<NoticeBoard> {
        &self.notices
    }

    /// A fresh, empty collection for one screen. Call `load()` to fill it.
    pub fn collection(&self) -> Arc<BookCollection> {
        Arc::new(BookCollection::new(self.session.clone(), self.notices.clone()))
    }

    pub fn collection_with_listener(&self, listener: Arc<dyn BookListener>) -> Arc<BookCollection> {
        Arc::new(BookCollection::with_listener(
            self.session.clone(),
            self.notices.clone(),
            listener,
        ))
    }

    /// A form bound to `collection`, using the configured auto-stamp flag.
    pub fn form(&self, collection: Arc<BookCollection>) -> FormModeController {
        FormModeController::new(collection, self.config.auto_stamp_completion)
    }
}
