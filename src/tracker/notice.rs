//! Transient user-visible messages
//!
//! Failures are surfaced as one dismissible notice that clears itself once
//! its time-to-live has elapsed. Expiry is evaluated lazily on read, so no
//! timer task is needed.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Auto-clear interval used when none is configured.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub raised_at: Instant,
}

#[derive(Debug)]
pub struct NoticeBoard {
    ttl: Duration,
    current: Mutex<Option<Notice>>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL)
    }
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: Mutex::new(None),
        }
    }

    /// Shows `message`, replacing any notice still visible.
    pub fn post(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("[Notice] {}", message);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Notice {
            message,
            raised_at: Instant::now(),
        });
    }

    /// The visible notice, if any. Expired notices are dropped here.
    pub fn current(&self) -> Option<Notice> {
        let mut slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if slot
            .as_ref()
            .is_some_and(|n| n.raised_at.elapsed() >= self.ttl)
        {
            *slot = None;
        }
        slot.clone()
    }

    pub fn message(&self) -> Option<String> {
        self.current().map(|n| n.message)
    }

    pub fn dismiss(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
