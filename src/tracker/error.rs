//! Error taxonomy for the reading-tracker client.
//!
//! Every controller operation returns `Result<_, ClientError>`; nothing is
//! allowed to escape as a panic. Transport rejections are folded into the
//! taxonomy by [`ClientError::from_transport`].

use crate::tracker::transport::TransportError;
use thiserror::Error;

/// Fallback text when the server rejects a request without a message.
const DEFAULT_SERVER_MESSAGE: &str = "the server rejected the request";

/// Client-side violations of the payload-shaping rule, caught before any
/// network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("a book marked as read needs a rating between 1 and 5")]
    MissingRating,
    #[error("rating {0} is outside the 1..=5 range")]
    RatingOutOfRange(u8),
    #[error("a book marked as read needs a completion date")]
    MissingCompletionDate,
    #[error("no form is open; call begin_create or begin_edit first")]
    NoActiveForm,
}

/// Unified client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Sign-in was refused by the server.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An operation that needs a session was attempted without one.
    #[error("not signed in")]
    NotAuthenticated,

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response carrying the server's message.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `load()` failed; wraps the network or server failure.
    #[error("could not load books: {0}")]
    Fetch(#[source] Box<ClientError>),

    /// The id has no entry in the local mirror.
    #[error("book {0} is not in the local collection")]
    NotFound(String),

    /// Another operation on the same book is still pending.
    #[error("an operation on book {0} is already in flight")]
    Busy(String),

    /// The owning screen detached before the operation completed.
    #[error("operation cancelled: the collection was detached")]
    Cancelled,

    /// A success response whose body did not match the expected shape.
    #[error("could not decode {operation} response: {reason}")]
    Decode { operation: String, reason: String },

    /// The credential store failed to read or write.
    #[error("credential storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Maps a transport rejection into the taxonomy.
    pub fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Connection(reason) => Self::Network(reason),
            TransportError::Status { status, data } => Self::Server {
                status,
                message: server_message(&data)
                    .unwrap_or_else(|| DEFAULT_SERVER_MESSAGE.to_string()),
            },
        }
    }

    pub(crate) fn decode(operation: &str, reason: impl ToString) -> Self {
        Self::Decode {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Text suitable for a transient user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { message, .. } => message.clone(),
            Self::Authentication(message) => message.clone(),
            Self::Fetch(inner) => inner.user_message(),
            other => other.to_string(),
        }
    }
}

/// Extracts `error` or `message` from a rejection body.
pub(crate) fn server_message(data: &serde_json::Value) -> Option<String> {
    ["error", "message"].iter().find_map(|key| {
        data.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}
