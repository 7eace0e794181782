//! Book collection callback interface

use async_trait::async_trait;

/// Callbacks fired by [`super::BookCollection`].
#[async_trait]
pub trait BookListener: Send + Sync {
    /// The mirror changed; argument is the whole mirror as a JSON array.
    async fn on_book_list_changed(&self, books_json: String);

    /// `load()` started (`true`) or finished (`false`).
    async fn on_loading_changed(&self, loading: bool);

    /// An operation failed; argument is the user-facing message.
    async fn on_operation_failed(&self, message: String);
}

/// No-op listener.
pub struct EmptyBookListener;

#[async_trait]
impl BookListener for EmptyBookListener {
    async fn on_book_list_changed(&self, _books_json: String) {}
    async fn on_loading_changed(&self, _loading: bool) {}
    async fn on_operation_failed(&self, _message: String) {}
}
