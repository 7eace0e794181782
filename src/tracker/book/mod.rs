//! Book collection module
//!
//! Mirror of the signed-in user's books plus the create/edit form above it.

pub mod api;
pub mod form;
pub mod listener;
pub mod models;
pub mod service;

pub use api::BookApi;
pub use form::{FormMode, FormModeController};
pub use listener::{BookListener, EmptyBookListener};
pub use models::{
    BookDraft, BookPayload, BookResource, BookStatus, ReadPayload, ShapingOptions, UnreadPayload,
};
pub use service::BookCollection;
