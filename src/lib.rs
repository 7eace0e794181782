pub mod tracker;

// Re-exports of the commonly used types
pub use tracker::{
    auth::SessionManager,
    book::{BookCollection, BookDraft, BookResource, BookStatus, FormMode, FormModeController},
    client::{ClientConfig, TrackerClient},
    error::{ClientError, ValidationError},
    notice::NoticeBoard,
};
