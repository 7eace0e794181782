//! Create/edit form state
//!
//! [`FormModeController`] decides whether a submitted draft becomes a create
//! or an update, and shapes it into a [`BookPayload`] before dispatch.

use crate::tracker::book::models::{BookDraft, BookResource, ShapingOptions};
use crate::tracker::book::service::BookCollection;
use crate::tracker::error::{ClientError, ValidationError};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormMode {
    #[default]
    Idle,
    Creating,
    Editing(BookResource),
}

pub struct FormModeController {
    collection: Arc<BookCollection>,
    auto_stamp_completion: bool,
    mode: FormMode,
    draft: BookDraft,
}

impl FormModeController {
    pub fn new(collection: Arc<BookCollection>, auto_stamp_completion: bool) -> Self {
        Self {
            collection,
            auto_stamp_completion,
            mode: FormMode::Idle,
            draft: BookDraft::default(),
        }
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn draft(&self) -> &BookDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut BookDraft {
        &mut self.draft
    }

    /// Opens an empty form.
    pub fn begin_create(&mut self) {
        debug!("[Form] begin create");
        self.mode = FormMode::Creating;
        self.draft = BookDraft::default();
    }

    /// Opens the form on `book`. No network call.
    pub fn begin_edit(&mut self, book: BookResource) {
        debug!("[Form] begin edit of book {}", book.id);
        self.draft = BookDraft::from(&book);
        self.mode = FormMode::Editing(book);
    }

    /// Closes the form and discards the draft.
    pub fn cancel(&mut self) {
        self.mode = FormMode::Idle;
        self.draft = BookDraft::default();
    }

    /// Submits the form's own draft.
    pub async fn submit_current(&mut self) -> Result<BookResource, ClientError> {
        let draft = self.draft.clone();
        self.submit(draft).await
    }

    /// Shapes `draft` and routes it to create or update.
    ///
    /// The form returns to `Idle` only when the server accepts the book; on
    /// any failure mode and draft are kept so the user can retry.
    pub async fn submit(&mut self, draft: BookDraft) -> Result<BookResource, ClientError> {
        self.draft = draft;

        if self.mode == FormMode::Idle {
            return Err(self.reject(ValidationError::NoActiveForm.into()).await);
        }
        let owner = match self.collection.session().require_user("submit book") {
            Ok(owner) => owner,
            Err(e) => return Err(self.reject(e).await),
        };

        let options = ShapingOptions::new(self.auto_stamp_completion);
        let payload = match self.draft.shape(owner.id, &options) {
            Ok(payload) => payload,
            Err(e) => return Err(self.reject(e.into()).await),
        };

        let saved = match &self.mode {
            FormMode::Editing(target) => {
                let id = target.id.clone();
                self.collection.update(&id, &payload).await?
            }
            _ => self.collection.create(&payload).await?,
        };

        info!("[Form] ✅ book {} saved, closing form", saved.id);
        self.cancel();
        Ok(saved)
    }

    async fn reject(&self, err: ClientError) -> ClientError {
        debug!("[Form] submit refused: {}", err);
        self.collection.fail(err).await
    }
}
