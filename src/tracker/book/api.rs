//! Book HTTP API client
//!
//! Thin endpoint layer over [`TransportClient`]; the bearer header is already
//! installed on the transport by the session.

use crate::tracker::book::models::{BookPayload, BookResource};
use crate::tracker::error::ClientError;
use crate::tracker::transport::TransportClient;
use crate::tracker::types::decode_response;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct BookApi {
    transport: Arc<dyn TransportClient>,
}

impl BookApi {
    pub fn new(transport: Arc<dyn TransportClient>) -> Self {
        Self { transport }
    }

    /// `GET /books/mine`
    pub async fn list_mine(&self) -> Result<Vec<BookResource>, ClientError> {
        info!("[BookAPI] 📡 fetching own books");
        let response = self
            .transport
            .get("/books/mine")
            .await
            .map_err(|e| Self::reject("list books", e))?;
        let books: Vec<BookResource> = decode_response(response, "list books")?;
        info!("[BookAPI] ✅ received {} books", books.len());
        Ok(books)
    }

    /// `POST /books`
    pub async fn create(&self, payload: &BookPayload) -> Result<BookResource, ClientError> {
        info!("[BookAPI] 📡 creating book \"{}\"", payload.title());
        let body = Self::body(payload)?;
        debug!("[BookAPI]   body: {}", body);
        let response = self
            .transport
            .post("/books", body)
            .await
            .map_err(|e| Self::reject("create book", e))?;
        let book: BookResource = decode_response(response, "create book")?;
        info!("[BookAPI] ✅ created book {}", book.id);
        Ok(book)
    }

    /// `PUT /books/{id}`
    pub async fn update(&self, id: &str, payload: &BookPayload) -> Result<BookResource, ClientError> {
        info!("[BookAPI] 📡 updating book {}", id);
        let body = Self::body(payload)?;
        debug!("[BookAPI]   body: {}", body);
        let response = self
            .transport
            .put(&format!("/books/{id}"), body)
            .await
            .map_err(|e| Self::reject("update book", e))?;
        let book: BookResource = decode_response(response, "update book")?;
        info!("[BookAPI] ✅ updated book {}", book.id);
        Ok(book)
    }

    /// `DELETE /books/{id}`
    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        info!("[BookAPI] 📡 deleting book {}", id);
        self.transport
            .delete(&format!("/books/{id}"))
            .await
            .map_err(|e| Self::reject("delete book", e))?;
        info!("[BookAPI] ✅ deleted book {}", id);
        Ok(())
    }

    fn body(payload: &BookPayload) -> Result<serde_json::Value, ClientError> {
        serde_json::to_value(payload).map_err(|e| ClientError::decode("book payload", e))
    }

    fn reject(operation: &str, err: crate::tracker::transport::TransportError) -> ClientError {
        let err = ClientError::from_transport(err);
        error!("[BookAPI] {} failed: {}", operation, err);
        err
    }
}
