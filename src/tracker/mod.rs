pub mod auth;
pub mod book;
pub mod cancellation;
pub mod client;
pub mod error;
pub mod notice;
pub mod serialization;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::SessionManager;
pub use error::{ClientError, ValidationError};
