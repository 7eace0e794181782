use crate::tracker::error::ClientError;
use crate::tracker::transport::TransportResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Minimal identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    /// Older backends name this field `nome`.
    #[serde(alias = "nome")]
    pub name: String,
    pub email: String,
}

/// Bearer token plus the user it was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub user: UserSummary,
}

/// `POST /auth/login` body.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/login` success body; identical in shape to a [`Credential`].
pub type LoginResponse = Credential;

/// `POST /auth/register` body.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Decodes the `data` of a success response into `T`.
///
/// Shared by every endpoint call; `operation_name` only labels logs and the
/// resulting [`ClientError::Decode`].
pub fn decode_response<T: serde::de::DeserializeOwned>(
    response: TransportResponse,
    operation_name: &str,
) -> Result<T, ClientError> {
    debug!(
        "[HTTP] {} response, status: {}",
        operation_name, response.status
    );
    serde_json::from_value(response.data).map_err(|e| {
        error!("[HTTP] {} response failed to decode: {:?}", operation_name, e);
        ClientError::decode(operation_name, e)
    })
}
