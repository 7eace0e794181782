//! Authenticated-session lifecycle
//!
//! [`SessionManager`] is the explicit session handle: it is created once,
//! shared through `Arc`, and passed to every component that needs the current
//! user or the bearer header. There is no global session.

use crate::tracker::error::{server_message, ClientError};
use crate::tracker::serialization::{decode_token_claims, TokenClaims};
use crate::tracker::store::{CredentialStore, TOKEN_KEY, USER_KEY};
use crate::tracker::transport::{TransportClient, TransportError};
use crate::tracker::types::{
    decode_response, Credential, LoginRequest, LoginResponse, RegisterRequest, UserSummary,
};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

pub const AUTHORIZATION_HEADER: &str = "Authorization";

const SIGN_IN_FAILED: &str = "sign-in failed; check your credentials";

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Owns sign-in, sign-out, bootstrap and the bearer header.
pub struct SessionManager {
    transport: Arc<dyn TransportClient>,
    store: Arc<dyn CredentialStore>,
    current: RwLock<Option<Credential>>,
}

impl SessionManager {
    /// Creates an unauthenticated session. Call [`Self::bootstrap`] to restore
    /// a stored credential.
    pub fn new(transport: Arc<dyn TransportClient>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            store,
            current: RwLock::new(None),
        }
    }

    /// Restores the stored credential, if both halves are present.
    ///
    /// Trust-on-read: the token is not checked for freshness. Returns whether
    /// the session is now authenticated.
    pub async fn bootstrap(&self) -> Result<bool, ClientError> {
        let token = self.store.get(TOKEN_KEY).await.map_err(ClientError::storage)?;
        let user_json = self.store.get(USER_KEY).await.map_err(ClientError::storage)?;

        let (Some(token), Some(user_json)) = (token, user_json) else {
            debug!("[Session] no stored credential, staying signed out");
            return Ok(false);
        };

        let user: UserSummary = match serde_json::from_str(&user_json) {
            Ok(user) => user,
            Err(e) => {
                warn!("[Session] stored user entry is unreadable, ignoring it: {}", e);
                return Ok(false);
            }
        };

        self.transport
            .set_default_header(AUTHORIZATION_HEADER, &bearer(&token));
        info!("[Session] restored session for user {}", user.id);
        self.set_current(Some(Credential { token, user }));
        Ok(true)
    }

    /// Signs in and persists the returned credential.
    ///
    /// On any failure the previous session (if any), the header and the
    /// stored credential are left exactly as they were.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserSummary, ClientError> {
        info!("[Session] 🔐 signing in as {}", email);
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(|e| ClientError::decode("login request", e))?;

        let response = match self.transport.post("/auth/login", body).await {
            Ok(response) => response,
            Err(TransportError::Status { status, data }) => {
                let message = server_message(&data).unwrap_or_else(|| SIGN_IN_FAILED.to_string());
                warn!("[Session] sign-in rejected with HTTP {}: {}", status, message);
                return Err(ClientError::Authentication(message));
            }
            Err(e) => return Err(ClientError::from_transport(e)),
        };
        let credential: LoginResponse = decode_response(response, "login")?;

        let user_json = serde_json::to_string(&credential.user)
            .map_err(|e| ClientError::decode("user", e))?;
        self.store
            .set_all(&[
                (TOKEN_KEY, credential.token.as_str()),
                (USER_KEY, user_json.as_str()),
            ])
            .await
            .map_err(|e| {
                error!("[Session] failed to persist credential: {:#}", e);
                ClientError::storage(e)
            })?;

        self.transport
            .set_default_header(AUTHORIZATION_HEADER, &bearer(&credential.token));
        let user = credential.user.clone();
        self.set_current(Some(credential));
        info!("[Session] ✅ signed in, user id: {}", user.id);
        Ok(user)
    }

    /// Creates an account. Does not sign in.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), ClientError> {
        info!("[Session] registering account for {}", email);
        let body = serde_json::to_value(RegisterRequest { name, email, password })
            .map_err(|e| ClientError::decode("register request", e))?;
        self.transport
            .post("/auth/register", body)
            .await
            .map_err(|e| {
                let err = ClientError::from_transport(e);
                warn!("[Session] registration failed: {}", err);
                err
            })?;
        info!("[Session] ✅ account created for {}", email);
        Ok(())
    }

    /// Clears the session. Idempotent.
    ///
    /// Memory and header are cleared first so a storage failure never leaves
    /// the client acting as signed in; the storage error is still reported.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let was_signed_in = self.is_authenticated();
        self.set_current(None);
        self.transport.remove_default_header(AUTHORIZATION_HEADER);
        self.store
            .remove_all(&[TOKEN_KEY, USER_KEY])
            .await
            .map_err(|e| {
                error!("[Session] failed to clear stored credential: {:#}", e);
                ClientError::storage(e)
            })?;
        if was_signed_in {
            info!("[Session] signed out");
        }
        Ok(())
    }

    /// Deletes the current user's account, then signs out.
    ///
    /// Sign-out happens only after the server confirms the deletion; on
    /// failure the session stays active and the error is returned.
    pub async fn delete_account(&self) -> Result<(), ClientError> {
        let user = self.require_user("delete account")?;
        info!("[Session] deleting account {}", user.id);
        self.transport
            .delete(&format!("/users/{}", user.id))
            .await
            .map_err(|e| {
                let err = ClientError::from_transport(e);
                error!("[Session] account deletion failed, staying signed in: {}", err);
                err
            })?;
        info!("[Session] ✅ account {} deleted", user.id);
        self.sign_out().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn current_user(&self) -> Option<UserSummary> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.user.clone())
    }

    pub fn credential(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Claims decoded from the bearer token, for display only.
    pub fn bearer_claims(&self) -> Option<TokenClaims> {
        self.credential()
            .and_then(|c| decode_token_claims(&c.token))
    }

    pub(crate) fn transport(&self) -> Arc<dyn TransportClient> {
        self.transport.clone()
    }

    /// The signed-in user, or `NotAuthenticated`.
    ///
    /// Reaching this without a session is a caller bug, so it is logged at
    /// error level before the error is returned.
    pub(crate) fn require_user(&self, operation: &str) -> Result<UserSummary, ClientError> {
        self.current_user().ok_or_else(|| {
            error!("[Session] {} attempted without an authenticated session", operation);
            ClientError::NotAuthenticated
        })
    }

    fn set_current(&self, credential: Option<Credential>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = credential;
    }
}
