pub mod health;
pub mod root;
pub mod user_login;
pub mod user_register;


use crate::{
    accounts::{AccountStore, Argon2Hasher},
    sequence::IdAllocator,
};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, error};
use utoipa::ToSchema;

pub(crate) const MISSING_CREDENTIALS: &str = "username and password are required";
pub(crate) const INVALID_PAYLOAD: &str = "invalid JSON payload";
pub(crate) const USERNAME_TAKEN: &str = "username already exists";
pub(crate) const USER_ID_UNAVAILABLE: &str = "user id unavailable, retry registration";
pub(crate) const INVALID_CREDENTIALS: &str = "invalid credentials";
pub(crate) const INTERNAL_ERROR: &str = "internal error";

/// Dependencies shared by the auth handlers.
pub struct AuthState {
    accounts: Arc<dyn AccountStore>,
    allocator: IdAllocator,
    hasher: Argon2Hasher,
}

impl AuthState {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        allocator: IdAllocator,
        hasher: Argon2Hasher,
    ) -> Self {
        Self {
            accounts,
            allocator,
            hasher,
        }
    }

    pub(crate) fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub(crate) fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub(crate) fn hasher(&self) -> &Argon2Hasher {
        &self.hasher
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("allocator", &self.allocator)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

/// Request body shared by register and login.
#[derive(ToSchema, Serialize, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Failure envelope: `{ok: false, error}`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    ok: bool,
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Conflict(&'static str),
    Unauthorized,
    Internal(anyhow::Error),
}

impl ApiError {
    pub(crate) fn internal<E>(context: &'static str, err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal(err.into().context(context))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    /// Client-facing messages are fixed strings; internal causes are only logged.
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(message) | Self::Conflict(message) => message,
            Self::Unauthorized => INVALID_CREDENTIALS,
            Self::Internal(err) => {
                error!("{err:#}");
                INTERNAL_ERROR
            }
        };

        let body = ErrorResponse {
            ok: false,
            error: message.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Presence check for username and password; runs before any store access.
pub(crate) fn require_credentials(
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(String, String), ApiError> {
    let credentials = match payload {
        Ok(Json(credentials)) => credentials,
        Err(rejection) => {
            debug!("Rejected payload: {rejection}");
            return Err(ApiError::BadRequest(INVALID_PAYLOAD));
        }
    };

    match (credentials.username, credentials.password) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Ok((username, password))
        }
        _ => Err(ApiError::BadRequest(MISSING_CREDENTIALS)),
    }
}
