use crate::{
    accounts::{AccountError, NewAccount, UserAccount},
    api::handlers::{
        ApiError, AuthState, Credentials, ErrorResponse, USER_ID_UNAVAILABLE, USERNAME_TAKEN,
        require_credentials,
    },
};
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisteredUser {
    internal_id: String,
    user_id: i64,
    username: String,
    created_at: String,
}

impl From<&UserAccount> for RegisteredUser {
    fn from(account: &UserAccount) -> Self {
        Self {
            internal_id: account.internal_id.to_string(),
            user_id: account.user_id,
            username: account.username.clone(),
            created_at: account.created_at.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserRegister {
    ok: bool,
    user: RegisteredUser,
}

#[utoipa::path(
    post,
    path= "/auth/register",
    request_body = Credentials,
    responses (
        (status = 200, description = "Registration successful", body = UserRegister, content_type = "application/json"),
        (status = 400, description = "Missing username or password", body = ErrorResponse),
        (status = 409, description = "Username already exists or the allocated user id is taken", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag= "auth"
)]
// axum handler for register
#[instrument(skip(state, payload))]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<UserRegister>, ApiError> {
    let (username, password) = require_credentials(payload)?;

    // Fast path only: the unique constraint on insert is what actually decides.
    match state.accounts().find_by_username(&username).await {
        Ok(Some(_)) => {
            debug!("User already exists");
            return Err(ApiError::Conflict(USERNAME_TAKEN));
        }
        Ok(None) => (),
        Err(e) => return Err(ApiError::internal("Error checking if user exists", e)),
    }

    let password_hash = state
        .hasher()
        .hash(&password)
        .await
        .map_err(|e| ApiError::internal("Error hashing password", e))?;

    // From here on the id is consumed even if the insert fails.
    let user_id = state
        .allocator()
        .allocate()
        .await
        .map_err(|e| ApiError::internal("Error allocating user_id", e))?;

    let account = NewAccount {
        user_id,
        username,
        password_hash,
    };

    match state.accounts().insert(account).await {
        Ok(account) => {
            info!(user_id = account.user_id, "User registered");

            Ok(Json(UserRegister {
                ok: true,
                user: RegisteredUser::from(&account),
            }))
        }
        Err(AccountError::UsernameTaken) => {
            debug!("User already exists (insert)");
            Err(ApiError::Conflict(USERNAME_TAKEN))
        }
        Err(AccountError::UserIdTaken(user_id)) => {
            warn!(user_id, "Allocated user_id is already assigned; id space has wrapped");
            Err(ApiError::Conflict(USER_ID_UNAVAILABLE))
        }
        Err(e @ AccountError::Database(_)) => Err(ApiError::internal("Error inserting user", e)),
    }
}
