use crate::{
    accounts::UserAccount,
    api::handlers::{ApiError, AuthState, Credentials, ErrorResponse, require_credentials},
};
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoggedInUser {
    user_id: i64,
    username: String,
    created_at: String,
}

impl From<&UserAccount> for LoggedInUser {
    fn from(account: &UserAccount) -> Self {
        Self {
            user_id: account.user_id,
            username: account.username.clone(),
            created_at: account.created_at.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserLogin {
    ok: bool,
    user: LoggedInUser,
}

#[utoipa::path(
    post,
    path= "/auth/login",
    request_body = Credentials,
    responses (
        (status = 200, description = "Login successful", body = UserLogin, content_type = "application/json"),
        (status = 400, description = "Missing username or password", body = ErrorResponse),
        (status = 401, description = "Unknown username or wrong password", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    ),
    tag= "auth"
)]
// axum handler for login
#[instrument(skip(state, payload))]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<UserLogin>, ApiError> {
    let (username, password) = require_credentials(payload)?;

    let account = match state.accounts().find_by_username(&username).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            debug!("User not found");
            state
                .hasher()
                .verify_decoy(&password)
                .await
                .map_err(|e| ApiError::internal("Error verifying password", e))?;
            return Err(ApiError::Unauthorized);
        }
        Err(e) => return Err(ApiError::internal("Error getting user from database", e)),
    };

    let matches = state
        .hasher()
        .verify(&password, &account.password_hash)
        .await
        .map_err(|e| ApiError::internal("Error verifying password", e))?;

    if !matches {
        debug!("Password mismatch");
        return Err(ApiError::Unauthorized);
    }

    debug!("Login successful");

    Ok(Json(UserLogin {
        ok: true,
        user: LoggedInUser::from(&account),
    }))
}
