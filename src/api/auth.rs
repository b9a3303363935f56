use axum::{extract::State, http::StatusCode, Json};

use crate::{
    crypto::password::{hash_password_off_runtime, verify_password_off_runtime},
    error::{AppError, Result},
    models::{ApiResponse, AuthResponse, Credentials, User},
};

use super::{AppJson, AppState};

const LOGIN_FAILED: &str = "Invalid username or password";

// ==================== HANDLERS ====================

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<Credentials>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    req.validate_new()?;
    let username = req.username.trim();

    if state.db.get_user_by_username(username).await?.is_some() {
        return Err(AppError::Conflict("Username is already taken".to_string()));
    }

    let password_hash = hash_password_off_runtime(req.password.clone()).await?;
    let user = state.db.create_user(username, &password_hash).await?;
    tracing::info!(user_id = user.id, "registered user {}", user.username);

    let response = issue_session(&state, user)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<Credentials>,
) -> Result<Json<ApiResponse<AuthResponse>>> {
    let rejected = || {
        tracing::debug!("login rejected for {}", req.username.trim());
        AppError::Unauthenticated(LOGIN_FAILED.to_string())
    };

    let user = state
        .db
        .get_user_by_username(req.username.trim())
        .await?
        .ok_or_else(rejected)?;
    let verified =
        verify_password_off_runtime(user.password_hash.clone(), req.password.clone()).await?;
    if !verified {
        return Err(rejected());
    }

    Ok(Json(ApiResponse::success(issue_session(&state, user)?)))
}

// ==================== HELPER FUNCTIONS ====================

fn issue_session(state: &AppState, user: User) -> Result<AuthResponse> {
    let token = state.verifier.issue(user.id)?;
    Ok(AuthResponse {
        token,
        expires_in: state.verifier.expires_in_secs(),
        user: user.into(),
    })
}
