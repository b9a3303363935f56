pub mod auth;
pub mod events;
pub mod games;
pub mod health;
pub mod player_games;
pub mod players;
pub mod pokemon;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::Serialize;

use crate::access::{AccessGate, AccessRequest, Credential, Grant, Operation, ResourceKind};
use crate::config::Config;
use crate::crypto::JwtVerifier;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::services::SpriteStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub verifier: JwtVerifier,
    pub sprites: SpriteStorage,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            verifier: JwtVerifier::new(&config.jwt_secret, config.jwt_expiry_hours),
            sprites: SpriteStorage::from_config(&config),
            config,
        }
    }

    pub fn gate(&self) -> AccessGate<'_, JwtVerifier, Database> {
        AccessGate::new(&self.verifier, &self.db, &self.config.catalog_policy)
    }
}

/// Runs the access gate for one handler and turns denials into `AppError`s.
pub async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    kind: ResourceKind,
    operation: Operation,
    id: Option<&str>,
) -> Result<Grant> {
    let mut request = AccessRequest::new(Credential::from_headers(headers), kind, operation);
    if let Some(id) = id {
        request = request.on(id);
    }
    state.gate().authorize(request).await.into_grant()
}

/// Authenticates the caller without resolving any instance.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Grant> {
    state
        .gate()
        .identify(Credential::from_headers(headers))
        .into_grant()
}

/// Same as [`authorize`] for a referenced instance, reusing an existing grant's principal.
pub async fn authorize_reference(
    state: &AppState,
    grant: &Grant,
    kind: ResourceKind,
    operation: Operation,
    id: i32,
) -> Result<Grant> {
    state
        .gate()
        .authorize_for(grant.principal, kind, operation, id)
        .await
        .into_grant()
}

/// JSON body extractor whose rejections use the API error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: i32,
    pub deleted: bool,
}

impl Deleted {
    pub fn new(id: i32) -> Self {
        Self { id, deleted: true }
    }
}

// ==================== LEGACY STATUS ====================

/// Existing clients expect `400` for unauthenticated requests.
pub fn rewrite_auth_status(legacy: bool, status: StatusCode) -> StatusCode {
    if legacy && status == StatusCode::UNAUTHORIZED {
        StatusCode::BAD_REQUEST
    } else {
        status
    }
}

pub async fn legacy_auth_status(State(state): State<AppState>, mut response: Response) -> Response {
    let status = rewrite_auth_status(state.config.legacy_auth_status, response.status());
    *response.status_mut() = status;
    response
}
