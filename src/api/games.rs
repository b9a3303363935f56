use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    access::{Operation, ResourceKind},
    error::{AppError, Result},
    models::{ApiResponse, CreateGameRequest, Game, UpdateGameRequest},
};

use super::{authorize, AppJson, AppState, Deleted};

fn game_gone() -> AppError {
    AppError::NotFound(format!("{} not found", ResourceKind::Game))
}

/// POST /games
pub async fn create_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateGameRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Game>>)> {
    let (name, player_count) = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::Create, None).await?;

    let game = state
        .db
        .create_game(grant.user_id(), &name, player_count)
        .await?;
    tracing::info!(game_id = game.id, user_id = grant.user_id(), "game created");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(game))))
}

/// GET /games
pub async fn list_games(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<Game>>>> {
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::List, None).await?;
    let games = state.db.list_games(grant.user_id()).await?;
    Ok(Json(ApiResponse::success(games)))
}

/// GET /games/{id}
pub async fn get_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Game>>> {
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::Read, Some(&id)).await?;
    let game = state
        .db
        .get_game(grant.target_id()?)
        .await?
        .ok_or_else(game_gone)?;
    Ok(Json(ApiResponse::success(game)))
}

/// PUT /games/{id}
///
/// Lowering `playerCount` below the linked players is a 409.
pub async fn update_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateGameRequest>,
) -> Result<Json<ApiResponse<Game>>> {
    let (name, player_count) = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::Update, Some(&id)).await?;
    let game_id = grant.target_id()?;

    let game = state
        .db
        .update_game(game_id, name.as_deref(), player_count)
        .await?
        .ok_or_else(game_gone)?;
    tracing::info!(game_id, "game updated");

    Ok(Json(ApiResponse::success(game)))
}

/// DELETE /games/{id}
pub async fn delete_game(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::Delete, Some(&id)).await?;
    let game_id = grant.target_id()?;

    if !state.db.delete_game(game_id).await? {
        return Err(game_gone());
    }
    tracing::info!(game_id, "game deleted");

    Ok(Json(ApiResponse::success(Deleted::new(game_id))))
}
