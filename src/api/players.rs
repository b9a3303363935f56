use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    access::{Grant, Operation, ResourceKind},
    error::{AppError, Result},
    models::{ApiResponse, CreatePlayerRequest, Player, PlayerWithPokemon, UpdatePlayerRequest},
};

use super::{authorize, authorize_reference, AppJson, AppState, Deleted};

fn player_gone() -> AppError {
    AppError::NotFound(format!("{} not found", ResourceKind::Player))
}

/// A favourite must point at an existing catalog entry.
async fn check_favourite(state: &AppState, grant: &Grant, pokemon_id: Option<i32>) -> Result<()> {
    if let Some(pokemon_id) = pokemon_id {
        authorize_reference(state, grant, ResourceKind::Pokemon, Operation::Read, pokemon_id)
            .await?;
    }
    Ok(())
}

/// POST /players
pub async fn create_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreatePlayerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Player>>)> {
    let (name, pokemon_id) = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Player, Operation::Create, None).await?;
    check_favourite(&state, &grant, pokemon_id).await?;

    let player = state
        .db
        .create_player(grant.user_id(), &name, pokemon_id)
        .await?;
    tracing::info!(player_id = player.id, user_id = grant.user_id(), "player created");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(player))))
}

/// GET /players
pub async fn list_players(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<PlayerWithPokemon>>>> {
    let grant = authorize(&state, &headers, ResourceKind::Player, Operation::List, None).await?;
    let players = state.db.list_players(grant.user_id()).await?;
    Ok(Json(ApiResponse::success(players)))
}

/// GET /players/{id}
pub async fn get_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Player>>> {
    let grant = authorize(&state, &headers, ResourceKind::Player, Operation::Read, Some(&id)).await?;
    let player = state
        .db
        .get_player(grant.target_id()?)
        .await?
        .ok_or_else(player_gone)?;
    Ok(Json(ApiResponse::success(player)))
}

/// PUT /players/{id}
pub async fn update_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdatePlayerRequest>,
) -> Result<Json<ApiResponse<Player>>> {
    let (name, pokemon_id) = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Player, Operation::Update, Some(&id)).await?;
    check_favourite(&state, &grant, pokemon_id.flatten()).await?;

    let player_id = grant.target_id()?;
    let player = state
        .db
        .update_player(player_id, name.as_deref(), pokemon_id)
        .await?
        .ok_or_else(player_gone)?;
    tracing::info!(player_id, "player updated");

    Ok(Json(ApiResponse::success(player)))
}

/// DELETE /players/{id}
pub async fn delete_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let grant = authorize(&state, &headers, ResourceKind::Player, Operation::Delete, Some(&id)).await?;
    let player_id = grant.target_id()?;

    if !state.db.delete_player(player_id).await? {
        return Err(player_gone());
    }
    tracing::info!(player_id, "player deleted");

    Ok(Json(ApiResponse::success(Deleted::new(player_id))))
}
