use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    access::{Operation, ResourceKind},
    error::{AppError, Result},
    models::{require_positive_id, ApiResponse, LinkPlayerRequest, Player, PlayerGame},
};

use super::{authenticate, authorize, authorize_reference, AppJson, AppState};

/// POST /player-games
///
/// Both sides must belong to the caller. Linking changes the game, so the
/// game is checked as an update. A duplicate link or a full game is a 409.
pub async fn link_player(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<LinkPlayerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PlayerGame>>)> {
    let game_id = require_positive_id("gameId", req.game_id)?;
    let player_id = require_positive_id("playerId", req.player_id)?;

    let grant = authenticate(&state, &headers)?;
    authorize_reference(&state, &grant, ResourceKind::Game, Operation::Update, game_id).await?;
    authorize_reference(&state, &grant, ResourceKind::Player, Operation::Read, player_id).await?;

    let link = state
        .db
        .link_player_to_game(player_id, game_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", ResourceKind::Game)))?;
    tracing::info!(player_id, game_id, "player linked to game");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(link))))
}

/// GET /player-games/{gameId}
pub async fn list_game_players(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Player>>>> {
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::Read, Some(&game_id)).await?;
    let players = state.db.list_game_players(grant.target_id()?).await?;
    Ok(Json(ApiResponse::success(players)))
}
