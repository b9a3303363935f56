use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    access::{Operation, ResourceKind},
    error::{AppError, Result},
    models::{
        ApiResponse, CreateEventRequest, Event, EventAttributesRequest, EventStatusRequest,
        EventWithPokemon, UpdateEventRequest,
    },
};

use super::{authorize, authorize_reference, AppJson, AppState, Deleted};

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    #[serde(rename = "gameId")]
    pub game_id: Option<String>,
}

fn event_gone() -> AppError {
    AppError::NotFound(format!("{} not found", ResourceKind::Event))
}

/// POST /events
pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateEventRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Event>>)> {
    let new_event = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Event, Operation::Create, None).await?;

    // Referenced rows are checked with the caller's identity before anything is written
    authorize_reference(&state, &grant, ResourceKind::Game, Operation::Read, new_event.game_id)
        .await?;
    authorize_reference(&state, &grant, ResourceKind::Player, Operation::Read, new_event.player_id)
        .await?;
    authorize_reference(&state, &grant, ResourceKind::Pokemon, Operation::Read, new_event.pokemon_id)
        .await?;

    let linked = state
        .db
        .is_player_in_game(new_event.player_id, new_event.game_id)
        .await?;
    new_event.require_membership(linked)?;

    let event = state.db.create_event(&new_event).await?;
    tracing::info!(
        event_id = event.id,
        game_id = event.game_id,
        player_id = event.player_id,
        "event logged: {}",
        event.status
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(event))))
}

/// GET /events?gameId=
pub async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventListQuery>,
) -> Result<Json<ApiResponse<Vec<EventWithPokemon>>>> {
    let game_id = query
        .game_id
        .ok_or_else(|| AppError::BadRequest("gameId is required".to_string()))?;
    let grant = authorize(&state, &headers, ResourceKind::Game, Operation::Read, Some(&game_id)).await?;

    let events = state.db.list_game_events(grant.target_id()?).await?;
    Ok(Json(ApiResponse::success(events)))
}

/// GET /events/{id}
pub async fn get_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>> {
    let grant = authorize(&state, &headers, ResourceKind::Event, Operation::Read, Some(&id)).await?;
    let event = state
        .db
        .get_event(grant.target_id()?)
        .await?
        .ok_or_else(event_gone)?;
    Ok(Json(ApiResponse::success(event)))
}

/// PUT /events/{id}
pub async fn update_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateEventRequest>,
) -> Result<Json<ApiResponse<Event>>> {
    let (route, nickname, status) = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Event, Operation::Update, Some(&id)).await?;

    let event_id = grant.target_id()?;
    let nickname = nickname.as_ref().map(|n| n.as_deref());
    let event = state
        .db
        .update_event(event_id, route.as_deref(), nickname, status)
        .await?
        .ok_or_else(event_gone)?;
    tracing::info!(event_id, "event updated");

    Ok(Json(ApiResponse::success(event)))
}

/// PATCH /events/{id}/status
pub async fn update_event_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<EventStatusRequest>,
) -> Result<Json<ApiResponse<Event>>> {
    let grant = authorize(&state, &headers, ResourceKind::Event, Operation::Update, Some(&id)).await?;

    let event_id = grant.target_id()?;
    let event = state
        .db
        .update_event(event_id, None, None, Some(req.status))
        .await?
        .ok_or_else(event_gone)?;
    tracing::info!(event_id, "event status set to {}", req.status);

    Ok(Json(ApiResponse::success(event)))
}

/// PUT /events/{id}/attributes
pub async fn update_event_attributes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<EventAttributesRequest>,
) -> Result<Json<ApiResponse<Event>>> {
    req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Event, Operation::Update, Some(&id)).await?;

    let event = state
        .db
        .update_event_attributes(grant.target_id()?, req.is_shiny, req.is_champ)
        .await?
        .ok_or_else(event_gone)?;

    Ok(Json(ApiResponse::success(event)))
}

/// DELETE /events/{id}
pub async fn delete_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let grant = authorize(&state, &headers, ResourceKind::Event, Operation::Delete, Some(&id)).await?;
    let event_id = grant.target_id()?;

    if !state.db.delete_event(event_id).await? {
        return Err(event_gone());
    }
    tracing::info!(event_id, "event deleted");

    Ok(Json(ApiResponse::success(Deleted::new(event_id))))
}
