use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::{
    access::{Operation, ResourceKind},
    constants::SPRITE_FIELD_NAME,
    error::{AppError, Result},
    models::{ApiResponse, Pokemon, PokemonInput, PokemonSummary},
    utils::{normalize_search_term, parse_resource_id, search_limit},
};

use super::{authorize, AppJson, AppState, Deleted};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_term: Option<String>,
    pub limit: Option<i64>,
}

fn pokemon_gone() -> AppError {
    AppError::NotFound(format!("{} not found", ResourceKind::Pokemon))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// Removes the files behind `stem` unless another catalog row still uses them.
async fn release_sprite(state: &AppState, pokemon_id: i32, stem: &str) -> Result<()> {
    if state.db.pokemon_image_in_use(stem, pokemon_id).await? {
        tracing::debug!(pokemon_id, "sprite {} still referenced, keeping it", stem);
        return Ok(());
    }
    if let Err(e) = state.sprites.remove(stem).await {
        tracing::warn!(pokemon_id, "sprite {} left behind: {}", stem, e);
    }
    Ok(())
}

// ==================== PUBLIC CATALOG ====================

/// GET /pokemons/pokemon
pub async fn list_pokemon(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Pokemon>>>> {
    let pokemon = state.db.list_pokemon().await?;
    Ok(Json(ApiResponse::success(pokemon)))
}

/// GET /pokemons/pokemon/{id}
pub async fn get_pokemon(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Pokemon>>> {
    let id = parse_resource_id(&id).ok_or_else(pokemon_gone)?;
    let pokemon = state.db.get_pokemon(id).await?.ok_or_else(pokemon_gone)?;
    Ok(Json(ApiResponse::success(pokemon)))
}

/// GET /pokemons/search?searchTerm=
pub async fn search_pokemon(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<PokemonSummary>>>> {
    let pattern = normalize_search_term(query.search_term.as_deref().unwrap_or_default())?;
    let results = state
        .db
        .search_pokemon(&pattern, search_limit(query.limit))
        .await?;
    Ok(Json(ApiResponse::success(results)))
}

// ==================== CATALOG WRITES ====================

/// POST /pokemons/pokemon
pub async fn create_pokemon(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<PokemonInput>,
) -> Result<(StatusCode, Json<ApiResponse<Pokemon>>)> {
    let input = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Pokemon, Operation::Create, None).await?;

    let pokemon = state.db.create_pokemon(&input).await?;
    tracing::info!(
        pokemon_id = pokemon.id,
        user_id = grant.user_id(),
        "catalog entry created: {}",
        pokemon.name
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(pokemon))))
}

/// PUT /pokemons/pokemon/{id}
pub async fn update_pokemon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<PokemonInput>,
) -> Result<Json<ApiResponse<Pokemon>>> {
    let input = req.validate()?;
    let grant = authorize(&state, &headers, ResourceKind::Pokemon, Operation::Update, Some(&id)).await?;

    let pokemon_id = grant.target_id()?;
    let pokemon = state
        .db
        .update_pokemon(pokemon_id, &input)
        .await?
        .ok_or_else(pokemon_gone)?;
    tracing::info!(pokemon_id, user_id = grant.user_id(), "catalog entry updated");

    Ok(Json(ApiResponse::success(pokemon)))
}

/// DELETE /pokemons/pokemon/{id}
///
/// Refused with 409 while events still reference the entry.
pub async fn delete_pokemon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let grant = authorize(&state, &headers, ResourceKind::Pokemon, Operation::Delete, Some(&id)).await?;
    let pokemon_id = grant.target_id()?;

    let image = state
        .db
        .get_pokemon(pokemon_id)
        .await?
        .ok_or_else(pokemon_gone)?
        .image;
    if !state.db.delete_pokemon(pokemon_id).await? {
        return Err(pokemon_gone());
    }

    if let Some(stem) = image {
        release_sprite(&state, pokemon_id, &stem).await?;
    }
    tracing::info!(pokemon_id, user_id = grant.user_id(), "catalog entry deleted");

    Ok(Json(ApiResponse::success(Deleted::new(pokemon_id))))
}

/// POST /pokemons/pokemon/{id}/sprite
pub async fn upload_sprite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Pokemon>>> {
    let grant = authorize(&state, &headers, ResourceKind::Pokemon, Operation::Update, Some(&id)).await?;
    let pokemon_id = grant.target_id()?;
    let pokemon = state
        .db
        .get_pokemon(pokemon_id)
        .await?
        .ok_or_else(pokemon_gone)?;

    let mut stored = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(SPRITE_FIELD_NAME) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        stored = Some(state.sprites.save(&pokemon, &content_type, &bytes).await?);
        break;
    }
    let stored = stored.ok_or_else(|| {
        AppError::BadRequest(format!("multipart field '{}' is required", SPRITE_FIELD_NAME))
    })?;

    let previous = pokemon.image;
    let pokemon = state
        .db
        .set_pokemon_image(pokemon_id, &stored.stem)
        .await?
        .ok_or_else(pokemon_gone)?;
    if let Some(old) = previous.filter(|old| *old != stored.stem) {
        release_sprite(&state, pokemon_id, &old).await?;
    }
    tracing::info!(pokemon_id, user_id = grant.user_id(), "sprite uploaded: {}", stored.file_name);

    Ok(Json(ApiResponse::success(pokemon)))
}
