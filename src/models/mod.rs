// src/models/mod.rs
pub mod event;
pub mod game;
pub mod pokemon;
pub mod response;
pub mod user;

// Re-export commonly used types so other modules can use `crate::models::X`
pub use event::{
    CreateEventRequest, Event, EventAttributesRequest, EventStatus, EventStatusRequest,
    EventWithPokemon, UpdateEventRequest,
};
pub use game::{
    check_link_admission, check_player_count_change, CreateGameRequest, CreatePlayerRequest,
    Game, LinkPlayerRequest, Player, PlayerGame, PlayerWithPokemon, UpdateGameRequest,
    UpdatePlayerRequest,
};
pub use pokemon::{Pokemon, PokemonInput, PokemonSummary};
pub use response::ApiResponse;
pub use user::{AuthResponse, Credentials, User};

use serde::{Deserialize, Deserializer};

use crate::error::{AppError, Result};

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub(crate) fn require_text(field: &str, value: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn require_positive_id(field: &str, value: i32) -> Result<i32> {
    if value <= 0 {
        return Err(AppError::BadRequest(format!("{} must be a positive id", field)));
    }
    Ok(value)
}

/// Keeps an explicit `null` apart from a missing field: `Some(None)` clears.
pub(crate) fn explicit_option<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
