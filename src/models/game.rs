use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{pokemon::PokemonSummary, require_positive_id, require_text};
use crate::{
    constants::{MAX_PLAYERS_PER_GAME, NAME_MAX_LEN},
    error::{AppError, Result},
};

// ==================== GAME ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i32,
    pub name: String,
    pub player_count: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateGameRequest {
    pub name: String,
    pub player_count: i32,
}

impl CreateGameRequest {
    pub fn validate(&self) -> Result<(String, i32)> {
        let name = require_text("name", &self.name, NAME_MAX_LEN)?;
        Ok((name, validate_player_count(self.player_count)?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateGameRequest {
    pub name: Option<String>,
    pub player_count: Option<i32>,
}

impl UpdateGameRequest {
    pub fn validate(&self) -> Result<(Option<String>, Option<i32>)> {
        if self.name.is_none() && self.player_count.is_none() {
            return Err(AppError::BadRequest("Nothing to update".to_string()));
        }
        let name = self
            .name
            .as_deref()
            .map(|n| require_text("name", n, NAME_MAX_LEN))
            .transpose()?;
        let player_count = self.player_count.map(validate_player_count).transpose()?;
        Ok((name, player_count))
    }
}

fn validate_player_count(count: i32) -> Result<i32> {
    if !(1..=MAX_PLAYERS_PER_GAME).contains(&count) {
        return Err(AppError::BadRequest(format!(
            "playerCount must be between 1 and {}",
            MAX_PLAYERS_PER_GAME
        )));
    }
    Ok(count)
}

/// `playerCount` may not drop below the players already linked.
pub fn check_player_count_change(new_count: i32, linked: i64) -> Result<()> {
    if i64::from(new_count) < linked {
        return Err(AppError::Conflict(format!(
            "Game already has {} players linked",
            linked
        )));
    }
    Ok(())
}

// ==================== PLAYER ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: i32,
    pub name: String,
    pub pokemon_id: Option<i32>,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePlayerRequest {
    pub name: String,
    #[serde(default)]
    pub pokemon_id: Option<i32>,
}

impl CreatePlayerRequest {
    pub fn validate(&self) -> Result<(String, Option<i32>)> {
        let name = require_text("name", &self.name, NAME_MAX_LEN)?;
        let pokemon_id = self
            .pokemon_id
            .map(|id| require_positive_id("pokemonId", id))
            .transpose()?;
        Ok((name, pokemon_id))
    }
}

/// `pokemonId: null` clears the favourite; omitting it leaves it unchanged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdatePlayerRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "super::explicit_option")]
    pub pokemon_id: Option<Option<i32>>,
}

impl UpdatePlayerRequest {
    pub fn validate(&self) -> Result<(Option<String>, Option<Option<i32>>)> {
        if self.name.is_none() && self.pokemon_id.is_none() {
            return Err(AppError::BadRequest("Nothing to update".to_string()));
        }
        let name = self
            .name
            .as_deref()
            .map(|n| require_text("name", n, NAME_MAX_LEN))
            .transpose()?;
        let pokemon_id = match self.pokemon_id {
            Some(Some(id)) => Some(Some(require_positive_id("pokemonId", id)?)),
            other => other,
        };
        Ok((name, pokemon_id))
    }
}


/// Join row behind the player listing.
#[derive(Debug, FromRow)]
pub struct PlayerListingRow {
    pub id: i32,
    pub name: String,
    pub pokemon_id: Option<i32>,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub pokemon_name: Option<String>,
    pub pokemon_form: Option<String>,
    pub pokemon_type1: Option<String>,
    pub pokemon_type2: Option<String>,
    pub pokemon_total: Option<i32>,
    pub pokemon_image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWithPokemon {
    #[serde(flatten)]
    pub player: Player,
    pub pokemon: Option<PokemonSummary>,
}

impl From<PlayerListingRow> for PlayerWithPokemon {
    fn from(row: PlayerListingRow) -> Self {
        let pokemon = match (row.pokemon_id, row.pokemon_name, row.pokemon_type1) {
            (Some(id), Some(name), Some(type1)) => Some(PokemonSummary {
                id,
                name,
                form: row.pokemon_form,
                type1,
                type2: row.pokemon_type2,
                total: row.pokemon_total.unwrap_or_default(),
                image: row.pokemon_image,
            }),
            _ => None,
        };
        Self {
            player: Player {
                id: row.id,
                name: row.name,
                pokemon_id: row.pokemon_id,
                user_id: row.user_id,
                created_at: row.created_at,
            },
            pokemon,
        }
    }
}

// ==================== PLAYER <-> GAME ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGame {
    pub id: i32,
    pub player_id: i32,
    pub game_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinkPlayerRequest {
    pub player_id: i32,
    pub game_id: i32,
}

/// A player joins a game once, and only while a seat is free.
pub fn check_link_admission(already_linked: bool, linked: i64, player_count: i32) -> Result<()> {
    if already_linked {
        return Err(AppError::Conflict(
            "Player is already part of this game".to_string(),
        ));
    }
    if linked >= i64::from(player_count) {
        return Err(AppError::Conflict(format!(
            "Game is full ({} players)",
            player_count
        )));
    }
    Ok(())
}
