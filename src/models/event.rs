use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;

use super::{explicit_option, pokemon::PokemonSummary, require_positive_id, require_text};
use crate::{
    constants::{
        EVENT_STATUS_CAUGHT, EVENT_STATUS_DEFEATED, EVENT_STATUS_RUN_AWAY, NICKNAME_MAX_LEN,
        ROUTE_MAX_LEN,
    },
    error::{AppError, Result},
};

// ==================== STATUS ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EventStatus {
    #[default]
    #[serde(rename = "Catched", alias = "Caught")]
    Caught,
    #[serde(rename = "Run Away", alias = "RunAway")]
    RunAway,
    #[serde(rename = "Defeated")]
    Defeated,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Caught => EVENT_STATUS_CAUGHT,
            EventStatus::RunAway => EVENT_STATUS_RUN_AWAY,
            EventStatus::Defeated => EVENT_STATUS_DEFEATED,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== FLAGS ====================
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
}

/// Accepts `true`/`false` as well as the `0`/`1` the web client sends.
fn optional_flag<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlagRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlagRepr::Bool(b)) => Ok(Some(b)),
        Some(FlagRepr::Int(0)) => Ok(Some(false)),
        Some(FlagRepr::Int(1)) => Ok(Some(true)),
        Some(FlagRepr::Int(n)) => Err(D::Error::custom(format!(
            "flag must be 0 or 1, got {}",
            n
        ))),
    }
}

// ==================== EVENT ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i32,
    pub player_id: i32,
    pub pokemon_id: i32,
    pub game_id: i32,
    pub route: String,
    pub nickname: Option<String>,
    pub status: String,
    pub is_shiny: bool,
    #[serde(rename = "isChamp")]
    pub is_champion: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateEventRequest {
    pub player_id: i32,
    pub pokemon_id: i32,
    pub game_id: i32,
    pub route: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default, deserialize_with = "optional_flag")]
    pub is_shiny: Option<bool>,
    #[serde(default, deserialize_with = "optional_flag")]
    pub is_champ: Option<bool>,
}

/// Validated values for a new event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub player_id: i32,
    pub pokemon_id: i32,
    pub game_id: i32,
    pub route: String,
    pub nickname: Option<String>,
    pub status: EventStatus,
    pub is_shiny: bool,
    pub is_champion: bool,
}

impl NewEvent {
    /// Events are only logged for players taking part in the game.
    pub fn require_membership(&self, player_in_game: bool) -> Result<()> {
        if !player_in_game {
            return Err(AppError::BadRequest(
                "Player is not part of this game".to_string(),
            ));
        }
        Ok(())
    }
}

impl CreateEventRequest {
    pub fn validate(self) -> Result<NewEvent> {
        Ok(NewEvent {
            player_id: require_positive_id("playerId", self.player_id)?,
            pokemon_id: require_positive_id("pokemonId", self.pokemon_id)?,
            game_id: require_positive_id("gameId", self.game_id)?,
            route: require_text("route", &self.route, ROUTE_MAX_LEN)?,
            nickname: optional_nickname(self.nickname)?,
            status: self.status.unwrap_or_default(),
            is_shiny: self.is_shiny.unwrap_or(false),
            is_champion: self.is_champ.unwrap_or(false),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateEventRequest {
    pub route: Option<String>,
    /// `null` or `""` clears the nickname; omitting it keeps the stored one.
    #[serde(default, deserialize_with = "explicit_option")]
    pub nickname: Option<Option<String>>,
    pub status: Option<EventStatus>,
}

impl UpdateEventRequest {
    pub fn validate(
        self,
    ) -> Result<(Option<String>, Option<Option<String>>, Option<EventStatus>)> {
        if self.route.is_none() && self.nickname.is_none() && self.status.is_none() {
            return Err(AppError::BadRequest("Nothing to update".to_string()));
        }
        let route = self
            .route
            .as_deref()
            .map(|r| require_text("route", r, ROUTE_MAX_LEN))
            .transpose()?;
        let nickname = self.nickname.map(optional_nickname).transpose()?;
        Ok((route, nickname, self.status))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventStatusRequest {
    pub status: EventStatus,
}

/// Either flag may be omitted; omitted flags keep their stored value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventAttributesRequest {
    #[serde(default, deserialize_with = "optional_flag")]
    pub is_shiny: Option<bool>,
    #[serde(default, deserialize_with = "optional_flag")]
    pub is_champ: Option<bool>,
}

impl EventAttributesRequest {
    pub fn validate(&self) -> Result<()> {
        if self.is_shiny.is_none() && self.is_champ.is_none() {
            return Err(AppError::BadRequest(
                "isShiny or isChamp is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn optional_nickname(nickname: Option<String>) -> Result<Option<String>> {
    match nickname {
        Some(n) if n.trim().is_empty() => Ok(None),
        Some(n) => require_text("nickname", &n, NICKNAME_MAX_LEN).map(Some),
        None => Ok(None),
    }
}

/// Join row behind the event listing.
#[derive(Debug, FromRow)]
pub struct EventListingRow {
    pub id: i32,
    pub player_id: i32,
    pub pokemon_id: i32,
    pub game_id: i32,
    pub route: String,
    pub nickname: Option<String>,
    pub status: String,
    pub is_shiny: bool,
    pub is_champion: bool,
    pub created_at: DateTime<Utc>,
    pub pokemon_name: String,
    pub pokemon_form: Option<String>,
    pub pokemon_type1: String,
    pub pokemon_type2: Option<String>,
    pub pokemon_total: i32,
    pub pokemon_image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventWithPokemon {
    #[serde(flatten)]
    pub event: Event,
    pub pokemon: PokemonSummary,
}

impl From<EventListingRow> for EventWithPokemon {
    fn from(row: EventListingRow) -> Self {
        Self {
            pokemon: PokemonSummary {
                id: row.pokemon_id,
                name: row.pokemon_name,
                form: row.pokemon_form,
                type1: row.pokemon_type1,
                type2: row.pokemon_type2,
                total: row.pokemon_total,
                image: row.pokemon_image,
            },
            event: Event {
                id: row.id,
                player_id: row.player_id,
                pokemon_id: row.pokemon_id,
                game_id: row.game_id,
                route: row.route,
                nickname: row.nickname,
                status: row.status,
                is_shiny: row.is_shiny,
                is_champion: row.is_champion,
                created_at: row.created_at,
            },
        }
    }
}
