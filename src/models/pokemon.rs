use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::require_text;
use crate::{
    constants::{MAX_GENERATION, MAX_NATIONAL_DEX, NAME_MAX_LEN},
    error::{AppError, Result},
};

// ==================== POKEMON ====================
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Pokemon {
    pub id: i32,
    pub national_dex: i32,
    pub name: String,
    pub form: Option<String>,
    pub type1: String,
    pub type2: Option<String>,
    pub total: i32,
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub special_attack: i32,
    pub special_defense: i32,
    pub speed: i32,
    pub generation: i32,
    /// Sprite file stem under the sprite directory.
    pub image: Option<String>,
}

/// The fields cards and listings need.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PokemonSummary {
    pub id: i32,
    pub name: String,
    pub form: Option<String>,
    pub type1: String,
    pub type2: Option<String>,
    pub total: i32,
    pub image: Option<String>,
}

/// Body for catalog create and full update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PokemonInput {
    pub national_dex: i32,
    pub name: String,
    #[serde(default)]
    pub form: Option<String>,
    pub type1: String,
    #[serde(default)]
    pub type2: Option<String>,
    #[serde(default)]
    pub total: Option<i32>,
    pub hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub special_attack: i32,
    pub special_defense: i32,
    pub speed: i32,
    pub generation: i32,
}

impl PokemonInput {
    /// Normalizes text fields and fills `total` from the base stats.
    pub fn validate(mut self) -> Result<Self> {
        if !(1..=MAX_NATIONAL_DEX).contains(&self.national_dex) {
            return Err(AppError::BadRequest(format!(
                "nationalDex must be between 1 and {}",
                MAX_NATIONAL_DEX
            )));
        }
        if !(1..=MAX_GENERATION).contains(&self.generation) {
            return Err(AppError::BadRequest(format!(
                "generation must be between 1 and {}",
                MAX_GENERATION
            )));
        }

        self.name = require_text("name", &self.name, NAME_MAX_LEN)?;
        self.type1 = require_text("type1", &self.type1, NAME_MAX_LEN)?;
        self.form = optional_text("form", self.form)?;
        self.type2 = optional_text("type2", self.type2)?;
        if self.type2.as_deref() == Some(self.type1.as_str()) {
            self.type2 = None;
        }

        let stats = [
            self.hp,
            self.attack,
            self.defense,
            self.special_attack,
            self.special_defense,
            self.speed,
        ];
        if stats.iter().any(|s| !(1..=255).contains(s)) {
            return Err(AppError::BadRequest(
                "base stats must be between 1 and 255".to_string(),
            ));
        }
        let sum: i32 = stats.iter().sum();
        match self.total {
            Some(total) if total != sum => {
                return Err(AppError::BadRequest(format!(
                    "total {} does not match the sum of base stats {}",
                    total, sum
                )));
            }
            _ => self.total = Some(sum),
        }

        Ok(self)
    }

    pub fn total(&self) -> i32 {
        self.total.unwrap_or_else(|| {
            self.hp
                + self.attack
                + self.defense
                + self.special_attack
                + self.special_defense
                + self.speed
        })
    }
}

fn optional_text(field: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => require_text(field, &v, NAME_MAX_LEN).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pikachu() -> PokemonInput {
        PokemonInput {
            national_dex: 25,
            name: " Pikachu ".to_string(),
            form: Some("".to_string()),
            type1: "Electric".to_string(),
            type2: None,
            total: None,
            hp: 35,
            attack: 55,
            defense: 40,
            special_attack: 50,
            special_defense: 50,
            speed: 90,
            generation: 1,
        }
    }

    #[test]
    fn validate_fills_total_and_trims() {
        let input = pikachu().validate().unwrap();
        assert_eq!(input.name, "Pikachu");
        assert_eq!(input.form, None);
        assert_eq!(input.total(), 320);
    }

    #[test]
    fn validate_rejects_inconsistent_total() {
        let mut input = pikachu();
        input.total = Some(999);
        assert!(input.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_dex() {
        let mut input = pikachu();
        input.national_dex = 0;
        assert!(input.validate().is_err());
    }

    #[test]
    fn validate_drops_duplicate_secondary_type() {
        let mut input = pikachu();
        input.type2 = Some("Electric".to_string());
        assert_eq!(input.validate().unwrap().type2, None);
    }
}
