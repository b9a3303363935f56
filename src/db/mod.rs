use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    access::{Ownership, OwnershipStore, ResourceKind},
    config::Config,
    error::Result,
    models::{
        event::{EventListingRow, NewEvent},
        game::PlayerListingRow,
        *,
    },
};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        // migrations live at the crate root: ./migrations
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== OWNERSHIP LOOKUP ====================
#[async_trait]
impl OwnershipStore for Database {
    type Error = sqlx::Error;

    async fn ownership(
        &self,
        kind: ResourceKind,
        id: i32,
    ) -> std::result::Result<Option<Ownership>, sqlx::Error> {
        let sql = match kind {
            ResourceKind::Game => "SELECT user_id FROM games WHERE id = $1",
            ResourceKind::Player => "SELECT user_id FROM players WHERE id = $1",
            // Events belong to whoever owns their player
            ResourceKind::Event => {
                "SELECT p.user_id FROM events e
                 JOIN players p ON p.id = e.player_id
                 WHERE e.id = $1"
            }
            ResourceKind::Pokemon => {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT id FROM pokemon WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                return Ok(exists.map(|_| Ownership::Unowned));
            }
        };

        let owner: Option<i32> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(Ownership::Owned))
    }
}

// ==================== USER QUERIES ====================
impl Database {
    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2)
             RETURNING id, username, password_hash, created_at",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

// ==================== GAME QUERIES ====================
impl Database {
    pub async fn create_game(&self, user_id: i32, name: &str, player_count: i32) -> Result<Game> {
        let game = sqlx::query_as::<_, Game>(
            "INSERT INTO games (name, player_count, user_id) VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(name)
        .bind(player_count)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(game)
    }

    pub async fn list_games(&self, user_id: i32) -> Result<Vec<Game>> {
        let games = sqlx::query_as::<_, Game>(
            "SELECT * FROM games WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(games)
    }

    pub async fn get_game(&self, id: i32) -> Result<Option<Game>> {
        let game = sqlx::query_as::<_, Game>("SELECT * FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(game)
    }

    /// Runs under a row lock on the game so a concurrent link cannot slip in
    /// between the capacity check and the write.
    pub async fn update_game(
        &self,
        id: i32,
        name: Option<&str>,
        player_count: Option<i32>,
    ) -> Result<Option<Game>> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i32> =
            sqlx::query_scalar("SELECT id FROM games WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(None);
        }

        if let Some(new_count) = player_count {
            let linked: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM player_games WHERE game_id = $1")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            check_player_count_change(new_count, linked)?;
        }

        let game = sqlx::query_as::<_, Game>(
            "UPDATE games
             SET name = COALESCE($2, name),
                 player_count = COALESCE($3, player_count)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(player_count)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(game)
    }

    /// Links and events of the game go with it (ON DELETE CASCADE).
    pub async fn delete_game(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM games WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ==================== PLAYER QUERIES ====================
impl Database {
    pub async fn create_player(
        &self,
        user_id: i32,
        name: &str,
        pokemon_id: Option<i32>,
    ) -> Result<Player> {
        let player = sqlx::query_as::<_, Player>(
            "INSERT INTO players (name, pokemon_id, user_id) VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(name)
        .bind(pokemon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(player)
    }

    pub async fn list_players(&self, user_id: i32) -> Result<Vec<PlayerWithPokemon>> {
        let rows = sqlx::query_as::<_, PlayerListingRow>(
            r#"
            SELECT p.id, p.name, p.pokemon_id, p.user_id, p.created_at,
                   pk.name AS pokemon_name, pk.form AS pokemon_form,
                   pk.type1 AS pokemon_type1, pk.type2 AS pokemon_type2,
                   pk.total AS pokemon_total, pk.image AS pokemon_image
            FROM players p
            LEFT JOIN pokemon pk ON pk.id = p.pokemon_id
            WHERE p.user_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PlayerWithPokemon::from).collect())
    }

    pub async fn get_player(&self, id: i32) -> Result<Option<Player>> {
        let player = sqlx::query_as::<_, Player>("SELECT * FROM players WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(player)
    }

    /// `pokemon_id`: `None` keeps the favourite, `Some(None)` clears it.
    pub async fn update_player(
        &self,
        id: i32,
        name: Option<&str>,
        pokemon_id: Option<Option<i32>>,
    ) -> Result<Option<Player>> {
        let player = sqlx::query_as::<_, Player>(
            "UPDATE players
             SET name = COALESCE($2, name),
                 pokemon_id = CASE WHEN $3 THEN $4 ELSE pokemon_id END
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(pokemon_id.is_some())
        .bind(pokemon_id.flatten())
        .fetch_optional(&self.pool)
        .await?;
        Ok(player)
    }

    pub async fn delete_player(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM players WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ==================== PLAYER-GAME QUERIES ====================
impl Database {
    /// `None` when the game is gone. Capacity and duplicates are checked while
    /// the game row is locked, so concurrent links cannot overfill it.
    pub async fn link_player_to_game(
        &self,
        player_id: i32,
        game_id: i32,
    ) -> Result<Option<PlayerGame>> {
        let mut tx = self.pool.begin().await?;

        let capacity: Option<i32> =
            sqlx::query_scalar("SELECT player_count FROM games WHERE id = $1 FOR UPDATE")
                .bind(game_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(capacity) = capacity else {
            return Ok(None);
        };

        let linked: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM player_games WHERE game_id = $1")
                .bind(game_id)
                .fetch_one(&mut *tx)
                .await?;
        let already_linked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM player_games WHERE player_id = $1 AND game_id = $2)",
        )
        .bind(player_id)
        .bind(game_id)
        .fetch_one(&mut *tx)
        .await?;
        check_link_admission(already_linked, linked, capacity)?;

        let link = sqlx::query_as::<_, PlayerGame>(
            "INSERT INTO player_games (player_id, game_id) VALUES ($1, $2)
             RETURNING id, player_id, game_id",
        )
        .bind(player_id)
        .bind(game_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(link))
    }

    pub async fn list_game_players(&self, game_id: i32) -> Result<Vec<Player>> {
        let players = sqlx::query_as::<_, Player>(
            "SELECT p.* FROM players p
             JOIN player_games pg ON pg.player_id = p.id
             WHERE pg.game_id = $1
             ORDER BY pg.id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(players)
    }

    pub async fn is_player_in_game(&self, player_id: i32, game_id: i32) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM player_games WHERE player_id = $1 AND game_id = $2",
        )
        .bind(player_id)
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

// ==================== POKEMON QUERIES ====================
impl Database {
    pub async fn create_pokemon(&self, input: &PokemonInput) -> Result<Pokemon> {
        let pokemon = sqlx::query_as::<_, Pokemon>(
            r#"
            INSERT INTO pokemon
                (national_dex, name, form, type1, type2, total, hp, attack, defense,
                 special_attack, special_defense, speed, generation)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            RETURNING *
            "#,
        )
        .bind(input.national_dex)
        .bind(&input.name)
        .bind(&input.form)
        .bind(&input.type1)
        .bind(&input.type2)
        .bind(input.total())
        .bind(input.hp)
        .bind(input.attack)
        .bind(input.defense)
        .bind(input.special_attack)
        .bind(input.special_defense)
        .bind(input.speed)
        .bind(input.generation)
        .fetch_one(&self.pool)
        .await?;
        Ok(pokemon)
    }

    pub async fn list_pokemon(&self) -> Result<Vec<Pokemon>> {
        let pokemon =
            sqlx::query_as::<_, Pokemon>("SELECT * FROM pokemon ORDER BY national_dex, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(pokemon)
    }

    pub async fn get_pokemon(&self, id: i32) -> Result<Option<Pokemon>> {
        let pokemon = sqlx::query_as::<_, Pokemon>("SELECT * FROM pokemon WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(pokemon)
    }

    /// `pattern` is an already escaped ILIKE pattern.
    pub async fn search_pokemon(&self, pattern: &str, limit: i64) -> Result<Vec<PokemonSummary>> {
        let results = sqlx::query_as::<_, PokemonSummary>(
            r#"
            SELECT id, name, form, type1, type2, total, image
            FROM pokemon
            WHERE name ILIKE $1 ESCAPE '\' OR form ILIKE $1 ESCAPE '\'
            ORDER BY national_dex, id
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }

    pub async fn update_pokemon(&self, id: i32, input: &PokemonInput) -> Result<Option<Pokemon>> {
        let pokemon = sqlx::query_as::<_, Pokemon>(
            r#"
            UPDATE pokemon
            SET national_dex = $2, name = $3, form = $4, type1 = $5, type2 = $6,
                total = $7, hp = $8, attack = $9, defense = $10,
                special_attack = $11, special_defense = $12, speed = $13, generation = $14
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.national_dex)
        .bind(&input.name)
        .bind(&input.form)
        .bind(&input.type1)
        .bind(&input.type2)
        .bind(input.total())
        .bind(input.hp)
        .bind(input.attack)
        .bind(input.defense)
        .bind(input.special_attack)
        .bind(input.special_defense)
        .bind(input.speed)
        .bind(input.generation)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pokemon)
    }

    pub async fn set_pokemon_image(&self, id: i32, image: &str) -> Result<Option<Pokemon>> {
        let pokemon = sqlx::query_as::<_, Pokemon>(
            "UPDATE pokemon SET image = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pokemon)
    }

    /// Whether any catalog row other than `except_id` points at `image`.
    pub async fn pokemon_image_in_use(&self, image: &str, except_id: i32) -> Result<bool> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT id FROM pokemon WHERE image = $1 AND id <> $2 LIMIT 1")
                .bind(image)
                .bind(except_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Fails with a foreign-key violation while events still reference the entry.
    pub async fn delete_pokemon(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pokemon WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ==================== EVENT QUERIES ====================
impl Database {
    pub async fn create_event(&self, event: &NewEvent) -> Result<Event> {
        let created = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events
                (player_id, pokemon_id, game_id, route, nickname, status, is_shiny, is_champion)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            RETURNING *
            "#,
        )
        .bind(event.player_id)
        .bind(event.pokemon_id)
        .bind(event.game_id)
        .bind(&event.route)
        .bind(&event.nickname)
        .bind(event.status.as_str())
        .bind(event.is_shiny)
        .bind(event.is_champion)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn list_game_events(&self, game_id: i32) -> Result<Vec<EventWithPokemon>> {
        let rows = sqlx::query_as::<_, EventListingRow>(
            r#"
            SELECT e.id, e.player_id, e.pokemon_id, e.game_id, e.route, e.nickname,
                   e.status, e.is_shiny, e.is_champion, e.created_at,
                   pk.name AS pokemon_name, pk.form AS pokemon_form,
                   pk.type1 AS pokemon_type1, pk.type2 AS pokemon_type2,
                   pk.total AS pokemon_total, pk.image AS pokemon_image
            FROM events e
            JOIN pokemon pk ON pk.id = e.pokemon_id
            WHERE e.game_id = $1
            ORDER BY e.player_id, e.created_at, e.id
            "#,
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EventWithPokemon::from).collect())
    }

    pub async fn get_event(&self, id: i32) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    /// `nickname`: `None` keeps it, `Some(None)` clears it.
    pub async fn update_event(
        &self,
        id: i32,
        route: Option<&str>,
        nickname: Option<Option<&str>>,
        status: Option<EventStatus>,
    ) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            "UPDATE events
             SET route = COALESCE($2, route),
                 nickname = CASE WHEN $3 THEN $4 ELSE nickname END,
                 status = COALESCE($5, status)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(route)
        .bind(nickname.is_some())
        .bind(nickname.flatten())
        .bind(status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    pub async fn update_event_attributes(
        &self,
        id: i32,
        is_shiny: Option<bool>,
        is_champion: Option<bool>,
    ) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            "UPDATE events
             SET is_shiny = COALESCE($2, is_shiny),
                 is_champion = COALESCE($3, is_champion)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(is_shiny)
        .bind(is_champion)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    pub async fn delete_event(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let mut config = test_config();
        config.database_url = "not-a-url".to_string();
        let result = Database::new(&config).await;
        assert!(result.is_err());
    }
}
