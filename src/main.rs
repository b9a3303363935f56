use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod access;
mod api;
mod config;
mod constants;
mod crypto;
mod db;
mod error;
mod models;
mod services;
mod utils;

use config::Config;
use constants::{API_VERSION, SPRITE_ROUTE_PREFIX};
use db::Database;

// Multipart framing on top of the sprite itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poke_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting poke-tracker server");
    tracing::info!("Environment: {}", config.environment);
    if config.is_development() {
        tracing::warn!("Development mode; do not expose this instance publicly");
    }
    tracing::info!("API Version: {}", API_VERSION);
    if config.legacy_auth_status {
        tracing::info!("Unauthenticated requests answer 400 (LEGACY_AUTH_STATUS)");
    }

    // Initialize database
    let db = Database::new(&config).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    let app_state = api::AppState::new(db, config.clone());
    app_state.sprites.ensure_dir().await?;
    tracing::info!("Serving sprites from {}", app_state.sprites.dir().display());

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);
    let sprites = ServeDir::new(state.sprites.dir());
    let upload_limit = state.sprites.max_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Authentication
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        // Games
        .route(
            "/games",
            post(api::games::create_game).get(api::games::list_games),
        )
        .route(
            "/games/{id}",
            get(api::games::get_game)
                .put(api::games::update_game)
                .delete(api::games::delete_game),
        )
        // Players
        .route(
            "/players",
            post(api::players::create_player).get(api::players::list_players),
        )
        .route(
            "/players/{id}",
            get(api::players::get_player)
                .put(api::players::update_player)
                .delete(api::players::delete_player),
        )
        // Player <-> game links
        .route("/player-games", post(api::player_games::link_player))
        .route(
            "/player-games/{game_id}",
            get(api::player_games::list_game_players),
        )
        // Events
        .route(
            "/events",
            post(api::events::create_event).get(api::events::list_events),
        )
        .route(
            "/events/{id}",
            get(api::events::get_event)
                .put(api::events::update_event)
                .delete(api::events::delete_event),
        )
        .route(
            "/events/{id}/status",
            patch(api::events::update_event_status),
        )
        .route(
            "/events/{id}/attributes",
            put(api::events::update_event_attributes),
        )
        // Pokemon catalog
        .route(
            "/pokemons/pokemon",
            get(api::pokemon::list_pokemon).post(api::pokemon::create_pokemon),
        )
        .route(
            "/pokemons/pokemon/{id}",
            get(api::pokemon::get_pokemon)
                .put(api::pokemon::update_pokemon)
                .delete(api::pokemon::delete_pokemon),
        )
        .route(
            "/pokemons/pokemon/{id}/sprite",
            post(api::pokemon::upload_sprite).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/pokemons/search", get(api::pokemon::search_pokemon))
        // Sprite files
        .nest_service(SPRITE_ROUTE_PREFIX, sprites)
        .layer(middleware::map_response_with_state(
            state.clone(),
            api::legacy_auth_status,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

