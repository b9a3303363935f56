/// Application constants

// API version
pub const API_VERSION: &str = "v1";

// Accounts
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;

// Games & players
pub const NAME_MAX_LEN: usize = 64;
pub const MAX_PLAYERS_PER_GAME: i32 = 16;

// Events
pub const ROUTE_MAX_LEN: usize = 64;
pub const NICKNAME_MAX_LEN: usize = 32;
pub const EVENT_STATUS_CAUGHT: &str = "Catched";
pub const EVENT_STATUS_RUN_AWAY: &str = "Run Away";
pub const EVENT_STATUS_DEFEATED: &str = "Defeated";

// Pokédex
pub const MAX_NATIONAL_DEX: i32 = 1025;
pub const MAX_GENERATION: i32 = 9;
pub const SEARCH_RESULT_LIMIT: i64 = 20;

// Sprite uploads
pub const SPRITE_FIELD_NAME: &str = "sprite";
pub const SPRITE_ROUTE_PREFIX: &str = "/sprites";
pub const SPRITE_MIME_TYPES: [(&str, &str); 4] = [
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];
