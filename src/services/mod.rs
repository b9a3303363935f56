pub mod sprite_storage;

pub use sprite_storage::SpriteStorage;
