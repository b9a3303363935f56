use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{
    config::Config,
    constants::SPRITE_MIME_TYPES,
    error::AppError,
    models::Pokemon,
    utils::slugify,
};

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("Unsupported sprite type: {0}")]
    UnsupportedType(String),

    #[error("Sprite content does not match {0}")]
    ContentMismatch(&'static str),

    #[error("Sprite is empty")]
    Empty,

    #[error("Sprite exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Sprite storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SpriteError> for AppError {
    fn from(e: SpriteError) -> Self {
        match e {
            SpriteError::TooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            SpriteError::Io(io) => AppError::Io(io),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSprite {
    /// Value recorded in `pokemon.image`.
    pub stem: String,
    pub file_name: String,
}

/// Disk storage for catalog sprites.
///
/// Files are named `<dex>-<name>[-<form>]-<id>.<ext>`. The trailing row id
/// keeps stems distinct even for entries sharing dex, name and form;
/// uploading again for the same entry replaces its previous file.
#[derive(Debug, Clone)]
pub struct SpriteStorage {
    dir: PathBuf,
    max_bytes: usize,
}

impl SpriteStorage {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.upload_dir.clone(), config.upload_max_bytes)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// MIME filter; returns the extension files of that type are stored with.
    pub fn extension_for(content_type: &str) -> Result<&'static str, SpriteError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        SPRITE_MIME_TYPES
            .iter()
            .find(|(mime, _)| *mime == essence)
            .map(|(_, ext)| *ext)
            .ok_or(SpriteError::UnsupportedType(essence))
    }

    pub fn file_stem(pokemon: &Pokemon) -> String {
        let mut stem = format!("{:04}-{}", pokemon.national_dex, slugify(&pokemon.name));
        if let Some(form) = pokemon.form.as_deref().map(slugify).filter(|f| !f.is_empty()) {
            stem.push('-');
            stem.push_str(&form);
        }
        stem.push_str(&format!("-{}", pokemon.id));
        stem
    }

    pub async fn save(
        &self,
        pokemon: &Pokemon,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredSprite, SpriteError> {
        let extension = Self::extension_for(content_type)?;
        if bytes.is_empty() {
            return Err(SpriteError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(SpriteError::TooLarge {
                limit: self.max_bytes,
            });
        }
        if !content_matches(extension, bytes) {
            return Err(SpriteError::ContentMismatch(extension));
        }

        self.ensure_dir().await?;

        let stem = Self::file_stem(pokemon);
        let file_name = format!("{}.{}", stem, extension);
        let final_path = self.dir.join(&file_name);
        let tmp_path = self.dir.join(format!(".{}.tmp", file_name));

        tokio::fs::write(&tmp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        // One file per stem
        for (_, other_ext) in SPRITE_MIME_TYPES.iter().filter(|(_, ext)| *ext != extension) {
            let stale = self.dir.join(format!("{}.{}", stem, other_ext));
            match tokio::fs::remove_file(&stale).await {
                Ok(()) => tracing::debug!("removed stale sprite {}", stale.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("could not remove stale sprite {}: {}", stale.display(), e),
            }
        }

        tracing::info!(pokemon_id = pokemon.id, "stored sprite {}", file_name);
        Ok(StoredSprite { stem, file_name })
    }

    /// Deletes every stored variant of `stem`; returns how many files went.
    pub async fn remove(&self, stem: &str) -> Result<usize, SpriteError> {
        let mut removed = 0;
        for (_, ext) in SPRITE_MIME_TYPES.iter() {
            let path = self.dir.join(format!("{}.{}", stem, ext));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

fn content_matches(extension: &str, bytes: &[u8]) -> bool {
    match extension {
        "png" => bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        "jpg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "gif" => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        "webp" => bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn charizard(form: Option<&str>) -> Pokemon {
        Pokemon {
            id: 6,
            national_dex: 6,
            name: "Charizard".to_string(),
            form: form.map(str::to_string),
            type1: "Fire".to_string(),
            type2: Some("Flying".to_string()),
            total: 534,
            hp: 78,
            attack: 84,
            defense: 78,
            special_attack: 109,
            special_defense: 85,
            speed: 100,
            generation: 1,
            image: None,
        }
    }

    #[test]
    fn mime_filter_accepts_images_only() {
        assert_eq!(SpriteStorage::extension_for("image/png").unwrap(), "png");
        assert_eq!(
            SpriteStorage::extension_for("IMAGE/JPEG; charset=binary").unwrap(),
            "jpg"
        );
        assert!(matches!(
            SpriteStorage::extension_for("application/pdf"),
            Err(SpriteError::UnsupportedType(_))
        ));
        assert!(SpriteStorage::extension_for("image/svg+xml").is_err());
    }

    #[test]
    fn file_stem_follows_naming_convention() {
        assert_eq!(SpriteStorage::file_stem(&charizard(None)), "0006-charizard-6");
        assert_eq!(
            SpriteStorage::file_stem(&charizard(Some("Mega X"))),
            "0006-charizard-mega-x-6"
        );
        assert_eq!(SpriteStorage::file_stem(&charizard(Some("  "))), "0006-charizard-6");
    }

    #[tokio::test]
    async fn save_writes_file_under_stem() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpriteStorage::new(dir.path().join("sprites"), 1024);

        let stored = storage.save(&charizard(None), "image/png", PNG).await.unwrap();
        assert_eq!(stored.stem, "0006-charizard-6");
        assert_eq!(stored.file_name, "0006-charizard-6.png");

        let written = std::fs::read(storage.dir().join("0006-charizard-6.png")).unwrap();
        assert_eq!(written, PNG);
        assert!(!storage.dir().join(".0006-charizard-6.png.tmp").exists());
    }

    #[tokio::test]
    async fn save_replaces_sprite_with_other_extension() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpriteStorage::new(dir.path(), 1024);
        let gif = b"GIF89a\x01\x00\x01\x00";

        storage.save(&charizard(None), "image/gif", gif).await.unwrap();
        storage.save(&charizard(None), "image/png", PNG).await.unwrap();

        assert!(dir.path().join("0006-charizard-6.png").exists());
        assert!(!dir.path().join("0006-charizard-6.gif").exists());
    }

    #[tokio::test]
    async fn save_rejects_oversized_and_mislabelled_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpriteStorage::new(dir.path(), 8);

        let too_big = storage.save(&charizard(None), "image/png", PNG).await;
        assert!(matches!(too_big, Err(SpriteError::TooLarge { limit: 8 })));

        let storage = SpriteStorage::new(dir.path(), 1024);
        let mislabelled = storage.save(&charizard(None), "image/jpeg", PNG).await;
        assert!(matches!(mislabelled, Err(SpriteError::ContentMismatch("jpg"))));

        let empty = storage.save(&charizard(None), "image/png", &[]).await;
        assert!(matches!(empty, Err(SpriteError::Empty)));
    }

    #[tokio::test]
    async fn remove_deletes_stored_variants() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpriteStorage::new(dir.path(), 1024);
        let stored = storage.save(&charizard(None), "image/png", PNG).await.unwrap();

        assert_eq!(storage.remove(&stored.stem).await.unwrap(), 1);
        assert!(!dir.path().join("0006-charizard-6.png").exists());
        assert_eq!(storage.remove(&stored.stem).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn entries_sharing_identity_keep_separate_sprites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SpriteStorage::new(dir.path(), 1024);
        let first = charizard(None);
        let mut second = charizard(None);
        second.id = 7;
        let gif = b"GIF89a\x01\x00\x01\x00";

        let a = storage.save(&first, "image/png", PNG).await.unwrap();
        let b = storage.save(&second, "image/gif", gif).await.unwrap();
        assert_ne!(a.stem, b.stem);

        storage.remove(&b.stem).await.unwrap();
        let kept = std::fs::read(dir.path().join(&a.file_name)).unwrap();
        assert_eq!(kept, PNG);
    }

    #[test]
    fn sprite_errors_map_to_client_errors() {
        let too_large: AppError = SpriteError::TooLarge { limit: 1 }.into();
        assert!(matches!(too_large, AppError::PayloadTooLarge(_)));
        let bad_type: AppError = SpriteError::UnsupportedType("text/plain".into()).into();
        assert!(matches!(bad_type, AppError::BadRequest(_)));
    }
}
