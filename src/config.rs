use std::env;
use std::path::PathBuf;

use crate::access::CatalogPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // JWT
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,

    // Sprite uploads
    pub upload_dir: PathBuf,
    pub upload_max_bytes: usize,

    // Access control
    pub legacy_auth_status: bool,
    pub catalog_policy: CatalogPolicy,

    // CORS
    pub cors_allowed_origins: String,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| {
            let normalized = v.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,

            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./uploads/sprites".to_string())
                .into(),
            upload_max_bytes: env::var("UPLOAD_MAX_BYTES")
                .unwrap_or_else(|_| "2097152".to_string())
                .parse()?,

            legacy_auth_status: env_flag("LEGACY_AUTH_STATUS", true),
            catalog_policy: CatalogPolicy::parse(
                &env::var("CATALOG_WRITE_POLICY").unwrap_or_default(),
                &env::var("CATALOG_ADMIN_IDS").unwrap_or_default(),
            )?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET is empty");
        }
        if self.jwt_expiry_hours == 0 {
            anyhow::bail!("JWT_EXPIRY_HOURS must be > 0");
        }
        if self.upload_max_bytes == 0 {
            anyhow::bail!("UPLOAD_MAX_BYTES must be > 0");
        }
        if self.upload_dir.as_os_str().is_empty() {
            anyhow::bail!("UPLOAD_DIR is empty");
        }

        if self.jwt_secret == "secret" || self.jwt_secret.len() < 16 {
            tracing::warn!("Detected weak JWT_SECRET; do not use it outside development");
        }

        if let CatalogPolicy::Admins(ids) = &self.catalog_policy {
            if ids.is_empty() {
                tracing::warn!("CATALOG_WRITE_POLICY=admins with no CATALOG_ADMIN_IDS; catalog is read-only");
            }
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            database_url: "postgres://localhost/poke_tracker_test".to_string(),
            database_max_connections: 1,
            jwt_secret: "test_secret_with_enough_length".to_string(),
            jwt_expiry_hours: 24,
            upload_dir: PathBuf::from("./uploads/sprites"),
            upload_max_bytes: 1024,
            legacy_auth_status: true,
            catalog_policy: CatalogPolicy::Authenticated,
            cors_allowed_origins: "*".to_string(),
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_secret() {
        let mut config = test_config();
        config.jwt_secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_upload_limit() {
        let mut config = test_config();
        config.upload_max_bytes = 0;
        assert!(config.validate().is_err());
    }
}
