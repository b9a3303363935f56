//! Access control shared by every resource endpoint.
//!
//! Handlers never compare owner ids themselves. They describe the request
//! (credential, resource kind, operation, raw path id) and hand it to
//! [`AccessGate`], which authenticates, resolves and checks ownership before
//! any write happens.

pub mod gate;

pub use gate::{AccessGate, AccessRequest, Grant};

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::fmt;
use thiserror::Error;

// ==================== IDENTITY ====================

/// Authenticated identity, used as the `userId` ownership key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
    pub user_id: i32,
}

/// Bearer credential as it arrived on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Absent,
    Malformed,
    Bearer(&'a str),
}

impl<'a> Credential<'a> {
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Credential::Absent;
        };
        let Ok(raw) = value.to_str() else {
            return Credential::Malformed;
        };
        match raw.strip_prefix("Bearer ").map(str::trim) {
            Some(token) if !token.is_empty() => Credential::Bearer(token),
            _ => Credential::Malformed,
        }
    }
}

// ==================== RESOURCES ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Game,
    Player,
    Pokemon,
    Event,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Game => "Game",
            ResourceKind::Player => "Player",
            ResourceKind::Pokemon => "Pokémon",
            ResourceKind::Event => "Event",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    List,
}

/// Who a stored instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned(i32),
    /// Catalog entries have no owner.
    Unowned,
}

// ==================== COLLABORATORS ====================

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("token rejected: {0}")]
    Invalid(String),

    #[error("credential verifier unavailable: {0}")]
    Unavailable(String),
}

/// Turns a bearer token into a principal.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, CredentialError>;
}

/// Ownership lookup the gate needs from persistence.
///
/// `Ok(None)` means the instance does not exist; `Err` means the store could
/// not answer at all.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    type Error: fmt::Display + Send;

    async fn ownership(
        &self,
        kind: ResourceKind,
        id: i32,
    ) -> Result<Option<Ownership>, Self::Error>;
}

// ==================== CATALOG POLICY ====================

/// Write access rule for the unowned Pokémon catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CatalogPolicy {
    /// Any authenticated principal may edit the catalog.
    #[default]
    Authenticated,
    /// Only the listed user ids may edit the catalog.
    Admins(Vec<i32>),
}

impl CatalogPolicy {
    pub fn parse(policy: &str, admin_ids: &str) -> anyhow::Result<Self> {
        match policy.trim().to_ascii_lowercase().as_str() {
            "" | "authenticated" => Ok(CatalogPolicy::Authenticated),
            "admins" => {
                let ids = admin_ids
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<i32>()
                            .map_err(|_| anyhow::anyhow!("Invalid catalog admin id: {}", s))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Ok(CatalogPolicy::Admins(ids))
            }
            other => anyhow::bail!("Unknown CATALOG_WRITE_POLICY: {}", other),
        }
    }

    pub fn permits(&self, principal: &Principal) -> bool {
        match self {
            CatalogPolicy::Authenticated => true,
            CatalogPolicy::Admins(ids) => ids.contains(&principal.user_id),
        }
    }
}
