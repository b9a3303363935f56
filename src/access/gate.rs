use std::fmt;

use super::{
    CatalogPolicy, Credential, CredentialError, CredentialVerifier, Operation, Ownership,
    OwnershipStore, Principal, ResourceKind,
};
use crate::{
    error::{AppError, Result},
    utils::parse_resource_id,
};

/// Resolved instance an allowed request acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub kind: ResourceKind,
    pub id: i32,
    pub ownership: Ownership,
}

/// Payload of an `Allow` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub principal: Principal,
    pub target: Option<Target>,
}

impl Grant {
    /// Owner to record on anything created under this grant.
    pub fn user_id(&self) -> i32 {
        self.principal.user_id
    }

    pub fn target_id(&self) -> Result<i32> {
        self.target
            .map(|t| t.id)
            .ok_or_else(|| AppError::Internal("Grant has no resolved target".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    Missing,
    Malformed,
    Invalid(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Missing => f.write_str("no Authorization header"),
            AuthFailure::Malformed => f.write_str("Authorization header is not a bearer token"),
            AuthFailure::Invalid(reason) => write!(f, "bearer token rejected: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Allow(Grant),
    DenyUnauthenticated(AuthFailure),
    DenyNotFound { kind: ResourceKind, id: String },
    DenyForbidden { kind: ResourceKind, id: i32 },
    Fault(String),
}

impl Outcome {
    /// Collapses the outcome into the handler-facing result.
    pub fn into_grant(self) -> Result<Grant> {
        match self {
            Outcome::Allow(grant) => Ok(grant),
            Outcome::DenyUnauthenticated(AuthFailure::Missing) => Err(AppError::Unauthenticated(
                "Access denied. No token provided.".to_string(),
            )),
            Outcome::DenyUnauthenticated(_) => Err(AppError::Unauthenticated(
                "Invalid or expired token".to_string(),
            )),
            Outcome::DenyNotFound { kind, .. } => Err(AppError::NotFound(format!("{} not found", kind))),
            Outcome::DenyForbidden { kind, .. } => Err(AppError::Forbidden(format!(
                "You are not authorized to modify this {}",
                kind.label().to_lowercase()
            ))),
            Outcome::Fault(detail) => Err(AppError::Fault(detail)),
        }
    }
}

/// Everything the gate needs to know about one request.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    pub credential: Credential<'a>,
    pub kind: ResourceKind,
    pub operation: Operation,
    pub id: Option<&'a str>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(credential: Credential<'a>, kind: ResourceKind, operation: Operation) -> Self {
        Self {
            credential,
            kind,
            operation,
            id: None,
        }
    }

    /// Raw path segment naming the instance.
    pub fn on(mut self, id: &'a str) -> Self {
        self.id = Some(id);
        self
    }
}

/// Authorization decision point.
///
/// Holds no state of its own: one credential verification and at most one
/// ownership lookup per call. It never performs the mutation it authorizes.
pub struct AccessGate<'a, V: ?Sized, S: ?Sized> {
    verifier: &'a V,
    store: &'a S,
    catalog: &'a CatalogPolicy,
}

impl<'a, V, S> AccessGate<'a, V, S>
where
    V: CredentialVerifier + ?Sized,
    S: OwnershipStore + ?Sized,
{
    pub fn new(verifier: &'a V, store: &'a S, catalog: &'a CatalogPolicy) -> Self {
        Self {
            verifier,
            store,
            catalog,
        }
    }

    pub async fn authorize(&self, request: AccessRequest<'_>) -> Outcome {
        let principal = match self.authenticate(request.credential) {
            Ok(principal) => principal,
            Err(outcome) => return outcome,
        };

        let outcome = match request.operation {
            Operation::Create => self.check_create(principal, request.kind),
            Operation::List => Outcome::Allow(Grant {
                principal,
                target: None,
            }),
            Operation::Read | Operation::Update | Operation::Delete => {
                let raw_id = request.id.unwrap_or_default();
                // Unparseable ids never reach the store.
                match parse_resource_id(raw_id) {
                    Some(id) => self.resolve(principal, request.kind, request.operation, id).await,
                    None => Outcome::DenyNotFound {
                        kind: request.kind,
                        id: raw_id.to_string(),
                    },
                }
            }
        };

        log_outcome(&principal, request.kind, request.operation, &outcome);
        outcome
    }

    /// Verifies the credential alone, for requests whose instances are all
    /// checked afterwards through [`AccessGate::authorize_for`].
    pub fn identify(&self, credential: Credential<'_>) -> Outcome {
        match self.authenticate(credential) {
            Ok(principal) => Outcome::Allow(Grant {
                principal,
                target: None,
            }),
            Err(outcome) => outcome,
        }
    }

    /// Checks an instance on behalf of an already authenticated principal,
    /// e.g. the game and player a new event points at.
    pub async fn authorize_for(
        &self,
        principal: Principal,
        kind: ResourceKind,
        operation: Operation,
        id: i32,
    ) -> Outcome {
        let outcome = self.resolve(principal, kind, operation, id).await;
        log_outcome(&principal, kind, operation, &outcome);
        outcome
    }

    fn authenticate(&self, credential: Credential<'_>) -> std::result::Result<Principal, Outcome> {
        let token = match credential {
            Credential::Absent => {
                tracing::debug!("access denied: {}", AuthFailure::Missing);
                return Err(Outcome::DenyUnauthenticated(AuthFailure::Missing));
            }
            Credential::Malformed => {
                tracing::debug!("access denied: {}", AuthFailure::Malformed);
                return Err(Outcome::DenyUnauthenticated(AuthFailure::Malformed));
            }
            Credential::Bearer(token) => token,
        };

        match self.verifier.verify(token) {
            Ok(principal) => Ok(principal),
            Err(CredentialError::Invalid(reason)) => {
                let failure = AuthFailure::Invalid(reason);
                tracing::debug!("access denied: {}", failure);
                Err(Outcome::DenyUnauthenticated(failure))
            }
            Err(CredentialError::Unavailable(reason)) => {
                tracing::error!("credential verifier unavailable: {}", reason);
                Err(Outcome::Fault(format!("credential verifier unavailable: {}", reason)))
            }
        }
    }

    fn check_create(&self, principal: Principal, kind: ResourceKind) -> Outcome {
        if kind == ResourceKind::Pokemon && !self.catalog.permits(&principal) {
            return Outcome::DenyForbidden { kind, id: 0 };
        }
        Outcome::Allow(Grant {
            principal,
            target: None,
        })
    }

    async fn resolve(
        &self,
        principal: Principal,
        kind: ResourceKind,
        operation: Operation,
        id: i32,
    ) -> Outcome {
        let ownership = match self.store.ownership(kind, id).await {
            Ok(Some(ownership)) => ownership,
            Ok(None) => {
                return Outcome::DenyNotFound {
                    kind,
                    id: id.to_string(),
                }
            }
            Err(e) => return Outcome::Fault(format!("{} lookup failed: {}", kind, e)),
        };

        let permitted = match ownership {
            Ownership::Owned(owner_id) => owner_id == principal.user_id,
            Ownership::Unowned => operation == Operation::Read || self.catalog.permits(&principal),
        };

        if !permitted {
            return Outcome::DenyForbidden { kind, id };
        }

        Outcome::Allow(Grant {
            principal,
            target: Some(Target {
                kind,
                id,
                ownership,
            }),
        })
    }
}

fn log_outcome(principal: &Principal, kind: ResourceKind, operation: Operation, outcome: &Outcome) {
    match outcome {
        Outcome::Allow(_) => {}
        Outcome::Fault(detail) => {
            tracing::error!(kind = %kind, operation = ?operation, "access check failed: {}", detail);
        }
        denied => {
            tracing::debug!(
                user_id = principal.user_id,
                kind = %kind,
                operation = ?operation,
                "access denied: {:?}",
                denied
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeVerifier;

    impl CredentialVerifier for FakeVerifier {
        fn verify(&self, token: &str) -> std::result::Result<Principal, CredentialError> {
            if token == "verifier-down" {
                return Err(CredentialError::Unavailable("key set offline".to_string()));
            }
            token
                .strip_prefix("user-")
                .and_then(|id| id.parse().ok())
                .map(|user_id| Principal { user_id })
                .ok_or_else(|| CredentialError::Invalid("signature mismatch".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeStore {
        rows: Mutex<HashMap<(ResourceKind, i32), Ownership>>,
        lookups: AtomicUsize,
        next_id: AtomicI32,
        offline: bool,
    }

    impl FakeStore {
        fn offline() -> Self {
            Self {
                offline: true,
                ..Self::default()
            }
        }

        fn insert(&self, kind: ResourceKind, id: i32, ownership: Ownership) {
            self.rows.lock().unwrap().insert((kind, id), ownership);
        }

        // Mirrors how handlers create rows: the owner comes from the grant only.
        fn create(&self, kind: ResourceKind, grant: &Grant) -> i32 {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.insert(kind, id, Ownership::Owned(grant.user_id()));
            id
        }

        fn remove(&self, kind: ResourceKind, id: i32) {
            self.rows.lock().unwrap().remove(&(kind, id));
        }

        fn contains(&self, kind: ResourceKind, id: i32) -> bool {
            self.rows.lock().unwrap().contains_key(&(kind, id))
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OwnershipStore for FakeStore {
        type Error = String;

        async fn ownership(
            &self,
            kind: ResourceKind,
            id: i32,
        ) -> std::result::Result<Option<Ownership>, String> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.offline {
                return Err("connection refused".to_string());
            }
            Ok(self.rows.lock().unwrap().get(&(kind, id)).copied())
        }
    }

    fn request(
        token: &'static str,
        kind: ResourceKind,
        operation: Operation,
    ) -> AccessRequest<'static> {
        AccessRequest::new(Credential::Bearer(token), kind, operation)
    }

    const KINDS: [ResourceKind; 4] = [
        ResourceKind::Game,
        ResourceKind::Player,
        ResourceKind::Pokemon,
        ResourceKind::Event,
    ];

    const OPERATIONS: [Operation; 5] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
        Operation::List,
    ];

    #[tokio::test]
    async fn missing_credential_is_denied_for_every_kind_and_operation() {
        let store = FakeStore::default();
        store.insert(ResourceKind::Game, 1, Ownership::Owned(1));
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        for kind in KINDS {
            for operation in OPERATIONS {
                for credential in [Credential::Absent, Credential::Malformed] {
                    let outcome = gate
                        .authorize(AccessRequest::new(credential, kind, operation).on("1"))
                        .await;
                    assert!(
                        matches!(outcome, Outcome::DenyUnauthenticated(_)),
                        "{:?} {:?} {:?} gave {:?}",
                        credential,
                        kind,
                        operation,
                        outcome
                    );
                }
            }
        }
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn garbage_token_is_denied_without_touching_the_store() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        for operation in [Operation::Create, Operation::Update, Operation::Delete] {
            let outcome = gate
                .authorize(request("garbage", ResourceKind::Player, operation).on("3"))
                .await;
            assert_eq!(
                outcome,
                Outcome::DenyUnauthenticated(AuthFailure::Invalid(
                    "signature mismatch".to_string()
                ))
            );
        }
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn verifier_malfunction_is_a_fault() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let outcome = gate
            .authorize(request("verifier-down", ResourceKind::Game, Operation::List))
            .await;
        assert!(matches!(outcome, Outcome::Fault(_)));
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn update_of_unknown_player_is_not_found() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        for operation in [Operation::Update, Operation::Delete] {
            let outcome = gate
                .authorize(request("user-1", ResourceKind::Player, operation).on("999999"))
                .await;
            assert_eq!(
                outcome,
                Outcome::DenyNotFound {
                    kind: ResourceKind::Player,
                    id: "999999".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn unparseable_ids_are_not_found_without_lookup() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        for raw in ["abc", "12abc", "99999999999", "", "1.5"] {
            let outcome = gate
                .authorize(request("user-1", ResourceKind::Game, Operation::Delete).on(raw))
                .await;
            assert!(
                matches!(outcome, Outcome::DenyNotFound { .. }),
                "{:?} gave {:?}",
                raw,
                outcome
            );
        }
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn existence_is_checked_before_ownership() {
        let store = FakeStore::default();
        store.insert(ResourceKind::Event, 5, Ownership::Owned(2));
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let missing = gate
            .authorize(request("user-1", ResourceKind::Event, Operation::Update).on("6"))
            .await;
        assert!(matches!(missing, Outcome::DenyNotFound { .. }));

        let foreign = gate
            .authorize(request("user-1", ResourceKind::Event, Operation::Update).on("5"))
            .await;
        assert_eq!(
            foreign,
            Outcome::DenyForbidden {
                kind: ResourceKind::Event,
                id: 5
            }
        );
    }

    #[tokio::test]
    async fn other_owner_is_forbidden_for_read_update_delete() {
        let store = FakeStore::default();
        store.insert(ResourceKind::Player, 10, Ownership::Owned(1));
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        for operation in [Operation::Read, Operation::Update, Operation::Delete] {
            let outcome = gate
                .authorize(request("user-2", ResourceKind::Player, operation).on("10"))
                .await;
            assert!(matches!(outcome, Outcome::DenyForbidden { .. }));
        }
    }

    #[tokio::test]
    async fn owner_is_allowed_with_resolved_target() {
        let store = FakeStore::default();
        store.insert(ResourceKind::Game, 4, Ownership::Owned(1));
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let outcome = gate
            .authorize(request("user-1", ResourceKind::Game, Operation::Update).on("4"))
            .await;
        let grant = outcome.into_grant().unwrap();
        assert_eq!(grant.user_id(), 1);
        assert_eq!(grant.target_id().unwrap(), 4);
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn foreign_delete_leaves_game_in_place() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let grant_a = gate
            .authorize(request("user-1", ResourceKind::Game, Operation::Create))
            .await
            .into_grant()
            .unwrap();
        let game_id = store.create(ResourceKind::Game, &grant_a);
        let raw_id = game_id.to_string();

        let outcome = gate
            .authorize(AccessRequest::new(
                Credential::Bearer("user-2"),
                ResourceKind::Game,
                Operation::Delete,
            )
            .on(&raw_id))
            .await;
        if let Outcome::Allow(_) = outcome {
            store.remove(ResourceKind::Game, game_id);
        }

        assert!(matches!(outcome, Outcome::DenyForbidden { .. }));
        assert!(store.contains(ResourceKind::Game, game_id));
    }

    #[tokio::test]
    async fn created_resource_reads_back_with_creator_as_owner() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let grant = gate
            .authorize(request("user-7", ResourceKind::Player, Operation::Create))
            .await
            .into_grant()
            .unwrap();
        assert!(grant.target.is_none());
        let player_id = store.create(ResourceKind::Player, &grant);
        let raw_id = player_id.to_string();

        let read = gate
            .authorize(AccessRequest::new(
                Credential::Bearer("user-7"),
                ResourceKind::Player,
                Operation::Read,
            )
            .on(&raw_id))
            .await
            .into_grant()
            .unwrap();
        assert_eq!(
            read.target.map(|t| t.ownership),
            Some(Ownership::Owned(7))
        );
    }

    #[tokio::test]
    async fn list_only_requires_authentication() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let grant = gate
            .authorize(request("user-3", ResourceKind::Event, Operation::List))
            .await
            .into_grant()
            .unwrap();
        assert_eq!(grant.principal, Principal { user_id: 3 });
        assert_eq!(store.lookups(), 0);
    }

    #[test]
    fn identify_checks_the_credential_only() {
        let store = FakeStore::default();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let grant = gate
            .identify(Credential::Bearer("user-8"))
            .into_grant()
            .unwrap();
        assert_eq!(grant.principal, Principal { user_id: 8 });
        assert_eq!(grant.target, None);

        assert_eq!(
            gate.identify(Credential::Absent),
            Outcome::DenyUnauthenticated(AuthFailure::Missing)
        );
        assert!(matches!(
            gate.identify(Credential::Bearer("garbage")),
            Outcome::DenyUnauthenticated(AuthFailure::Invalid(_))
        ));
        assert_eq!(store.lookups(), 0);
    }

    #[tokio::test]
    async fn store_failure_is_a_fault_not_a_missing_resource() {
        let store = FakeStore::offline();
        let catalog = CatalogPolicy::default();
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);

        let outcome = gate
            .authorize(request("user-1", ResourceKind::Game, Operation::Delete).on("1"))
            .await;
        assert!(matches!(outcome, Outcome::Fault(_)));
        assert!(matches!(outcome.into_grant(), Err(AppError::Fault(_))));
    }

    #[tokio::test]
    async fn catalog_entries_follow_the_catalog_policy() {
        let store = FakeStore::default();
        store.insert(ResourceKind::Pokemon, 25, Ownership::Unowned);

        let open = CatalogPolicy::Authenticated;
        let gate = AccessGate::new(&FakeVerifier, &store, &open);
        let outcome = gate
            .authorize(request("user-9", ResourceKind::Pokemon, Operation::Update).on("25"))
            .await;
        assert!(matches!(outcome, Outcome::Allow(_)));

        let admins = CatalogPolicy::Admins(vec![1]);
        let gate = AccessGate::new(&FakeVerifier, &store, &admins);
        let denied = gate
            .authorize(request("user-9", ResourceKind::Pokemon, Operation::Delete).on("25"))
            .await;
        assert!(matches!(denied, Outcome::DenyForbidden { .. }));

        let create = gate
            .authorize(request("user-9", ResourceKind::Pokemon, Operation::Create))
            .await;
        assert!(matches!(create, Outcome::DenyForbidden { .. }));

        let read = gate
            .authorize(request("user-9", ResourceKind::Pokemon, Operation::Read).on("25"))
            .await;
        assert!(matches!(read, Outcome::Allow(_)));

        let admin = gate
            .authorize(request("user-1", ResourceKind::Pokemon, Operation::Delete).on("25"))
            .await;
        assert!(matches!(admin, Outcome::Allow(_)));
    }

    #[test]
    fn outcomes_map_to_app_errors() {
        let missing = Outcome::DenyUnauthenticated(AuthFailure::Missing).into_grant();
        assert!(matches!(missing, Err(AppError::Unauthenticated(_))));

        let not_found = Outcome::DenyNotFound {
            kind: ResourceKind::Game,
            id: "1".to_string(),
        }
        .into_grant();
        assert!(matches!(not_found, Err(AppError::NotFound(_))));

        let forbidden = Outcome::DenyForbidden {
            kind: ResourceKind::Game,
            id: 1,
        }
        .into_grant();
        assert!(matches!(forbidden, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn referenced_instances_are_checked_for_the_same_principal() {
        let store = FakeStore::default();
        store.insert(ResourceKind::Game, 1, Ownership::Owned(1));
        store.insert(ResourceKind::Player, 2, Ownership::Owned(2));
        store.insert(ResourceKind::Pokemon, 25, Ownership::Unowned);
        let catalog = CatalogPolicy::Admins(vec![]);
        let gate = AccessGate::new(&FakeVerifier, &store, &catalog);
        let principal = Principal { user_id: 1 };

        let game = gate
            .authorize_for(principal, ResourceKind::Game, Operation::Read, 1)
            .await;
        assert!(matches!(game, Outcome::Allow(_)));

        let foreign_player = gate
            .authorize_for(principal, ResourceKind::Player, Operation::Read, 2)
            .await;
        assert!(matches!(
            foreign_player,
            Outcome::DenyForbidden { kind: ResourceKind::Player, id: 2 }
        ));

        // Reading the catalog ignores the write policy
        let pokemon = gate
            .authorize_for(principal, ResourceKind::Pokemon, Operation::Read, 25)
            .await;
        assert!(matches!(pokemon, Outcome::Allow(_)));

        let missing = gate
            .authorize_for(principal, ResourceKind::Pokemon, Operation::Read, 9999)
            .await;
        assert!(matches!(missing, Outcome::DenyNotFound { .. }));
        assert_eq!(
            missing.into_grant().unwrap_err().to_string(),
            "Not found: Pokémon not found"
        );
    }
}
