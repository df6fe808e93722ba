//! In-memory credential store.
//!
//! [`CredentialStore`] is the single source of truth for the current access
//! and refresh credentials. It is constructed once per session and shared by
//! `Arc` between the request decorator, the refresh coordinator and the
//! client. Nothing here touches durable storage except
//! [`migrate_from_legacy`](CredentialStore::migrate_from_legacy), which moves
//! credentials *out* of it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::legacy::{LEGACY_ACCESS_KEY, LEGACY_REFRESH_KEY, LegacyStore};
use crate::secret::Secret;

/// An access credential and the refresh credential minted alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived bearer credential.
    #[serde(rename = "accessToken")]
    pub access: Secret,

    /// Longer-lived credential used only to mint new access credentials.
    #[serde(rename = "refreshToken", default)]
    pub refresh: Option<Secret>,
}

impl CredentialPair {
    /// Create a pair with both credentials.
    pub fn new(access: impl Into<Secret>, refresh: impl Into<Secret>) -> Self {
        Self {
            access: access.into(),
            refresh: Some(refresh.into()),
        }
    }

    /// Create a pair that has no refresh credential.
    pub fn access_only(access: impl Into<Secret>) -> Self {
        Self {
            access: access.into(),
            refresh: None,
        }
    }
}

/// Process-memory credential store.
///
/// Both credentials live in one slot behind one lock, so they are always
/// replaced and cleared together. Every write bumps a generation counter;
/// the refresh coordinator uses it to detect a sign-out or sign-in that
/// happened while a refresh was in flight.
///
/// None of the operations fail; absence is `None`.
#[derive(Default)]
pub struct CredentialStore {
    slot: RwLock<Slot>,
}

#[derive(Default)]
struct Slot {
    pair: Option<CredentialPair>,
    generation: u64,
}

impl Slot {
    fn replace(&mut self, pair: Option<CredentialPair>) {
        self.pair = pair;
        self.generation = self.generation.wrapping_add(1);
    }
}

impl CredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both credentials.
    ///
    /// The values are not validated.
    pub fn set_credentials(&self, access: impl Into<Secret>, refresh: Option<Secret>) {
        self.set_pair(CredentialPair {
            access: access.into(),
            refresh,
        });
    }

    /// Replace both credentials from a pair.
    pub fn set_pair(&self, pair: CredentialPair) {
        self.slot.write().replace(Some(pair));
    }

    /// Current access credential.
    pub fn access(&self) -> Option<Secret> {
        self.slot.read().pair.as_ref().map(|pair| pair.access.clone())
    }

    /// Current refresh credential.
    pub fn refresh(&self) -> Option<Secret> {
        self.slot.read().pair.as_ref().and_then(|pair| pair.refresh.clone())
    }

    /// Current refresh credential together with the generation it was read at.
    pub fn refresh_at_generation(&self) -> (Option<Secret>, u64) {
        let slot = self.slot.read();
        let refresh = slot.pair.as_ref().and_then(|pair| pair.refresh.clone());
        (refresh, slot.generation)
    }

    /// Counter bumped by every set and clear.
    pub fn generation(&self) -> u64 {
        self.slot.read().generation
    }

    /// Drop both credentials. Idempotent.
    pub fn clear(&self) {
        self.slot.write().replace(None);
    }

    /// Store `pair` only if nothing was written since `generation`.
    pub fn set_pair_if_generation(&self, pair: CredentialPair, generation: u64) -> bool {
        let mut slot = self.slot.write();
        if slot.generation != generation {
            return false;
        }
        slot.replace(Some(pair));
        true
    }

    /// Clear only if nothing was written since `generation`.
    pub fn clear_if_generation(&self, generation: u64) -> bool {
        let mut slot = self.slot.write();
        if slot.generation != generation {
            return false;
        }
        slot.replace(None);
        true
    }

    /// True iff an access credential is held.
    pub fn is_authenticated(&self) -> bool {
        self.slot.read().pair.is_some()
    }

    /// Move credentials left behind by an earlier build into memory.
    ///
    /// Looks for a legacy access credential; when one is found it is copied
    /// into this store together with the legacy refresh credential (if any),
    /// and both legacy entries are deleted. Returns whether a migration
    /// happened.
    ///
    /// Best-effort: backend failures are logged and reported as `false`. A
    /// failure to delete after a successful copy still counts as migrated.
    pub async fn migrate_from_legacy(&self, legacy: &dyn LegacyStore) -> bool {
        let access = match legacy.get(LEGACY_ACCESS_KEY).await {
            Ok(Some(access)) if !access.is_blank() => access,
            Ok(_) => return false,
            Err(e) => {
                tracing::warn!("Could not read legacy access credential: {}", e);
                return false;
            }
        };

        let refresh = match legacy.get(LEGACY_REFRESH_KEY).await {
            Ok(refresh) => refresh.filter(|r| !r.is_blank()),
            Err(e) => {
                tracing::warn!("Could not read legacy refresh credential: {}", e);
                None
            }
        };

        let has_refresh = refresh.is_some();
        self.set_credentials(access, refresh);

        for key in [LEGACY_ACCESS_KEY, LEGACY_REFRESH_KEY] {
            if let Err(e) = legacy.remove(key).await {
                tracing::warn!("Could not delete legacy entry {}: {}", key, e);
            }
        }

        tracing::info!(
            "Migrated credentials from legacy storage (refresh credential: {})",
            has_refresh
        );

        true
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("CredentialStore")
            .field("authenticated", &slot.pair.is_some())
            .field(
                "has_refresh",
                &slot.pair.as_ref().is_some_and(|p| p.refresh.is_some()),
            )
            .field("generation", &slot.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::MemoryLegacyStore;

    #[test]
    fn test_empty_store() {
        let store = CredentialStore::new();
        assert!(store.access().is_none());
        assert!(store.refresh().is_none());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_set_overwrites_both() {
        let store = CredentialStore::new();
        store.set_credentials("a1", Some(Secret::new("r1")));
        store.set_credentials("a2", None);

        assert_eq!(store.access().unwrap().expose(), "a2");
        assert!(store.refresh().is_none());
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = CredentialStore::new();
        store.set_pair(CredentialPair::new("a1", "r1"));

        store.clear();
        store.clear();

        assert!(store.access().is_none());
        assert!(store.refresh().is_none());
    }

    #[test]
    fn test_conditional_writes_respect_generation() {
        let store = CredentialStore::new();
        store.set_pair(CredentialPair::new("a1", "r1"));
        let (refresh, generation) = store.refresh_at_generation();
        assert_eq!(refresh.unwrap().expose(), "r1");

        store.clear();

        assert!(!store.set_pair_if_generation(CredentialPair::new("a2", "r2"), generation));
        assert!(!store.is_authenticated());

        store.set_pair(CredentialPair::new("a3", "r3"));
        assert!(!store.clear_if_generation(generation));
        assert_eq!(store.access().unwrap().expose(), "a3");

        let current = store.generation();
        assert!(store.set_pair_if_generation(CredentialPair::new("a4", "r4"), current));
        assert_eq!(store.access().unwrap().expose(), "a4");
        assert!(store.clear_if_generation(store.generation()));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let store = CredentialStore::new();
        store.set_pair(CredentialPair::new("visible-access", "visible-refresh"));
        let debug = format!("{:?}", store);
        assert!(!debug.contains("visible"));
    }

    #[test]
    fn test_pair_deserializes_wire_names() {
        let pair: CredentialPair =
            serde_json::from_str(r#"{"accessToken":"a","refreshToken":"r"}"#).unwrap();
        assert_eq!(pair, CredentialPair::new("a", "r"));

        let pair: CredentialPair = serde_json::from_str(r#"{"accessToken":"a"}"#).unwrap();
        assert!(pair.refresh.is_none());
    }

    #[tokio::test]
    async fn test_migrate_moves_credentials() {
        let legacy = MemoryLegacyStore::with_entries([
            (LEGACY_ACCESS_KEY, "legacy-access"),
            (LEGACY_REFRESH_KEY, "legacy-refresh"),
        ]);
        let store = CredentialStore::new();

        assert!(store.migrate_from_legacy(&legacy).await);

        assert_eq!(store.access().unwrap().expose(), "legacy-access");
        assert_eq!(store.refresh().unwrap().expose(), "legacy-refresh");
        assert!(legacy.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_without_refresh() {
        let legacy = MemoryLegacyStore::with_entries([(LEGACY_ACCESS_KEY, "legacy-access")]);
        let store = CredentialStore::new();

        assert!(store.migrate_from_legacy(&legacy).await);
        assert!(store.refresh().is_none());
    }

    #[tokio::test]
    async fn test_migrate_nothing_to_do() {
        let legacy = MemoryLegacyStore::with_entries([(LEGACY_REFRESH_KEY, "orphan")]);
        let store = CredentialStore::new();
        store.set_pair(CredentialPair::new("current", "current-r"));

        assert!(!store.migrate_from_legacy(&legacy).await);

        // Without an access credential nothing is touched.
        assert_eq!(store.access().unwrap().expose(), "current");
        assert!(legacy.contains(LEGACY_REFRESH_KEY));
    }
}
