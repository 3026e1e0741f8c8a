// Device identity management.
// Format: lowercase hyphenated v4 UUID, e.g. "3f2b8c1e-9a4d-4e6f-8b1a-2c3d4e5f6a7b"

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::storage::{KvStore, DEVICE_ID_KEY};

/// Stable per-installation identifier.
///
/// Doubles as a capability token for admin allow-listing, so it is always
/// generated from the OS random source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Validate a persisted identity. Only version-4 UUIDs are accepted.
    pub fn parse(raw: &str) -> std::result::Result<Self, StorageError> {
        let raw = raw.trim();
        match Uuid::try_parse(raw) {
            Ok(uuid) if uuid.get_version_num() == 4 => {
                Ok(Self(uuid.hyphenated().to_string()))
            }
            _ => Err(StorageError::Corrupt {
                key: DEVICE_ID_KEY.to_string(),
                message: format!("invalid device identity: {raw}"),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Admin allow-list settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationConfig {
    pub admin_mode_enabled: bool,
    pub admin_device_ids: BTreeSet<String>,
}

impl AuthorizationConfig {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn allow_list<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admin_mode_enabled: true,
            admin_device_ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// Whether `identity` may run the intervention pipeline.
///
/// Every device is authorized unless admin mode is on, in which case only
/// allow-listed identities are.
pub fn is_authorized(identity: &DeviceIdentity, config: &AuthorizationConfig) -> bool {
    !config.admin_mode_enabled || config.admin_device_ids.contains(identity.as_str())
}

/// Issues and remembers this installation's [`DeviceIdentity`].
pub struct IdentityManager {
    store: Arc<dyn KvStore>,
    cached: OnceCell<DeviceIdentity>,
}

impl IdentityManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            cached: OnceCell::new(),
        }
    }

    /// Return the persisted identity, creating it on first use.
    ///
    /// Creation is a single atomic update on the store, so concurrent first
    /// calls (from this or another process) agree on one identity. A failed
    /// write is surfaced and nothing is cached, so the next call retries.
    pub async fn ensure_identity(&self) -> Result<DeviceIdentity> {
        let identity = self
            .cached
            .get_or_try_init(|| async {
                let raw = self
                    .store
                    .update(
                        DEVICE_ID_KEY,
                        Box::new(|current: Option<String>| match current {
                            Some(existing) => {
                                DeviceIdentity::parse(&existing).map(|id| id.0)
                            }
                            None => Ok(DeviceIdentity::generate().0),
                        }),
                    )
                    .await?;
                tracing::debug!(device_id = %raw, "device identity resolved");
                Ok::<_, StorageError>(DeviceIdentity(raw))
            })
            .await?;
        Ok(identity.clone())
    }

    /// Add this device to the admin allow-list if it is not already there.
    /// Returns `true` when the list changed.
    pub async fn trust_current_device(&self, device_ids: &mut Vec<String>) -> Result<bool> {
        let identity = self.ensure_identity().await?;
        if device_ids.iter().any(|id| id == identity.as_str()) {
            return Ok(false);
        }
        device_ids.push(identity.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SqliteStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use crate::storage::Mutation;

    fn manager() -> (Arc<MemoryStore>, IdentityManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = IdentityManager::new(store.clone());
        (store, manager)
    }

    fn assert_v4_shape(id: &str) {
        let bytes = id.as_bytes();
        assert_eq!(id.len(), 36);
        for (i, b) in bytes.iter().enumerate() {
            match i {
                8 | 13 | 18 | 23 => assert_eq!(*b, b'-'),
                _ => assert!(b.is_ascii_hexdigit() && !b.is_ascii_uppercase()),
            }
        }
        assert_eq!(bytes[14], b'4');
        assert!(matches!(bytes[19], b'8' | b'9' | b'a' | b'b'));
    }

    #[tokio::test]
    async fn test_identity_format() {
        let (_, manager) = manager();
        let id = manager.ensure_identity().await.unwrap();
        assert_v4_shape(id.as_str());
    }

    #[tokio::test]
    async fn test_identity_is_idempotent() {
        let (store, manager) = manager();
        let first = manager.ensure_identity().await.unwrap();
        let second = manager.ensure_identity().await.unwrap();
        assert_eq!(first, second);

        // A fresh manager over the same installation sees the same value.
        let other = IdentityManager::new(store.clone());
        assert_eq!(other.ensure_identity().await.unwrap(), first);
        assert_eq!(
            store.get(DEVICE_ID_KEY).await.unwrap().as_deref(),
            Some(first.as_str())
        );
    }

    #[tokio::test]
    async fn test_identity_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guardian.db");

        let first = {
            let store = Arc::new(SqliteStore::open_at(&path).unwrap());
            IdentityManager::new(store).ensure_identity().await.unwrap()
        };
        let store = Arc::new(SqliteStore::open_at(&path).unwrap());
        let second = IdentityManager::new(store).ensure_identity().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_identity_uniqueness() {
        let (_, a) = manager();
        let (_, b) = manager();
        assert_ne!(
            a.ensure_identity().await.unwrap(),
            b.ensure_identity().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_existing_identity_is_kept() {
        let (store, manager) = manager();
        store
            .set(DEVICE_ID_KEY, "123e4567-e89b-42d3-a456-426614174000")
            .await
            .unwrap();
        let id = manager.ensure_identity().await.unwrap();
        assert_eq!(id.as_str(), "123e4567-e89b-42d3-a456-426614174000");
    }

    #[tokio::test]
    async fn test_invalid_identity_rejected() {
        let (store, manager) = manager();
        store.set(DEVICE_ID_KEY, "invalid-id-123").await.unwrap();
        let result = manager.ensure_identity().await;
        assert!(result.is_err());
        // never regenerated behind the caller's back
        assert_eq!(
            store.get(DEVICE_ID_KEY).await.unwrap().as_deref(),
            Some("invalid-id-123")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_agree() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                IdentityManager::new(store).ensure_identity().await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    /// Store whose first `update` fails, to check that identity creation retries.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            self.inner.set(key, value).await
        }

        async fn update(
            &self,
            key: &str,
            mutate: Mutation,
        ) -> std::result::Result<String, StorageError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(StorageError::Locked);
            }
            self.inner.update(key, mutate).await
        }
    }

    #[tokio::test]
    async fn test_failed_persist_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(1),
        });
        let manager = IdentityManager::new(store.clone());

        assert!(manager.ensure_identity().await.is_err());
        let id = manager.ensure_identity().await.unwrap();
        assert_eq!(
            store.get(DEVICE_ID_KEY).await.unwrap().as_deref(),
            Some(id.as_str())
        );
    }

    #[test]
    fn test_authorized_when_admin_mode_off() {
        let id = DeviceIdentity::generate();
        assert!(is_authorized(&id, &AuthorizationConfig::open()));

        let config = AuthorizationConfig {
            admin_mode_enabled: false,
            admin_device_ids: ["someone-else".to_string()].into_iter().collect(),
        };
        assert!(is_authorized(&id, &config));
    }

    #[test]
    fn test_allow_list_enforced_in_admin_mode() {
        let id = DeviceIdentity::generate();
        assert!(!is_authorized(&id, &AuthorizationConfig::allow_list(Vec::<String>::new())));
        assert!(!is_authorized(&id, &AuthorizationConfig::allow_list(["other"])));
        assert!(is_authorized(
            &id,
            &AuthorizationConfig::allow_list([id.to_string()])
        ));
    }

    #[tokio::test]
    async fn test_trust_current_device() {
        let (_, manager) = manager();
        let mut ids = vec!["other".to_string()];
        assert!(manager.trust_current_device(&mut ids).await.unwrap());
        assert!(!manager.trust_current_device(&mut ids).await.unwrap());
        assert_eq!(ids.len(), 2);
        let id = manager.ensure_identity().await.unwrap();
        assert_eq!(ids[1], id.as_str());
    }
}
