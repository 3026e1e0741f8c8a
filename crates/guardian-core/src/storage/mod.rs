mod config;
pub mod database;
pub mod memory;

pub use config::{AdminConfig, Config, FatigueConfig, InterventionConfig, ServerConfig, SitesConfig};
pub use database::SqliteStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{ConfigError, CoreError, StorageError};

/// Store key holding the persisted device identity.
pub const DEVICE_ID_KEY: &str = "deviceUUID";
/// Store key holding the intervention ledger as a JSON array.
pub const LEDGER_KEY: &str = "sabotageLog";

/// A read-modify-write step applied by [`KvStore::update`].
///
/// Receives the current value (if any) and returns the value to persist.
/// Returning an error aborts the update and leaves the stored value untouched.
/// Owned (`'static`) so stores can run it on a blocking thread.
pub type Mutation = Box<dyn FnOnce(Option<String>) -> Result<String, StorageError> + Send>;

/// Device-local key-value store shared by the identity manager and the ledger.
///
/// Implementations must make `update` atomic with respect to every other
/// `update` on the same key, so concurrent navigations cannot lose writes.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Atomically replace the value under `key` with `mutate(current)`.
    /// Returns the value that was persisted.
    async fn update(&self, key: &str, mutate: Mutation) -> Result<String, StorageError>;
}

/// Returns `~/.config/guardian[-dev]/` based on GUARDIAN_ENV.
///
/// Set GUARDIAN_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if the home directory is unknown or creating the config
/// directory fails.
pub fn data_dir() -> Result<PathBuf, CoreError> {
    let base_dir = dirs::home_dir().ok_or(ConfigError::NoDataDir)?.join(".config");

    let env = std::env::var("GUARDIAN_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("guardian-dev")
    } else {
        base_dir.join("guardian")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
