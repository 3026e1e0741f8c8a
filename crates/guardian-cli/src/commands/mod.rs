pub mod check;
pub mod config;
pub mod device;
pub mod fatigue;
pub mod ledger;
pub mod status;

use std::sync::Arc;

use guardian_core::{Config, KvStore, Ledger, SqliteStore};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// The on-disk store shared by identity and ledger.
pub fn open_store() -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open()?))
}

/// Ledger over `store` with the configured retention.
pub fn open_ledger(config: &Config, store: Arc<dyn KvStore>) -> Arc<Ledger> {
    Arc::new(Ledger::new(store).with_retention_days(config.fatigue.retention_days))
}
