//! # Guardian Core Library
//!
//! This library decides when to interrupt a visit to a risky site with a
//! redirect prompt, and keeps the record that feeds the weekly fatigue score.
//! The `guardian` CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Matcher**: pure URL-to-pattern matching
//! - **Identity**: stable per-installation device identity and admin allow-list
//! - **Status**: subscription lookups against the remote authority
//! - **Gating**: the per-navigation decision composing the pieces above
//! - **Ledger**: append-only intervention log with impact rating
//! - **Fatigue**: 7-day weighted score and alert threshold
//! - **Storage**: injected key-value store (SQLite or in-memory) and TOML config
//!
//! ## Key Components
//!
//! - [`GatingEngine`]: decision pipeline and its side effects
//! - [`Ledger`]: intervention log
//! - [`KvStore`]: storage seam shared by identity and ledger
//! - [`Config`]: application configuration management

pub mod display;
pub mod error;
pub mod fatigue;
pub mod gating;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod matcher;
pub mod status;
pub mod storage;

pub use display::{InjectionNotice, InterventionDisplay};
pub use error::{ConfigError, CoreError, StorageError, ValidationError};
pub use fatigue::{check_threshold, compute_summary, FatigueMonitor, FatigueNotifier, FatigueSummary};
pub use gating::{DenyReason, GateDecision, GatingContext, GatingEngine, GatingMode};
pub use identity::{is_authorized, AuthorizationConfig, DeviceIdentity, IdentityManager};
pub use ledger::{Impact, ImpactClassifier, InterventionEvent, KeywordClassifier, Ledger};
pub use matcher::{matches, MonitoredSiteSet};
pub use status::{HttpStatusResolver, RemoteStatus, StatusAuthority, StatusOutcome, UnknownReason};
pub use storage::{Config, KvStore, MemoryStore, SqliteStore};
