//! Gating decision engine.
//!
//! Decides, once per completed navigation, whether the intervention prompt
//! is shown. Evaluation short-circuits in this order:
//!
//! 1. the device must be authorized (no network traffic otherwise)
//! 2. the URL must match a monitored site
//! 3. an active lockout yields [`GateDecision::Locked`], the notice shown
//!    in place of the prompt
//! 4. with a server URL and an email configured (strict mode) the remote
//!    authority must report an active subscriber; otherwise (soft-degrade
//!    mode) the local override flag decides
//!
//! Strict mode never falls back to the override flag: an unreachable
//! authority denies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::display::{InjectionNotice, InterventionDisplay, DEFAULT_PROMPT};
use crate::error::{CoreError, Result};
use crate::identity::{is_authorized, AuthorizationConfig, DeviceIdentity, IdentityManager};
use crate::ledger::Ledger;
use crate::matcher::MonitoredSiteSet;
use crate::status::{StatusAuthority, StatusOutcome, UnknownReason};
use crate::storage::KvStore;

/// Everything one decision needs, captured at navigation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatingContext {
    pub url: String,
    pub auth_config: AuthorizationConfig,
    pub monitored_sites: MonitoredSiteSet,
    pub server_url: Option<String>,
    pub user_email: Option<String>,
    pub local_override_enabled: bool,
    pub lockout_until: Option<DateTime<Utc>>,
    pub prompt_text: String,
}

impl GatingContext {
    /// Context with default sites, open authorization, no server and the
    /// override disabled.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_config: AuthorizationConfig::default(),
            monitored_sites: MonitoredSiteSet::default(),
            server_url: None,
            user_email: None,
            local_override_enabled: false,
            lockout_until: None,
            prompt_text: DEFAULT_PROMPT.to_string(),
        }
    }

    /// Strict when both the server URL and the email are non-blank.
    pub fn mode(&self) -> GatingMode {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if present(&self.server_url) && present(&self.user_email) {
            GatingMode::Strict
        } else {
            GatingMode::SoftDegrade
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatingMode {
    /// The remote authority decides.
    Strict,
    /// The local override flag decides.
    SoftDegrade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Unauthorized,
    NotMonitored,
    StatusUnknown(UnknownReason),
    Inactive,
    OverrideDisabled,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthorized => "unauthorized",
            DenyReason::NotMonitored => "not_monitored",
            DenyReason::StatusUnknown(_) => "status_unknown",
            DenyReason::Inactive => "inactive",
            DenyReason::OverrideDisabled => "override_disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Inject {
        device_id: DeviceIdentity,
        mode: GatingMode,
    },
    Locked {
        until: DateTime<Utc>,
    },
    Deny(DenyReason),
}

impl GateDecision {
    pub fn is_inject(&self) -> bool {
        matches!(self, GateDecision::Inject { .. })
    }
}

/// Composes identity, matching, status resolution and local flags.
///
/// Clones share the same identity cache, ledger and display.
#[derive(Clone)]
pub struct GatingEngine {
    identity: Arc<IdentityManager>,
    authority: Arc<dyn StatusAuthority>,
    ledger: Arc<Ledger>,
    display: Arc<dyn InterventionDisplay>,
}

impl GatingEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        authority: Arc<dyn StatusAuthority>,
        display: Arc<dyn InterventionDisplay>,
    ) -> Self {
        Self {
            identity: Arc::new(IdentityManager::new(store.clone())),
            authority,
            ledger: Arc::new(Ledger::new(store)),
            display,
        }
    }

    /// Use a pre-configured ledger (retention, classifier).
    pub fn with_ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn identity(&self) -> &IdentityManager {
        &self.identity
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Decide without side effects (beyond the status request in strict mode
    /// and first-use identity creation).
    pub async fn evaluate(&self, ctx: &GatingContext, now: DateTime<Utc>) -> Result<GateDecision> {
        let device_id = self.identity.ensure_identity().await?;
        if !is_authorized(&device_id, &ctx.auth_config) {
            return Ok(GateDecision::Deny(DenyReason::Unauthorized));
        }

        if !ctx.monitored_sites.matches(&ctx.url) {
            return Ok(GateDecision::Deny(DenyReason::NotMonitored));
        }

        if let Some(until) = ctx.lockout_until.filter(|until| now < *until) {
            return Ok(GateDecision::Locked { until });
        }

        let mode = ctx.mode();
        match mode {
            GatingMode::Strict => {
                let email = ctx.user_email.as_deref().unwrap_or_default();
                match self
                    .authority
                    .fetch_status(email, ctx.server_url.as_deref())
                    .await
                {
                    StatusOutcome::Resolved(status) if status.is_active => {}
                    StatusOutcome::Resolved(_) => {
                        tracing::info!(email, "user not active according to server; skipping");
                        return Ok(GateDecision::Deny(DenyReason::Inactive));
                    }
                    StatusOutcome::Unknown(reason) => {
                        return Ok(GateDecision::Deny(DenyReason::StatusUnknown(reason)));
                    }
                }
            }
            GatingMode::SoftDegrade => {
                if !ctx.local_override_enabled {
                    return Ok(GateDecision::Deny(DenyReason::OverrideDisabled));
                }
            }
        }

        Ok(GateDecision::Inject { device_id, mode })
    }

    pub async fn should_inject(&self, ctx: &GatingContext) -> Result<bool> {
        Ok(self.evaluate(ctx, Utc::now()).await?.is_inject())
    }

    /// Handle one completed navigation: decide, then show the prompt and log
    /// the intervention, or show the lockout notice.
    ///
    /// Runs on its own tokio task, so dropping the returned future does not
    /// cancel it: a decision that completes after the caller stopped waiting
    /// is still shown and logged.
    pub async fn on_navigation_completed(&self, ctx: &GatingContext) -> Result<GateDecision> {
        let engine = self.clone();
        let ctx = ctx.clone();
        match tokio::spawn(async move { engine.handle_navigation(&ctx).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(CoreError::Task(e.to_string())),
        }
    }

    async fn handle_navigation(&self, ctx: &GatingContext) -> Result<GateDecision> {
        let decision = self.evaluate(ctx, Utc::now()).await?;
        tracing::debug!(url = %ctx.url, ?decision, "gating decision");

        match &decision {
            GateDecision::Inject { device_id, .. } => {
                self.display.inject(&InjectionNotice {
                    device_id: device_id.clone(),
                    url: ctx.url.clone(),
                    prompt_text: ctx.prompt_text.clone(),
                })?;
                self.ledger.append(&ctx.url, &ctx.prompt_text).await?;
            }
            GateDecision::Locked { until } => self.display.locked(*until)?,
            GateDecision::Deny(_) => {}
        }
        Ok(decision)
    }
}
