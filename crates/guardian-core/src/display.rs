//! Contract with the component that renders the intervention prompt.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::identity::DeviceIdentity;

/// Prompt shown when no custom text is configured.
pub const DEFAULT_PROMPT: &str = "This space might not honor your dignity. Want to redirect?";

/// Notice shown instead of the prompt while a lockout is active.
pub const LOCKED_PROMPT: &str =
    "Redirect locked: emotional fatigue threshold reached. Try again later.";

/// Where the prompt's redirect action leads when nothing is configured.
pub const DEFAULT_REDIRECT_URL: &str = "https://example.com/safe";

/// What the display receives when the gate allows an intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionNotice {
    pub device_id: DeviceIdentity,
    pub url: String,
    pub prompt_text: String,
}

/// Renders interventions. Rendering itself is outside this crate.
pub trait InterventionDisplay: Send + Sync {
    /// Show the intervention prompt for an allowed navigation.
    fn inject(&self, notice: &InjectionNotice) -> Result<()>;

    /// Show the lockout notice.
    fn locked(&self, _until: DateTime<Utc>) -> Result<()> {
        Ok(()) // default no-op
    }
}
