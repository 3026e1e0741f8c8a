use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use guardian_core::display::{DEFAULT_REDIRECT_URL, LOCKED_PROMPT};
use guardian_core::{
    Config, CoreError, GateDecision, GatingEngine, HttpStatusResolver, InjectionNotice,
    InterventionDisplay,
};
use serde_json::json;

use super::{open_ledger, open_store, CmdResult};

#[derive(Args)]
pub struct CheckArgs {
    /// URL of the completed navigation
    url: String,
    /// Output JSON
    #[arg(long)]
    json: bool,
}

/// Prints the prompt to the terminal. Silent in JSON mode so stdout stays
/// machine-readable.
struct TerminalDisplay {
    redirect_url: String,
    quiet: bool,
}

impl InterventionDisplay for TerminalDisplay {
    fn inject(&self, notice: &InjectionNotice) -> Result<(), CoreError> {
        if !self.quiet {
            println!("{}", notice.prompt_text);
            println!("  redirect: {}", self.redirect_url);
        }
        Ok(())
    }

    fn locked(&self, until: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.quiet {
            println!("{LOCKED_PROMPT}");
            println!("  until: {}", until.to_rfc3339());
        }
        Ok(())
    }
}

pub async fn run(args: CheckArgs) -> CmdResult {
    let config = Config::load()?;
    let store = open_store()?;

    let redirect_url = match config.intervention.redirect_url.trim() {
        "" => DEFAULT_REDIRECT_URL.to_string(),
        url => url.to_string(),
    };
    let display = Arc::new(TerminalDisplay {
        redirect_url,
        quiet: args.json,
    });
    let authority = Arc::new(HttpStatusResolver::new(config.status_timeout())?);
    let engine = GatingEngine::new(store.clone(), authority, display)
        .with_ledger(open_ledger(&config, store));

    let ctx = config.gating_context(&args.url);
    let decision = engine.on_navigation_completed(&ctx).await?;

    if args.json {
        let value = match &decision {
            GateDecision::Inject { device_id, mode } => json!({
                "decision": "inject",
                "url": args.url,
                "deviceId": device_id,
                "mode": mode,
                "promptText": ctx.prompt_text,
            }),
            GateDecision::Locked { until } => json!({
                "decision": "locked",
                "url": args.url,
                "until": until,
            }),
            GateDecision::Deny(reason) => json!({
                "decision": "deny",
                "url": args.url,
                "reason": reason.as_str(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match decision {
        GateDecision::Inject { mode, .. } => println!("inject ({mode:?})"),
        GateDecision::Locked { .. } => println!("locked"),
        GateDecision::Deny(reason) => println!("deny: {}", reason.as_str()),
    }
    Ok(())
}
