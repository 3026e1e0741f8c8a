use chrono::Utc;
use clap::Subcommand;
use guardian_core::Config;

use super::{open_ledger, open_store, CmdResult};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Record an intervention
    Append {
        /// Site the prompt was shown on
        site: String,
        /// Prompt text shown
        prompt: String,
    },
    /// List recorded interventions
    List {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop entries older than fatigue.retention_days
    Prune,
}

pub async fn run(action: LedgerAction) -> CmdResult {
    let config = Config::load()?;
    let ledger = open_ledger(&config, open_store()?);

    match action {
        LedgerAction::Append { site, prompt } => {
            let event = ledger.append(&site, &prompt).await?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        LedgerAction::List { json } => {
            let events = ledger.read_all().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("no interventions recorded");
            } else {
                for event in &events {
                    println!(
                        "{}  {:<8}  {}  {}",
                        event.timestamp.format("%Y-%m-%d %H:%M"),
                        format!("{:?}", event.impact),
                        event.site,
                        event.prompt_text
                    );
                }
            }
        }
        LedgerAction::Prune => {
            let removed = ledger.prune(Utc::now()).await?;
            println!("removed {removed} entries");
        }
    }
    Ok(())
}
