use chrono::Utc;
use clap::Subcommand;
use guardian_core::{Config, CoreError, FatigueMonitor, FatigueNotifier};

use super::{open_ledger, open_store, CmdResult};

#[derive(Subcommand)]
pub enum FatigueAction {
    /// Weighted counts for the last 7 days
    Summary,
    /// Alert when the score reaches the threshold (exit code 2)
    Check {
        /// Override fatigue.threshold
        #[arg(long)]
        threshold: Option<u32>,
    },
}

struct TerminalNotifier;

impl FatigueNotifier for TerminalNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), CoreError> {
        eprintln!("{title}: {message}");
        Ok(())
    }
}

pub async fn run(action: FatigueAction) -> CmdResult {
    let config = Config::load()?;
    let ledger = open_ledger(&config, open_store()?);

    match action {
        FatigueAction::Summary => {
            let monitor = FatigueMonitor::new(ledger, config.fatigue.threshold);
            let summary = monitor.summary(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        FatigueAction::Check { threshold } => {
            let threshold = threshold.unwrap_or(config.fatigue.threshold);
            let monitor = FatigueMonitor::new(ledger, threshold);
            let (summary, alerted) = monitor
                .check_and_notify(Utc::now(), &TerminalNotifier)
                .await?;
            println!("score {} / threshold {}", summary.score, monitor.threshold());
            if alerted {
                std::process::exit(2);
            }
        }
    }
    Ok(())
}
