use clap::Args;
use guardian_core::{Config, HttpStatusResolver, StatusAuthority, StatusOutcome};

use super::CmdResult;

#[derive(Args)]
pub struct StatusArgs {
    /// Email to look up (defaults to server.user_email)
    #[arg(long)]
    email: Option<String>,
    /// Authority base URL (defaults to server.url)
    #[arg(long)]
    server: Option<String>,
}

pub async fn run(args: StatusArgs) -> CmdResult {
    let config = Config::load()?;
    let email = args.email.or_else(|| config.user_email()).unwrap_or_default();
    let server = args.server.or_else(|| config.server_url());

    let resolver = HttpStatusResolver::new(config.status_timeout())?;
    let outcome = resolver.fetch_status(&email, server.as_deref()).await;

    match &outcome {
        StatusOutcome::Resolved(status) => {
            println!("{}", serde_json::to_string_pretty(status)?);
        }
        StatusOutcome::Unknown(reason) => println!("unknown: {reason}"),
    }
    println!("{}", outcome.describe());
    Ok(())
}
