use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "guardian", version, about = "Guardian CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one completed navigation through the gate
    Check(commands::check::CheckArgs),
    /// Device identity and admin allow-list
    Device {
        #[command(subcommand)]
        action: commands::device::DeviceAction,
    },
    /// Query the subscription authority
    Status(commands::status::StatusArgs),
    /// Intervention log
    Ledger {
        #[command(subcommand)]
        action: commands::ledger::LedgerAction,
    },
    /// Weekly fatigue score
    Fatigue {
        #[command(subcommand)]
        action: commands::fatigue::FatigueAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    guardian_core::logging::init("warn");

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check(args) => commands::check::run(args).await,
        Commands::Device { action } => commands::device::run(action).await,
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Ledger { action } => commands::ledger::run(action).await,
        Commands::Fatigue { action } => commands::fatigue::run(action).await,
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
