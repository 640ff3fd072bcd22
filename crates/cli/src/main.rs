use clap::{Parser, Subcommand};
use updown_core::{AppConfig, ConfigLoader};

mod commands;

use commands::{InspectArgs, KeeperArgs, SimulateArgs};

#[derive(Parser)]
#[command(name = "updown")]
#[command(about = "Operator tooling for recurring up/down prediction markets", long_about = None)]
struct Cli {
    /// Config file path (defaults to config/Market.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Profile overlay (config/Market.{profile}.toml)
    #[arg(long, global = true, env = "UPDOWN_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deterministic offline simulation of many rounds
    Simulate(SimulateArgs),
    /// Drive a live market: genesis, then one tick per round
    Keeper(KeeperArgs),
    /// Print the state stored in a ledger snapshot
    Inspect(InspectArgs),
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    match (&cli.config, &cli.profile) {
        (Some(path), _) => ConfigLoader::load_from(path),
        (None, Some(profile)) => ConfigLoader::load_with_profile(profile),
        (None, None) => ConfigLoader::load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match &cli.command {
        Commands::Simulate(args) => {
            let config = load_config(&cli)?;
            commands::run_simulate(args, &config)?;
        }
        Commands::Keeper(args) => {
            let config = load_config(&cli)?;
            commands::run_keeper(args, config).await?;
        }
        Commands::Inspect(args) => {
            commands::run_inspect(args)?;
        }
    }

    Ok(())
}
