use clap::Parser;
use carry_trader::cli::{Cli, Commands};
use carry_trader::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config.display(), e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    let _telemetry = carry_trader::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Open(args) => {
            tracing::info!("Opening spread");
            args.execute(&config).await?;
        }
        Commands::Close(args) => {
            tracing::info!("Closing spread");
            args.execute(&config).await?;
        }
        Commands::Backtest(args) => {
            tracing::info!("Starting backtest");
            args.execute(&config).await?;
        }
        Commands::Calendar(args) => {
            args.execute(&config)?;
        }
        Commands::Config => {
            println!("Current configuration:");
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
