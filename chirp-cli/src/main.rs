use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use chirp_core::{Bot, BotConfig};

#[derive(Parser)]
#[command(name = "chirp", about = "OneBot 11 bot framework")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Run {
        /// Path to the config file
        #[arg(short, long, default_value = "chirp.toml")]
        config: PathBuf,

        /// Directory containing user plugins
        #[arg(short, long, default_value = "plugins")]
        plugins: PathBuf,
    },
    /// Write a template config file
    Init {
        /// Path to write
        #[arg(short, long, default_value = "chirp.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, plugins } => run(config, plugins, cli.verbose).await,
        Commands::Init { config } => init(config),
    }
}

async fn run(config_path: PathBuf, plugins_dir: PathBuf, verbose: bool) -> Result<()> {
    let config = BotConfig::load(&config_path)?;

    let filter = if verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bot = Bot::new(config, &config_path, plugins_dir);
    bot.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    bot.stop().await;
    Ok(())
}

fn init(config_path: PathBuf) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }
    BotConfig::default().save(&config_path)?;
    println!("wrote {}", config_path.display());
    Ok(())
}
