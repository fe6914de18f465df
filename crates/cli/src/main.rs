//! Foreman CLI: the main entry point.
//!
//! Commands:
//! - `serve`  : Start the HTTP invocation endpoint
//! - `invoke` : Run a single invocation and stream the answer to stdout
//! - `doctor` : Check every collaborator the agent depends on
//! - `config` : Show, locate or validate configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "foreman",
    about = "Foreman: plant operations agent with gateway tools and graceful fallback",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.foreman/config.toml
    #[arg(short, long, global = true, env = "FOREMAN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP invocation endpoint
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Run a single invocation
    Invoke {
        /// The new turn to execute
        #[arg(short, long)]
        prompt: String,

        /// JSON file with prior messages
        #[arg(long)]
        history: Option<PathBuf>,

        /// Session id for log correlation
        #[arg(long)]
        session_id: Option<String>,

        /// Print each event as its JSON wire form
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and connectivity
    Doctor,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => {
            let config = commands::load_config(config_path)?;
            commands::serve::run(config, port, host).await?
        }
        Commands::Invoke {
            prompt,
            history,
            session_id,
            json,
        } => {
            let config = commands::load_config(config_path)?;
            commands::invoke::run(config, prompt, history, session_id, json).await?
        }
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(())
}
