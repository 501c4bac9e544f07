//! Kintsugi - terminal streaming chat client
//!
#![doc = "Kintsugi - terminal streaming chat client"]
#![doc = "Main entry point for the Kintsugi CLI."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kintsugi::cli::{Cli, Commands};
use kintsugi::commands;
use kintsugi::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            model,
            resume,
            system_prompt,
        } => {
            tracing::info!("Starting chat session");
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }
            if let Some(r) = &resume {
                tracing::debug!("Resuming conversation: {}", r);
            }

            commands::chat::run_chat(config, model, resume, system_prompt).await?;
            Ok(())
        }
        Commands::Login { email } => {
            tracing::info!("Starting login");
            commands::login::run_login(&config, email).await?;
            Ok(())
        }
        Commands::Logout => {
            commands::login::run_logout(&config).await?;
            Ok(())
        }
        Commands::History { command } => {
            let api = commands::make_api(&config)?;
            commands::history::handle_history(&api, command).await?;
            Ok(())
        }
        Commands::Models => {
            commands::models::list_models(&config.chat.model);
            Ok(())
        }
        Commands::Usage => {
            let api = commands::make_api(&config)?;
            commands::run_usage(&api).await?;
            Ok(())
        }
    }
}

/// Initializes the tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise `-v` raises the default level from
/// warn to debug for this crate.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "kintsugi=debug"
    } else {
        "kintsugi=warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
