//! Command-line interface definition for the Kintsugi client
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, authentication, conversation
//! history, and account status.

use clap::{Parser, Subcommand};

/// Kintsugi - terminal streaming chat client
///
/// Talk to the Kintsugi AI service from the terminal, with streamed
/// responses, resumable conversations, and local history views.
#[derive(Parser, Debug, Clone)]
#[command(name = "kintsugi")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the server base URL from config
    #[arg(long)]
    pub server: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the Kintsugi client
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Model for new chats (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Resume a conversation by id (full id or unique prefix)
        #[arg(short, long)]
        resume: Option<String>,

        /// System prompt sent with every message
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Log in and store the access token
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Inspect conversation history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// List the known model catalog
    Models,

    /// Show token quota usage
    Usage,
}

/// History subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List all conversations
    List,

    /// Print one conversation's transcript
    Show {
        /// Conversation id (full id or unique prefix)
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id (full id or unique prefix)
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            server: None,
            command: Commands::Chat {
                model: None,
                resume: None,
                system_prompt: None,
            },
        }
    }
}
