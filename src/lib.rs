//! Kintsugi - terminal streaming chat client library
//!
//! This library implements the client side of the Kintsugi AI chat
//! service, centered on the streaming exchange pipeline: transport bytes
//! are decoded, framed, accumulated, rendered live, and committed as
//! exactly one durable assistant message per exchange.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `stream`: The exchange pipeline (decoder, frame parser, accumulator,
//!   render/commit sink, driver)
//! - `store`: In-memory conversation state
//! - `api`: REST and streaming client for the backend
//! - `auth`: Credential storage and login/logout
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: CLI command handlers, including the chat REPL
//!
//! # Example
//!
//! ```no_run
//! use kintsugi::{Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     // Session setup would go here
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod store;
pub mod stream;

// Re-export commonly used types
pub use config::Config;
pub use error::{KintsugiError, Result};
pub use store::{ChatMessage, Conversation, ConversationStore};
pub use stream::{
    run_exchange, EventFrame, ExchangeOptions, ExchangeOutcome, FrameParser, RenderSink,
    StreamAccumulator, StreamState, Utf8StreamDecoder,
};
