//! Error types for the Kintsugi client
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Kintsugi client operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, authentication, API calls, and the streaming
/// exchange pipeline.
///
/// Malformed stream frames are intentionally *not* represented here: a bad
/// frame is skipped and logged (`EventFrame::Malformed`), never surfaced as
/// an error, so one corrupt frame cannot abort an otherwise healthy stream.
#[derive(Error, Debug)]
pub enum KintsugiError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level streaming errors (network failure, missing body,
    /// chunk timeout, stream ended before a terminal frame)
    #[error("Transport error: {0}")]
    Transport(String),

    /// API errors surfaced by the Kintsugi backend (non-2xx responses)
    #[error("API error: {0}")]
    Api(String),

    /// Authentication errors (e.g., 401 Unauthorized)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// No stored credentials for the configured server
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// A new exchange was started while one is already streaming
    #[error("Exchange already in progress: {0}")]
    Reentrancy(String),

    /// Conversation store errors (unknown conversation or message)
    #[error("Store error: {0}")]
    Store(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for Kintsugi client operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
