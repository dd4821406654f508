//! Typed error definitions for the WWKS client.
//!
//! Provides [`WwksError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the WWKS client.
#[derive(Debug, Error)]
pub enum WwksError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Socket connect, read, or write fault.
    #[error("transport error: {0}")]
    Transport(String),

    /// Stream closed or broken in the middle of a frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// Inbound XML document could not be deserialized.
    #[error("parse error: {0}")]
    Parse(String),

    /// Outbound request could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// Message was well-formed but violated the protocol contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Engine command rejected or engine no longer running.
    #[error("engine error: {0}")]
    Engine(String),
}

impl From<std::io::Error> for WwksError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Convenience alias used across the core crate.
pub type Result<T> = std::result::Result<T, WwksError>;
