//! Error types shared between the framework and plugin authors

use std::time::Duration;
use thiserror::Error;

/// Errors produced when calling endpoint actions
#[derive(Error, Debug)]
pub enum ActionError {
    /// The endpoint answered with `status: "failed"`
    #[error("action '{action}' failed (retcode {retcode}): {message} {wording}")]
    Failed {
        action: String,
        retcode: i64,
        message: String,
        wording: String,
    },

    /// No response arrived within the caller's deadline
    #[error("action '{action}' timed out after {timeout:?}")]
    Timeout { action: String, timeout: Duration },

    /// The connection dropped while the call was in flight
    #[error("connection lost before a response arrived")]
    ConnectionLost,

    /// The socket is not currently open
    #[error("socket is not connected")]
    NotConnected,

    /// The request frame could not be sent
    #[error("failed to send request frame: {0}")]
    Send(String),

    /// The response data did not match the expected shape
    #[error("failed to decode response data: {0}")]
    Decode(String),

    /// Reply was requested for an event that is not a message
    #[error("event is not a message, nothing to reply to")]
    NotAMessage,
}

/// Errors that plugins can return
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An endpoint action failed inside a handler
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PluginError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
