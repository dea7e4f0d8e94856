//! Top-level error type for chirp-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::plugins::PluginHostError;
use crate::socket::SocketError;
use chirp_api::ActionError;

/// Errors surfaced by the bot composition layer
#[derive(Error, Debug)]
pub enum ChirpError {
    /// Transport socket error
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Action call error
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Plugin host error
    #[error("Plugin error: {0}")]
    PluginHost(#[from] PluginHostError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_error_display() {
        let err = ChirpError::Socket(SocketError::NotConnected);
        assert!(err.to_string().contains("not connected"));
    }

    #[test]
    fn test_action_error_conversion() {
        let err: ChirpError = ActionError::ConnectionLost.into();
        assert!(matches!(err, ChirpError::Action(_)));
        assert!(err.to_string().contains("Action error"));
    }

    #[test]
    fn test_plugin_host_error_conversion() {
        let err: ChirpError = PluginHostError::NotFound {
            name: "ghost".to_string(),
        }
        .into();
        assert!(err.to_string().contains("ghost"));
    }
}
