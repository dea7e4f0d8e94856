//! Plugin host error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the plugin host
#[derive(Error, Debug)]
pub enum PluginHostError {
    /// Plugin library not found in directory
    #[error("Plugin library not found in {dir}")]
    LibraryNotFound { dir: PathBuf },

    /// API version mismatch between chirp and plugin
    #[error("API version mismatch: chirp expects {expected}, plugin has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// Failed to load dynamic library
    #[error("Failed to load plugin library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// The loaded module is not a valid plugin
    #[error("Invalid plugin: {reason}")]
    InvalidPlugin { reason: String },

    /// Plugin setup failed
    #[error("Plugin '{name}' setup failed: {source}")]
    SetupFailed {
        name: String,
        #[source]
        source: chirp_api::PluginError,
    },

    /// Plugin not found
    #[error("Plugin '{name}' not found")]
    NotFound { name: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
