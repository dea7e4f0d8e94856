//! chirp-core: Core library for the chirp bot framework
//!
//! This crate provides the foundational components for chirp:
//!
//! - **Transport** - [`Socket`] keeps one reconnecting WebSocket to the
//!   endpoint and broadcasts lifecycle events
//! - **Action correlation** - [`ActionClient`] matches action responses
//!   to their requests by echo token
//! - **Event classification** - [`key_path`] derives the general-to-
//!   specific delivery path for a typed event
//! - **Dispatch** - [`DispatchRegistry`] holds handler registrations per
//!   event key with per-plugin ownership tracking
//! - **Plugin lifecycle** - [`PluginManager`] loads, unloads, enables and
//!   disables plugins and tears their handlers down cleanly
//! - **Composition** - [`Bot`] wires everything together
//!
//! # Quick Start
//!
//! ```no_run
//! use chirp_core::{Bot, BotConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chirp_core::ChirpError> {
//!     let config = BotConfig::load("chirp.toml")?;
//!     let bot = Bot::new(config, "chirp.toml", "plugins");
//!     bot.start().await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     bot.stop().await;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod admin;
pub mod bot;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod plugins;
pub mod socket;

// Re-export key types for convenience
pub use action::{ActionClient, ApiEvent};
pub use admin::{AdminCommand, AdminPlugin, parse_command};
pub use bot::Bot;
pub use classify::key_path;
pub use config::{BotConfig, ConfigError, ReconnectionConfig};
pub use dispatch::{DispatchRegistry, ScopedRegistrar};
pub use error::ChirpError;
pub use plugins::{DylibLoader, LoadedModule, ModuleLoader, PluginHostError, PluginInfo, PluginManager};
pub use socket::{
    FrameSink, Reconnection, Socket, SocketConfig, SocketError, SocketEvent, SocketSender,
};
