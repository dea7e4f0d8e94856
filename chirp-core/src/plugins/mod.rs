//! Plugin system for chirp
//!
//! - [`PluginManager`]: loads, unloads, enables and disables plugins and
//!   owns their records
//! - [`ModuleLoader`] / [`DylibLoader`]: how plugin code gets into the
//!   process (dynamic libraries in production, mocks in tests)
//! - [`PluginHostError`]: error types for plugin operations
//!
//! # Plugin structure
//!
//! Each user plugin lives in its own directory under the plugins root:
//!
//! ```text
//! plugins/
//!   hello/
//!     hello.so        (or libhello.so / hello.dylib / hello.dll)
//! ```
//!
//! The directory name is the plugin's identity for the enabled set and
//! admin commands. Builtins are registered in-process and never touch
//! the loader.

mod error;
mod loader;
mod manager;

pub use error::PluginHostError;
pub use loader::{DylibLoader, LoadedModule, ModuleLoader};
pub use manager::{PluginInfo, PluginManager};
