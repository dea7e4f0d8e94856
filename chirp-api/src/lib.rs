//! chirp-api - Plugin API for the chirp bot framework
//!
//! This crate provides the traits and types needed to write plugins for
//! chirp. Plugins are native Rust dynamic libraries that register async
//! handlers for typed chat events and talk back to the endpoint through
//! the action API.
//!
//! # Example
//!
//! ```ignore
//! use chirp_api::{Plugin, PluginContext, PluginError, PluginManifest, export_plugin};
//!
//! #[derive(Default)]
//! pub struct MyPlugin;
//!
//! impl Plugin for MyPlugin {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest::new("my-plugin", "0.1.0").with_description("My custom plugin")
//!     }
//!
//!     fn setup(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
//!         ctx.handle("message.group", |payload| async move {
//!             payload.reply("hi there", false).await?;
//!             Ok(())
//!         });
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(MyPlugin);
//! ```

pub mod action;
pub mod context;
pub mod error;
pub mod event;
pub mod segment;
pub mod types;

pub use action::{
    ActionRequest, ActionResponse, FriendInfo, GroupInfo, GroupMemberInfo, LoginInfo, MessageId,
    ResponseStatus, VersionInfo,
};
pub use context::{
    ActionCaller, Api, Disposer, EventHandler, EventPayload, HandlerFuture, HandlerRegistrar,
    OutgoingContent, PluginContext,
};
pub use error::{ActionError, PluginError};
pub use event::{
    BotEvent, MessageEvent, MessageKind, MetaEvent, MetaKind, NoticeEvent, NoticeKind, NotifyKind,
    RequestEvent, RequestKind, Sender,
};
pub use segment::{KnownSegment, Segment};
pub use types::PluginManifest;

/// Current plugin API version. Plugins must match this exactly.
/// This is checked when loading plugins to ensure compatibility.
pub const API_VERSION: u32 = 1;

/// The core plugin trait - implement this to create a chirp plugin.
///
/// `setup` runs once when the plugin is loaded and is where handlers are
/// registered; it must return promptly. Long-running work belongs in
/// tasks spawned from handlers.
pub trait Plugin: Send {
    /// Return plugin metadata
    fn manifest(&self) -> PluginManifest;

    /// Called when the plugin is loaded. Register event handlers here.
    fn setup(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError>;

    /// Called when the plugin is unloaded. Clean up resources here.
    fn on_unload(&mut self) {}
}

/// Export a plugin type for dynamic loading.
///
/// This macro generates the C ABI entry points that chirp uses to load
/// and unload plugins dynamically.
///
/// # Usage
///
/// ```ignore
/// chirp_api::export_plugin!(MyPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_chirp_plugin_create()`: Creates a new plugin instance
/// - `_chirp_plugin_api_version()`: Returns the API version
/// - `_chirp_plugin_destroy()`: Destroys a plugin instance
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _chirp_plugin_create() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new(<$plugin_type>::default());
            Box::into_raw(plugin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _chirp_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _chirp_plugin_destroy(ptr: *mut dyn $crate::Plugin) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}
