//! Module loading - how plugin code gets into the process

use std::path::{Path, PathBuf};

use libloading::Library;

use super::error::PluginHostError;
use chirp_api::{API_VERSION, Plugin};

/// A plugin instance fresh out of a loader
pub struct LoadedModule {
    pub plugin: Box<dyn Plugin>,
    /// Kept alive for as long as the instance exists; `None` for builtins
    /// and test plugins
    pub library: Option<Library>,
}

/// Seam between the lifecycle manager and the loading mechanism
pub trait ModuleLoader: Send + Sync {
    /// Load the plugin found in `dir`
    fn load(&self, dir: &Path) -> Result<LoadedModule, PluginHostError>;
}

/// Loads plugins from dynamic libraries on disk
#[derive(Default)]
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn load(&self, dir: &Path) -> Result<LoadedModule, PluginHostError> {
        let lib_path = find_library(dir)?;

        // SAFETY: We're loading a plugin that the user explicitly enabled.
        // The plugin is expected to follow the Plugin trait contract.
        let library = unsafe { Library::new(&lib_path)? };

        // SAFETY: We're calling a C function exported by the plugin.
        let api_version_fn: libloading::Symbol<extern "C" fn() -> u32> =
            unsafe { library.get(b"_chirp_plugin_api_version")? };

        let plugin_api_version = api_version_fn();
        if plugin_api_version != API_VERSION {
            return Err(PluginHostError::ApiVersionMismatch {
                expected: API_VERSION,
                found: plugin_api_version,
            });
        }

        // SAFETY: We're calling the plugin's create function which returns
        // a raw pointer that we convert back to a Box<dyn Plugin>.
        let create_fn: libloading::Symbol<extern "C" fn() -> *mut dyn Plugin> =
            unsafe { library.get(b"_chirp_plugin_create")? };

        let plugin = unsafe { Box::from_raw(create_fn()) };

        Ok(LoadedModule {
            plugin,
            library: Some(library),
        })
    }
}

/// Find the library file in a plugin directory
///
/// Looks for `<dirname>.<ext>` then `lib<dirname>.<ext>`, then falls
/// back to the first file with a loadable extension.
fn find_library(dir: &Path) -> Result<PathBuf, PluginHostError> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let extensions: &[&str] = if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["so"]
    };

    for ext in extensions {
        let lib_path = dir.join(format!("{name}.{ext}"));
        if lib_path.exists() {
            return Ok(lib_path);
        }

        // Also try lib<name>.<ext> format
        let lib_path = dir.join(format!("lib{name}.{ext}"));
        if lib_path.exists() {
            return Ok(lib_path);
        }
    }

    // Any loadable file at all
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(ext) = path.extension().and_then(|e| e.to_str())
                && extensions.contains(&ext)
            {
                return Ok(path);
            }
        }
    }

    Err(PluginHostError::LibraryNotFound {
        dir: dir.to_path_buf(),
    })
}
