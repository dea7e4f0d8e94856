//! Plugin lifecycle manager
//!
//! Owns the plugin records and the enabled set, and keeps the dispatch
//! registry consistent with them: a plugin's handler registrations exist
//! exactly while the plugin is loaded. Builtins share the same record
//! table under the same name-uniqueness rule but cannot be disabled or
//! unloaded through the user-facing operations.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use serde::Serialize;

use super::error::PluginHostError;
use super::loader::{DylibLoader, LoadedModule, ModuleLoader};
use crate::dispatch::{DispatchRegistry, ScopedRegistrar};
use chirp_api::{Api, Plugin, PluginContext, PluginManifest};

struct PluginRecord {
    manifest: PluginManifest,
    // Declared before _library so the instance drops first
    instance: Box<dyn Plugin>,
    source_dir: Option<PathBuf>,
    builtin: bool,
    _library: Option<Library>,
}

/// Snapshot of one plugin for listings
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub builtin: bool,
    pub enabled: bool,
    pub loaded: bool,
}

/// Loads, unloads, enables and disables plugins
pub struct PluginManager {
    plugins: HashMap<String, PluginRecord>,
    enabled: HashSet<String>,
    api: Api,
    registry: DispatchRegistry,
    plugins_dir: PathBuf,
    loader: Box<dyn ModuleLoader>,
}

impl PluginManager {
    pub fn new(
        api: Api,
        registry: DispatchRegistry,
        plugins_dir: impl Into<PathBuf>,
        enabled: HashSet<String>,
    ) -> Self {
        Self::with_loader(api, registry, plugins_dir, enabled, Box::new(DylibLoader))
    }

    /// Construct with a custom loader (tests)
    pub fn with_loader(
        api: Api,
        registry: DispatchRegistry,
        plugins_dir: impl Into<PathBuf>,
        enabled: HashSet<String>,
        loader: Box<dyn ModuleLoader>,
    ) -> Self {
        Self {
            plugins: HashMap::new(),
            enabled,
            api,
            registry,
            plugins_dir: plugins_dir.into(),
            loader,
        }
    }

    /// Names in the enabled set, sorted (persisted to config by the admin plugin)
    pub fn enabled_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.enabled.iter().cloned().collect();
        names.sort();
        names
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Validate a freshly loaded module, run its setup and record it
    ///
    /// Setup failure removes any registrations made before the failure,
    /// so no partial plugin survives.
    fn install(
        &mut self,
        mut module: LoadedModule,
        source_dir: Option<PathBuf>,
        builtin: bool,
    ) -> Result<String, PluginHostError> {
        let manifest = module.plugin.manifest();
        if manifest.name.trim().is_empty() {
            return Err(PluginHostError::InvalidPlugin {
                reason: "manifest has an empty name".to_string(),
            });
        }
        if manifest.version.trim().is_empty() {
            return Err(PluginHostError::InvalidPlugin {
                reason: format!("plugin '{}' has an empty version", manifest.name),
            });
        }
        let name = manifest.name.clone();

        // Same-name load replaces the previous instance, except that a
        // user plugin may never displace a builtin
        if let Some(existing) = self.plugins.get(&name) {
            if existing.builtin && !builtin {
                return Err(PluginHostError::InvalidPlugin {
                    reason: format!("name '{name}' collides with a builtin plugin"),
                });
            }
            tracing::info!(plugin = %name, "replacing already loaded plugin");
            self.unload_inner(&name);
        }

        let registrar = Arc::new(ScopedRegistrar::new(name.clone(), self.registry.clone()));
        let mut ctx = PluginContext::new(name.clone(), self.api.clone(), registrar);
        if let Err(e) = module.plugin.setup(&mut ctx) {
            self.registry.remove_all_for(&name);
            tracing::error!(plugin = %name, error = %e, "plugin setup failed");
            return Err(PluginHostError::SetupFailed { name, source: e });
        }

        tracing::info!(
            plugin = %name,
            version = %manifest.version,
            builtin,
            "plugin loaded"
        );
        self.plugins.insert(
            name.clone(),
            PluginRecord {
                manifest,
                instance: module.plugin,
                source_dir,
                builtin,
                _library: module.library,
            },
        );
        Ok(name)
    }

    /// Load one user plugin from its directory
    ///
    /// Returns `Ok(false)` without side effects when the plugin is not in
    /// the enabled set.
    pub fn load_plugin(&mut self, dir: &Path) -> Result<bool, PluginHostError> {
        let dir_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if !self.enabled.contains(&dir_name) {
            tracing::debug!(plugin = %dir_name, "skipping plugin not in enabled set");
            return Ok(false);
        }

        let module = self.loader.load(dir)?;
        self.install(module, Some(dir.to_path_buf()), false)?;
        Ok(true)
    }

    /// Register an in-process builtin plugin
    pub fn register_builtin(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginHostError> {
        self.install(
            LoadedModule {
                plugin,
                library: None,
            },
            None,
            true,
        )?;
        Ok(())
    }

    fn unload_inner(&mut self, name: &str) {
        if let Some(mut record) = self.plugins.remove(name) {
            record.instance.on_unload();
            let removed = self.registry.remove_all_for(name);
            tracing::info!(plugin = %name, handlers_removed = removed, "plugin unloaded");
            // record drops here: instance first, then the library
        }
    }

    /// Unload a plugin; false when absent or a protected builtin
    pub fn unload_plugin(&mut self, name: &str, allow_builtin: bool) -> bool {
        match self.plugins.get(name) {
            None => {
                tracing::warn!(plugin = %name, "unload requested for plugin that is not loaded");
                false
            }
            Some(record) if record.builtin && !allow_builtin => {
                tracing::warn!(plugin = %name, "refusing to unload builtin plugin");
                false
            }
            Some(_) => {
                self.unload_inner(name);
                true
            }
        }
    }

    /// Unload then load again from the plugin's source directory
    pub fn reload_plugin(&mut self, name: &str) -> Result<(), PluginHostError> {
        let dir = self
            .plugins
            .get(name)
            .and_then(|record| record.source_dir.clone())
            .or_else(|| self.resolve_plugin_dir(name))
            .ok_or_else(|| PluginHostError::NotFound {
                name: name.to_string(),
            })?;

        self.unload_plugin(name, false);
        self.load_plugin(&dir)?;
        Ok(())
    }

    /// Add to the enabled set and load from disk; idempotent when already
    /// enabled and loaded
    pub fn enable_plugin(&mut self, name: &str) -> Result<(), PluginHostError> {
        if self.enabled.contains(name) && self.plugins.contains_key(name) {
            tracing::debug!(plugin = %name, "plugin already enabled");
            return Ok(());
        }

        let dir = self
            .resolve_plugin_dir(name)
            .ok_or_else(|| PluginHostError::NotFound {
                name: name.to_string(),
            })?;
        let dir_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();

        self.enabled.insert(dir_name);
        self.load_plugin(&dir)?;
        Ok(())
    }

    /// Remove from the enabled set and unload; false for builtins,
    /// idempotent otherwise
    pub fn disable_plugin(&mut self, name: &str) -> bool {
        if let Some(record) = self.plugins.get(name)
            && record.builtin
        {
            tracing::warn!(plugin = %name, "refusing to disable builtin plugin");
            return false;
        }

        let was_enabled = self.enabled.remove(name);
        if self.plugins.contains_key(name) {
            self.unload_inner(name);
        } else if !was_enabled {
            tracing::debug!(plugin = %name, "plugin already disabled");
        }
        true
    }

    /// Load every enabled plugin under the plugins directory
    ///
    /// Individual failures are logged and skipped; returns the number of
    /// plugins loaded.
    pub fn load_all_plugins(&mut self) -> usize {
        let entries = match std::fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    dir = %self.plugins_dir.display(),
                    error = %e,
                    "plugins directory not readable"
                );
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match self.load_plugin(&path) {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(dir = %path.display(), error = %e, "failed to load plugin");
                }
            }
        }
        tracing::info!(loaded, "finished loading plugins");
        loaded
    }

    /// Every known plugin: loaded records plus discoverable-but-unloaded
    /// directories with placeholder metadata
    pub fn get_all_plugins(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .plugins
            .values()
            .map(|record| PluginInfo {
                name: record.manifest.name.clone(),
                version: record.manifest.version.clone(),
                description: record.manifest.description.clone(),
                builtin: record.builtin,
                enabled: record.builtin || self.enabled.contains(&record.manifest.name),
                loaded: true,
            })
            .collect();

        if let Ok(entries) = std::fs::read_dir(&self.plugins_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if self.plugins.contains_key(name) {
                    continue;
                }
                infos.push(PluginInfo {
                    name: name.to_string(),
                    version: "-".to_string(),
                    description: "(not loaded)".to_string(),
                    builtin: false,
                    enabled: self.enabled.contains(name),
                    loaded: false,
                });
            }
        }

        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Find a plugin directory by name, case-insensitively
    fn resolve_plugin_dir(&self, name: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.plugins_dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(dir_name) = path.file_name().and_then(|n| n.to_str())
                && dir_name.eq_ignore_ascii_case(name)
            {
                return Some(path);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_api::{ActionCaller, ActionError, PluginError};
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct NullCaller;

    #[async_trait::async_trait]
    impl ActionCaller for NullCaller {
        async fn call(&self, _action: &str, _params: Value) -> Result<Value, ActionError> {
            Ok(Value::Null)
        }

        async fn call_with_timeout(
            &self,
            action: &str,
            params: Value,
            _timeout: Duration,
        ) -> Result<Value, ActionError> {
            self.call(action, params).await
        }
    }

    /// Test plugin that registers a message handler on setup
    struct TestPlugin {
        name: String,
        version: String,
        fail_setup: bool,
        unloaded: Arc<AtomicBool>,
    }

    impl Plugin for TestPlugin {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new(self.name.clone(), self.version.clone())
        }

        fn setup(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
            ctx.handle("message", |_payload| async move { Ok(()) });
            if self.fail_setup {
                return Err(PluginError::custom("setup exploded"));
            }
            Ok(())
        }

        fn on_unload(&mut self) {
            self.unloaded.store(true, Ordering::SeqCst);
        }
    }

    struct MockLoader {
        name: Mutex<String>,
        version: Mutex<String>,
        fail_setup: AtomicBool,
        unloaded: Arc<AtomicBool>,
    }

    impl MockLoader {
        fn new(name: &str) -> Self {
            Self {
                name: Mutex::new(name.to_string()),
                version: Mutex::new("1.0.0".to_string()),
                fail_setup: AtomicBool::new(false),
                unloaded: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl ModuleLoader for MockLoader {
        fn load(&self, _dir: &Path) -> Result<LoadedModule, PluginHostError> {
            Ok(LoadedModule {
                plugin: Box::new(TestPlugin {
                    name: self.name.lock().unwrap().clone(),
                    version: self.version.lock().unwrap().clone(),
                    fail_setup: self.fail_setup.load(Ordering::SeqCst),
                    unloaded: self.unloaded.clone(),
                }),
                library: None,
            })
        }
    }

    struct Fixture {
        manager: PluginManager,
        registry: DispatchRegistry,
        unloaded: Arc<AtomicBool>,
        _dir: TempDir,
    }

    fn fixture(plugin_name: &str, enabled: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(plugin_name)).unwrap();

        let registry = DispatchRegistry::new();
        let loader = MockLoader::new(plugin_name);
        let unloaded = loader.unloaded.clone();
        let manager = PluginManager::with_loader(
            Api::new(Arc::new(NullCaller)),
            registry.clone(),
            dir.path(),
            enabled.iter().map(|s| s.to_string()).collect(),
            Box::new(loader),
        );
        Fixture {
            manager,
            registry,
            unloaded,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_load_skips_plugin_not_in_enabled_set() {
        let mut f = fixture("hello", &[]);
        let dir = f._dir.path().join("hello");

        assert!(!f.manager.load_plugin(&dir).unwrap());
        assert!(!f.manager.is_loaded("hello"));
        assert_eq!(f.registry.total_handlers(), 0);
    }

    #[tokio::test]
    async fn test_load_registers_handlers() {
        let mut f = fixture("hello", &["hello"]);
        let dir = f._dir.path().join("hello");

        assert!(f.manager.load_plugin(&dir).unwrap());
        assert!(f.manager.is_loaded("hello"));
        assert_eq!(f.registry.handler_count("message"), 1);
    }

    #[tokio::test]
    async fn test_empty_manifest_name_is_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("hello")).unwrap();
        let registry = DispatchRegistry::new();
        // Loader produces a manifest with an empty name
        let mut manager = PluginManager::with_loader(
            Api::new(Arc::new(NullCaller)),
            registry.clone(),
            dir.path(),
            ["hello".to_string()].into_iter().collect(),
            Box::new(MockLoader::new("")),
        );

        let err = manager.load_plugin(&dir.path().join("hello")).unwrap_err();
        assert!(matches!(err, PluginHostError::InvalidPlugin { .. }));
        assert!(manager.get_all_plugins().iter().all(|p| !p.loaded));
        assert_eq!(registry.total_handlers(), 0);
    }

    #[tokio::test]
    async fn test_setup_failure_cleans_partial_registrations() {
        let f = fixture("hello", &["hello"]);
        let dir = f._dir.path().join("hello");
        let loader = MockLoader::new("hello");
        loader.fail_setup.store(true, Ordering::SeqCst);
        let mut manager = PluginManager::with_loader(
            Api::new(Arc::new(NullCaller)),
            f.registry.clone(),
            f._dir.path(),
            ["hello".to_string()].into_iter().collect(),
            Box::new(loader),
        );

        let err = manager.load_plugin(&dir).unwrap_err();
        assert!(matches!(err, PluginHostError::SetupFailed { .. }));
        assert!(!manager.is_loaded("hello"));
        // The handler registered before the failure is gone
        assert_eq!(f.registry.total_handlers(), 0);
    }

    #[tokio::test]
    async fn test_unload_removes_handlers_and_calls_on_unload() {
        let mut f = fixture("hello", &["hello"]);
        let dir = f._dir.path().join("hello");
        f.manager.load_plugin(&dir).unwrap();

        assert!(f.manager.unload_plugin("hello", false));
        assert!(!f.manager.is_loaded("hello"));
        assert_eq!(f.registry.total_handlers(), 0);
        assert!(f.unloaded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unload_absent_plugin_returns_false() {
        let mut f = fixture("hello", &[]);
        assert!(!f.manager.unload_plugin("ghost", false));
    }

    #[tokio::test]
    async fn test_builtin_cannot_be_unloaded_or_disabled() {
        let mut f = fixture("hello", &[]);
        f.manager
            .register_builtin(Box::new(TestPlugin {
                name: "admin".to_string(),
                version: "1.0.0".to_string(),
                fail_setup: false,
                unloaded: Arc::new(AtomicBool::new(false)),
            }))
            .unwrap();

        assert!(!f.manager.unload_plugin("admin", false));
        assert!(!f.manager.disable_plugin("admin"));
        assert!(f.manager.is_loaded("admin"));

        // Internal teardown with allow_builtin still works
        assert!(f.manager.unload_plugin("admin", true));
    }

    #[tokio::test]
    async fn test_user_plugin_cannot_shadow_builtin_name() {
        // Plugin directory named after the builtin
        let mut f = fixture("admin", &[]);
        let builtin_unloaded = Arc::new(AtomicBool::new(false));
        f.manager
            .register_builtin(Box::new(TestPlugin {
                name: "admin".to_string(),
                version: "1.0.0".to_string(),
                fail_setup: false,
                unloaded: builtin_unloaded.clone(),
            }))
            .unwrap();

        let err = f.manager.enable_plugin("admin").unwrap_err();
        assert!(matches!(err, PluginHostError::InvalidPlugin { .. }));

        // The builtin survives untouched, handlers included
        assert!(!builtin_unloaded.load(Ordering::SeqCst));
        assert_eq!(f.registry.handler_count("message"), 1);
        let infos = f.manager.get_all_plugins();
        let admin = infos.iter().find(|p| p.name == "admin").unwrap();
        assert!(admin.builtin);
        assert!(admin.loaded);
    }

    #[tokio::test]
    async fn test_enable_is_idempotent() {
        let mut f = fixture("hello", &[]);
        f.manager.enable_plugin("hello").unwrap();
        assert!(f.manager.is_loaded("hello"));
        assert_eq!(f.registry.handler_count("message"), 1);

        // Second enable changes nothing
        f.manager.enable_plugin("hello").unwrap();
        assert_eq!(f.registry.handler_count("message"), 1);
    }

    #[tokio::test]
    async fn test_enable_unknown_plugin_is_not_found() {
        let mut f = fixture("hello", &[]);
        let err = f.manager.enable_plugin("ghost").unwrap_err();
        assert!(matches!(err, PluginHostError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_enable_resolves_name_case_insensitively() {
        let mut f = fixture("Hello", &[]);
        f.manager.enable_plugin("hello").unwrap();
        assert!(f.manager.is_enabled("Hello"));
    }

    #[tokio::test]
    async fn test_disable_is_idempotent() {
        let mut f = fixture("hello", &["hello"]);
        let dir = f._dir.path().join("hello");
        f.manager.load_plugin(&dir).unwrap();

        assert!(f.manager.disable_plugin("hello"));
        assert!(!f.manager.is_loaded("hello"));
        assert!(!f.manager.is_enabled("hello"));
        assert_eq!(f.registry.total_handlers(), 0);

        // Disabling again still succeeds
        assert!(f.manager.disable_plugin("hello"));
    }

    #[tokio::test]
    async fn test_enable_disable_roundtrip_restores_registry_state() {
        let mut f = fixture("hello", &[]);

        f.manager.enable_plugin("hello").unwrap();
        assert_eq!(f.registry.handler_count("message"), 1);

        f.manager.disable_plugin("hello");
        assert_eq!(f.registry.handler_count("message"), 0);

        f.manager.enable_plugin("hello").unwrap();
        assert_eq!(f.registry.handler_count("message"), 1);
    }

    #[tokio::test]
    async fn test_reload_replaces_instance() {
        let mut f = fixture("hello", &["hello"]);
        let dir = f._dir.path().join("hello");
        f.manager.load_plugin(&dir).unwrap();

        f.manager.reload_plugin("hello").unwrap();
        assert!(f.manager.is_loaded("hello"));
        assert_eq!(f.registry.handler_count("message"), 1);
        // The first instance was torn down
        assert!(f.unloaded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reload_unknown_plugin_is_not_found() {
        let mut f = fixture("hello", &[]);
        let err = f.manager.reload_plugin("ghost").unwrap_err();
        assert!(matches!(err, PluginHostError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_all_skips_disabled_and_tolerates_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("enabled-one")).unwrap();
        std::fs::create_dir(dir.path().join("disabled-one")).unwrap();

        let registry = DispatchRegistry::new();
        // Loader produces a plugin named after nothing useful; what
        // matters is the enabled-set gate by directory name
        let loader = MockLoader::new("enabled-one");
        let mut manager = PluginManager::with_loader(
            Api::new(Arc::new(NullCaller)),
            registry.clone(),
            dir.path(),
            ["enabled-one".to_string()].into_iter().collect(),
            Box::new(loader),
        );

        assert_eq!(manager.load_all_plugins(), 1);
        assert!(manager.is_loaded("enabled-one"));
        assert!(!manager.is_loaded("disabled-one"));
    }

    #[tokio::test]
    async fn test_get_all_plugins_includes_placeholders() {
        let mut f = fixture("hello", &[]);
        std::fs::create_dir(f._dir.path().join("dormant")).unwrap();
        f.manager.enable_plugin("hello").unwrap();

        let infos = f.manager.get_all_plugins();
        let dormant = infos.iter().find(|p| p.name == "dormant").unwrap();
        assert!(!dormant.loaded);
        assert!(!dormant.enabled);
        assert_eq!(dormant.description, "(not loaded)");

        let hello = infos.iter().find(|p| p.name == "hello").unwrap();
        assert!(hello.loaded);
        assert!(hello.enabled);
        assert_eq!(hello.version, "1.0.0");
    }
}
