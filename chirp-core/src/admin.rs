//! Builtin admin plugin
//!
//! Listens on `message` for prefix-triggered commands and drives the
//! plugin lifecycle and bot settings from chat. Admins may inspect and
//! manage plugins; settings commands (`set ...`) are restricted to root
//! users. Mutations are persisted back to the config file.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::BotConfig;
use crate::plugins::PluginManager;
use chirp_api::{
    Api, EventPayload, Plugin, PluginContext, PluginError, PluginManifest,
};

/// A parsed admin command
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    Help,
    Status,
    PluginList,
    PluginReload(String),
    PluginEnable(String),
    PluginDisable(String),
    SetPrefix(String),
    AdminAdd(Option<i64>),
    AdminRemove(Option<i64>),
    OwnerAdd(Option<i64>),
    OwnerRemove(Option<i64>),
    Unknown(String),
}

/// Parse a prefixed command out of message text
///
/// Returns `None` for text that does not start with the prefix; prefixed
/// text that matches no command parses to [`AdminCommand::Unknown`] so
/// the handler can point at `help`.
pub fn parse_command(prefix: &str, text: &str) -> Option<AdminCommand> {
    let text = text.trim();
    let rest = text.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();

    let command = match words.next()? {
        "help" => AdminCommand::Help,
        "status" => AdminCommand::Status,
        "plugin" => match (words.next(), words.next()) {
            (Some("list") | Some("ls"), _) | (None, _) => AdminCommand::PluginList,
            (Some("reload"), Some(name)) => AdminCommand::PluginReload(name.to_string()),
            (Some("enable") | Some("on"), Some(name)) => {
                AdminCommand::PluginEnable(name.to_string())
            }
            (Some("disable") | Some("off"), Some(name)) => {
                AdminCommand::PluginDisable(name.to_string())
            }
            _ => AdminCommand::Unknown(rest.trim().to_string()),
        },
        "set" => match (words.next(), words.next(), words.next()) {
            (Some("prefix"), Some(p), _) => AdminCommand::SetPrefix(p.to_string()),
            (Some("admin"), Some("add"), id) => AdminCommand::AdminAdd(parse_id(id)),
            (Some("admin"), Some("remove"), id) => AdminCommand::AdminRemove(parse_id(id)),
            (Some("owner"), Some("add"), id) => AdminCommand::OwnerAdd(parse_id(id)),
            (Some("owner"), Some("remove"), id) => AdminCommand::OwnerRemove(parse_id(id)),
            _ => AdminCommand::Unknown(rest.trim().to_string()),
        },
        other => AdminCommand::Unknown(other.to_string()),
    };
    Some(command)
}

fn parse_id(word: Option<&str>) -> Option<i64> {
    word.and_then(|w| w.parse().ok())
}

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// The builtin administration plugin
pub struct AdminPlugin {
    manager: Arc<tokio::sync::Mutex<PluginManager>>,
    config: Arc<RwLock<BotConfig>>,
    config_path: PathBuf,
    started_at: Instant,
}

impl AdminPlugin {
    pub fn new(
        manager: Arc<tokio::sync::Mutex<PluginManager>>,
        config: Arc<RwLock<BotConfig>>,
        config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager,
            config,
            config_path: config_path.into(),
            started_at: Instant::now(),
        }
    }
}

impl Plugin for AdminPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("admin", env!("CARGO_PKG_VERSION"))
            .with_description("builtin administration commands")
    }

    fn setup(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        let manager = self.manager.clone();
        let config = self.config.clone();
        let config_path = self.config_path.clone();
        let started_at = self.started_at;

        ctx.handle("message", move |payload| {
            let manager = manager.clone();
            let config = config.clone();
            let config_path = config_path.clone();
            async move {
                handle_message(payload, manager, config, config_path, started_at).await
            }
        });
        Ok(())
    }
}

async fn handle_message(
    payload: EventPayload,
    manager: Arc<tokio::sync::Mutex<PluginManager>>,
    config: Arc<RwLock<BotConfig>>,
    config_path: PathBuf,
    started_at: Instant,
) -> Result<(), PluginError> {
    let Some(msg) = payload.message() else {
        return Ok(());
    };

    let (prefix, is_admin, is_root) = {
        let cfg = config.read().unwrap();
        (
            cfg.prefix.clone(),
            cfg.is_admin(msg.user_id),
            cfg.is_root(msg.user_id),
        )
    };

    let Some(command) = parse_command(&prefix, &msg.plain_text()) else {
        return Ok(());
    };
    if !is_admin {
        tracing::debug!(user = msg.user_id, "ignoring admin command from non-admin");
        return Ok(());
    }
    tracing::info!(user = msg.user_id, ?command, "admin command");

    let mention = msg.at_targets().first().copied();
    let reply = match command {
        AdminCommand::Help => help_text(&prefix, is_root),
        AdminCommand::Status => status_text(&payload.api, &manager, started_at).await,
        AdminCommand::PluginList => {
            let infos = manager.lock().await.get_all_plugins();
            if infos.is_empty() {
                "no plugins found".to_string()
            } else {
                infos
                    .iter()
                    .map(|p| {
                        let state = if p.builtin {
                            "builtin"
                        } else if p.loaded {
                            "enabled"
                        } else if p.enabled {
                            "enabled, not loaded"
                        } else {
                            "disabled"
                        };
                        format!("{} {} ({})", p.name, p.version, state)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        AdminCommand::PluginReload(name) => {
            match manager.lock().await.reload_plugin(&name) {
                Ok(()) => format!("plugin '{name}' reloaded"),
                Err(e) => format!("reload failed: {e}"),
            }
        }
        AdminCommand::PluginEnable(name) => {
            let result = {
                let mut mgr = manager.lock().await;
                let result = mgr.enable_plugin(&name);
                if result.is_ok() {
                    persist_plugins(&config, &config_path, mgr.enabled_names());
                }
                result
            };
            match result {
                Ok(()) => format!("plugin '{name}' enabled"),
                Err(e) => format!("enable failed: {e}"),
            }
        }
        AdminCommand::PluginDisable(name) => {
            let disabled = {
                let mut mgr = manager.lock().await;
                let disabled = mgr.disable_plugin(&name);
                if disabled {
                    persist_plugins(&config, &config_path, mgr.enabled_names());
                }
                disabled
            };
            if disabled {
                format!("plugin '{name}' disabled")
            } else {
                format!("'{name}' is a builtin plugin and cannot be disabled")
            }
        }
        AdminCommand::SetPrefix(new_prefix) => {
            if !is_root {
                "only root users can change settings".to_string()
            } else {
                let mut cfg = config.write().unwrap();
                cfg.prefix = new_prefix.clone();
                save_config(&cfg, &config_path);
                format!("prefix changed to '{new_prefix}'")
            }
        }
        AdminCommand::AdminAdd(target) => {
            mutate_user_list(&config, &config_path, is_root, target.or(mention), |cfg, id| {
                if cfg.admins.contains(&id) {
                    format!("{id} is already an admin")
                } else {
                    cfg.admins.push(id);
                    format!("{id} is now an admin")
                }
            })
        }
        AdminCommand::AdminRemove(target) => {
            mutate_user_list(&config, &config_path, is_root, target.or(mention), |cfg, id| {
                if cfg.admins.contains(&id) {
                    cfg.admins.retain(|&a| a != id);
                    format!("{id} is no longer an admin")
                } else {
                    format!("{id} is not an admin")
                }
            })
        }
        AdminCommand::OwnerAdd(target) => {
            mutate_user_list(&config, &config_path, is_root, target.or(mention), |cfg, id| {
                if cfg.root.contains(&id) {
                    format!("{id} is already an owner")
                } else {
                    cfg.root.push(id);
                    format!("{id} is now an owner")
                }
            })
        }
        AdminCommand::OwnerRemove(target) => {
            let caller = msg.user_id;
            mutate_user_list(&config, &config_path, is_root, target.or(mention), |cfg, id| {
                if id == caller {
                    "refusing to remove yourself from the owner list".to_string()
                } else if cfg.root.contains(&id) {
                    cfg.root.retain(|&r| r != id);
                    format!("{id} is no longer an owner")
                } else {
                    format!("{id} is not an owner")
                }
            })
        }
        AdminCommand::Unknown(input) => {
            format!("unknown command '{input}', try {prefix}help")
        }
    };

    payload.reply(reply, true).await?;
    Ok(())
}

fn help_text(prefix: &str, is_root: bool) -> String {
    let mut lines = vec![
        format!("{prefix}help - this list"),
        format!("{prefix}status - bot status"),
        format!("{prefix}plugin list - all plugins"),
        format!("{prefix}plugin reload <name>"),
        format!("{prefix}plugin enable <name>"),
        format!("{prefix}plugin disable <name>"),
    ];
    if is_root {
        lines.push(format!("{prefix}set prefix <prefix>"));
        lines.push(format!("{prefix}set admin add|remove <id|@user>"));
        lines.push(format!("{prefix}set owner add|remove <id|@user>"));
    }
    lines.join("\n")
}

async fn status_text(
    api: &Api,
    manager: &Arc<tokio::sync::Mutex<PluginManager>>,
    started_at: Instant,
) -> String {
    let (user_total, user_enabled, builtins) = {
        let infos = manager.lock().await.get_all_plugins();
        let user: Vec<_> = infos.iter().filter(|p| !p.builtin).collect();
        (
            user.len(),
            user.iter().filter(|p| p.enabled).count(),
            infos.len() - user.len(),
        )
    };

    let identity = match api.get_login_info().await {
        Ok(info) => format!("{} ({})", info.nickname, info.user_id),
        Err(e) => format!("unknown ({e})"),
    };
    let groups = api.get_group_list().await.map(|g| g.len()).unwrap_or(0);
    let friends = api.get_friend_list().await.map(|f| f.len()).unwrap_or(0);

    format!(
        "account: {identity}\ngroups: {groups}, friends: {friends}\n\
         plugins: {user_enabled}/{user_total} enabled (+{builtins} builtin)\n\
         chirp v{} up {}",
        env!("CARGO_PKG_VERSION"),
        format_uptime(started_at.elapsed().as_secs()),
    )
}

fn mutate_user_list(
    config: &Arc<RwLock<BotConfig>>,
    config_path: &PathBuf,
    is_root: bool,
    target: Option<i64>,
    apply: impl FnOnce(&mut BotConfig, i64) -> String,
) -> String {
    if !is_root {
        return "only root users can change settings".to_string();
    }
    let Some(id) = target else {
        return "specify a user id or @mention".to_string();
    };
    let mut cfg = config.write().unwrap();
    let reply = apply(&mut cfg, id);
    save_config(&cfg, config_path);
    reply
}

fn save_config(config: &BotConfig, path: &PathBuf) {
    if let Err(e) = config.save(path) {
        tracing::error!(path = %path.display(), error = %e, "failed to persist config");
    }
}

fn persist_plugins(config: &Arc<RwLock<BotConfig>>, path: &PathBuf, enabled: Vec<String>) {
    let mut cfg = config.write().unwrap();
    cfg.plugins = enabled;
    save_config(&cfg, path);
}
