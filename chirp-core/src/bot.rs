//! Bot composition root
//!
//! Wires transport, correlator, classifier, registry and plugin manager
//! together and owns the two long-lived tasks: the frame router (splits
//! inbound frames into action responses and events) and the socket
//! watcher (logs lifecycle transitions and fails in-flight calls on
//! close).

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::action::ActionClient;
use crate::admin::AdminPlugin;
use crate::classify::key_path;
use crate::config::BotConfig;
use crate::dispatch::DispatchRegistry;
use crate::error::ChirpError;
use crate::plugins::PluginManager;
use crate::socket::{Socket, SocketEvent};
use chirp_api::{ActionCaller, Api, BotEvent, EventPayload};

/// The assembled bot
pub struct Bot {
    config: Arc<RwLock<BotConfig>>,
    socket: Arc<Socket>,
    client: Arc<ActionClient>,
    registry: DispatchRegistry,
    manager: Arc<tokio::sync::Mutex<PluginManager>>,
    api: Api,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        config_path: impl Into<PathBuf>,
        plugins_dir: impl Into<PathBuf>,
    ) -> Self {
        let socket = Arc::new(Socket::new(config.socket_config()));
        let client = Arc::new(ActionClient::new(Arc::new(socket.sender())));
        let api = Api::new(client.clone() as Arc<dyn ActionCaller>);
        let registry = DispatchRegistry::new();

        let enabled = config.plugins.iter().cloned().collect();
        let manager = Arc::new(tokio::sync::Mutex::new(PluginManager::new(
            api.clone(),
            registry.clone(),
            plugins_dir,
            enabled,
        )));
        let config = Arc::new(RwLock::new(config));

        let bot = Self {
            config: config.clone(),
            socket,
            client,
            registry,
            manager: manager.clone(),
            api,
        };
        bot.register_admin(config_path.into());
        bot
    }

    fn register_admin(&self, config_path: PathBuf) {
        let admin = AdminPlugin::new(self.manager.clone(), self.config.clone(), config_path);
        // No other handle exists yet, the lock is uncontended
        match self.manager.try_lock() {
            Ok(mut mgr) => {
                if let Err(e) = mgr.register_builtin(Box::new(admin)) {
                    tracing::error!(error = %e, "failed to register the admin builtin");
                }
            }
            Err(_) => tracing::error!("plugin manager busy during startup"),
        }
    }

    /// Connect, start the router and watcher tasks and load all plugins
    pub async fn start(&self) -> Result<(), ChirpError> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.socket.connect(inbound_tx).await?;

        tokio::spawn(route_frames(
            inbound_rx,
            self.client.clone(),
            self.registry.clone(),
            self.api.clone(),
        ));
        tokio::spawn(watch_socket(self.socket.subscribe(), self.client.clone()));

        let loaded = self.manager.lock().await.load_all_plugins();
        tracing::info!(plugins = loaded, "bot started");
        Ok(())
    }

    /// Disconnect and fail every in-flight call
    pub async fn stop(&self) {
        self.socket.disconnect();
        self.client.fail_all();
        tracing::info!("bot stopped");
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    pub fn manager(&self) -> Arc<tokio::sync::Mutex<PluginManager>> {
        self.manager.clone()
    }

    pub fn config(&self) -> Arc<RwLock<BotConfig>> {
        self.config.clone()
    }

    pub fn subscribe_socket(&self) -> broadcast::Receiver<SocketEvent> {
        self.socket.subscribe()
    }
}

/// Split inbound frames into action responses and events, and deliver
/// events along their key path
async fn route_frames(
    mut inbound: mpsc::UnboundedReceiver<String>,
    client: Arc<ActionClient>,
    registry: DispatchRegistry,
    api: Api,
) {
    while let Some(text) = inbound.recv().await {
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "inbound frame is not JSON");
                continue;
            }
        };

        // Response frames carry our echo token
        if client.resolve(&value) {
            continue;
        }

        let event: BotEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable event frame");
                continue;
            }
        };

        let path = key_path(&event);
        let payload = EventPayload::new(Arc::new(event), api.clone());
        tracing::debug!(keys = ?path, "dispatching event");
        for key in path {
            registry.deliver(&key, payload.clone());
        }
    }
}

/// Log socket lifecycle and fail in-flight calls when the connection drops
async fn watch_socket(
    mut events: broadcast::Receiver<SocketEvent>,
    client: Arc<ActionClient>,
) {
    loop {
        match events.recv().await {
            Ok(SocketEvent::Connecting { attempt }) => {
                tracing::info!(attempt, "connecting to endpoint");
            }
            Ok(SocketEvent::Open) => {
                tracing::info!("endpoint connection open");
            }
            Ok(SocketEvent::Close { code, reason }) => {
                tracing::warn!(?code, %reason, "endpoint connection closed");
                client.fail_all();
            }
            Ok(SocketEvent::Error { message }) => {
                tracing::error!(%message, "endpoint connection failed");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "socket event watcher lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
