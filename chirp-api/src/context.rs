//! Plugin-facing context: action API, handler registration and event payloads

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::action::{
    FriendInfo, GroupInfo, GroupMemberInfo, LoginInfo, MessageId, VersionInfo,
};
use crate::error::{ActionError, PluginError};
use crate::event::{BotEvent, MessageEvent, MessageKind};
use crate::segment::Segment;

/// Boxed future returned by event handlers
pub type HandlerFuture = BoxFuture<'static, Result<(), PluginError>>;

/// A registered event callback
pub type EventHandler = Arc<dyn Fn(EventPayload) -> HandlerFuture + Send + Sync>;

/// Seam for sending actions to the endpoint and awaiting the correlated response
#[async_trait]
pub trait ActionCaller: Send + Sync {
    /// Send an action and wait for its response `data`
    async fn call(&self, action: &str, params: Value) -> Result<Value, ActionError>;

    /// Send an action but give up after `timeout`
    async fn call_with_timeout(
        &self,
        action: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ActionError>;
}

/// Seam for registering event handlers on behalf of a plugin
pub trait HandlerRegistrar: Send + Sync {
    /// Register `handler` under `key`; the disposer removes exactly this registration
    fn register(&self, key: &str, handler: EventHandler) -> Disposer;
}

/// Removes one handler registration when invoked
///
/// Dropping a disposer without calling [`Disposer::dispose`] leaves the
/// registration in place; it then lives until its owning plugin is
/// unloaded or disabled.
pub struct Disposer(Option<Box<dyn FnOnce() + Send>>);

impl Disposer {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A disposer that does nothing (e.g. for deduplicated registrations)
    pub fn noop() -> Self {
        Self(None)
    }

    /// Remove the registration this disposer refers to
    pub fn dispose(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Disposer")
            .field(&self.0.as_ref().map(|_| "active").unwrap_or("noop"))
            .finish()
    }
}

/// Message content accepted by the send helpers
#[derive(Debug, Clone)]
pub enum OutgoingContent {
    Text(String),
    Segments(Vec<Segment>),
}

impl OutgoingContent {
    pub fn into_segments(self) -> Vec<Segment> {
        match self {
            OutgoingContent::Text(text) => vec![Segment::text(text)],
            OutgoingContent::Segments(segments) => segments,
        }
    }
}

impl From<&str> for OutgoingContent {
    fn from(text: &str) -> Self {
        OutgoingContent::Text(text.to_string())
    }
}

impl From<String> for OutgoingContent {
    fn from(text: String) -> Self {
        OutgoingContent::Text(text)
    }
}

impl From<Vec<Segment>> for OutgoingContent {
    fn from(segments: Vec<Segment>) -> Self {
        OutgoingContent::Segments(segments)
    }
}

impl From<Segment> for OutgoingContent {
    fn from(segment: Segment) -> Self {
        OutgoingContent::Segments(vec![segment])
    }
}

/// Cheaply cloneable handle for calling endpoint actions
///
/// The typed wrappers are thin compositions over [`ActionCaller::call`];
/// anything not wrapped here can be reached with [`Api::call`] directly.
#[derive(Clone)]
pub struct Api {
    caller: Arc<dyn ActionCaller>,
}

impl Api {
    pub fn new(caller: Arc<dyn ActionCaller>) -> Self {
        Self { caller }
    }

    /// Raw action call
    pub async fn call(&self, action: &str, params: Value) -> Result<Value, ActionError> {
        self.caller.call(action, params).await
    }

    /// Raw action call with a deadline
    pub async fn call_with_timeout(
        &self,
        action: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ActionError> {
        self.caller.call_with_timeout(action, params, timeout).await
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Value,
    ) -> Result<T, ActionError> {
        let data = self.caller.call(action, params).await?;
        serde_json::from_value(data).map_err(|e| ActionError::Decode(e.to_string()))
    }

    pub async fn send_private_msg(
        &self,
        user_id: i64,
        message: impl Into<OutgoingContent>,
    ) -> Result<i64, ActionError> {
        let segments = message.into().into_segments();
        let data: MessageId = self
            .call_typed(
                "send_private_msg",
                json!({"user_id": user_id, "message": segments}),
            )
            .await?;
        Ok(data.message_id)
    }

    pub async fn send_group_msg(
        &self,
        group_id: i64,
        message: impl Into<OutgoingContent>,
    ) -> Result<i64, ActionError> {
        let segments = message.into().into_segments();
        let data: MessageId = self
            .call_typed(
                "send_group_msg",
                json!({"group_id": group_id, "message": segments}),
            )
            .await?;
        Ok(data.message_id)
    }

    pub async fn delete_msg(&self, message_id: i64) -> Result<(), ActionError> {
        self.call("delete_msg", json!({"message_id": message_id}))
            .await?;
        Ok(())
    }

    pub async fn get_msg(&self, message_id: i64) -> Result<Value, ActionError> {
        self.call("get_msg", json!({"message_id": message_id})).await
    }

    pub async fn get_login_info(&self) -> Result<LoginInfo, ActionError> {
        self.call_typed("get_login_info", json!({})).await
    }

    pub async fn get_version_info(&self) -> Result<VersionInfo, ActionError> {
        self.call_typed("get_version_info", json!({})).await
    }

    pub async fn get_group_info(&self, group_id: i64) -> Result<GroupInfo, ActionError> {
        self.call_typed("get_group_info", json!({"group_id": group_id}))
            .await
    }

    pub async fn get_group_list(&self) -> Result<Vec<GroupInfo>, ActionError> {
        self.call_typed("get_group_list", json!({})).await
    }

    pub async fn get_group_member_info(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<GroupMemberInfo, ActionError> {
        self.call_typed(
            "get_group_member_info",
            json!({"group_id": group_id, "user_id": user_id}),
        )
        .await
    }

    pub async fn get_group_member_list(
        &self,
        group_id: i64,
    ) -> Result<Vec<GroupMemberInfo>, ActionError> {
        self.call_typed("get_group_member_list", json!({"group_id": group_id}))
            .await
    }

    pub async fn get_friend_list(&self) -> Result<Vec<FriendInfo>, ActionError> {
        self.call_typed("get_friend_list", json!({})).await
    }

    pub async fn set_group_card(
        &self,
        group_id: i64,
        user_id: i64,
        card: &str,
    ) -> Result<(), ActionError> {
        self.call(
            "set_group_card",
            json!({"group_id": group_id, "user_id": user_id, "card": card}),
        )
        .await?;
        Ok(())
    }

    pub async fn set_group_admin(
        &self,
        group_id: i64,
        user_id: i64,
        enable: bool,
    ) -> Result<(), ActionError> {
        self.call(
            "set_group_admin",
            json!({"group_id": group_id, "user_id": user_id, "enable": enable}),
        )
        .await?;
        Ok(())
    }

    /// Mute a member for `duration` seconds; 0 lifts the ban
    pub async fn set_group_ban(
        &self,
        group_id: i64,
        user_id: i64,
        duration: i64,
    ) -> Result<(), ActionError> {
        self.call(
            "set_group_ban",
            json!({"group_id": group_id, "user_id": user_id, "duration": duration}),
        )
        .await?;
        Ok(())
    }

    pub async fn set_group_whole_ban(
        &self,
        group_id: i64,
        enable: bool,
    ) -> Result<(), ActionError> {
        self.call(
            "set_group_whole_ban",
            json!({"group_id": group_id, "enable": enable}),
        )
        .await?;
        Ok(())
    }

    pub async fn set_group_kick(
        &self,
        group_id: i64,
        user_id: i64,
        reject_add_request: bool,
    ) -> Result<(), ActionError> {
        self.call(
            "set_group_kick",
            json!({
                "group_id": group_id,
                "user_id": user_id,
                "reject_add_request": reject_add_request
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_group_leave(&self, group_id: i64) -> Result<(), ActionError> {
        self.call("set_group_leave", json!({"group_id": group_id}))
            .await?;
        Ok(())
    }

    pub async fn set_group_name(&self, group_id: i64, name: &str) -> Result<(), ActionError> {
        self.call(
            "set_group_name",
            json!({"group_id": group_id, "group_name": name}),
        )
        .await?;
        Ok(())
    }

    pub async fn set_group_special_title(
        &self,
        group_id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<(), ActionError> {
        self.call(
            "set_group_special_title",
            json!({"group_id": group_id, "user_id": user_id, "special_title": title}),
        )
        .await?;
        Ok(())
    }

    pub async fn send_like(&self, user_id: i64, times: i64) -> Result<(), ActionError> {
        self.call("send_like", json!({"user_id": user_id, "times": times}))
            .await?;
        Ok(())
    }

    pub async fn set_msg_emoji_like(
        &self,
        message_id: i64,
        emoji_id: i64,
    ) -> Result<(), ActionError> {
        self.call(
            "set_msg_emoji_like",
            json!({"message_id": message_id, "emoji_id": emoji_id}),
        )
        .await?;
        Ok(())
    }

    /// Avatar URL for a user, `size` one of 40/100/140/640
    pub fn avatar_url(user_id: i64, size: u32) -> String {
        format!("https://q1.qlogo.cn/g?b=qq&nk={user_id}&s={size}")
    }

    /// Avatar URL for a group
    pub fn group_avatar_url(group_id: i64, size: u32) -> String {
        format!("https://p.qlogo.cn/gh/{group_id}/{group_id}/{size}")
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").finish_non_exhaustive()
    }
}

/// An event delivered to a handler, together with the action API
#[derive(Debug, Clone)]
pub struct EventPayload {
    pub event: Arc<BotEvent>,
    pub api: Api,
}

impl EventPayload {
    pub fn new(event: Arc<BotEvent>, api: Api) -> Self {
        Self { event, api }
    }

    /// The message inside this payload, if it is a message event
    pub fn message(&self) -> Option<&MessageEvent> {
        match &*self.event {
            BotEvent::Message(msg) | BotEvent::MessageSent(msg) => Some(msg),
            _ => None,
        }
    }

    /// Answer a message event in the chat it came from
    ///
    /// Routes to `send_group_msg` or `send_private_msg` based on the
    /// message's own `message_type`. With `quote` the original message is
    /// referenced via a reply segment. Fails with
    /// [`ActionError::NotAMessage`] for non-message events.
    pub async fn reply(
        &self,
        content: impl Into<OutgoingContent>,
        quote: bool,
    ) -> Result<i64, ActionError> {
        let msg = self.message().ok_or(ActionError::NotAMessage)?;
        let mut segments = content.into().into_segments();
        if quote {
            segments.insert(0, Segment::reply(msg.message_id));
        }
        match msg.message_type {
            MessageKind::Group => {
                let group_id = msg.group_id.ok_or(ActionError::NotAMessage)?;
                self.api.send_group_msg(group_id, segments).await
            }
            MessageKind::Private => self.api.send_private_msg(msg.user_id, segments).await,
        }
    }
}

/// Per-plugin context handed to [`crate::Plugin::setup`]
///
/// Registrations made through this context are attributed to the plugin
/// and removed automatically when it is unloaded or disabled.
pub struct PluginContext {
    plugin_name: String,
    api: Api,
    registrar: Arc<dyn HandlerRegistrar>,
}

impl PluginContext {
    pub fn new(
        plugin_name: impl Into<String>,
        api: Api,
        registrar: Arc<dyn HandlerRegistrar>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            api,
            registrar,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Register an async closure for an event key
    ///
    /// Keys go from general to specific (`message`, `message.group`,
    /// `notice.notify.poke`, ...); a handler fires for the exact level it
    /// registered at.
    pub fn handle<F, Fut>(&mut self, key: &str, f: F) -> Disposer
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |payload| Box::pin(f(payload)));
        self.registrar.register(key, handler)
    }

    /// Register a pre-built handler (same callback under the same key is
    /// registered at most once)
    pub fn handle_raw(&mut self, key: &str, handler: EventHandler) -> Disposer {
        self.registrar.register(key, handler)
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_name", &self.plugin_name)
            .finish_non_exhaustive()
    }
}
