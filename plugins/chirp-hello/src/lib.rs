//! Demo plugin: replies to greetings and serves a small menu
//!
//! Shows the three things most plugins do: register a handler on a
//! message key, read the incoming message, and reply with text or
//! segments.

use chirp_api::{
    EventPayload, Plugin, PluginContext, PluginError, PluginManifest, Segment, export_plugin,
};

#[derive(Default)]
pub struct HelloPlugin;

impl Plugin for HelloPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("hello", env!("CARGO_PKG_VERSION"))
            .with_description("greets back and shows a menu")
    }

    fn setup(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        ctx.handle("message", |payload| async move {
            respond(&payload).await
        });
        Ok(())
    }
}

async fn respond(payload: &EventPayload) -> Result<(), PluginError> {
    let Some(msg) = payload.message() else {
        return Ok(());
    };

    match msg.plain_text().trim() {
        "hello" => {
            payload.reply("hello, world!", false).await?;
        }
        "menu" => {
            let menu = vec![
                Segment::at(msg.user_id),
                Segment::text(" here is what I can do:\n"),
                Segment::text("hello - a friendly greeting\n"),
                Segment::text("menu - this menu"),
            ];
            // Quote the request so the menu is easy to trace in busy groups
            payload.reply(menu, true).await?;
        }
        _ => {}
    }
    Ok(())
}

export_plugin!(HelloPlugin);

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_api::{
        ActionCaller, ActionError, Api, BotEvent, Disposer, EventHandler, HandlerRegistrar,
        MessageEvent, MessageKind, Sender,
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingCaller {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait::async_trait]
    impl ActionCaller for RecordingCaller {
        async fn call(&self, action: &str, params: Value) -> Result<Value, ActionError> {
            self.calls
                .lock()
                .unwrap()
                .push((action.to_string(), params));
            Ok(json!({"message_id": 1}))
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

    #[derive(Default)]
    struct CapturingRegistrar {
        handlers: Mutex<Vec<(String, EventHandler)>>,
    }

    impl HandlerRegistrar for CapturingRegistrar {
        fn register(&self, key: &str, handler: EventHandler) -> Disposer {
            self.handlers
                .lock()
                .unwrap()
                .push((key.to_string(), handler));
            Disposer::noop()
        }
    }

    fn private_message(text: &str) -> BotEvent {
        BotEvent::Message(MessageEvent {
            time: 0,
            self_id: 1,
            message_type: MessageKind::Private,
            sub_type: Some("friend".to_string()),
            message_id: 5,
            user_id: 10001,
            group_id: None,
            message: vec![Segment::text(text)],
            raw_message: text.to_string(),
            sender: Sender::default(),
        })
    }

    async fn run_plugin_with(text: &str) -> Vec<(String, Value)> {
        let caller = Arc::new(RecordingCaller {
            calls: Mutex::new(Vec::new()),
        });
        let registrar = Arc::new(CapturingRegistrar::default());

        let mut plugin = HelloPlugin;
        let mut ctx = PluginContext::new(
            "hello",
            Api::new(caller.clone()),
            registrar.clone(),
        );
        plugin.setup(&mut ctx).unwrap();

        let (key, handler) = {
            let handlers = registrar.handlers.lock().unwrap();
            assert_eq!(handlers.len(), 1);
            (handlers[0].0.clone(), handlers[0].1.clone())
        };
        assert_eq!(key, "message");

        let payload = EventPayload::new(
            Arc::new(private_message(text)),
            Api::new(caller.clone()),
        );
        handler(payload).await.unwrap();

        let calls = caller.calls.lock().unwrap();
        calls.clone()
    }

    #[tokio::test]
    async fn test_hello_gets_a_greeting_back() {
        let calls = run_plugin_with("hello").await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "send_private_msg");
        assert_eq!(
            calls[0].1["message"][0]["data"]["text"],
            "hello, world!"
        );
    }

    #[tokio::test]
    async fn test_menu_is_quoted_and_mentions_the_asker() {
        let calls = run_plugin_with("menu").await;
        assert_eq!(calls.len(), 1);
        let segments = calls[0].1["message"].as_array().unwrap();
        assert_eq!(segments[0]["type"], "reply");
        assert_eq!(segments[1]["type"], "at");
        assert_eq!(segments[1]["data"]["qq"], "10001");
    }

    #[tokio::test]
    async fn test_other_text_is_ignored() {
        let calls = run_plugin_with("what's up").await;
        assert!(calls.is_empty());
    }
}
