//! Demo plugin: sends profile likes on request
//!
//! "like me" likes the sender, "like them" likes the first mentioned
//! user. Likes go out in batches of ten until the endpoint refuses one
//! (the daily cap), then the triggering message gets an emoji reaction:
//! a thumbs-up when anything was sent, a teardrop when the cap was
//! already spent.

use chirp_api::{
    ActionError, EventPayload, Plugin, PluginContext, PluginError, PluginManifest, export_plugin,
};

// QQ emoji ids for the reaction on the triggering message
const EMOJI_THUMBS_UP: i64 = 201;
const EMOJI_TEARDROP: i64 = 174;

#[derive(Default)]
pub struct LikePlugin;

impl Plugin for LikePlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("like", env!("CARGO_PKG_VERSION"))
            .with_description("likes profiles until the daily cap")
    }

    fn setup(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        ctx.handle("message.group", |payload| async move {
            respond(&payload).await
        });
        Ok(())
    }
}

async fn respond(payload: &EventPayload) -> Result<(), PluginError> {
    let Some(msg) = payload.message() else {
        return Ok(());
    };

    let text = msg.plain_text();
    let target = match text.trim() {
        "like me" => msg.user_id,
        rest if rest.starts_with("like them") => {
            match msg.at_targets().first().copied() {
                Some(id) => id,
                None => return Ok(()),
            }
        }
        _ => return Ok(()),
    };

    let mut count = 0;
    loop {
        match payload.api.send_like(target, 10).await {
            Ok(()) => count += 10,
            // The endpoint refuses the batch past the daily cap
            Err(ActionError::Failed { .. }) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let emoji = if count > 0 {
        EMOJI_THUMBS_UP
    } else {
        EMOJI_TEARDROP
    };
    payload.api.set_msg_emoji_like(msg.message_id, emoji).await?;
    Ok(())
}

export_plugin!(LikePlugin);

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_api::{
        ActionCaller, Api, BotEvent, MessageEvent, MessageKind, Segment, Sender,
    };
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Caller that accepts a fixed number of send_like batches, then
    /// refuses the rest the way a capped endpoint does
    struct CappedCaller {
        calls: Mutex<Vec<(String, Value)>>,
        batches_left: Mutex<u32>,
    }

    impl CappedCaller {
        fn new(batches: u32) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                batches_left: Mutex::new(batches),
            }
        }
    }

    #[async_trait::async_trait]
    impl ActionCaller for CappedCaller {
        async fn call(&self, action: &str, params: Value) -> Result<Value, ActionError> {
            self.calls
                .lock()
                .unwrap()
                .push((action.to_string(), params));
            if action == "send_like" {
                let mut left = self.batches_left.lock().unwrap();
                if *left == 0 {
                    return Err(ActionError::Failed {
                        action: action.to_string(),
                        retcode: 1200,
                        message: "ERR".to_string(),
                        wording: "daily cap reached".to_string(),
                    });
                }
                *left -= 1;
            }
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

    fn group_message(text: &str, mention: Option<i64>) -> BotEvent {
        let mut segments = vec![Segment::text(text)];
        if let Some(id) = mention {
            segments.push(Segment::at(id));
        }
        BotEvent::Message(MessageEvent {
            time: 0,
            self_id: 1,
            message_type: MessageKind::Group,
            sub_type: Some("normal".to_string()),
            message_id: 42,
            user_id: 10001,
            group_id: Some(20002),
            message: segments,
            raw_message: text.to_string(),
            sender: Sender::default(),
        })
    }

    async fn run_plugin_with(event: BotEvent, batches: u32) -> Vec<(String, Value)> {
        let caller = Arc::new(CappedCaller::new(batches));
        let payload = EventPayload::new(Arc::new(event), Api::new(caller.clone()));
        respond(&payload).await.unwrap();

        let calls = caller.calls.lock().unwrap();
        calls.clone()
    }

    #[tokio::test]
    async fn test_like_me_loops_until_the_cap_then_reacts() {
        let calls = run_plugin_with(group_message("like me", None), 3).await;

        // Three accepted batches plus the refused fourth
        let likes: Vec<_> = calls.iter().filter(|(a, _)| a == "send_like").collect();
        assert_eq!(likes.len(), 4);
        assert!(likes.iter().all(|(_, p)| p["user_id"] == 10001 && p["times"] == 10));

        let (action, params) = calls.last().unwrap();
        assert_eq!(action, "set_msg_emoji_like");
        assert_eq!(params["message_id"], 42);
        assert_eq!(params["emoji_id"], json!(EMOJI_THUMBS_UP));
    }

    #[tokio::test]
    async fn test_spent_cap_reacts_with_teardrop() {
        let calls = run_plugin_with(group_message("like me", None), 0).await;

        assert_eq!(calls.len(), 2);
        let (action, params) = calls.last().unwrap();
        assert_eq!(action, "set_msg_emoji_like");
        assert_eq!(params["emoji_id"], json!(EMOJI_TEARDROP));
    }

    #[tokio::test]
    async fn test_like_them_targets_the_mentioned_user() {
        let calls = run_plugin_with(group_message("like them ", Some(777)), 1).await;

        let likes: Vec<_> = calls.iter().filter(|(a, _)| a == "send_like").collect();
        assert!(!likes.is_empty());
        assert!(likes.iter().all(|(_, p)| p["user_id"] == 777));
    }

    #[tokio::test]
    async fn test_like_them_without_mention_is_ignored() {
        let calls = run_plugin_with(group_message("like them", None), 1).await;
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_other_text_is_ignored() {
        let calls = run_plugin_with(group_message("nothing to see", None), 1).await;
        assert!(calls.is_empty());
    }
}
