//! Event classification
//!
//! Maps a decoded event to its dot-joined key path, ordered from general
//! to specific. The router delivers the event once at every level, so a
//! handler on `message` sees every message while a handler on
//! `message.group.normal` sees only normal group chatter. Events whose
//! inner discriminator is unknown keep their category root so generic
//! handlers still fire.

use chirp_api::{
    BotEvent, MessageEvent, MessageKind, MetaEvent, MetaKind, NoticeEvent, NoticeKind, NotifyKind,
    RequestEvent, RequestKind,
};

/// Derive the delivery key path for an event
pub fn key_path(event: &BotEvent) -> Vec<String> {
    match event {
        BotEvent::Message(msg) => message_path("message", msg),
        BotEvent::MessageSent(msg) => message_path("message_sent", msg),
        BotEvent::Notice(notice) => notice_path(notice),
        BotEvent::Request(request) => request_path(request),
        BotEvent::MetaEvent(meta) => meta_path(meta),
    }
}

fn message_path(root: &str, msg: &MessageEvent) -> Vec<String> {
    let kind = match msg.message_type {
        MessageKind::Private => "private",
        MessageKind::Group => "group",
    };
    let mut path = vec![root.to_string(), format!("{root}.{kind}")];
    if let Some(sub) = msg.sub_type.as_deref()
        && !sub.is_empty()
    {
        path.push(format!("{root}.{kind}.{sub}"));
    }
    path
}

fn notice_path(notice: &NoticeEvent) -> Vec<String> {
    let mut path = vec!["notice".to_string()];
    let kind = match notice {
        NoticeEvent::Known(kind) => kind,
        NoticeEvent::Other(raw) => {
            tracing::warn!(
                notice_type = raw.get("notice_type").and_then(|v| v.as_str()),
                "unrecognized notice, delivering at category root"
            );
            return path;
        }
    };

    match kind {
        NoticeKind::FriendAdd { .. } => path.push("notice.friend_add".to_string()),
        NoticeKind::FriendRecall { .. } => path.push("notice.friend_recall".to_string()),
        NoticeKind::GroupRecall { .. } => path.push("notice.group_recall".to_string()),
        NoticeKind::GroupIncrease { sub_type, .. } => {
            push_with_sub(&mut path, "notice.group_increase", sub_type);
        }
        NoticeKind::GroupDecrease { sub_type, .. } => {
            push_with_sub(&mut path, "notice.group_decrease", sub_type);
        }
        NoticeKind::GroupAdmin { sub_type, .. } => {
            push_with_sub(&mut path, "notice.group_admin", sub_type);
        }
        NoticeKind::GroupBan { sub_type, .. } => {
            push_with_sub(&mut path, "notice.group_ban", sub_type);
        }
        NoticeKind::GroupCard { .. } => path.push("notice.group_card".to_string()),
        NoticeKind::GroupUpload { .. } => path.push("notice.group_upload".to_string()),
        NoticeKind::Essence { sub_type, .. } => {
            push_with_sub(&mut path, "notice.essence", sub_type);
        }
        NoticeKind::GroupMsgEmojiLike { .. } => {
            path.push("notice.group_msg_emoji_like".to_string());
        }
        NoticeKind::BotOffline { .. } => path.push("notice.bot_offline".to_string()),
        NoticeKind::Notify(notify) => {
            path.push("notice.notify".to_string());
            match notify {
                NotifyKind::Poke { group_id, .. } => {
                    path.push("notice.notify.poke".to_string());
                    let scope = if group_id.is_some() { "group" } else { "friend" };
                    path.push(format!("notice.notify.poke.{scope}"));
                }
                NotifyKind::Title { .. } => path.push("notice.notify.title".to_string()),
                NotifyKind::GroupName { .. } => path.push("notice.notify.group_name".to_string()),
                NotifyKind::ProfileLike { .. } => {
                    path.push("notice.notify.profile_like".to_string());
                }
                NotifyKind::InputStatus { .. } => {
                    path.push("notice.notify.input_status".to_string());
                }
            }
        }
    }
    path
}

fn request_path(request: &RequestEvent) -> Vec<String> {
    let mut path = vec!["request".to_string()];
    match request {
        RequestEvent::Known(RequestKind::Friend { .. }) => {
            path.push("request.friend".to_string());
        }
        RequestEvent::Known(RequestKind::Group { sub_type, .. }) => {
            push_with_sub(&mut path, "request.group", sub_type);
        }
        RequestEvent::Other(raw) => {
            tracing::warn!(
                request_type = raw.get("request_type").and_then(|v| v.as_str()),
                "unrecognized request, delivering at category root"
            );
        }
    }
    path
}

fn meta_path(meta: &MetaEvent) -> Vec<String> {
    let mut path = vec!["meta_event".to_string()];
    match meta {
        MetaEvent::Known(MetaKind::Heartbeat { .. }) => {
            path.push("meta_event.heartbeat".to_string());
        }
        MetaEvent::Known(MetaKind::Lifecycle { sub_type, .. }) => {
            push_with_sub(&mut path, "meta_event.lifecycle", sub_type);
        }
        MetaEvent::Other(raw) => {
            tracing::warn!(
                meta_event_type = raw.get("meta_event_type").and_then(|v| v.as_str()),
                "unrecognized meta event, delivering at category root"
            );
        }
    }
    path
}

fn push_with_sub(path: &mut Vec<String>, base: &str, sub_type: &str) {
    path.push(base.to_string());
    if !sub_type.is_empty() {
        path.push(format!("{base}.{sub_type}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(frame: serde_json::Value) -> BotEvent {
        serde_json::from_value(frame).unwrap()
    }

    #[test]
    fn test_group_message_path() {
        let event = decode(json!({
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": 1,
            "user_id": 2,
            "group_id": 3
        }));
        assert_eq!(
            key_path(&event),
            vec!["message", "message.group", "message.group.normal"]
        );
    }

    #[test]
    fn test_private_message_without_sub_type() {
        let event = decode(json!({
            "post_type": "message",
            "message_type": "private",
            "message_id": 1,
            "user_id": 2
        }));
        assert_eq!(key_path(&event), vec!["message", "message.private"]);
    }

    #[test]
    fn test_message_sent_uses_its_own_root() {
        let event = decode(json!({
            "post_type": "message_sent",
            "message_type": "private",
            "sub_type": "friend",
            "message_id": 1,
            "user_id": 2
        }));
        assert_eq!(
            key_path(&event),
            vec![
                "message_sent",
                "message_sent.private",
                "message_sent.private.friend"
            ]
        );
    }

    #[test]
    fn test_group_increase_path() {
        let event = decode(json!({
            "post_type": "notice",
            "notice_type": "group_increase",
            "sub_type": "invite",
            "group_id": 1,
            "user_id": 2,
            "operator_id": 3
        }));
        assert_eq!(
            key_path(&event),
            vec![
                "notice",
                "notice.group_increase",
                "notice.group_increase.invite"
            ]
        );
    }

    #[test]
    fn test_friend_poke_path() {
        let event = decode(json!({
            "post_type": "notice",
            "notice_type": "notify",
            "sub_type": "poke",
            "user_id": 2,
            "target_id": 3
        }));
        assert_eq!(
            key_path(&event),
            vec![
                "notice",
                "notice.notify",
                "notice.notify.poke",
                "notice.notify.poke.friend"
            ]
        );
    }

    #[test]
    fn test_group_poke_path() {
        let event = decode(json!({
            "post_type": "notice",
            "notice_type": "notify",
            "sub_type": "poke",
            "group_id": 1,
            "user_id": 2,
            "target_id": 3
        }));
        assert!(
            key_path(&event)
                .contains(&"notice.notify.poke.group".to_string())
        );
    }

    #[test]
    fn test_unknown_notice_keeps_category_root_only() {
        let event = decode(json!({
            "post_type": "notice",
            "notice_type": "brand_new_thing"
        }));
        assert_eq!(key_path(&event), vec!["notice"]);
    }

    #[test]
    fn test_group_request_path() {
        let event = decode(json!({
            "post_type": "request",
            "request_type": "group",
            "sub_type": "add",
            "group_id": 1,
            "user_id": 2,
            "flag": "f"
        }));
        assert_eq!(
            key_path(&event),
            vec!["request", "request.group", "request.group.add"]
        );
    }

    #[test]
    fn test_lifecycle_path() {
        let event = decode(json!({
            "post_type": "meta_event",
            "meta_event_type": "lifecycle",
            "sub_type": "connect"
        }));
        assert_eq!(
            key_path(&event),
            vec![
                "meta_event",
                "meta_event.lifecycle",
                "meta_event.lifecycle.connect"
            ]
        );
    }

    #[test]
    fn test_heartbeat_path() {
        let event = decode(json!({
            "post_type": "meta_event",
            "meta_event_type": "heartbeat",
            "interval": 5000
        }));
        assert_eq!(key_path(&event), vec!["meta_event", "meta_event.heartbeat"]);
    }
}
