//! Typed inbound events
//!
//! Every frame pushed by the endpoint carries a `post_type` discriminator,
//! then one more level of discrimination per category (`message_type`,
//! `notice_type`, `request_type`, `meta_event_type`) and sometimes a
//! `sub_type` below that. [`BotEvent`] mirrors that tree with tagged
//! enums; categories whose inner discriminator we do not recognize decode
//! into an `Other` variant carrying the raw JSON, so new endpoint
//! features degrade to generic delivery instead of being dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::segment::Segment;

/// An inbound event, discriminated on `post_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum BotEvent {
    /// A message received by the bot
    Message(MessageEvent),
    /// A message sent by the bot account itself (possibly from another device)
    MessageSent(MessageEvent),
    /// State-change notifications (recalls, member changes, pokes, ...)
    Notice(NoticeEvent),
    /// Friend and group-join requests awaiting approval
    Request(RequestEvent),
    /// Protocol metadata (heartbeats, lifecycle)
    MetaEvent(MetaEvent),
}

/// Whether a message arrived in a private chat or a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Private,
    Group,
}

/// A chat message, private or group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    pub message_type: MessageKind,
    /// `friend`/`group` for private, `normal`/`anonymous`/`notice` for group
    #[serde(default)]
    pub sub_type: Option<String>,
    pub message_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub message: Vec<Segment>,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

/// Who sent a message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    /// Group card (display name), group messages only
    #[serde(default)]
    pub card: Option<String>,
    /// `owner`, `admin` or `member`, group messages only
    #[serde(default)]
    pub role: Option<String>,
}

impl MessageEvent {
    /// Concatenated text of all text segments
    pub fn plain_text(&self) -> String {
        self.message
            .iter()
            .filter_map(Segment::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// User ids mentioned via at segments, in order
    pub fn at_targets(&self) -> Vec<i64> {
        self.message.iter().filter_map(Segment::at_target).collect()
    }

    /// URL of the first image segment, if any
    pub fn first_image_url(&self) -> Option<&str> {
        self.message.iter().find_map(Segment::image_url)
    }

    /// Id of the quoted message, if this message is a reply
    pub fn quoted_message_id(&self) -> Option<i64> {
        self.message.iter().find_map(Segment::reply_target)
    }

    /// True when the sender is a group owner or admin
    pub fn sender_is_group_admin(&self) -> bool {
        matches!(self.sender.role.as_deref(), Some("owner") | Some("admin"))
    }
}

/// Notice frame: known kinds decode into [`NoticeKind`], anything else is kept raw
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoticeEvent {
    Known(NoticeKind),
    Other(Value),
}

/// Notices discriminated on `notice_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notice_type", rename_all = "snake_case")]
pub enum NoticeKind {
    FriendAdd {
        user_id: i64,
    },
    FriendRecall {
        user_id: i64,
        message_id: i64,
    },
    GroupRecall {
        group_id: i64,
        user_id: i64,
        operator_id: i64,
        message_id: i64,
    },
    /// `sub_type`: `approve` or `invite`
    GroupIncrease {
        sub_type: String,
        group_id: i64,
        user_id: i64,
        operator_id: i64,
    },
    /// `sub_type`: `leave`, `kick` or `kick_me`
    GroupDecrease {
        sub_type: String,
        group_id: i64,
        user_id: i64,
        operator_id: i64,
    },
    /// `sub_type`: `set` or `unset`
    GroupAdmin {
        sub_type: String,
        group_id: i64,
        user_id: i64,
    },
    /// `sub_type`: `ban` or `lift_ban`; `duration` in seconds
    GroupBan {
        sub_type: String,
        group_id: i64,
        user_id: i64,
        operator_id: i64,
        #[serde(default)]
        duration: i64,
    },
    GroupCard {
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        card_new: String,
        #[serde(default)]
        card_old: String,
    },
    GroupUpload {
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        file: Value,
    },
    /// `sub_type`: `add` or `delete`
    Essence {
        sub_type: String,
        group_id: i64,
        message_id: i64,
        sender_id: i64,
        operator_id: i64,
    },
    GroupMsgEmojiLike {
        group_id: i64,
        user_id: i64,
        message_id: i64,
        #[serde(default)]
        likes: Value,
    },
    BotOffline {
        user_id: i64,
        #[serde(default)]
        tag: String,
        #[serde(default)]
        message: String,
    },
    Notify(NotifyKind),
}

/// `notify` notices discriminated on `sub_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum NotifyKind {
    /// Poke in a group (`group_id` set) or friend chat
    Poke {
        #[serde(default)]
        group_id: Option<i64>,
        user_id: i64,
        target_id: i64,
    },
    Title {
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        title: String,
    },
    GroupName {
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        name_new: String,
    },
    ProfileLike {
        operator_id: i64,
        #[serde(default)]
        operator_nick: String,
        #[serde(default)]
        times: i64,
    },
    InputStatus {
        user_id: i64,
        #[serde(default)]
        group_id: Option<i64>,
        #[serde(default)]
        status_text: String,
    },
}

/// Request frame: known kinds decode into [`RequestKind`], anything else is kept raw
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestEvent {
    Known(RequestKind),
    Other(Value),
}

/// Requests discriminated on `request_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request_type", rename_all = "snake_case")]
pub enum RequestKind {
    Friend {
        user_id: i64,
        #[serde(default)]
        comment: String,
        /// Opaque token passed back when approving or rejecting
        flag: String,
    },
    /// `sub_type`: `add` (user applied) or `invite` (bot was invited)
    Group {
        sub_type: String,
        group_id: i64,
        user_id: i64,
        #[serde(default)]
        comment: String,
        flag: String,
    },
}

/// Meta frame: known kinds decode into [`MetaKind`], anything else is kept raw
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaEvent {
    Known(MetaKind),
    Other(Value),
}

/// Meta events discriminated on `meta_event_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "meta_event_type", rename_all = "snake_case")]
pub enum MetaKind {
    Heartbeat {
        #[serde(default)]
        time: i64,
        #[serde(default)]
        interval: i64,
        #[serde(default)]
        status: Value,
    },
    /// `sub_type`: `enable`, `disable` or `connect`
    Lifecycle {
        #[serde(default)]
        time: i64,
        sub_type: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_group_message() {
        let frame = json!({
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": 42,
            "user_id": 10001,
            "group_id": 20002,
            "time": 1700000000,
            "self_id": 99999,
            "raw_message": "hello @bot",
            "message": [
                {"type": "text", "data": {"text": "hello "}},
                {"type": "at", "data": {"qq": "99999"}}
            ],
            "sender": {"user_id": 10001, "nickname": "alice", "role": "admin"}
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::Message(msg) = event else {
            panic!("expected message event");
        };
        assert_eq!(msg.message_type, MessageKind::Group);
        assert_eq!(msg.group_id, Some(20002));
        assert_eq!(msg.plain_text(), "hello ");
        assert_eq!(msg.at_targets(), vec![99999]);
        assert!(msg.sender_is_group_admin());
    }

    #[test]
    fn test_decode_private_message_without_group_id() {
        let frame = json!({
            "post_type": "message",
            "message_type": "private",
            "sub_type": "friend",
            "message_id": 7,
            "user_id": 10001,
            "raw_message": "hi",
            "message": [{"type": "text", "data": {"text": "hi"}}]
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::Message(msg) = event else {
            panic!("expected message event");
        };
        assert_eq!(msg.message_type, MessageKind::Private);
        assert_eq!(msg.group_id, None);
    }

    #[test]
    fn test_decode_group_increase_notice() {
        let frame = json!({
            "post_type": "notice",
            "notice_type": "group_increase",
            "sub_type": "approve",
            "group_id": 20002,
            "user_id": 10001,
            "operator_id": 10002
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::Notice(NoticeEvent::Known(NoticeKind::GroupIncrease {
            sub_type,
            group_id,
            ..
        })) = event
        else {
            panic!("expected group_increase notice");
        };
        assert_eq!(sub_type, "approve");
        assert_eq!(group_id, 20002);
    }

    #[test]
    fn test_decode_group_poke_notify() {
        let frame = json!({
            "post_type": "notice",
            "notice_type": "notify",
            "sub_type": "poke",
            "group_id": 20002,
            "user_id": 10001,
            "target_id": 99999
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::Notice(NoticeEvent::Known(NoticeKind::Notify(NotifyKind::Poke {
            group_id,
            target_id,
            ..
        }))) = event
        else {
            panic!("expected poke notify");
        };
        assert_eq!(group_id, Some(20002));
        assert_eq!(target_id, 99999);
    }

    #[test]
    fn test_unknown_notice_type_falls_back_to_other() {
        let frame = json!({
            "post_type": "notice",
            "notice_type": "some_future_notice",
            "group_id": 20002
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::Notice(NoticeEvent::Other(raw)) = event else {
            panic!("expected raw notice");
        };
        assert_eq!(raw["notice_type"], "some_future_notice");
    }

    #[test]
    fn test_decode_group_request() {
        let frame = json!({
            "post_type": "request",
            "request_type": "group",
            "sub_type": "invite",
            "group_id": 20002,
            "user_id": 10001,
            "comment": "",
            "flag": "abc123"
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::Request(RequestEvent::Known(RequestKind::Group {
            sub_type, flag, ..
        })) = event
        else {
            panic!("expected group request");
        };
        assert_eq!(sub_type, "invite");
        assert_eq!(flag, "abc123");
    }

    #[test]
    fn test_decode_lifecycle_meta() {
        let frame = json!({
            "post_type": "meta_event",
            "meta_event_type": "lifecycle",
            "sub_type": "connect",
            "time": 1700000000
        });

        let event: BotEvent = serde_json::from_value(frame).unwrap();
        let BotEvent::MetaEvent(MetaEvent::Known(MetaKind::Lifecycle { sub_type, .. })) = event
        else {
            panic!("expected lifecycle meta event");
        };
        assert_eq!(sub_type, "connect");
    }

    #[test]
    fn test_unknown_post_type_is_a_decode_error() {
        let frame = json!({"post_type": "galaxy_brain"});
        assert!(serde_json::from_value::<BotEvent>(frame).is_err());
    }
}
