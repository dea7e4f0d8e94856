//! Message segments - the structured pieces a chat message is made of
//!
//! Messages on the wire are arrays of segments. Each known segment is
//! adjacently tagged as `{"type": ..., "data": {...}}`; anything the
//! endpoint sends that we do not model is preserved as [`Segment::Other`]
//! so it survives a round trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One piece of a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    Known(KnownSegment),
    Other(Value),
}

/// Segment kinds the framework understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum KnownSegment {
    Text {
        text: String,
    },
    At {
        qq: String,
    },
    Face {
        id: String,
    },
    Image {
        file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Reply {
        id: String,
    },
    Record {
        file: String,
    },
    Video {
        file: String,
    },
}

impl Segment {
    /// Plain text segment
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Known(KnownSegment::Text { text: text.into() })
    }

    /// Mention a user
    pub fn at(user_id: i64) -> Self {
        Segment::Known(KnownSegment::At {
            qq: user_id.to_string(),
        })
    }

    /// Mention everyone in a group
    pub fn at_all() -> Self {
        Segment::Known(KnownSegment::At {
            qq: "all".to_string(),
        })
    }

    /// Small emoji face by id
    pub fn face(id: i64) -> Self {
        Segment::Known(KnownSegment::Face { id: id.to_string() })
    }

    /// Image from a file path, URL or base64 payload
    pub fn image(file: impl Into<String>) -> Self {
        Segment::Known(KnownSegment::Image {
            file: file.into(),
            url: None,
        })
    }

    /// Quote another message by id
    pub fn reply(message_id: i64) -> Self {
        Segment::Known(KnownSegment::Reply {
            id: message_id.to_string(),
        })
    }

    /// Text content if this is a text segment
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Known(KnownSegment::Text { text }) => Some(text),
            _ => None,
        }
    }

    /// Mentioned user id if this is an at segment (`None` for at-all)
    pub fn at_target(&self) -> Option<i64> {
        match self {
            Segment::Known(KnownSegment::At { qq }) => qq.parse().ok(),
            _ => None,
        }
    }

    /// Downloadable URL if this is an image segment
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Segment::Known(KnownSegment::Image { file, url }) => {
                Some(url.as_deref().unwrap_or(file))
            }
            _ => None,
        }
    }

    /// Quoted message id if this is a reply segment
    pub fn reply_target(&self) -> Option<i64> {
        match self {
            Segment::Known(KnownSegment::Reply { id }) => id.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_segment_wire_shape() {
        let seg = Segment::text("hello");
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json, json!({"type": "text", "data": {"text": "hello"}}));
    }

    #[test]
    fn test_at_segment_roundtrip() {
        let seg = Segment::at(12345);
        let json = serde_json::to_string(&seg).unwrap();
        let parsed: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.at_target(), Some(12345));
    }

    #[test]
    fn test_image_url_prefers_url_field() {
        let seg: Segment = serde_json::from_value(json!({
            "type": "image",
            "data": {"file": "abc.jpg", "url": "https://example.com/abc.jpg"}
        }))
        .unwrap();
        assert_eq!(seg.image_url(), Some("https://example.com/abc.jpg"));
    }

    #[test]
    fn test_unknown_segment_preserved() {
        let raw = json!({"type": "mface", "data": {"emoji_id": "x"}});
        let seg: Segment = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(seg, Segment::Other(_)));
        assert_eq!(serde_json::to_value(&seg).unwrap(), raw);
    }

    #[test]
    fn test_reply_target_parses_id() {
        let seg = Segment::reply(987654);
        assert_eq!(seg.reply_target(), Some(987654));
        assert_eq!(seg.as_text(), None);
    }
}
