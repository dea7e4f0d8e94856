//! Action request/response wire frames and typed response payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound action frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub params: Value,
    /// Correlation token echoed back in the response
    pub echo: String,
}

/// `status` field of an action response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Failed,
}

/// Inbound action response frame
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub wording: String,
    #[serde(default)]
    pub echo: Option<String>,
}

/// `data` of send_*_msg responses
#[derive(Debug, Clone, Deserialize)]
pub struct MessageId {
    pub message_id: i64,
}

/// `data` of get_login_info
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInfo {
    pub user_id: i64,
    pub nickname: String,
}

/// `data` of get_version_info
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub app_name: String,
    pub app_version: String,
    #[serde(default)]
    pub protocol_version: String,
}

/// `data` of get_group_info and entries of get_group_list
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    pub group_id: i64,
    pub group_name: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub max_member_count: i64,
}

/// `data` of get_group_member_info and entries of get_group_member_list
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMemberInfo {
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub card: String,
    /// `owner`, `admin` or `member`
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub join_time: i64,
    #[serde(default)]
    pub last_sent_time: i64,
}

/// Entries of get_friend_list
#[derive(Debug, Clone, Deserialize)]
pub struct FriendInfo {
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_frame_shape() {
        let req = ActionRequest {
            action: "send_private_msg".to_string(),
            params: json!({"user_id": 1, "message": "hi"}),
            echo: "17".to_string(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["action"], "send_private_msg");
        assert_eq!(value["echo"], "17");
        assert_eq!(value["params"]["user_id"], 1);
    }

    #[test]
    fn test_decode_ok_response() {
        let resp: ActionResponse = serde_json::from_value(json!({
            "status": "ok",
            "retcode": 0,
            "data": {"message_id": 123},
            "echo": "5"
        }))
        .unwrap();
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert_eq!(resp.echo.as_deref(), Some("5"));

        let id: MessageId = serde_json::from_value(resp.data).unwrap();
        assert_eq!(id.message_id, 123);
    }

    #[test]
    fn test_decode_failed_response_with_wording() {
        let resp: ActionResponse = serde_json::from_value(json!({
            "status": "failed",
            "retcode": 1400,
            "data": null,
            "message": "ERR_X",
            "wording": "target does not exist",
            "echo": "6"
        }))
        .unwrap();
        assert_eq!(resp.status, ResponseStatus::Failed);
        assert_eq!(resp.retcode, 1400);
        assert_eq!(resp.wording, "target does not exist");
    }

    #[test]
    fn test_group_member_info_tolerates_missing_fields() {
        let info: GroupMemberInfo = serde_json::from_value(json!({
            "group_id": 1,
            "user_id": 2
        }))
        .unwrap();
        assert_eq!(info.role, "");
    }
}
