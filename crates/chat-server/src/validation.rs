use chrono::DateTime;
use serde::{Deserialize, Serialize};

const MAX_USER_ID: u32 = 100_000;
const VALID_MESSAGE_TYPES: [&str; 3] = ["TEXT", "JOIN", "LEAVE"];

/// Inbound chat frame. Fields are optional so missing ones surface as
/// validation errors rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Not validated; clients send it as a number or a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<serde_json::Value>,
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Returns the first rule the message breaks, as the reply's error text.
pub fn validate(msg: &ChatMessage) -> Result<(), &'static str> {
    if blank(&msg.user_id) {
        return Err("userId is required");
    }
    let user_id: u32 = msg
        .user_id
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| "userId must be a numeric string")?;
    if !(1..=MAX_USER_ID).contains(&user_id) {
        return Err("userId must be between 1 and 100000");
    }

    if blank(&msg.username) {
        return Err("username is required");
    }
    let username = msg.username.as_deref().unwrap_or_default();
    if !(3..=20).contains(&username.chars().count()) {
        return Err("username must be 3-20 characters");
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("username must be alphanumeric");
    }

    let message = msg.message.as_deref().unwrap_or_default();
    if message.is_empty() {
        return Err("message is required");
    }
    if message.chars().count() > 500 {
        return Err("message must be 1-500 characters");
    }

    if blank(&msg.timestamp) {
        return Err("timestamp is required");
    }
    if DateTime::parse_from_rfc3339(msg.timestamp.as_deref().unwrap_or_default()).is_err() {
        return Err("timestamp must be valid ISO-8601");
    }

    match msg.message_type.as_deref() {
        Some(kind) if VALID_MESSAGE_TYPES.contains(&kind) => Ok(()),
        _ => Err("messageType must be TEXT, JOIN, or LEAVE"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ChatMessage {
        ChatMessage {
            user_id: Some("42".into()),
            username: Some("user42".into()),
            message: Some("hello".into()),
            timestamp: Some("2025-01-01T12:00:00.000Z".into()),
            message_type: Some("TEXT".into()),
            room_id: Some(serde_json::json!(3)),
        }
    }

    #[test]
    fn test_valid_message() {
        assert_eq!(validate(&valid()), Ok(()));
    }

    #[test]
    fn test_user_id_rules() {
        let mut msg = valid();
        msg.user_id = None;
        assert_eq!(validate(&msg), Err("userId is required"));
        msg.user_id = Some("abc".into());
        assert_eq!(validate(&msg), Err("userId must be a numeric string"));
        msg.user_id = Some("0".into());
        assert_eq!(validate(&msg), Err("userId must be between 1 and 100000"));
        msg.user_id = Some("100001".into());
        assert_eq!(validate(&msg), Err("userId must be between 1 and 100000"));
        msg.user_id = Some("100000".into());
        assert_eq!(validate(&msg), Ok(()));
    }

    #[test]
    fn test_username_rules() {
        let mut msg = valid();
        msg.username = Some("ab".into());
        assert_eq!(validate(&msg), Err("username must be 3-20 characters"));
        msg.username = Some("a".repeat(21));
        assert_eq!(validate(&msg), Err("username must be 3-20 characters"));
        msg.username = Some("user_1".into());
        assert_eq!(validate(&msg), Err("username must be alphanumeric"));
    }

    #[test]
    fn test_message_and_timestamp_rules() {
        let mut msg = valid();
        msg.message = Some(String::new());
        assert_eq!(validate(&msg), Err("message is required"));
        msg.message = Some("x".repeat(501));
        assert_eq!(validate(&msg), Err("message must be 1-500 characters"));

        let mut msg = valid();
        msg.timestamp = Some("yesterday".into());
        assert_eq!(validate(&msg), Err("timestamp must be valid ISO-8601"));
    }

    #[test]
    fn test_message_type_rules() {
        let mut msg = valid();
        msg.message_type = Some("SHOUT".into());
        assert_eq!(validate(&msg), Err("messageType must be TEXT, JOIN, or LEAVE"));
        msg.message_type = None;
        assert_eq!(validate(&msg), Err("messageType must be TEXT, JOIN, or LEAVE"));
    }

    #[test]
    fn test_parses_camel_case_wire_format() {
        let raw = r#"{"userId":"7","username":"user7","message":"hi","timestamp":"2025-01-01T00:00:00Z","messageType":"JOIN","roomId":1}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.user_id.as_deref(), Some("7"));
        assert_eq!(msg.message_type.as_deref(), Some("JOIN"));
        assert_eq!(validate(&msg), Ok(()));
    }
}
