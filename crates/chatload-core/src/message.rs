use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Text,
    Join,
    Leave,
}

impl MessageKind {
    pub const ALL: [MessageKind; 3] = [MessageKind::Text, MessageKind::Join, MessageKind::Leave];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::Join => "JOIN",
            MessageKind::Leave => "LEAVE",
        }
    }

    /// Maps a roll in 0..100 onto the 90/5/5 split.
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            0..=89 => MessageKind::Text,
            90..=94 => MessageKind::Join,
            _ => MessageKind::Leave,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synthesized chat message: its semantic fields plus the serialized
/// payload that actually goes on the wire.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub user_id: u32,
    pub username: String,
    pub body: Arc<str>,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub room_id: u32,
    pub payload: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    user_id: String,
    username: &'a str,
    message: &'a str,
    timestamp: String,
    message_type: MessageKind,
    room_id: u32,
}

impl WorkItem {
    pub fn new(
        user_id: u32,
        body: Arc<str>,
        created_at: DateTime<Utc>,
        kind: MessageKind,
        room_id: u32,
    ) -> Result<Self, serde_json::Error> {
        let username = format!("user{user_id}");
        let payload = serde_json::to_string(&WireMessage {
            user_id: user_id.to_string(),
            username: &username,
            message: &body,
            timestamp: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            message_type: kind,
            room_id,
        })?;

        Ok(Self {
            user_id,
            username,
            body,
            created_at,
            kind,
            room_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_roll() {
        assert_eq!(MessageKind::from_roll(0), MessageKind::Text);
        assert_eq!(MessageKind::from_roll(89), MessageKind::Text);
        assert_eq!(MessageKind::from_roll(90), MessageKind::Join);
        assert_eq!(MessageKind::from_roll(94), MessageKind::Join);
        assert_eq!(MessageKind::from_roll(95), MessageKind::Leave);
        assert_eq!(MessageKind::from_roll(99), MessageKind::Leave);
    }

    #[test]
    fn test_payload_wire_shape() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let item = WorkItem::new(42, Arc::from("hello"), at, MessageKind::Join, 7).unwrap();

        let json: serde_json::Value = serde_json::from_str(&item.payload).unwrap();
        assert_eq!(json["userId"], "42");
        assert_eq!(json["username"], "user42");
        assert_eq!(json["message"], "hello");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00.000Z");
        assert_eq!(json["messageType"], "JOIN");
        assert_eq!(json["roomId"], 7);
    }
}
