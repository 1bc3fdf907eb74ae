use parley_common::{ChatId, Conversation, Message, StatusItem, User, UserId};
use serde_json::{Map, Value};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq)]
pub enum OutboundEvent {
    /// Registers this connection for pushes addressed to the user.
    Setup(User),
    JoinChat(ChatId),
    NewMessage(Message),
    NewGroup(Conversation),
    NewStatus(StatusItem),
    MarkMessagesRead(ChatId),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::JoinChat(_) => "join chat",
            Self::NewMessage(_) => "new message",
            Self::NewGroup(_) => "new group",
            Self::NewStatus(_) => "new status",
            Self::MarkMessagesRead(_) => "mark messages read",
        }
    }

    pub fn payload(&self) -> Result<Value> {
        Ok(match self {
            Self::Setup(user) => serde_json::to_value(user)?,
            Self::JoinChat(chat) | Self::MarkMessagesRead(chat) => serde_json::to_value(chat)?,
            Self::NewMessage(message) => serde_json::to_value(message)?,
            Self::NewGroup(chat) => serde_json::to_value(chat)?,
            Self::NewStatus(status) => serde_json::to_value(status)?,
        })
    }
}

/// Who read which conversation, when the backend says so. Older backends send the event
/// bare, leaving both fields empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadReceipt {
    pub chat: Option<ChatId>,
    pub reader: Option<UserId>,
}

impl ReadReceipt {
    fn from_payload(payload: Option<Value>) -> Self {
        match payload {
            Some(Value::String(chat)) => Self {
                chat: Some(chat.into()),
                reader: None,
            },
            Some(Value::Object(fields)) => Self {
                chat: field(&fields, &["chatId", "chat"]),
                reader: field(&fields, &["userId", "reader"]),
            },
            _ => Self::default(),
        }
    }
}

fn field<T: for<'a> From<&'a str>>(fields: &Map<String, Value>, keys: &[&str]) -> Option<T> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(T::from)
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Connected,
    MessageReceived(Message),
    MessageRead(ReadReceipt),
    RefetchChats,
    StatusReceived(StatusItem),
}

impl InboundEvent {
    /// Maps a named event to its typed form. `Ok(None)` for events this client does not
    /// handle.
    pub fn decode(name: &str, payload: Option<Value>) -> Result<Option<Self>> {
        let required = |payload: Option<Value>| payload.unwrap_or(Value::Null);
        Ok(Some(match name {
            "connected" => Self::Connected,
            "message received" => Self::MessageReceived(serde_json::from_value(required(payload))?),
            "message read" => Self::MessageRead(ReadReceipt::from_payload(payload)),
            "refetch chats" => Self::RefetchChats,
            "status received" => Self::StatusReceived(serde_json::from_value(required(payload))?),
            _ => return Ok(None),
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn read_receipt_payload_shapes() {
        let decode = |payload| match InboundEvent::decode("message read", payload).unwrap() {
            Some(InboundEvent::MessageRead(receipt)) => receipt,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(decode(None), ReadReceipt::default());
        assert_eq!(decode(Some(json!("c1"))).chat, Some("c1".into()));
        let receipt = decode(Some(json!({"chatId": "c1", "userId": "u2"})));
        assert_eq!(receipt.chat, Some("c1".into()));
        assert_eq!(receipt.reader, Some("u2".into()));
    }

    #[test]
    fn unknown_events_are_skipped() {
        assert_eq!(InboundEvent::decode("typing", None).unwrap(), None);
    }

    #[test]
    fn message_received_needs_a_message() {
        assert!(InboundEvent::decode("message received", None).is_err());
        let event = InboundEvent::decode(
            "message received",
            Some(json!({
                "_id": "m1",
                "sender": {"_id": "u1", "name": "A"},
                "content": "hi",
                "chat": "c1",
                "createdAt": "2024-01-01T00:00:00Z"
            })),
        )
        .unwrap();
        assert!(matches!(event, Some(InboundEvent::MessageReceived(m)) if m.chat_id().as_str() == "c1"));
    }

    #[test]
    fn outbound_names_match_the_backend() {
        let event = OutboundEvent::MarkMessagesRead("c1".into());
        assert_eq!(event.name(), "mark messages read");
        assert_eq!(event.payload().unwrap(), json!("c1"));
    }
}
