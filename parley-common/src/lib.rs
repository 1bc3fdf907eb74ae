use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

mod conversation;
mod message;
mod message_list;
pub mod status;

pub use conversation::{Conversation, MessageSummary};
pub use message::{ChatRef, Media, MediaKind, Message, MessageKey, ReceiptState};
pub use message_list::MessageList;
pub use status::{StatusBoard, StatusGroup, StatusItem, StatusViewer};

macro_rules! identifier {
    ($($name:ident),* $(,)?) => {$(
        #[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Arc<str>);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s.into())
            }
        }
    )*};
}

identifier!(UserId, ChatId, MessageId, StatusId);

pub(crate) fn empty_str() -> Arc<str> {
    Arc::from("")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub identifier: UserId,
    #[serde(rename = "name", default = "empty_str")]
    pub display_name: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Arc<str>>,
    #[serde(rename = "pic", default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Arc<str>>,
}

/// The logged-in user, as returned by login/signup and persisted between runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(flatten)]
    pub user: User,
    pub token: Arc<str>,
}

impl Identity {
    pub fn id(&self) -> &UserId {
        &self.user.identifier
    }
}

/// A user field that the backend sends either as a bare id or populated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(UserId),
    User(User),
}

impl UserRef {
    pub fn id(&self) -> &UserId {
        match self {
            Self::Id(id) => id,
            Self::User(user) => &user.identifier,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::User(user) => Some(&user.display_name),
        }
    }
}

impl From<UserId> for UserRef {
    fn from(id: UserId) -> Self {
        Self::Id(id)
    }
}

/// A pending "unread elsewhere" marker for a message in a conversation that is not open.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub message: Message,
}

impl Notification {
    pub fn message_id(&self) -> &MessageId {
        &self.message.identifier
    }

    pub fn chat_id(&self) -> &ChatId {
        self.message.chat.id()
    }

    /// "New message in <group>" or "New message from <sender>".
    pub fn describe(&self, known: Option<&Conversation>) -> String {
        let chat = known.or_else(|| self.message.chat.conversation());
        match chat {
            Some(chat) if chat.is_group => {
                format!("New message in {}", chat.name.as_deref().unwrap_or("group"))
            }
            _ => format!("New message from {}", self.message.sender.display_name),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    pub fn user(id: &str) -> User {
        User {
            identifier: id.into(),
            display_name: id.into(),
            email: None,
            avatar: None,
        }
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn message(id: &str, chat: &str, sender: &str, secs: i64) -> Message {
        Message {
            identifier: id.into(),
            sender: user(sender),
            content: format!("message {id}").into(),
            chat: ChatRef::Id(chat.into()),
            media_url: None,
            media_type: None,
            read_by: Vec::new(),
            timestamp: at(secs),
        }
    }
}
