use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChatId, MessageId, User, UserId, UserRef};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub identifier: ChatId,
    #[serde(rename = "chatName", alias = "name", default)]
    pub name: Option<Arc<str>>,
    #[serde(rename = "isGroupChat", default)]
    pub is_group: bool,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(rename = "groupAdmin", default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<UserRef>,
    #[serde(rename = "latestMessage", default, skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<MessageSummary>,
    // communities only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Arc<str>>,
}

/// The last message of a conversation, as shown in the chat list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<MessageId>,
    pub sender: UserRef,
    #[serde(default = "crate::empty_str")]
    pub content: Arc<str>,
    #[serde(rename = "createdAt")]
    pub timestamp: DateTime<Utc>,
}

const PREVIEW_CHARS: usize = 36;

impl Conversation {
    /// The first participant that is not `viewer`.
    pub fn counterpart(&self, viewer: &UserId) -> Option<&User> {
        self.users.iter().find(|user| &user.identifier != viewer)
    }

    /// Group name for groups, the other participant's name otherwise.
    pub fn display_name(&self, viewer: &UserId) -> Arc<str> {
        if self.is_group {
            return self.name.clone().unwrap_or_else(|| "Group".into());
        }
        self.counterpart(viewer)
            .map(|user| user.display_name.clone())
            .unwrap_or_else(|| "User".into())
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admin.as_ref().is_some_and(|admin| admin.id() == user)
    }

    /// One-line preview of the latest message, with a sender prefix in groups.
    pub fn preview(&self) -> Option<String> {
        let latest = self.latest_message.as_ref()?;
        let content: String = latest.content.chars().take(PREVIEW_CHARS).collect();
        match latest.sender.display_name() {
            Some(sender) if self.is_group => Some(format!("{sender}: {content}")),
            _ => Some(content),
        }
    }
}
