use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChatId, Conversation, MessageId, User, UserId, UserRef};

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct MessageKey {
    pub timestamp: DateTime<Utc>,
    pub identifier: MessageId,
}

/// The parent conversation of a message, sent either as an id or populated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatRef {
    Id(ChatId),
    Conversation(Box<Conversation>),
}

impl ChatRef {
    pub fn id(&self) -> &ChatId {
        match self {
            Self::Id(id) => id,
            Self::Conversation(chat) => &chat.identifier,
        }
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        match self {
            Self::Id(_) => None,
            Self::Conversation(chat) => Some(chat),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classifies a MIME type; anything that is not `image/*` or `video/*` is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split_once('/') {
            Some(("image", _)) => Some(Self::Image),
            Some(("video", _)) => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Media {
    pub kind: MediaKind,
    pub url: Arc<str>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub identifier: MessageId,
    pub sender: User,
    #[serde(default = "crate::empty_str")]
    pub content: Arc<str>,
    pub chat: ChatRef,
    #[serde(rename = "mediaUrl", default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<Arc<str>>,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(rename = "readBy", default)]
    pub read_by: Vec<UserRef>,
    #[serde(rename = "createdAt")]
    pub timestamp: DateTime<Utc>,
}

/// Tick shown next to the viewer's own messages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReceiptState {
    Sent,
    Seen,
}

impl Message {
    pub fn key(&self) -> MessageKey {
        MessageKey {
            timestamp: self.timestamp,
            identifier: self.identifier.clone(),
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        self.chat.id()
    }

    pub fn media(&self) -> Option<Media> {
        Some(Media {
            kind: self.media_type?,
            url: self.media_url.clone()?,
        })
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender.identifier == user
    }

    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.iter().any(|reader| reader.id() == user)
    }

    /// Adds `reader` to the reader set; returns whether it was new.
    pub fn mark_read_by(&mut self, reader: &UserId) -> bool {
        if self.is_read_by(reader) {
            return false;
        }
        self.read_by.push(UserRef::Id(reader.clone()));
        true
    }

    /// Read receipt for `viewer`'s own messages; `None` for messages from anyone else.
    ///
    /// A message counts as seen as soon as anyone other than the viewer has read it. In a
    /// group that means "seen by someone", not "seen by everyone".
    pub fn receipt(&self, viewer: &UserId) -> Option<ReceiptState> {
        if !self.is_from(viewer) {
            return None;
        }
        if self.read_by.iter().any(|reader| reader.id() != viewer) {
            Some(ReceiptState::Seen)
        } else {
            Some(ReceiptState::Sent)
        }
    }
}
