//! The REST surface of the backend.

use std::sync::Arc;

use async_trait::async_trait;
use parley_common::{ChatId, Conversation, Identity, MediaKind, Message, StatusItem, User, UserId};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Signup {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub pic: Option<String>,
}

/// `PUT /user/profile` answers with the user and, depending on the backend, a fresh token.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdatedProfile {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub token: Option<Arc<str>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewMessage {
    pub content: String,
    #[serde(rename = "chatId")]
    pub chat: ChatId,
    #[serde(rename = "mediaUrl", skip_serializing_if = "Option::is_none")]
    pub media_url: Option<Arc<str>>,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
}

impl NewMessage {
    pub fn text(chat: ChatId, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chat,
            media_url: None,
            media_type: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewGroup {
    pub name: String,
    /// The backend expects the member ids as a JSON-encoded string, not an array.
    #[serde(serialize_with = "json_string")]
    pub users: Vec<UserId>,
}

fn json_string<S: Serializer>(ids: &[UserId], serializer: S) -> Result<S::Ok, S::Error> {
    let encoded = serde_json::to_string(ids).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&encoded)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewCommunity {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewStatus {
    #[serde(rename = "mediaUrl")]
    pub media_url: String,
    pub caption: String,
}

/// Authenticated calls take the bearer token explicitly; it is read from the session on
/// every call.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Identity>;
    async fn signup(&self, signup: &Signup) -> Result<Identity>;
    async fn search_users(&self, token: &str, query: &str) -> Result<Vec<User>>;
    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<UpdatedProfile>;

    async fn fetch_chats(&self, token: &str) -> Result<Vec<Conversation>>;
    /// Returns the direct conversation with `user`, creating it if needed.
    async fn access_chat(&self, token: &str, user: &UserId) -> Result<Conversation>;
    async fn create_group(&self, token: &str, group: &NewGroup) -> Result<Conversation>;
    async fn exit_group(&self, token: &str, chat: &ChatId) -> Result<()>;
    async fn delete_chat(&self, token: &str, chat: &ChatId) -> Result<()>;

    async fn fetch_messages(&self, token: &str, chat: &ChatId) -> Result<Vec<Message>>;
    async fn send_message(&self, token: &str, message: &NewMessage) -> Result<Message>;
    async fn mark_read(&self, token: &str, chat: &ChatId) -> Result<()>;

    async fn fetch_communities(&self, token: &str) -> Result<Vec<Conversation>>;
    async fn create_community(&self, token: &str, community: &NewCommunity) -> Result<()>;

    async fn fetch_statuses(&self, token: &str) -> Result<Vec<StatusItem>>;
    async fn post_status(&self, token: &str, status: &NewStatus) -> Result<StatusItem>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn group_members_are_sent_as_json_text() {
        let group = NewGroup {
            name: "team".into(),
            users: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            serde_json::to_value(&group).unwrap(),
            json!({"name": "team", "users": "[\"a\",\"b\"]"}),
        );
    }

    #[test]
    fn text_message_omits_media_fields() {
        let message = NewMessage::text("c1".into(), "hi");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"content": "hi", "chatId": "c1"}),
        );
    }

    #[test]
    fn profile_response_without_token() {
        let profile: UpdatedProfile =
            serde_json::from_str(r#"{"_id": "u1", "name": "New", "pic": "p"}"#).unwrap();
        assert_eq!(&*profile.user.display_name, "New");
        assert!(profile.token.is_none());
    }
}
