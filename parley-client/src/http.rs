use async_trait::async_trait;
use parley_common::{ChatId, Conversation, Identity, Message, StatusItem, User, UserId};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use url::Url;

use crate::{
    api::{
        ChatApi, Credentials, NewCommunity, NewGroup, NewMessage, NewStatus, ProfileUpdate, Signup,
        UpdatedProfile,
    },
    error::{ClientError, Result},
};

/// `ChatApi` over HTTP with JSON bodies.
#[derive(Clone, Debug)]
pub struct HttpApi {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpApi {
    pub fn new(base: &Url) -> Self {
        Self::with_client(Client::new(), base)
    }

    pub fn with_client(client: Client, base: &Url) -> Self {
        Self {
            client,
            base: base.as_str().trim_end_matches('/').to_owned(),
        }
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{path}", self.base));
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or_default().to_owned());
        tracing::debug!(%status, %message, "backend rejected request");
        Err(ClientError::Status { status, message })
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn empty(request: RequestBuilder) -> Result<()> {
        Self::check(request.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn login(&self, credentials: &Credentials) -> Result<Identity> {
        Self::json(self.request(Method::POST, "/user/login", None).json(credentials)).await
    }

    async fn signup(&self, signup: &Signup) -> Result<Identity> {
        Self::json(self.request(Method::POST, "/user", None).json(signup)).await
    }

    async fn search_users(&self, token: &str, query: &str) -> Result<Vec<User>> {
        let request = self
            .request(Method::GET, "/user", Some(token))
            .query(&[("search", query)]);
        Self::json(request).await
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<UpdatedProfile> {
        Self::json(self.request(Method::PUT, "/user/profile", Some(token)).json(update)).await
    }

    async fn fetch_chats(&self, token: &str) -> Result<Vec<Conversation>> {
        Self::json(self.request(Method::GET, "/chat", Some(token))).await
    }

    async fn access_chat(&self, token: &str, user: &UserId) -> Result<Conversation> {
        let request = self
            .request(Method::POST, "/chat", Some(token))
            .json(&json!({ "userId": user }));
        Self::json(request).await
    }

    async fn create_group(&self, token: &str, group: &NewGroup) -> Result<Conversation> {
        Self::json(self.request(Method::POST, "/chat/group", Some(token)).json(group)).await
    }

    async fn exit_group(&self, token: &str, chat: &ChatId) -> Result<()> {
        let request = self
            .request(Method::PUT, "/chat/groupexit", Some(token))
            .json(&json!({ "chatId": chat }));
        Self::empty(request).await
    }

    async fn delete_chat(&self, token: &str, chat: &ChatId) -> Result<()> {
        let request = self
            .request(Method::DELETE, "/chat/delete", Some(token))
            .json(&json!({ "chatId": chat }));
        Self::empty(request).await
    }

    async fn fetch_messages(&self, token: &str, chat: &ChatId) -> Result<Vec<Message>> {
        Self::json(self.request(Method::GET, &format!("/message/{chat}"), Some(token))).await
    }

    async fn send_message(&self, token: &str, message: &NewMessage) -> Result<Message> {
        Self::json(self.request(Method::POST, "/message", Some(token)).json(message)).await
    }

    async fn mark_read(&self, token: &str, chat: &ChatId) -> Result<()> {
        let request = self
            .request(Method::PUT, "/message/read", Some(token))
            .json(&json!({ "chatId": chat }));
        Self::empty(request).await
    }

    async fn fetch_communities(&self, token: &str) -> Result<Vec<Conversation>> {
        Self::json(self.request(Method::GET, "/community", Some(token))).await
    }

    async fn create_community(&self, token: &str, community: &NewCommunity) -> Result<()> {
        Self::empty(self.request(Method::POST, "/community", Some(token)).json(community)).await
    }

    async fn fetch_statuses(&self, token: &str) -> Result<Vec<StatusItem>> {
        Self::json(self.request(Method::GET, "/status", Some(token))).await
    }

    async fn post_status(&self, token: &str, status: &NewStatus) -> Result<StatusItem> {
        Self::json(self.request(Method::POST, "/status", Some(token)).json(status)).await
    }
}
