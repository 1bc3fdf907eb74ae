use std::{path::Path, sync::Arc};

use parley_common::Identity;
use tokio::sync::mpsc;

use crate::{
    api::{ChatApi, NewMessage, ProfileUpdate},
    error::{ClientError, Result},
    media::{self, MediaHost},
    session::SessionStore,
    socket::{EventChannel, EventConnector},
    state::{Effect, Picture, Update},
};

/// Runs effects. REST calls and uploads are spawned and report back on the update channel;
/// session and event-channel effects are handled inline.
pub struct Driver {
    api: Arc<dyn ChatApi>,
    media: Arc<dyn MediaHost>,
    connector: Arc<dyn EventConnector>,
    session: SessionStore,
    updates: mpsc::UnboundedSender<Update>,
    channel: Option<EventChannel>,
}

impl Driver {
    pub fn new(
        api: Arc<dyn ChatApi>,
        media: Arc<dyn MediaHost>,
        connector: Arc<dyn EventConnector>,
        session: SessionStore,
    ) -> (Self, mpsc::UnboundedReceiver<Update>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let driver = Self {
            api,
            media,
            connector,
            session,
            updates,
            channel: None,
        };
        (driver, rx)
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|channel| !channel.is_closed())
    }

    /// `identity` is the session the effects were produced for.
    pub fn run_all(&mut self, effects: Vec<Effect>, identity: Option<&Identity>) {
        for effect in effects {
            self.run(effect, identity);
        }
    }

    pub fn run(&mut self, effect: Effect, identity: Option<&Identity>) {
        tracing::trace!(?effect, "running effect");
        match effect {
            Effect::Connect => match identity {
                Some(identity) => self.connect(identity),
                None => tracing::warn!("cannot open the event channel without a session"),
            },
            Effect::Disconnect => {
                if self.channel.take().is_some() {
                    tracing::info!("event channel torn down");
                }
            }
            Effect::Emit(event) => match &self.channel {
                Some(channel) => channel.emit(event),
                None => tracing::debug!(name = event.name(), "no event channel, dropping emit"),
            },
            Effect::SaveSession(identity) => {
                if let Err(err) = self.session.save(&identity) {
                    tracing::warn!("failed to save session: {err}");
                }
            }
            Effect::ClearSession => {
                if let Err(err) = self.session.clear() {
                    tracing::warn!("failed to clear session: {err}");
                }
            }
            effect => {
                let api = Arc::clone(&self.api);
                let media = Arc::clone(&self.media);
                let updates = self.updates.clone();
                let token = identity.map(|identity| Arc::clone(&identity.token));
                tokio::spawn(async move {
                    if let Some(update) = execute(&*api, &*media, effect, token.as_deref()).await {
                        // the receiver is gone once the UI has quit
                        let _ = updates.send(update);
                    }
                });
            }
        }
    }

    /// Replaces the current channel. The old one is dropped, and with it its tasks, before the
    /// new one is opened.
    fn connect(&mut self, identity: &Identity) {
        self.channel = None;
        let (inbound, mut events) = mpsc::unbounded_channel();
        let mut channel = self.connector.open(identity, inbound);
        let updates = self.updates.clone();
        channel.attach(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if updates.send(Update::Event(event)).is_err() {
                    break;
                }
            }
        }));
        tracing::info!(user = %identity.id(), "event channel opened");
        self.channel = Some(channel);
    }
}

fn require(token: Option<&str>) -> Result<&str> {
    token.ok_or(ClientError::NotAuthenticated)
}

async fn upload_file(media: &dyn MediaHost, path: &Path, mime: &'static str) -> Result<String> {
    let upload = media::read_upload(path, mime).await?;
    Ok(media.upload(upload).await?.to_string())
}

/// Performs one REST or upload effect and describes its outcome. Returns `None` for effects
/// that are not remote calls.
pub async fn execute(
    api: &dyn ChatApi,
    media: &dyn MediaHost,
    effect: Effect,
    token: Option<&str>,
) -> Option<Update> {
    Some(match effect {
        Effect::Login(credentials) => Update::LoggedIn(api.login(&credentials).await),
        Effect::Signup {
            mut signup,
            picture,
        } => Update::LoggedIn(
            async {
                if let Some(path) = picture {
                    let mime = media::check_profile_picture(&path)?;
                    signup.pic = Some(upload_file(media, &path, mime).await?);
                }
                api.signup(&signup).await
            }
            .await,
        ),
        Effect::UpdateProfile { name, picture } => Update::ProfileUpdated(
            async {
                let token = require(token)?;
                let pic = match picture {
                    Picture::Keep => None,
                    Picture::Url(url) => Some(url),
                    Picture::File(path) => {
                        let mime = media::check_profile_picture(&path)?;
                        Some(upload_file(media, &path, mime).await?)
                    }
                };
                api.update_profile(token, &ProfileUpdate { name, pic }).await
            }
            .await,
        ),
        Effect::FetchChats => {
            Update::Chats(async { api.fetch_chats(require(token)?).await }.await)
        }
        Effect::FetchHistory(chat) => {
            let result = async { api.fetch_messages(require(token)?, &chat).await }.await;
            Update::History { chat, result }
        }
        Effect::MarkRead(chat) => {
            let result = async { api.mark_read(require(token)?, &chat).await }.await;
            Update::MarkedRead { chat, result }
        }
        Effect::SendMessage { chat, content } => {
            let message = NewMessage::text(chat.clone(), content.clone());
            let result = async { api.send_message(require(token)?, &message).await }.await;
            Update::Sent {
                chat,
                draft: content,
                result,
            }
        }
        Effect::SendMedia {
            chat,
            path,
            kind,
            caption,
        } => {
            let result = async {
                let token = require(token)?;
                let (_, mime) = media::classify_attachment(&path)?;
                let url = upload_file(media, &path, mime).await?;
                let message = NewMessage {
                    content: caption.clone(),
                    chat: chat.clone(),
                    media_url: Some(url.into()),
                    media_type: Some(kind),
                };
                api.send_message(token, &message).await
            }
            .await;
            Update::Sent {
                chat,
                draft: caption,
                result,
            }
        }
        Effect::SearchUsers(query) => {
            let result = async { api.search_users(require(token)?, &query).await }.await;
            Update::SearchResults { query, result }
        }
        Effect::AccessChat(user) => {
            Update::ChatAccessed(async { api.access_chat(require(token)?, &user).await }.await)
        }
        Effect::CreateGroup(group) => {
            Update::GroupCreated(async { api.create_group(require(token)?, &group).await }.await)
        }
        Effect::ExitGroup(chat) => {
            let result = async { api.exit_group(require(token)?, &chat).await }.await;
            Update::LeftChat {
                chat,
                deleted: false,
                result,
            }
        }
        Effect::DeleteChat(chat) => {
            let result = async { api.delete_chat(require(token)?, &chat).await }.await;
            Update::LeftChat {
                chat,
                deleted: true,
                result,
            }
        }
        Effect::FetchCommunities => {
            Update::Communities(async { api.fetch_communities(require(token)?).await }.await)
        }
        Effect::CreateCommunity(community) => Update::CommunityCreated(
            async { api.create_community(require(token)?, &community).await }.await,
        ),
        Effect::FetchStatuses => {
            Update::Statuses(async { api.fetch_statuses(require(token)?).await }.await)
        }
        Effect::PostStatus(status) => {
            Update::StatusPosted(async { api.post_status(require(token)?, &status).await }.await)
        }
        Effect::Connect
        | Effect::Disconnect
        | Effect::Emit(_)
        | Effect::SaveSession(_)
        | Effect::ClearSession => return None,
    })
}
