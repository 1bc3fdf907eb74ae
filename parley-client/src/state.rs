//! Client-side application state.
//!
//! `AppState` is only ever touched by the UI loop. Its methods never do I/O: they mutate the
//! state and return the [`Effect`]s that should run. Results come back as [`Update`]s through
//! [`AppState::apply`], which may in turn ask for more effects.

use std::{
    collections::VecDeque,
    path::PathBuf,
    time::{Duration, Instant},
};

use parley_common::{
    ChatId, Conversation, Identity, MediaKind, Message, MessageList, MessageSummary,
    Notification, StatusBoard, StatusItem, User, UserId, UserRef,
};

use crate::{
    api::{Credentials, NewCommunity, NewGroup, NewStatus, Signup, UpdatedProfile},
    error::ClientError,
    media,
    socket::{InboundEvent, OutboundEvent, ReadReceipt},
};

/// Where a new profile or signup picture comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum Picture {
    Keep,
    Url(String),
    File(PathBuf),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Open the event channel for the current identity.
    Connect,
    Disconnect,
    Emit(OutboundEvent),
    SaveSession(Identity),
    ClearSession,
    Login(Credentials),
    Signup { signup: Signup, picture: Option<PathBuf> },
    UpdateProfile { name: String, picture: Picture },
    FetchChats,
    FetchHistory(ChatId),
    MarkRead(ChatId),
    SendMessage { chat: ChatId, content: String },
    SendMedia { chat: ChatId, path: PathBuf, kind: MediaKind, caption: String },
    SearchUsers(String),
    AccessChat(UserId),
    CreateGroup(NewGroup),
    ExitGroup(ChatId),
    DeleteChat(ChatId),
    FetchCommunities,
    CreateCommunity(NewCommunity),
    FetchStatuses,
    PostStatus(NewStatus),
}

type Outcome<T> = Result<T, ClientError>;

#[derive(Debug)]
pub enum Update {
    LoggedIn(Outcome<Identity>),
    ProfileUpdated(Outcome<UpdatedProfile>),
    Chats(Outcome<Vec<Conversation>>),
    History { chat: ChatId, result: Outcome<Vec<Message>> },
    MarkedRead { chat: ChatId, result: Outcome<()> },
    Sent { chat: ChatId, draft: String, result: Outcome<Message> },
    SearchResults { query: String, result: Outcome<Vec<User>> },
    ChatAccessed(Outcome<Conversation>),
    GroupCreated(Outcome<Conversation>),
    LeftChat { chat: ChatId, deleted: bool, result: Outcome<()> },
    Communities(Outcome<Vec<Conversation>>),
    CommunityCreated(Outcome<()>),
    Statuses(Outcome<Vec<StatusItem>>),
    StatusPosted(Outcome<StatusItem>),
    Event(InboundEvent),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient notice.
#[derive(Clone, Debug)]
pub struct Toast {
    pub level: ToastLevel,
    pub text: String,
    pub raised: Instant,
}

const TOAST_LIFETIME: Duration = Duration::from_secs(5);
const MAX_TOASTS: usize = 4;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Loading {
    pub auth: bool,
    pub chats: bool,
    pub history: bool,
    pub search: bool,
    pub profile: bool,
    pub upload: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Search {
    pub query: String,
    pub results: Vec<User>,
}

#[derive(Debug, Default)]
pub struct AppState {
    identity: Option<Identity>,
    chats: Vec<Conversation>,
    selected: Option<ChatId>,
    messages: MessageList,
    notifications: Vec<Notification>,
    statuses: Vec<StatusItem>,
    status_board: StatusBoard,
    communities: Vec<Conversation>,
    search: Search,
    group_members: Vec<User>,
    toasts: VecDeque<Toast>,
    loading: Loading,
    channel_live: bool,
    /// The message composer's text.
    pub draft: String,
}

impl AppState {
    /// Starts from the persisted identity, if any.
    pub fn new(identity: Option<Identity>) -> (Self, Vec<Effect>) {
        let mut state = Self::default();
        let effects = match identity {
            Some(identity) => state.start_session(identity),
            None => Vec::new(),
        };
        (state, effects)
    }

    fn start_session(&mut self, identity: Identity) -> Vec<Effect> {
        tracing::info!(user = %identity.id(), "session started");
        self.identity = Some(identity);
        self.loading.chats = true;
        vec![Effect::Connect, Effect::FetchChats, Effect::FetchStatuses]
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn viewer(&self) -> Option<&UserId> {
        self.identity.as_ref().map(Identity::id)
    }

    pub fn chats(&self) -> &[Conversation] {
        &self.chats
    }

    pub fn group_chats(&self) -> impl Iterator<Item = &Conversation> {
        self.chats.iter().filter(|chat| chat.is_group)
    }

    pub fn communities(&self) -> &[Conversation] {
        &self.communities
    }

    pub fn selected_id(&self) -> Option<&ChatId> {
        self.selected.as_ref()
    }

    /// The open conversation, looked up in the chat list and then the community list.
    pub fn selected(&self) -> Option<&Conversation> {
        let id = self.selected.as_ref()?;
        self.chats
            .iter()
            .chain(&self.communities)
            .find(|chat| &chat.identifier == id)
    }

    pub fn find_chat(&self, id: &ChatId) -> Option<&Conversation> {
        self.chats
            .iter()
            .chain(&self.communities)
            .find(|chat| &chat.identifier == id)
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status_board
    }

    pub fn search(&self) -> &Search {
        &self.search
    }

    pub fn group_members(&self) -> &[User] {
        &self.group_members
    }

    pub fn loading(&self) -> &Loading {
        &self.loading
    }

    pub fn is_channel_live(&self) -> bool {
        self.channel_live
    }

    pub fn toasts(&self) -> impl DoubleEndedIterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn toast(&mut self, level: ToastLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            ToastLevel::Error => tracing::warn!("{text}"),
            _ => tracing::debug!("{text}"),
        }
        if self.toasts.len() == MAX_TOASTS {
            self.toasts.pop_front();
        }
        self.toasts.push_back(Toast {
            level,
            text,
            raised: Instant::now(),
        });
    }

    pub fn expire_toasts(&mut self, now: Instant) {
        self.toasts
            .retain(|toast| now.saturating_duration_since(toast.raised) < TOAST_LIFETIME);
    }

    fn fail(&mut self, err: &ClientError, fallback: &str) {
        let level = match err {
            ClientError::Validation(_) => ToastLevel::Warning,
            _ => ToastLevel::Error,
        };
        tracing::debug!("{fallback}: {err}");
        self.toast(level, err.user_message(fallback));
    }

    fn warn(&mut self, text: &str) -> Vec<Effect> {
        self.toast(ToastLevel::Warning, text);
        Vec::new()
    }

    fn not_logged_in(&mut self) -> Vec<Effect> {
        self.warn("Please log in first")
    }

    // --- authentication ---

    pub fn login(&mut self, email: &str, password: &str) -> Vec<Effect> {
        if email.is_empty() || password.is_empty() {
            return self.warn("Please fill all the fields");
        }
        self.loading.auth = true;
        vec![Effect::Login(Credentials {
            email: email.to_owned(),
            password: password.to_owned(),
        })]
    }

    pub fn signup(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        picture: Picture,
    ) -> Vec<Effect> {
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return self.warn("Please fill all the fields");
        }
        let (pic, file) = match picture {
            Picture::Keep => (None, None),
            Picture::Url(url) => (Some(url), None),
            Picture::File(path) => {
                if let Err(err) = media::check_profile_picture(&path) {
                    self.fail(&err, "Please select an image");
                    return Vec::new();
                }
                (None, Some(path))
            }
        };
        self.loading.auth = true;
        vec![Effect::Signup {
            signup: Signup {
                name: name.to_owned(),
                email: email.to_owned(),
                password: password.to_owned(),
                pic,
            },
            picture: file,
        }]
    }

    /// Forgets everything about the session.
    pub fn logout(&mut self) -> Vec<Effect> {
        if let Some(identity) = &self.identity {
            tracing::info!(user = %identity.id(), "logged out");
        }
        let toasts = std::mem::take(&mut self.toasts);
        *self = Self {
            toasts,
            ..Self::default()
        };
        vec![Effect::ClearSession, Effect::Disconnect]
    }

    pub fn update_profile(&mut self, name: &str, picture: Picture) -> Vec<Effect> {
        let Some(identity) = &self.identity else {
            return self.not_logged_in();
        };
        let name = if name.is_empty() {
            identity.user.display_name.to_string()
        } else {
            name.to_owned()
        };
        if let Picture::File(path) = &picture {
            if let Err(err) = media::check_profile_picture(path) {
                self.fail(&err, "Please select an image");
                return Vec::new();
            }
        }
        self.loading.profile = true;
        vec![Effect::UpdateProfile { name, picture }]
    }

    // --- conversations ---

    pub fn refresh(&mut self) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        self.loading.chats = true;
        let mut effects = vec![Effect::FetchChats, Effect::FetchStatuses];
        if let Some(chat) = &self.selected {
            effects.push(Effect::FetchHistory(chat.clone()));
        }
        effects
    }

    /// Makes `chat` the open conversation: one history fetch plus one mark-read.
    pub fn select_chat(&mut self, chat: ChatId) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        if self.selected.as_ref() == Some(&chat) {
            return Vec::new();
        }
        tracing::debug!(%chat, "opening conversation");
        self.messages.clear();
        self.loading.history = true;
        self.selected = Some(chat.clone());
        vec![Effect::FetchHistory(chat.clone()), Effect::MarkRead(chat)]
    }

    pub fn close_chat(&mut self) {
        self.selected = None;
        self.messages.clear();
        self.loading.history = false;
    }

    /// Opens the conversation a notification points at and drops the notification.
    pub fn open_notification(&mut self, index: usize) -> Vec<Effect> {
        if index >= self.notifications.len() {
            return Vec::new();
        }
        let notification = self.notifications.remove(index);
        self.select_chat(notification.chat_id().clone())
    }

    pub fn search_users(&mut self, query: &str) -> Vec<Effect> {
        self.search.query = query.to_owned();
        self.search.results.clear();
        if query.is_empty() {
            self.loading.search = false;
            return Vec::new();
        }
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        self.loading.search = true;
        vec![Effect::SearchUsers(query.to_owned())]
    }

    pub fn clear_search(&mut self) {
        self.search = Search::default();
        self.loading.search = false;
    }

    pub fn access_chat(&mut self, user: UserId) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        vec![Effect::AccessChat(user)]
    }

    pub fn add_group_member(&mut self, user: User) {
        if self
            .group_members
            .iter()
            .any(|member| member.identifier == user.identifier)
        {
            self.toast(ToastLevel::Warning, "User already added");
            return;
        }
        self.group_members.push(user);
    }

    pub fn remove_group_member(&mut self, user: &UserId) {
        self.group_members.retain(|member| &member.identifier != user);
    }

    pub fn create_group(&mut self, name: &str) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        if name.is_empty() || self.group_members.is_empty() {
            return self.warn("Please fill all the fields");
        }
        vec![Effect::CreateGroup(NewGroup {
            name: name.to_owned(),
            users: self
                .group_members
                .iter()
                .map(|member| member.identifier.clone())
                .collect(),
        })]
    }

    pub fn exit_group(&mut self) -> Vec<Effect> {
        let target = self.selected().map(|chat| (chat.identifier.clone(), chat.is_group));
        match target {
            Some((chat, true)) => vec![Effect::ExitGroup(chat)],
            Some(_) => self.warn("Only groups can be exited"),
            None => self.warn("No conversation is open"),
        }
    }

    /// Deletes the open conversation. Groups can only be deleted by their admin.
    pub fn delete_chat(&mut self) -> Vec<Effect> {
        let Some(viewer) = self.viewer().cloned() else {
            return self.not_logged_in();
        };
        let target = self
            .selected()
            .map(|chat| (chat.identifier.clone(), !chat.is_group || chat.is_admin(&viewer)));
        match target {
            Some((chat, true)) => vec![Effect::DeleteChat(chat)],
            Some(_) => self.warn("Only the group admin can delete this group"),
            None => self.warn("No conversation is open"),
        }
    }

    pub fn load_communities(&mut self) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        vec![Effect::FetchCommunities]
    }

    pub fn create_community(&mut self, name: &str, description: &str, image: &str) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        if name.is_empty() || description.is_empty() {
            return self.warn("Name and description are required");
        }
        vec![Effect::CreateCommunity(NewCommunity {
            name: name.to_owned(),
            description: description.to_owned(),
            image: image.to_owned(),
        })]
    }

    // --- thread ---

    /// Sends the composer's content to the open conversation. The composer is cleared right
    /// away; it gets the text back if the send fails.
    pub fn submit_draft(&mut self) -> Vec<Effect> {
        if self.draft.trim().is_empty() {
            return Vec::new();
        }
        let Some(chat) = self.selected.clone() else {
            return self.warn("No conversation is open");
        };
        let content = self.draft.trim().to_owned();
        self.draft.clear();
        vec![Effect::SendMessage { chat, content }]
    }

    /// Uploads a local image or video and sends it with the composer's text as caption.
    pub fn attach(&mut self, path: PathBuf) -> Vec<Effect> {
        let Some(chat) = self.selected.clone() else {
            return self.warn("No conversation is open");
        };
        let kind = match media::classify_attachment(&path) {
            Ok((kind, _)) => kind,
            Err(err) => {
                self.fail(&err, "Unsupported file");
                return Vec::new();
            }
        };
        self.loading.upload = true;
        let caption = std::mem::take(&mut self.draft).trim().to_owned();
        vec![Effect::SendMedia {
            chat,
            path,
            kind,
            caption,
        }]
    }

    // --- status ---

    pub fn post_status(&mut self, media_url: &str, caption: &str) -> Vec<Effect> {
        if self.identity.is_none() {
            return self.not_logged_in();
        }
        if media_url.is_empty() {
            return self.warn("Please enter an image URL");
        }
        vec![Effect::PostStatus(NewStatus {
            media_url: media_url.to_owned(),
            caption: caption.to_owned(),
        })]
    }

    fn set_statuses(&mut self, statuses: Vec<StatusItem>) {
        self.statuses = statuses;
        self.rebuild_status_board();
    }

    fn rebuild_status_board(&mut self) {
        self.status_board = match &self.identity {
            Some(identity) => StatusBoard::new(self.statuses.iter().cloned(), identity.id()),
            None => StatusBoard::default(),
        };
    }

    // --- results ---

    pub fn apply(&mut self, update: Update) -> Vec<Effect> {
        // requests still in flight at logout finish after the session is gone
        if self.identity.is_none() && !matches!(update, Update::LoggedIn(_)) {
            tracing::debug!(?update, "ignoring result without a session");
            return Vec::new();
        }
        match update {
            Update::LoggedIn(result) => {
                self.loading.auth = false;
                match result {
                    Ok(identity) => {
                        self.toast(ToastLevel::Success, "Login successful");
                        let mut effects = vec![Effect::SaveSession(identity.clone())];
                        effects.extend(self.start_session(identity));
                        effects
                    }
                    Err(err) => {
                        self.fail(&err, "Login failed");
                        Vec::new()
                    }
                }
            }
            Update::ProfileUpdated(result) => {
                self.loading.profile = false;
                self.loading.upload = false;
                match result {
                    Ok(profile) => {
                        let Some(current) = self.identity.take() else {
                            return Vec::new();
                        };
                        let identity = Identity {
                            token: profile.token.unwrap_or(current.token),
                            user: profile.user,
                        };
                        self.identity = Some(identity.clone());
                        self.toast(ToastLevel::Success, "Profile updated");
                        vec![Effect::SaveSession(identity)]
                    }
                    Err(err) => {
                        self.fail(&err, "Failed to update profile");
                        Vec::new()
                    }
                }
            }
            Update::Chats(result) => {
                self.loading.chats = false;
                match result {
                    Ok(chats) => self.chats = chats,
                    Err(err) => self.fail(&err, "Failed to load chats"),
                }
                Vec::new()
            }
            Update::History { chat, result } => {
                if self.selected.as_ref() != Some(&chat) {
                    tracing::debug!(%chat, "discarding history of a conversation that is no longer open");
                    return Vec::new();
                }
                self.loading.history = false;
                match result {
                    Ok(messages) => {
                        self.messages.replace_all(messages);
                        vec![Effect::Emit(OutboundEvent::JoinChat(chat))]
                    }
                    Err(err) => {
                        self.fail(&err, "Failed to load messages");
                        Vec::new()
                    }
                }
            }
            Update::MarkedRead { chat, result } => match result {
                Ok(()) => vec![Effect::Emit(OutboundEvent::MarkMessagesRead(chat))],
                Err(err) => {
                    tracing::warn!(%chat, "failed to mark read: {err}");
                    Vec::new()
                }
            },
            Update::Sent {
                chat,
                draft,
                result,
            } => {
                self.loading.upload = false;
                match result {
                    Ok(message) => {
                        self.touch_chat(&message);
                        if self.selected.as_ref() == Some(&chat) {
                            self.messages.insert(message.clone());
                        }
                        vec![Effect::Emit(OutboundEvent::NewMessage(message))]
                    }
                    Err(err) => {
                        self.restore_draft(&draft);
                        self.fail(&err, "Failed to send message");
                        Vec::new()
                    }
                }
            }
            Update::SearchResults { query, result } => {
                if query != self.search.query {
                    return Vec::new();
                }
                self.loading.search = false;
                match result {
                    Ok(users) => self.search.results = users,
                    Err(err) => self.fail(&err, "Failed to load search results"),
                }
                Vec::new()
            }
            Update::ChatAccessed(result) => match result {
                Ok(chat) => {
                    let id = chat.identifier.clone();
                    if self.find_chat(&id).is_none() {
                        self.chats.insert(0, chat);
                    }
                    self.clear_search();
                    self.select_chat(id)
                }
                Err(err) => {
                    self.fail(&err, "Error fetching the chat");
                    Vec::new()
                }
            },
            Update::GroupCreated(result) => match result {
                Ok(chat) => {
                    self.group_members.clear();
                    self.chats.insert(0, chat.clone());
                    self.toast(ToastLevel::Success, "New group chat created");
                    vec![Effect::Emit(OutboundEvent::NewGroup(chat))]
                }
                Err(err) => {
                    self.fail(&err, "Failed to create group");
                    Vec::new()
                }
            },
            Update::LeftChat {
                chat,
                deleted,
                result,
            } => {
                match result {
                    Ok(()) => {
                        self.chats.retain(|c| c.identifier != chat);
                        self.notifications.retain(|n| n.chat_id() != &chat);
                        if self.selected.as_ref() == Some(&chat) {
                            self.close_chat();
                        }
                        if deleted {
                            self.toast(ToastLevel::Info, "Chat deleted");
                        } else {
                            self.toast(ToastLevel::Success, "You left the group");
                        }
                    }
                    Err(err) if deleted => self.fail(&err, "Failed to delete chat"),
                    Err(err) => self.fail(&err, "Failed to exit group"),
                }
                Vec::new()
            }
            Update::Communities(result) => {
                match result {
                    Ok(communities) => self.communities = communities,
                    Err(err) => self.fail(&err, "Failed to load communities"),
                }
                Vec::new()
            }
            Update::CommunityCreated(result) => match result {
                Ok(()) => {
                    self.toast(ToastLevel::Success, "Community created");
                    vec![Effect::FetchCommunities]
                }
                Err(err) => {
                    self.fail(&err, "Failed to create community");
                    Vec::new()
                }
            },
            Update::Statuses(result) => {
                match result {
                    Ok(statuses) => self.set_statuses(statuses),
                    Err(err) => tracing::warn!("failed to fetch statuses: {err}"),
                }
                Vec::new()
            }
            Update::StatusPosted(result) => match result {
                Ok(status) => {
                    self.toast(ToastLevel::Success, "Status uploaded");
                    vec![
                        Effect::Emit(OutboundEvent::NewStatus(status)),
                        Effect::FetchStatuses,
                    ]
                }
                Err(err) => {
                    self.fail(&err, "Failed to upload status");
                    Vec::new()
                }
            },
            Update::Event(event) => self.apply_event(event),
        }
    }

    fn restore_draft(&mut self, draft: &str) {
        if self.draft.is_empty() {
            self.draft = draft.to_owned();
        } else {
            self.draft = format!("{draft} {}", self.draft);
        }
    }

    /// Moves the message's conversation to the top and updates its summary. Returns false if
    /// the conversation is not in the list.
    fn touch_chat(&mut self, message: &Message) -> bool {
        let Some(index) = self
            .chats
            .iter()
            .position(|chat| &chat.identifier == message.chat_id())
        else {
            return false;
        };
        let mut chat = self.chats.remove(index);
        chat.latest_message = Some(MessageSummary {
            identifier: Some(message.identifier.clone()),
            sender: UserRef::User(message.sender.clone()),
            content: message.content.clone(),
            timestamp: message.timestamp,
        });
        self.chats.insert(0, chat);
        true
    }

    /// Handles a push from the event channel.
    pub fn apply_event(&mut self, event: InboundEvent) -> Vec<Effect> {
        if self.identity.is_none() {
            tracing::debug!(?event, "ignoring event without a session");
            return Vec::new();
        }
        match event {
            InboundEvent::Connected => {
                self.channel_live = true;
                Vec::new()
            }
            InboundEvent::MessageReceived(message) => self.message_received(message),
            InboundEvent::MessageRead(receipt) => self.message_read(receipt),
            InboundEvent::RefetchChats => vec![Effect::FetchChats],
            InboundEvent::StatusReceived(status) => {
                if !self
                    .statuses
                    .iter()
                    .any(|known| known.identifier == status.identifier)
                {
                    self.statuses.insert(0, status);
                    self.rebuild_status_board();
                }
                Vec::new()
            }
        }
    }

    fn message_received(&mut self, message: Message) -> Vec<Effect> {
        let chat = message.chat_id().clone();
        if self.selected.as_ref() == Some(&chat) {
            self.touch_chat(&message);
            self.messages.insert(message);
            return vec![Effect::MarkRead(chat)];
        }
        if self
            .notifications
            .iter()
            .any(|n| n.message_id() == &message.identifier)
        {
            return Vec::new();
        }
        let known = self.touch_chat(&message);
        self.notifications.insert(0, Notification { message });
        if known {
            Vec::new()
        } else {
            vec![Effect::FetchChats]
        }
    }

    fn message_read(&mut self, receipt: ReadReceipt) -> Vec<Effect> {
        let Some(open) = self.selected.clone() else {
            return Vec::new();
        };
        match receipt {
            ReadReceipt {
                chat: Some(chat),
                reader: Some(reader),
            } => {
                if chat == open {
                    let changed = self.messages.mark_read_by(&reader);
                    tracing::trace!(%chat, %reader, changed, "patched read receipts");
                }
                Vec::new()
            }
            ReadReceipt {
                chat: Some(chat), ..
            } if chat != open => Vec::new(),
            _ => vec![Effect::FetchHistory(open)],
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parley_common::{ChatRef, ReceiptState};

    use super::*;

    fn user(id: &str) -> User {
        User {
            identifier: id.into(),
            display_name: id.into(),
            email: None,
            avatar: None,
        }
    }

    fn identity(id: &str) -> Identity {
        Identity {
            user: user(id),
            token: format!("token-{id}").into(),
        }
    }

    fn chat(id: &str, users: &[&str]) -> Conversation {
        Conversation {
            identifier: id.into(),
            name: None,
            is_group: users.len() > 2,
            users: users.iter().map(|u| user(u)).collect(),
            admin: users.first().map(|u| UserRef::Id((*u).into())),
            latest_message: None,
            description: None,
            image: None,
        }
    }

    fn message(id: &str, chat: &str, sender: &str) -> Message {
        Message {
            identifier: id.into(),
            sender: user(sender),
            content: format!("text of {id}").into(),
            chat: ChatRef::Id(chat.into()),
            media_url: None,
            media_type: None,
            read_by: Vec::new(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn logged_in(id: &str) -> AppState {
        let (mut state, effects) = AppState::new(Some(identity(id)));
        assert_eq!(
            effects,
            [Effect::Connect, Effect::FetchChats, Effect::FetchStatuses]
        );
        state.apply(Update::Chats(Ok(vec![
            chat("c1", &["alice", "bob"]),
            chat("c2", &["alice", "carol"]),
        ])));
        state
    }

    #[test]
    fn starts_empty_without_persisted_identity() {
        let (state, effects) = AppState::new(None);
        assert!(effects.is_empty());
        assert!(state.identity().is_none());
        assert!(state.chats().is_empty());
    }

    #[test]
    fn opening_a_chat_fetches_once_and_marks_read_once() {
        let mut state = logged_in("alice");
        let effects = state.select_chat("c1".into());
        assert_eq!(
            effects,
            [Effect::FetchHistory("c1".into()), Effect::MarkRead("c1".into())]
        );
        assert!(state.select_chat("c1".into()).is_empty());
    }

    #[test]
    fn history_replaces_messages_and_joins_the_room() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        let effects = state.apply(Update::History {
            chat: "c1".into(),
            result: Ok(vec![message("m1", "c1", "bob"), message("m2", "c1", "alice")]),
        });
        assert_eq!(effects, [Effect::Emit(OutboundEvent::JoinChat("c1".into()))]);
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn stale_history_is_discarded() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        state.select_chat("c2".into());
        let effects = state.apply(Update::History {
            chat: "c1".into(),
            result: Ok(vec![message("m1", "c1", "bob")]),
        });
        assert!(effects.is_empty());
        assert!(state.messages().is_empty());
        assert!(state.loading().history);
    }

    #[test]
    fn mark_read_success_notifies_the_sender() {
        let mut state = logged_in("alice");
        let effects = state.apply(Update::MarkedRead {
            chat: "c1".into(),
            result: Ok(()),
        });
        assert_eq!(
            effects,
            [Effect::Emit(OutboundEvent::MarkMessagesRead("c1".into()))]
        );
    }

    #[test]
    fn send_clears_draft_first_and_appends_once() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        state.draft = "  hi ".into();
        let effects = state.submit_draft();
        assert_eq!(
            effects,
            [Effect::SendMessage {
                chat: "c1".into(),
                content: "hi".into()
            }]
        );
        assert!(state.draft.is_empty());

        let sent = message("m1", "c1", "alice");
        // the echo may beat the REST response
        state.apply_event(InboundEvent::MessageReceived(sent.clone()));
        let effects = state.apply(Update::Sent {
            chat: "c1".into(),
            draft: "hi".into(),
            result: Ok(sent.clone()),
        });
        assert_eq!(effects, [Effect::Emit(OutboundEvent::NewMessage(sent))]);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(
            state.chats()[0].latest_message.as_ref().map(|m| &*m.content),
            Some("text of m1")
        );
    }

    #[test]
    fn failed_send_restores_the_draft() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        state.draft = "hello".into();
        state.submit_draft();
        state.apply(Update::Sent {
            chat: "c1".into(),
            draft: "hello".into(),
            result: Err(ClientError::Protocol("boom".into())),
        });
        assert_eq!(state.draft, "hello");
        assert_eq!(state.toasts().last().unwrap().level, ToastLevel::Error);

        state.draft = "again".into();
        state.submit_draft();
        state.draft = "more".into();
        state.apply(Update::Sent {
            chat: "c1".into(),
            draft: "again".into(),
            result: Err(ClientError::Protocol("boom".into())),
        });
        assert_eq!(state.draft, "again more");
    }

    #[test]
    fn empty_draft_sends_nothing() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        state.draft = "   ".into();
        assert!(state.submit_draft().is_empty());
    }

    #[test]
    fn message_for_open_chat_is_appended_and_marked_read() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        let effects = state.apply_event(InboundEvent::MessageReceived(message("m1", "c1", "bob")));
        assert_eq!(effects, [Effect::MarkRead("c1".into())]);
        assert!(state.messages().contains(&"m1".into()));
        assert!(state.notifications().is_empty());
    }

    #[test]
    fn message_for_other_chat_notifies_once_per_id() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        for _ in 0..3 {
            state.apply_event(InboundEvent::MessageReceived(message("m9", "c2", "carol")));
        }
        state.apply_event(InboundEvent::MessageReceived(message("m10", "c2", "carol")));
        let ids: Vec<_> = state
            .notifications()
            .iter()
            .map(|n| n.message_id().as_str())
            .collect();
        assert_eq!(ids, ["m10", "m9"]);
        assert_eq!(state.chats()[0].identifier.as_str(), "c2");
        assert!(state.messages().is_empty());
    }

    #[test]
    fn message_for_unknown_chat_refetches_the_list() {
        let mut state = logged_in("alice");
        let effects = state.apply_event(InboundEvent::MessageReceived(message("m1", "new", "dan")));
        assert_eq!(effects, [Effect::FetchChats]);
        assert_eq!(state.notifications().len(), 1);
    }

    #[test]
    fn opening_a_notification_removes_it_and_opens_its_chat() {
        let mut state = logged_in("alice");
        state.apply_event(InboundEvent::MessageReceived(message("m1", "c2", "carol")));
        let effects = state.open_notification(0);
        assert_eq!(
            effects,
            [Effect::FetchHistory("c2".into()), Effect::MarkRead("c2".into())]
        );
        assert!(state.notifications().is_empty());
        assert!(state.open_notification(0).is_empty());
    }

    #[test]
    fn read_receipt_with_reader_patches_in_place() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        state.apply(Update::History {
            chat: "c1".into(),
            result: Ok(vec![message("m1", "c1", "alice")]),
        });
        let viewer: UserId = "alice".into();
        let tick = |state: &AppState| state.messages().get(&"m1".into()).unwrap().receipt(&viewer);
        assert_eq!(tick(&state), Some(ReceiptState::Sent));

        let effects = state.apply_event(InboundEvent::MessageRead(ReadReceipt {
            chat: Some("c1".into()),
            reader: Some("bob".into()),
        }));
        assert!(effects.is_empty());
        assert_eq!(tick(&state), Some(ReceiptState::Seen));
    }

    #[test]
    fn bare_read_receipt_refetches_open_history() {
        let mut state = logged_in("alice");
        assert!(state
            .apply_event(InboundEvent::MessageRead(ReadReceipt::default()))
            .is_empty());
        state.select_chat("c1".into());
        assert_eq!(
            state.apply_event(InboundEvent::MessageRead(ReadReceipt::default())),
            [Effect::FetchHistory("c1".into())]
        );
        assert!(state
            .apply_event(InboundEvent::MessageRead(ReadReceipt {
                chat: Some("c2".into()),
                reader: None
            }))
            .is_empty());
    }

    #[test]
    fn refetch_signal_fetches_chats() {
        let mut state = logged_in("alice");
        assert_eq!(
            state.apply_event(InboundEvent::RefetchChats),
            [Effect::FetchChats]
        );
    }

    #[test]
    fn empty_search_makes_no_call() {
        let mut state = logged_in("alice");
        state.search_users("bo");
        state.apply(Update::SearchResults {
            query: "bo".into(),
            result: Ok(vec![user("bob")]),
        });
        assert_eq!(state.search().results.len(), 1);
        assert!(state.search_users("").is_empty());
        assert!(state.search().results.is_empty());
    }

    #[test]
    fn stale_search_results_are_ignored() {
        let mut state = logged_in("alice");
        state.search_users("b");
        state.search_users("bo");
        state.apply(Update::SearchResults {
            query: "b".into(),
            result: Ok(vec![user("ben")]),
        });
        assert!(state.search().results.is_empty());
    }

    #[test]
    fn validation_happens_before_any_call() {
        let (mut state, _) = AppState::new(None);
        assert!(state.login("", "pw").is_empty());
        assert!(state.signup("", "a@b", "pw", Picture::Keep).is_empty());
        assert_eq!(state.toasts().last().unwrap().level, ToastLevel::Warning);

        let mut state = logged_in("alice");
        assert!(state.create_group("team").is_empty());
        state.add_group_member(user("bob"));
        state.add_group_member(user("bob"));
        assert_eq!(state.group_members().len(), 1);
        assert!(state.create_group("").is_empty());
        assert_eq!(state.create_group("team").len(), 1);
        assert!(state.create_community("x", "", "").is_empty());
        assert!(state.post_status("", "caption").is_empty());
        state.select_chat("c1".into());
        assert!(state.attach("notes.txt".into()).is_empty());
    }

    #[test]
    fn login_success_persists_and_starts_the_session() {
        let (mut state, _) = AppState::new(None);
        assert_eq!(state.login("a@b", "pw").len(), 1);
        let effects = state.apply(Update::LoggedIn(Ok(identity("alice"))));
        assert_eq!(
            effects,
            [
                Effect::SaveSession(identity("alice")),
                Effect::Connect,
                Effect::FetchChats,
                Effect::FetchStatuses
            ]
        );
        assert_eq!(state.viewer().map(UserId::as_str), Some("alice"));
    }

    #[test]
    fn login_failure_shows_backend_message() {
        let (mut state, _) = AppState::new(None);
        state.login("a@b", "pw");
        state.apply(Update::LoggedIn(Err(ClientError::Status {
            status: reqwest::StatusCode::UNAUTHORIZED,
            message: "Invalid Email or Password".into(),
        })));
        assert_eq!(state.toasts().last().unwrap().text, "Invalid Email or Password");
        assert!(!state.loading().auth);
    }

    #[test]
    fn logout_clears_everything() {
        let mut state = logged_in("alice");
        state.select_chat("c1".into());
        assert_eq!(state.logout(), [Effect::ClearSession, Effect::Disconnect]);
        assert!(state.identity().is_none());
        assert!(state.chats().is_empty());
        assert!(state.selected_id().is_none());
    }

    #[test]
    fn late_results_after_logout_are_dropped() {
        let mut state = logged_in("alice");
        assert_eq!(state.refresh(), [Effect::FetchChats, Effect::FetchStatuses]);
        state.logout();

        let effects = state.apply(Update::Chats(Ok(vec![chat("c1", &["alice", "bob"])])));
        assert!(effects.is_empty());
        let effects = state.apply(Update::Communities(Ok(vec![chat(
            "k1",
            &["alice", "bob", "carol"],
        )])));
        assert!(effects.is_empty());
        assert!(state.chats().is_empty());
        assert!(state.communities().is_empty());
        assert!(state.identity().is_none());

        // a fresh login still goes through
        let effects = state.apply(Update::LoggedIn(Ok(identity("bob"))));
        assert_eq!(effects[0], Effect::SaveSession(identity("bob")));
        assert!(state.identity().is_some());
    }

    #[test]
    fn profile_update_keeps_token_when_none_returned() {
        let mut state = logged_in("alice");
        state.update_profile("Alice B", Picture::Keep);
        let mut renamed = user("alice");
        renamed.display_name = "Alice B".into();
        let effects = state.apply(Update::ProfileUpdated(Ok(UpdatedProfile {
            user: renamed,
            token: None,
        })));
        let identity = state.identity().unwrap().clone();
        assert_eq!(&*identity.token, "token-alice");
        assert_eq!(&*identity.user.display_name, "Alice B");
        assert_eq!(effects, [Effect::SaveSession(identity)]);
    }

    #[test]
    fn only_admin_may_delete_a_group() {
        let mut state = logged_in("bob");
        state.apply(Update::Chats(Ok(vec![chat("g1", &["alice", "bob", "carol"])])));
        state.select_chat("g1".into());
        assert!(state.delete_chat().is_empty());
        assert_eq!(state.exit_group(), [Effect::ExitGroup("g1".into())]);

        state.apply(Update::LeftChat {
            chat: "g1".into(),
            deleted: false,
            result: Ok(()),
        });
        assert!(state.chats().is_empty());
        assert!(state.selected_id().is_none());
    }

    #[test]
    fn status_pushes_extend_the_board() {
        let mut state = logged_in("alice");
        let status = StatusItem {
            identifier: "s1".into(),
            user: user("bob"),
            media_url: "https://cdn/s1.png".into(),
            caption: None,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        state.apply_event(InboundEvent::StatusReceived(status.clone()));
        state.apply_event(InboundEvent::StatusReceived(status));
        assert_eq!(state.status_board().others.len(), 1);
        assert_eq!(state.status_board().others[0].items.len(), 1);
        assert!(state.status_board().mine.is_none());
    }
}
