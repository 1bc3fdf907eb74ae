use chrono::{DateTime, Duration, Utc};
use parley_client::{
    api::NewMessage,
    error::{ClientError, Result, StatusCode},
    socket::ReadReceipt,
    InboundEvent, OutboundEvent,
};
use parley_common::{
    ChatId, ChatRef, Conversation, Identity, Message, MessageSummary, StatusItem, User, UserId,
    UserRef,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub(crate) fn new_id() -> String {
    Uuid::now_v7().simple().to_string()
}

pub(crate) fn rejected(status: StatusCode, message: &str) -> ClientError {
    ClientError::Status {
        status,
        message: message.to_owned(),
    }
}

pub(crate) struct Account {
    pub user: User,
    pub password: String,
    pub token: String,
}

impl Account {
    pub fn identity(&self) -> Identity {
        Identity {
            user: self.user.clone(),
            token: self.token.as_str().into(),
        }
    }
}

struct Connection {
    id: u64,
    user: Option<UserId>,
    rooms: Vec<ChatId>,
    inbound: mpsc::UnboundedSender<InboundEvent>,
}

/// Everything the fake backend knows. Chats are kept most recently active first.
#[derive(Default)]
pub(crate) struct World {
    pub accounts: Vec<Account>,
    pub chats: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub communities: Vec<Conversation>,
    pub statuses: Vec<StatusItem>,
    connections: Vec<Connection>,
    next_connection: u64,
}

const STATUS_LIFETIME_HOURS: i64 = 24;

impl World {
    pub fn authenticate(&self, token: &str) -> Result<User> {
        self.accounts
            .iter()
            .find(|account| account.token == token)
            .map(|account| account.user.clone())
            .ok_or_else(|| rejected(StatusCode::UNAUTHORIZED, "Not authorized, token failed"))
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.accounts
            .iter()
            .map(|account| &account.user)
            .find(|user| &user.identifier == id)
    }

    pub fn add_account(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        pic: Option<String>,
    ) -> Result<Identity> {
        if self
            .accounts
            .iter()
            .any(|account| account.user.email.as_deref() == Some(email))
        {
            return Err(rejected(StatusCode::BAD_REQUEST, "User already exists"));
        }
        let account = Account {
            user: User {
                identifier: new_id().into(),
                display_name: name.into(),
                email: Some(email.into()),
                avatar: pic.map(Into::into),
            },
            password: password.to_owned(),
            token: format!("token-{}", new_id()),
        };
        let identity = account.identity();
        self.accounts.push(account);
        Ok(identity)
    }

    pub fn chat(&self, id: &ChatId) -> Result<&Conversation> {
        self.chats
            .iter()
            .find(|chat| &chat.identifier == id)
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "Chat Not Found"))
    }

    /// The chat, if `user` belongs to it.
    pub fn member_chat(&self, id: &ChatId, user: &UserId) -> Result<&Conversation> {
        let chat = self.chat(id)?;
        if chat.users.iter().any(|member| &member.identifier == user) {
            Ok(chat)
        } else {
            Err(rejected(StatusCode::FORBIDDEN, "You are not a member of this chat"))
        }
    }

    pub fn add_chat(
        &mut self,
        name: Option<&str>,
        members: Vec<User>,
        admin: Option<&UserId>,
    ) -> Conversation {
        let chat = Conversation {
            identifier: new_id().into(),
            name: name.map(Into::into),
            is_group: admin.is_some(),
            users: members,
            admin: admin.cloned().map(UserRef::Id),
            latest_message: None,
            description: None,
            image: None,
        };
        self.chats.insert(0, chat.clone());
        chat
    }

    pub fn post(
        &mut self,
        sender: User,
        new: &NewMessage,
        timestamp: DateTime<Utc>,
    ) -> Result<Message> {
        let index = self
            .chats
            .iter()
            .position(|chat| chat.identifier == new.chat)
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "Chat Not Found"))?;
        let mut chat = self.chats.remove(index);
        let message = Message {
            identifier: new_id().into(),
            sender: sender.clone(),
            content: new.content.as_str().into(),
            chat: ChatRef::Conversation(Box::new(chat.clone())),
            media_url: new.media_url.clone(),
            media_type: new.media_type,
            read_by: Vec::new(),
            timestamp,
        };
        chat.latest_message = Some(MessageSummary {
            identifier: Some(message.identifier.clone()),
            sender: UserRef::User(sender),
            content: message.content.clone(),
            timestamp,
        });
        self.chats.insert(0, chat);
        self.messages.push(message.clone());
        Ok(message)
    }

    pub fn mark_read(&mut self, chat: &ChatId, reader: &UserId) -> usize {
        self.messages
            .iter_mut()
            .filter(|message| message.chat_id() == chat && !message.is_from(reader))
            .map(|message| message.mark_read_by(reader))
            .filter(|changed| *changed)
            .count()
    }

    pub fn live_statuses(&self, now: DateTime<Utc>) -> Vec<StatusItem> {
        let cutoff = now - Duration::hours(STATUS_LIFETIME_HOURS);
        self.statuses
            .iter()
            .filter(|status| status.timestamp > cutoff)
            .cloned()
            .collect()
    }

    pub fn connect(&mut self, inbound: mpsc::UnboundedSender<InboundEvent>) -> u64 {
        self.next_connection += 1;
        let id = self.next_connection;
        self.connections.push(Connection {
            id,
            user: None,
            rooms: Vec::new(),
            inbound,
        });
        tracing::debug!(connection = id, "client connected");
        id
    }

    pub fn disconnect(&mut self, id: u64) {
        self.connections.retain(|connection| connection.id != id);
        tracing::debug!(connection = id, "client disconnected");
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Sends `event` to every connection registered for one of `users`.
    fn push_to(&self, users: &[&UserId], event: &InboundEvent) {
        for connection in &self.connections {
            if connection
                .user
                .as_ref()
                .is_some_and(|user| users.contains(&user))
            {
                let _ = connection.inbound.send(event.clone());
            }
        }
    }

    /// Members of `chat` other than `except`.
    fn others<'a>(&'a self, chat: &ChatId, except: &UserId) -> Vec<&'a UserId> {
        self.chats
            .iter()
            .find(|c| &c.identifier == chat)
            .map(|c| {
                c.users
                    .iter()
                    .map(|user| &user.identifier)
                    .filter(|user| *user != except)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn deliver_message(&self, message: &Message) {
        let recipients = self.others(message.chat_id(), &message.sender.identifier);
        self.push_to(&recipients, &InboundEvent::MessageReceived(message.clone()));
    }

    /// Read receipts go to the chat's room: only clients showing the chat care.
    pub fn deliver_read(&self, chat: &ChatId, reader: &UserId) {
        let receipt = InboundEvent::MessageRead(ReadReceipt {
            chat: Some(chat.clone()),
            reader: Some(reader.clone()),
        });
        for connection in &self.connections {
            if connection.rooms.contains(chat) && connection.user.as_ref() != Some(reader) {
                let _ = connection.inbound.send(receipt.clone());
            }
        }
    }

    /// Handles an event a client emitted on connection `id`.
    pub fn dispatch(&mut self, id: u64, event: OutboundEvent) {
        let Some(index) = self.connections.iter().position(|c| c.id == id) else {
            return;
        };
        let sender = self.connections[index].user.clone();
        match (event, sender) {
            (OutboundEvent::Setup(user), _) => {
                let connection = &mut self.connections[index];
                connection.user = Some(user.identifier);
                let _ = connection.inbound.send(InboundEvent::Connected);
            }
            (OutboundEvent::JoinChat(chat), Some(_)) => {
                let rooms = &mut self.connections[index].rooms;
                if !rooms.contains(&chat) {
                    rooms.push(chat);
                }
            }
            (OutboundEvent::NewMessage(message), Some(_)) => self.deliver_message(&message),
            (OutboundEvent::NewGroup(chat), Some(sender)) => {
                let recipients: Vec<_> = chat
                    .users
                    .iter()
                    .map(|user| &user.identifier)
                    .filter(|user| **user != sender)
                    .collect();
                self.push_to(&recipients, &InboundEvent::RefetchChats);
            }
            (OutboundEvent::NewStatus(status), Some(sender)) => {
                for connection in &self.connections {
                    if connection.user.as_ref().is_some_and(|user| *user != sender) {
                        let _ = connection
                            .inbound
                            .send(InboundEvent::StatusReceived(status.clone()));
                    }
                }
            }
            (OutboundEvent::MarkMessagesRead(chat), Some(reader)) => {
                self.deliver_read(&chat, &reader)
            }
            (event, None) => {
                tracing::debug!(connection = id, name = event.name(), "event before setup ignored")
            }
        }
    }
}
