//! An in-process stand-in for the chat backend, its media host and its event server.
//!
//! Useful for running the client offline and for end-to-end tests: several clients sharing one
//! [`FakeBackend`] see each other's messages, receipts and statuses.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use parley_client::{
    api::{
        Credentials, NewCommunity, NewGroup, NewMessage, NewStatus, ProfileUpdate, Signup,
        UpdatedProfile,
    },
    error::{Result, StatusCode},
    media::Upload,
    ChatApi, EventChannel, EventConnector, InboundEvent, MediaHost,
};
use parley_common::{ChatId, Conversation, Identity, Message, StatusItem, User, UserId, UserRef};
use tokio::sync::mpsc;

mod chatter;
mod world;

pub use chatter::chatter;
use world::{new_id, rejected, World};

#[derive(Clone, Default)]
pub struct FakeBackend {
    world: Arc<Mutex<World>>,
}

/// Password of every seeded account.
pub const DEMO_PASSWORD: &str = "password";
/// The seeded account meant for the person at the keyboard.
pub const DEMO_EMAIL: &str = "you@parley.test";

const BOT_NAMES: &[&str] = &["alice", "bob", "charlie", "dana"];

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with a few accounts, chats, a community and some statuses to look at.
    pub fn demo() -> Self {
        let backend = Self::new();
        if let Err(err) = seed(&mut backend.world()) {
            tracing::warn!("failed to seed demo data: {err}");
        }
        backend
    }

    fn world(&self) -> MutexGuard<'_, World> {
        // a panic while holding the lock leaves nothing half-written worth refusing
        self.world.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Users that are not bound to a person, for [`chatter`].
    pub fn bots(&self) -> Vec<User> {
        let world = self.world();
        world
            .accounts
            .iter()
            .map(|account| &account.user)
            .filter(|user| BOT_NAMES.contains(&&*user.display_name))
            .cloned()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.world().connection_count()
    }

    /// Posts `content` to `chat` as `sender` and pushes it to the other members, the way a
    /// client's send followed by its `new message` emit would.
    pub fn post_as(&self, sender: &UserId, chat: &ChatId, content: &str) -> Result<Message> {
        let mut world = self.world();
        let sender = world
            .user(sender)
            .cloned()
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "User not found"))?;
        world.member_chat(chat, &sender.identifier)?;
        let message = world.post(sender, &NewMessage::text(chat.clone(), content), Utc::now())?;
        world.deliver_message(&message);
        Ok(message)
    }

    /// Marks `chat` read by `reader` and tells whoever has it open.
    pub fn read_as(&self, reader: &UserId, chat: &ChatId) -> Result<()> {
        let mut world = self.world();
        world.member_chat(chat, reader)?;
        world.mark_read(chat, reader);
        world.deliver_read(chat, reader);
        Ok(())
    }

    /// Chats `user` belongs to, most recently active first.
    pub fn chats_of(&self, user: &UserId) -> Vec<Conversation> {
        self.world()
            .chats
            .iter()
            .filter(|chat| chat.users.iter().any(|member| &member.identifier == user))
            .cloned()
            .collect()
    }
}

fn seed(world: &mut World) -> Result<()> {
    let viewer = world
        .add_account("you", DEMO_EMAIL, DEMO_PASSWORD, None)?
        .user;
    let mut bots = Vec::with_capacity(BOT_NAMES.len());
    for name in BOT_NAMES {
        let email = format!("{name}@parley.test");
        bots.push(world.add_account(name, &email, DEMO_PASSWORD, None)?.user);
    }

    let mut everyone = vec![viewer.clone()];
    everyone.extend(bots.iter().cloned());
    world.add_chat(Some("general"), everyone, Some(&bots[0].identifier));
    for bot in &bots[..2] {
        let chat = world.add_chat(None, vec![viewer.clone(), bot.clone()], None);
        let hello = NewMessage::text(chat.identifier, format!("hi, it's {}", bot.display_name));
        world.post(bot.clone(), &hello, Utc::now())?;
    }

    let host = &bots[BOT_NAMES.len() - 1];
    world.communities.push(Conversation {
        identifier: new_id().into(),
        name: Some("rustaceans".into()),
        is_group: true,
        users: vec![host.clone()],
        admin: Some(UserRef::Id(host.identifier.clone())),
        latest_message: None,
        description: Some("crabs welcome".into()),
        image: None,
    });
    for bot in &bots {
        world.statuses.push(StatusItem {
            identifier: new_id().into(),
            user: bot.clone(),
            media_url: format!("https://picsum.photos/seed/{}/400", bot.display_name).into(),
            caption: Some(format!("{}'s day", bot.display_name).into()),
            timestamp: Utc::now(),
        });
    }
    Ok(())
}

#[async_trait]
impl ChatApi for FakeBackend {
    async fn login(&self, credentials: &Credentials) -> Result<Identity> {
        let world = self.world();
        world
            .accounts
            .iter()
            .find(|account| {
                account.user.email.as_deref() == Some(credentials.email.as_str())
                    && account.password == credentials.password
            })
            .map(|account| account.identity())
            .ok_or_else(|| rejected(StatusCode::UNAUTHORIZED, "Invalid Email or Password"))
    }

    async fn signup(&self, signup: &Signup) -> Result<Identity> {
        self.world()
            .add_account(&signup.name, &signup.email, &signup.password, signup.pic.clone())
    }

    async fn search_users(&self, token: &str, query: &str) -> Result<Vec<User>> {
        let world = self.world();
        let me = world.authenticate(token)?;
        let query = query.to_lowercase();
        Ok(world
            .accounts
            .iter()
            .map(|account| &account.user)
            .filter(|user| user.identifier != me.identifier)
            .filter(|user| {
                user.display_name.to_lowercase().contains(&query)
                    || user
                        .email
                        .as_deref()
                        .is_some_and(|email| email.to_lowercase().contains(&query))
            })
            .cloned()
            .collect())
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<UpdatedProfile> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        let account = world
            .accounts
            .iter_mut()
            .find(|account| account.user.identifier == me.identifier)
            .ok_or_else(|| rejected(StatusCode::NOT_FOUND, "User not found"))?;
        account.user.display_name = update.name.as_str().into();
        if let Some(pic) = &update.pic {
            account.user.avatar = Some(pic.as_str().into());
        }
        let user = account.user.clone();
        for chat in &mut world.chats {
            for member in &mut chat.users {
                if member.identifier == user.identifier {
                    *member = user.clone();
                }
            }
        }
        Ok(UpdatedProfile { user, token: None })
    }

    async fn fetch_chats(&self, token: &str) -> Result<Vec<Conversation>> {
        let me = self.world().authenticate(token)?;
        Ok(self.chats_of(&me.identifier))
    }

    async fn access_chat(&self, token: &str, user: &UserId) -> Result<Conversation> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        let existing = world.chats.iter().find(|chat| {
            !chat.is_group
                && chat.users.iter().any(|member| member.identifier == me.identifier)
                && chat.users.iter().any(|member| &member.identifier == user)
        });
        if let Some(chat) = existing {
            return Ok(chat.clone());
        }
        let other = world
            .user(user)
            .cloned()
            .ok_or_else(|| rejected(StatusCode::BAD_REQUEST, "UserId param not sent with request"))?;
        Ok(world.add_chat(None, vec![me, other], None))
    }

    async fn create_group(&self, token: &str, group: &NewGroup) -> Result<Conversation> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        if group.name.is_empty() || group.users.is_empty() {
            return Err(rejected(StatusCode::BAD_REQUEST, "Please Fill all the feilds"));
        }
        let mut members = vec![me.clone()];
        for id in &group.users {
            let user = world
                .user(id)
                .cloned()
                .ok_or_else(|| rejected(StatusCode::BAD_REQUEST, "Unknown group member"))?;
            if !members.contains(&user) {
                members.push(user);
            }
        }
        Ok(world.add_chat(Some(&group.name), members, Some(&me.identifier)))
    }

    async fn exit_group(&self, token: &str, chat: &ChatId) -> Result<()> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        if !world.member_chat(chat, &me.identifier)?.is_group {
            return Err(rejected(StatusCode::BAD_REQUEST, "Not a group chat"));
        }
        if let Some(group) = world.chats.iter_mut().find(|c| &c.identifier == chat) {
            group.users.retain(|member| member.identifier != me.identifier);
        }
        Ok(())
    }

    async fn delete_chat(&self, token: &str, chat: &ChatId) -> Result<()> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        let target = world.member_chat(chat, &me.identifier)?;
        if target.is_group && !target.is_admin(&me.identifier) {
            return Err(rejected(StatusCode::FORBIDDEN, "Only admin can delete the group"));
        }
        world.chats.retain(|c| &c.identifier != chat);
        world.messages.retain(|m| m.chat_id() != chat);
        Ok(())
    }

    async fn fetch_messages(&self, token: &str, chat: &ChatId) -> Result<Vec<Message>> {
        let world = self.world();
        let me = world.authenticate(token)?;
        world.member_chat(chat, &me.identifier)?;
        Ok(world
            .messages
            .iter()
            .filter(|message| message.chat_id() == chat)
            .cloned()
            .collect())
    }

    async fn send_message(&self, token: &str, message: &NewMessage) -> Result<Message> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        if message.content.is_empty() && message.media_url.is_none() {
            return Err(rejected(StatusCode::BAD_REQUEST, "Invalid data passed into request"));
        }
        world.member_chat(&message.chat, &me.identifier)?;
        world.post(me, message, Utc::now())
    }

    async fn mark_read(&self, token: &str, chat: &ChatId) -> Result<()> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        world.member_chat(chat, &me.identifier)?;
        let marked = world.mark_read(chat, &me.identifier);
        tracing::trace!(%chat, marked, "marked read");
        Ok(())
    }

    async fn fetch_communities(&self, token: &str) -> Result<Vec<Conversation>> {
        let world = self.world();
        world.authenticate(token)?;
        Ok(world.communities.clone())
    }

    async fn create_community(&self, token: &str, community: &NewCommunity) -> Result<()> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        let image = (!community.image.is_empty()).then(|| community.image.as_str().into());
        world.communities.push(Conversation {
            identifier: new_id().into(),
            name: Some(community.name.as_str().into()),
            is_group: true,
            users: vec![me.clone()],
            admin: Some(UserRef::Id(me.identifier)),
            latest_message: None,
            description: Some(community.description.as_str().into()),
            image,
        });
        Ok(())
    }

    async fn fetch_statuses(&self, token: &str) -> Result<Vec<StatusItem>> {
        let world = self.world();
        world.authenticate(token)?;
        Ok(world.live_statuses(Utc::now()))
    }

    async fn post_status(&self, token: &str, status: &NewStatus) -> Result<StatusItem> {
        let mut world = self.world();
        let me = world.authenticate(token)?;
        let caption = (!status.caption.is_empty()).then(|| status.caption.as_str().into());
        let item = StatusItem {
            identifier: new_id().into(),
            user: me,
            media_url: status.media_url.as_str().into(),
            caption,
            timestamp: Utc::now(),
        };
        world.statuses.push(item.clone());
        Ok(item)
    }
}

#[async_trait]
impl MediaHost for FakeBackend {
    async fn upload(&self, upload: Upload) -> Result<Arc<str>> {
        if upload.bytes.is_empty() {
            return Err(parley_client::ClientError::Upload("empty file".to_owned()));
        }
        Ok(format!("https://media.parley.test/{}/{}", new_id(), upload.file_name).into())
    }
}

/// Unregisters the connection however its task ends, including by abort.
struct Registration {
    world: Arc<Mutex<World>>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut world = self.world.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        world.disconnect(self.id);
    }
}

impl EventConnector for FakeBackend {
    fn open(
        &self,
        identity: &Identity,
        inbound: mpsc::UnboundedSender<InboundEvent>,
    ) -> EventChannel {
        let (outbound, mut events) = mpsc::unbounded_channel();
        let id = self.world().connect(inbound);
        let registration = Registration {
            world: Arc::clone(&self.world),
            id,
        };
        let _ = outbound.send(parley_client::OutboundEvent::Setup(identity.user.clone()));
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mut world = registration
                    .world
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                world.dispatch(registration.id, event);
            }
        });
        EventChannel::new(outbound, vec![task])
    }
}
