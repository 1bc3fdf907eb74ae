//! Two clients talking through one fake backend, driven the way the terminal UI drives them.

use std::{sync::Arc, time::Duration};

use parley_client::{AppState, Driver, Effect, SessionStore, Update};
use parley_common::{ChatId, Identity, ReceiptState, UserId};
use parley_fake_backend::FakeBackend;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Client {
    state: AppState,
    driver: Driver,
    updates: mpsc::UnboundedReceiver<Update>,
    _dir: TempDir,
}

impl Client {
    fn new(backend: &FakeBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionStore::new(dir.path().join("session.json"));
        let (driver, updates) = Driver::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            session,
        );
        let (state, effects) = AppState::new(None);
        let mut client = Self {
            state,
            driver,
            updates,
            _dir: dir,
        };
        client.act(effects);
        client
    }

    fn act(&mut self, effects: Vec<Effect>) {
        let identity = self.state.identity().cloned();
        self.driver.run_all(effects, identity.as_ref());
    }

    fn handle(&mut self, update: Update) {
        let effects = self.state.apply(update);
        self.act(effects);
    }

    /// Applies updates until `done` holds.
    async fn settle(&mut self, done: impl Fn(&AppState) -> bool) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while !done(&self.state) {
                let update = self.updates.recv().await.expect("driver gone");
                self.handle(update);
            }
        })
        .await;
        assert!(result.is_ok(), "client never reached the expected state");
    }

    async fn signup(backend: &FakeBackend, name: &str) -> Self {
        let mut client = Self::new(backend);
        let effects = client.state.signup(
            name,
            &format!("{name}@example.com"),
            "secret",
            parley_client::Picture::Keep,
        );
        client.act(effects);
        client
            .settle(|state| state.identity().is_some() && state.is_channel_live())
            .await;
        client
    }

    fn me(&self) -> UserId {
        self.state.identity().map(Identity::id).cloned().unwrap()
    }
}

/// Keeps both clients applying updates until `done` holds for `a`, so effects `b` still has in
/// flight reach the backend.
async fn settle_pair(a: &mut Client, b: &mut Client, done: impl Fn(&AppState) -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&a.state) {
            tokio::select! {
                Some(update) = a.updates.recv() => a.handle(update),
                Some(update) = b.updates.recv() => b.handle(update),
            }
        }
    })
    .await;
    assert!(result.is_ok(), "clients never reached the expected state");
}

#[tokio::test]
async fn a_message_reaches_the_other_side_and_comes_back_seen() {
    let backend = FakeBackend::new();
    let mut a = Client::signup(&backend, "ann").await;
    let mut b = Client::signup(&backend, "ben").await;

    let effects = a.state.access_chat(b.me());
    a.act(effects);
    a.settle(|state| state.selected().is_some() && !state.loading().history)
        .await;
    let chat: ChatId = a.state.selected_id().cloned().unwrap();

    a.state.draft = "hi".into();
    let effects = a.state.submit_draft();
    a.act(effects);
    a.settle(|state| state.messages().len() == 1).await;
    assert!(a.state.draft.is_empty());

    // b learns about the chat from the message itself
    b.settle(|state| !state.notifications().is_empty() && !state.chats().is_empty())
        .await;
    assert_eq!(b.state.notifications()[0].chat_id(), &chat);
    assert_eq!(&*b.state.notifications()[0].message.content, "hi");

    let effects = b.state.open_notification(0);
    b.act(effects);
    b.settle(|state| state.messages().len() == 1 && !state.loading().history)
        .await;
    assert!(b.state.notifications().is_empty());

    // b's read marker is applied after its history lands, so b keeps running too
    let viewer = a.me();
    settle_pair(&mut a, &mut b, |state| {
        state
            .messages()
            .iter()
            .all(|message| message.receipt(&viewer) == Some(ReceiptState::Seen))
    })
    .await;
}

#[tokio::test]
async fn pushes_for_the_open_chat_are_not_duplicated() {
    let backend = FakeBackend::new();
    let mut a = Client::signup(&backend, "ann").await;
    let b = Client::signup(&backend, "ben").await;

    let effects = a.state.access_chat(b.me());
    a.act(effects);
    a.settle(|state| state.selected().is_some() && !state.loading().history)
        .await;
    let chat = a.state.selected_id().cloned().unwrap();

    let message = backend.post_as(&b.me(), &chat, "one").unwrap();
    a.settle(|state| state.messages().contains(&message.identifier))
        .await;
    // a refresh brings the same message back from history
    let effects = a.state.refresh();
    a.act(effects);
    a.settle(|state| !state.loading().chats).await;
    backend.post_as(&b.me(), &chat, "two").unwrap();
    a.settle(|state| state.messages().len() == 2).await;
    assert!(a.state.notifications().is_empty());
}

#[tokio::test]
async fn empty_search_returns_nothing_without_asking() {
    let backend = FakeBackend::new();
    let mut a = Client::signup(&backend, "ann").await;
    let _b = Client::signup(&backend, "ben").await;

    let effects = a.state.search_users("be");
    assert_eq!(effects.len(), 1);
    a.act(effects);
    a.settle(|state| !state.search().results.is_empty()).await;
    assert_eq!(&*a.state.search().results[0].display_name, "ben");

    assert!(a.state.search_users("").is_empty());
    assert!(a.state.search().results.is_empty());
}

#[tokio::test]
async fn logging_out_closes_the_event_channel() {
    let backend = FakeBackend::new();
    let mut a = Client::signup(&backend, "ann").await;
    assert_eq!(backend.connection_count(), 1);
    assert!(a.driver.is_connected());

    let effects = a.state.logout();
    a.act(effects);
    assert!(!a.driver.is_connected());
    // the connection task unregisters when it is aborted
    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.connection_count() != 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert!(a.driver.session().load().is_none());
}

#[tokio::test]
async fn persisted_session_reconnects_on_start() {
    let backend = FakeBackend::new();
    let a = Client::signup(&backend, "ann").await;
    let stored = a.driver.session().load().unwrap();
    assert_eq!(stored.id(), &a.me());

    let (state, effects) = AppState::new(Some(stored));
    assert_eq!(
        effects,
        [Effect::Connect, Effect::FetchChats, Effect::FetchStatuses]
    );
    assert!(state.identity().is_some());
}

#[tokio::test]
async fn new_groups_show_up_for_their_members() {
    let backend = FakeBackend::new();
    let mut a = Client::signup(&backend, "ann").await;
    let mut b = Client::signup(&backend, "ben").await;

    let effects = a.state.search_users("ben");
    a.act(effects);
    a.settle(|state| !state.search().results.is_empty()).await;
    let ben = a.state.search().results[0].clone();
    a.state.add_group_member(ben);
    let effects = a.state.create_group("crew");
    a.act(effects);
    a.settle(|state| state.group_chats().count() == 1).await;

    b.settle(|state| state.group_chats().any(|chat| chat.name.as_deref() == Some("crew")))
        .await;
}
