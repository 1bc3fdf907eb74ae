use std::time::{Duration, Instant};

use parley_client::{AppState, Driver, Effect, ToastLevel, Update};
use parley_common::{ChatId, Conversation, StatusViewer};

use crate::{
    command::{Command, CommandError},
    error::TuiError,
    keymap::{KeyEvent, KeyCode, Keymap},
};

const SEQUENCE_TIMEOUT: Duration = Duration::from_millis(600);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Quit,
    Up,
    Down,
    First,
    Last,
    Open,
    Back,
    NextTab,
    PrevTab,
    Insert,
    Command,
    Search,
    Submit,
    Backspace,
    Notifications,
    Statuses,
    GroupInfo,
    AddMember,
    Refresh,
    Help,
    NextStatus,
    PrevStatus,
}

const NORMAL_KEYS: &[(&str, Action)] = &[
    ("q", Action::Quit),
    ("<C-c>", Action::Quit),
    ("k", Action::Up),
    ("<Up>", Action::Up),
    ("j", Action::Down),
    ("<Down>", Action::Down),
    ("gg", Action::First),
    ("G", Action::Last),
    ("<CR>", Action::Open),
    ("<Esc>", Action::Back),
    ("<Tab>", Action::NextTab),
    ("<BackTab>", Action::PrevTab),
    ("i", Action::Insert),
    (":", Action::Command),
    ("/", Action::Search),
    ("n", Action::Notifications),
    ("s", Action::Statuses),
    ("gi", Action::GroupInfo),
    ("a", Action::AddMember),
    ("r", Action::Refresh),
    ("?", Action::Help),
    ("l", Action::NextStatus),
    ("<Right>", Action::NextStatus),
    ("h", Action::PrevStatus),
    ("<Left>", Action::PrevStatus),
];

const LINE_KEYS: &[(&str, Action)] = &[
    ("<Esc>", Action::Back),
    ("<CR>", Action::Submit),
    ("<BS>", Action::Backspace),
    ("<C-c>", Action::Quit),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Normal,
    /// Typing into the composer.
    Insert,
    /// Typing a `:` command.
    Command,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Tab {
    #[default]
    Chats,
    Groups,
    Communities,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Chats, Tab::Groups, Tab::Communities];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Chats => "Chats",
            Tab::Groups => "Groups",
            Tab::Communities => "Communities",
        }
    }

    fn index(self) -> usize {
        match self {
            Tab::Chats => 0,
            Tab::Groups => 1,
            Tab::Communities => 2,
        }
    }

    fn step(self, forward: bool) -> Self {
        let len = Self::ALL.len();
        let index = if forward {
            (self.index() + 1) % len
        } else {
            (self.index() + len - 1) % len
        };
        Self::ALL[index]
    }
}

#[derive(Clone, Debug)]
pub enum Popup {
    Notifications,
    Search,
    GroupInfo,
    Statuses,
    Viewer(StatusViewer),
    Help,
}

pub struct App {
    pub state: AppState,
    driver: Driver,
    pub mode: Mode,
    pub tab: Tab,
    /// Row highlighted in the chat list or the open popup.
    pub cursor: usize,
    pub popup: Option<Popup>,
    pub command_line: String,
    normal: Keymap<Action>,
    line: Keymap<Action>,
    quit: bool,
}

impl App {
    pub fn new(state: AppState, driver: Driver, effects: Vec<Effect>) -> Result<Self, TuiError> {
        let mut app = Self {
            state,
            driver,
            mode: Mode::Normal,
            tab: Tab::default(),
            cursor: 0,
            popup: None,
            command_line: String::new(),
            normal: Keymap::with_bindings(SEQUENCE_TIMEOUT, NORMAL_KEYS.iter().copied())?,
            line: Keymap::with_bindings(SEQUENCE_TIMEOUT, LINE_KEYS.iter().copied())?,
            quit: false,
        };
        app.run(effects);
        Ok(app)
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    fn run(&mut self, effects: Vec<Effect>) {
        let identity = self.state.identity().cloned();
        self.driver.run_all(effects, identity.as_ref());
    }

    pub fn apply(&mut self, update: Update) {
        let effects = self.state.apply(update);
        self.run(effects);
        self.clamp_cursor();
    }

    pub fn tick(&mut self, now: Instant) {
        self.state.expire_toasts(now);
        let expired = match self.mode {
            Mode::Normal => self.normal.expire(now),
            Mode::Insert | Mode::Command => self.line.expire(now),
        };
        self.type_keys(&expired);
        if let Some(Popup::Viewer(viewer)) = &mut self.popup {
            viewer.tick();
            if !viewer.is_open() {
                self.popup = Some(Popup::Statuses);
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        let resolution = match self.mode {
            Mode::Normal => self.normal.push(key, now),
            Mode::Insert | Mode::Command => self.line.push(key, now),
        };
        self.type_keys(&resolution.passthru);
        if let Some(action) = resolution.action {
            self.perform(action);
        }
    }

    /// Unbound keys type into whichever line is being edited.
    fn type_keys(&mut self, keys: &[KeyEvent]) {
        let line = match self.mode {
            Mode::Normal => return,
            Mode::Insert => &mut self.state.draft,
            Mode::Command => &mut self.command_line,
        };
        for key in keys {
            if let Some(c) = key.typed_char() {
                line.push(c);
            } else if key.code != KeyCode::Unknown {
                tracing::trace!(?key, "ignoring key");
            }
        }
    }

    /// Rows of the list the cursor moves in.
    fn row_count(&self) -> usize {
        match &self.popup {
            Some(Popup::Notifications) => self.state.notifications().len(),
            Some(Popup::Search) => self.state.search().results.len(),
            Some(Popup::Statuses) => self.state.status_board().groups().count(),
            Some(Popup::GroupInfo | Popup::Viewer(_) | Popup::Help) => 0,
            None => self.visible_chats().len(),
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.row_count().saturating_sub(1));
    }

    pub fn visible_chats(&self) -> Vec<&Conversation> {
        match self.tab {
            Tab::Chats => self.state.chats().iter().collect(),
            Tab::Groups => self.state.group_chats().collect(),
            Tab::Communities => self.state.communities().iter().collect(),
        }
    }

    fn open_popup(&mut self, popup: Popup) {
        self.popup = Some(popup);
        self.cursor = 0;
    }

    fn close_popup(&mut self) {
        self.popup = None;
        self.cursor = self
            .state
            .selected_id()
            .and_then(|id| self.visible_chats().iter().position(|c| &c.identifier == id))
            .unwrap_or(0);
    }

    fn perform(&mut self, action: Action) {
        match self.mode {
            Mode::Normal => self.perform_normal(action),
            Mode::Insert => match action {
                Action::Back => self.mode = Mode::Normal,
                Action::Submit => {
                    let effects = self.state.submit_draft();
                    self.run(effects);
                }
                Action::Backspace => {
                    self.state.draft.pop();
                }
                Action::Quit => self.quit = true,
                _ => {}
            },
            Mode::Command => match action {
                Action::Back => {
                    self.command_line.clear();
                    self.mode = Mode::Normal;
                }
                Action::Submit => {
                    let line = std::mem::take(&mut self.command_line);
                    self.mode = Mode::Normal;
                    if !line.trim().is_empty() {
                        self.execute_line(&line);
                    }
                }
                Action::Backspace => {
                    if self.command_line.pop().is_none() {
                        self.mode = Mode::Normal;
                    }
                }
                Action::Quit => self.quit = true,
                _ => {}
            },
        }
    }

    fn perform_normal(&mut self, action: Action) {
        match action {
            Action::Quit => self.quit = true,
            Action::Up => self.cursor = self.cursor.saturating_sub(1),
            Action::Down => {
                self.cursor = (self.cursor + 1).min(self.row_count().saturating_sub(1));
            }
            Action::First => self.cursor = 0,
            Action::Last => self.cursor = self.row_count().saturating_sub(1),
            Action::Open => self.open_at_cursor(),
            Action::Back => match self.popup {
                Some(Popup::Viewer(_)) => self.popup = Some(Popup::Statuses),
                Some(_) => self.close_popup(),
                None => self.state.close_chat(),
            },
            Action::NextTab | Action::PrevTab if self.popup.is_none() => {
                self.tab = self.tab.step(action == Action::NextTab);
                self.cursor = 0;
                if self.tab == Tab::Communities {
                    let effects = self.state.load_communities();
                    self.run(effects);
                }
            }
            Action::Insert => {
                if self.state.selected_id().is_some() {
                    self.popup = None;
                    self.mode = Mode::Insert;
                } else {
                    self.state.toast(ToastLevel::Info, "Open a conversation first");
                }
            }
            Action::Command => self.mode = Mode::Command,
            Action::Search => {
                self.command_line = "search ".to_owned();
                self.mode = Mode::Command;
            }
            Action::Notifications => self.open_popup(Popup::Notifications),
            Action::Statuses => self.open_popup(Popup::Statuses),
            Action::GroupInfo => {
                if self.state.selected().is_some_and(|chat| chat.is_group) {
                    self.open_popup(Popup::GroupInfo);
                }
            }
            Action::AddMember => {
                if let Some(Popup::Search) = self.popup {
                    if let Some(user) = self.state.search().results.get(self.cursor).cloned() {
                        self.state.add_group_member(user);
                        let count = self.state.group_members().len();
                        self.state.toast(
                            ToastLevel::Info,
                            format!("{count} selected, :group <name> creates the group"),
                        );
                    }
                }
            }
            Action::Refresh => {
                let effects = self.state.refresh();
                self.run(effects);
            }
            Action::Help => self.open_popup(Popup::Help),
            Action::NextStatus | Action::PrevStatus => {
                if let Some(Popup::Viewer(viewer)) = &mut self.popup {
                    if action == Action::NextStatus {
                        viewer.next();
                    } else {
                        viewer.prev();
                    }
                    if !viewer.is_open() {
                        self.popup = Some(Popup::Statuses);
                    }
                }
            }
            _ => {}
        }
    }

    fn open_at_cursor(&mut self) {
        let effects = match self.popup {
            Some(Popup::Notifications) => {
                let effects = self.state.open_notification(self.cursor);
                self.close_popup();
                effects
            }
            Some(Popup::Search) => {
                let Some(user) = self.state.search().results.get(self.cursor) else {
                    return;
                };
                let user = user.identifier.clone();
                self.close_popup();
                self.state.access_chat(user)
            }
            Some(Popup::Statuses) => {
                let items = self
                    .state
                    .status_board()
                    .groups()
                    .nth(self.cursor)
                    .map(|group| group.items.clone())
                    .unwrap_or_default();
                let viewer = StatusViewer::new(items);
                if viewer.is_open() {
                    self.popup = Some(Popup::Viewer(viewer));
                }
                return;
            }
            Some(Popup::GroupInfo | Popup::Help | Popup::Viewer(_)) => {
                self.close_popup();
                return;
            }
            None => {
                let chat: Option<ChatId> = self
                    .visible_chats()
                    .get(self.cursor)
                    .map(|chat| chat.identifier.clone());
                match chat {
                    Some(chat) => self.state.select_chat(chat),
                    None => return,
                }
            }
        };
        self.run(effects);
    }

    fn execute_line(&mut self, line: &str) {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command),
            Err(err @ CommandError::Unknown(_)) => {
                self.state.toast(ToastLevel::Error, err.to_string())
            }
            Err(err) => self.state.toast(ToastLevel::Warning, err.to_string()),
        }
    }

    pub fn execute(&mut self, command: Command) {
        tracing::debug!(?command, "command");
        let effects = match command {
            Command::Login { email, password } => self.state.login(&email, &password),
            Command::Signup {
                name,
                email,
                password,
                picture,
            } => self.state.signup(&name, &email, &password, picture),
            Command::Logout => {
                self.popup = None;
                self.tab = Tab::Chats;
                self.cursor = 0;
                self.state.logout()
            }
            Command::Profile { name, picture } => self.state.update_profile(&name, picture),
            Command::Search(query) => {
                self.open_popup(Popup::Search);
                self.state.search_users(&query)
            }
            Command::Group(name) => self.state.create_group(&name),
            Command::Leave => self.state.exit_group(),
            Command::Delete => self.state.delete_chat(),
            Command::Communities => {
                self.tab = Tab::Communities;
                self.cursor = 0;
                self.state.load_communities()
            }
            Command::Community {
                name,
                description,
                image,
            } => self.state.create_community(&name, &description, &image),
            Command::Status { media_url, caption } => self.state.post_status(&media_url, &caption),
            Command::Attach(path) => self.state.attach(path),
            Command::Notifications => {
                self.open_popup(Popup::Notifications);
                Vec::new()
            }
            Command::Statuses => {
                self.open_popup(Popup::Statuses);
                Vec::new()
            }
            Command::Refresh => self.state.refresh(),
            Command::Help => {
                self.open_popup(Popup::Help);
                Vec::new()
            }
            Command::Quit => {
                self.quit = true;
                Vec::new()
            }
        };
        self.run(effects);
    }

    pub fn pending_keys(&self) -> &[KeyEvent] {
        match self.mode {
            Mode::Normal => self.normal.pending(),
            Mode::Insert | Mode::Command => self.line.pending(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_client::SessionStore;
    use parley_fake_backend::{FakeBackend, DEMO_EMAIL, DEMO_PASSWORD};
    use tokio::sync::mpsc;

    use super::*;
    use crate::keymap::parse_key_sequence;

    fn app(dir: &tempfile::TempDir) -> (App, mpsc::UnboundedReceiver<Update>) {
        let backend = FakeBackend::demo();
        let (driver, updates) = Driver::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(backend),
            SessionStore::new(dir.path().join("session.json")),
        );
        let (state, effects) = AppState::new(None);
        (App::new(state, driver, effects).unwrap(), updates)
    }

    fn type_keys(app: &mut App, keys: &str) {
        let now = Instant::now();
        for key in parse_key_sequence(keys).unwrap() {
            app.handle_key(key, now);
        }
    }

    async fn settle(
        app: &mut App,
        updates: &mut mpsc::UnboundedReceiver<Update>,
        done: impl Fn(&App) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(app) {
                let update = updates.recv().await.unwrap();
                app.apply(update);
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn command_line_logs_in_and_composer_sends() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, mut updates) = app(&dir);

        type_keys(&mut app, ":");
        assert_eq!(app.mode, Mode::Command);
        for c in format!("login {DEMO_EMAIL} {DEMO_PASSWORD}").chars() {
            app.handle_key(KeyCode::Char(c).into(), Instant::now());
        }
        type_keys(&mut app, "<CR>");
        assert_eq!(app.mode, Mode::Normal);
        settle(&mut app, &mut updates, |app| !app.state.chats().is_empty()).await;

        type_keys(&mut app, "G<CR>");
        settle(&mut app, &mut updates, |app| {
            app.state.selected().is_some() && !app.state.loading().history
        })
        .await;
        let before = app.state.messages().len();

        type_keys(&mut app, "ihey<Space>there<BS><CR><Esc>");
        assert_eq!(app.mode, Mode::Normal);
        assert!(app.state.draft.is_empty());
        settle(&mut app, &mut updates, |app| app.state.messages().len() == before + 1).await;
        assert!(app
            .state
            .messages()
            .iter()
            .any(|message| &*message.content == "hey ther"));
    }

    #[tokio::test]
    async fn bad_commands_raise_a_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _updates) = app(&dir);
        type_keys(&mut app, ":fly<CR>");
        let toast = app.state.toasts().last().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert_eq!(toast.text, "unknown command: fly");
    }

    #[tokio::test]
    async fn insert_mode_needs_an_open_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _updates) = app(&dir);
        type_keys(&mut app, "i");
        assert_eq!(app.mode, Mode::Normal);
    }

    #[test]
    fn tabs_wrap_around() {
        assert_eq!(Tab::Chats.step(false), Tab::Communities);
        assert_eq!(Tab::Communities.step(true), Tab::Chats);
    }
}
