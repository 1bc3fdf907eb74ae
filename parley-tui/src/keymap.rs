use std::{
    cmp,
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crossterm::event::KeyModifiers;

use crate::error::TuiError;

// resolving a key event needs the mode's keymap and the keys already buffered for a multi-key
// sequence. when a sequence times out, its keys are passed through (so typing a prefix of a
// binding in the composer is not lost), which is why expiry is checked on every tick and not
// only when the next key arrives

pub fn parse_key_sequence(input: &str) -> Result<Vec<KeyEvent>, nom::error::Error<&str>> {
    use nom::Finish;
    nom::multi::many1(parse_key)(input).finish().map(|(_, k)| k)
}

fn parse_key(input: &str) -> nom::IResult<&str, KeyEvent> {
    use nom::{
        branch::alt,
        bytes::complete::tag,
        character::complete::one_of,
        combinator::map,
        sequence::{delimited, separated_pair},
    };

    let key = alt((KeyCode::parse_char, KeyCode::parse_special));
    let modifiers = nom::multi::fold_many1(
        map(one_of("ACMS"), |c| match c {
            'A' => KeyModifiers::ALT,
            'C' => KeyModifiers::CONTROL,
            'M' => KeyModifiers::META,
            _ => KeyModifiers::SHIFT,
        }),
        KeyModifiers::empty,
        KeyModifiers::union,
    );

    let bracketed = alt((
        map(
            separated_pair(modifiers, tag("-"), key),
            |(modifiers, code)| KeyEvent { modifiers, code },
        ),
        map(KeyCode::parse_special, KeyEvent::from),
    ));
    alt((
        delimited(tag("<"), bracketed, tag(">")),
        map(KeyCode::parse_char, KeyEvent::from),
    ))(input)
}

#[derive(Clone, Copy, Debug, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    /// The character this key types, if it types one.
    pub fn typed_char(&self) -> Option<char> {
        match self.code {
            KeyCode::Char(c)
                if !self
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                Some(c)
            }
            _ => None,
        }
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::empty(),
        }
    }
}

impl From<crossterm::event::KeyEvent> for KeyEvent {
    fn from(event: crossterm::event::KeyEvent) -> Self {
        let code = KeyCode::from(event.code);
        let mut modifiers = event.modifiers;
        // the shift is already part of the character
        if let KeyCode::Char(_) = code {
            modifiers.remove(KeyModifiers::SHIFT);
        }
        Self { code, modifiers }
    }
}

// manually impl `Ord` since `KeyModifiers` isn't `Ord`
// https://github.com/crossterm-rs/crossterm/pull/951
impl Ord for KeyEvent {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.code
            .cmp(&other.code)
            .then(self.modifiers.bits().cmp(&other.modifiers.bits()))
    }
}

impl PartialOrd for KeyEvent {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == cmp::Ordering::Equal
    }
}

// Our own version of `crossterm::event::KeyCode`
// https://github.com/crossterm-rs/crossterm/pull/951
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum KeyCode {
    Char(char),
    Backspace,
    Delete,
    Enter,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Tab,
    BackTab,
    Insert,
    Escape,
    F(u8),
    Unknown,
}

impl KeyCode {
    /// Any visible character except `<`, which opens a bracketed key.
    fn parse_char(input: &str) -> nom::IResult<&str, Self> {
        nom::combinator::map(
            nom::character::complete::satisfy(|c| {
                c != '<' && (nom_unicode::is_alphanumeric(c) || c.is_ascii_punctuation())
            }),
            Self::Char,
        )(input)
    }

    fn parse_special(input: &str) -> nom::IResult<&str, Self> {
        use nom::{
            bytes::complete::tag,
            combinator::{map, value},
        };
        nom::branch::alt((
            value(Self::Backspace, tag("BS")),
            value(Self::Delete, tag("Del")),
            value(Self::Enter, tag("CR")),
            value(Self::Left, tag("Left")),
            value(Self::Right, tag("Right")),
            value(Self::Up, tag("Up")),
            value(Self::Down, tag("Down")),
            value(Self::Home, tag("Home")),
            value(Self::End, tag("End")),
            value(Self::PageUp, tag("PageUp")),
            value(Self::PageDown, tag("PageDown")),
            value(Self::BackTab, tag("BackTab")),
            value(Self::Tab, tag("Tab")),
            value(Self::Insert, tag("Ins")),
            value(Self::Escape, tag("Esc")),
            value(Self::Char(' '), tag("Space")),
            value(Self::Char('<'), tag("lt")),
            map(nom::character::complete::u8, Self::F),
        ))(input)
    }
}

impl From<crossterm::event::KeyCode> for KeyCode {
    fn from(code: crossterm::event::KeyCode) -> Self {
        use crossterm::event::KeyCode as Kc;
        match code {
            Kc::Char(c) => Self::Char(c),
            Kc::Backspace => Self::Backspace,
            Kc::Delete => Self::Delete,
            Kc::Enter => Self::Enter,
            Kc::Left => Self::Left,
            Kc::Right => Self::Right,
            Kc::Up => Self::Up,
            Kc::Down => Self::Down,
            Kc::Home => Self::Home,
            Kc::End => Self::End,
            Kc::PageUp => Self::PageUp,
            Kc::PageDown => Self::PageDown,
            Kc::Tab => Self::Tab,
            Kc::BackTab => Self::BackTab,
            Kc::Insert => Self::Insert,
            Kc::Esc => Self::Escape,
            Kc::F(n) => Self::F(n),
            _ => Self::Unknown,
        }
    }
}

/// What a key press resolved to.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution<A> {
    /// Keys that are not part of any binding, in the order they were pressed.
    pub passthru: Vec<KeyEvent>,
    pub action: Option<A>,
}

#[derive(Clone, Debug)]
pub struct Keymap<A> {
    pub keys: BTreeMap<Vec<KeyEvent>, A>,
    pub timeout: Duration,
    buffer: Vec<KeyEvent>,
    deadline: Option<Instant>,
}

impl<A: Clone> Keymap<A> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            keys: BTreeMap::new(),
            timeout,
            buffer: Vec::new(),
            deadline: None,
        }
    }

    /// Builds a keymap from `(key sequence, action)` pairs in the `<C-x>` notation.
    pub fn with_bindings<'a>(
        timeout: Duration,
        bindings: impl IntoIterator<Item = (&'a str, A)>,
    ) -> Result<Self, TuiError> {
        let mut keymap = Self::new(timeout);
        for (sequence, action) in bindings {
            let keys = parse_key_sequence(sequence)
                .map_err(|err| TuiError::KeySequence(sequence.to_owned(), err.to_string()))?;
            keymap.keys.insert(keys, action);
        }
        Ok(keymap)
    }

    pub fn push(&mut self, event: KeyEvent, now: Instant) -> Resolution<A> {
        self.buffer.push(event);
        let (skipped, action) = (0..self.buffer.len())
            .find_map(|i| self.get(&self.buffer[i..]).map(|action| (i, action)))
            .unwrap_or((self.buffer.len(), None));
        let passthru = self.buffer.drain(..skipped).collect();
        if action.is_some() {
            self.buffer.clear();
        }
        self.deadline = (!self.buffer.is_empty()).then(|| now + self.timeout);
        Resolution { passthru, action }
    }

    /// Releases a pending sequence whose time is up.
    pub fn expire(&mut self, now: Instant) -> Vec<KeyEvent> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                std::mem::take(&mut self.buffer)
            }
            _ => Vec::new(),
        }
    }

    /// Keys typed so far of an unfinished sequence.
    pub fn pending(&self) -> &[KeyEvent] {
        &self.buffer
    }

    fn entries_with_prefix<'s, 'p>(
        &'s self,
        prefix: &'p [KeyEvent],
    ) -> impl Iterator<Item = (&'s Vec<KeyEvent>, &'s A)> + use<'s, 'p, A> {
        use std::ops::Bound;

        self.keys
            .range::<[_], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    /// Finds the action corresponding to the provided key sequence.
    ///
    /// ## Return values
    /// - `Some(Some(action))`: the key sequence is mapped to the action
    /// - `Some(None)`: the key sequence is a prefix to at least one action
    /// - `None`: the key sequence is not a prefix to any action
    fn get(&self, keys: &[KeyEvent]) -> Option<Option<A>> {
        self.entries_with_prefix(keys)
            .next()
            .map(|(k, v)| (k == keys).then_some(v.clone()))
    }
}
