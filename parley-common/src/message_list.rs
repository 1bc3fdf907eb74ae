use std::{
    collections::{BTreeMap, HashMap},
    ops::RangeBounds,
};

use crate::{Message, MessageId, MessageKey, UserId};

/// Messages of one conversation, ordered by timestamp and unique by id.
#[derive(Clone, Debug, Default)]
pub struct MessageList {
    messages: BTreeMap<MessageKey, Message>,
    keys: HashMap<MessageId, MessageKey>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a message. A message with a known id replaces the old copy even if
    /// its timestamp changed, so a push echo of a message we already hold never renders twice.
    pub fn insert(&mut self, message: Message) -> Option<Message> {
        let key = message.key();
        let previous = self
            .keys
            .insert(message.identifier.clone(), key.clone())
            .and_then(|old_key| self.messages.remove(&old_key));
        self.messages.insert(key, message);
        previous
    }

    /// Replaces the whole list, e.g. with a freshly fetched history.
    pub fn replace_all(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.clear();
        for message in messages {
            self.insert(message);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.keys.clear();
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.keys.get(id).and_then(|key| self.messages.get(key))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.values()
    }

    pub fn range<R: RangeBounds<MessageKey>>(
        &self,
        range: R,
    ) -> impl DoubleEndedIterator<Item = &Message> {
        self.messages.range(range).map(|(_, message)| message)
    }

    /// Records that `reader` has read every message not sent by them. Returns how many
    /// messages changed.
    pub fn mark_read_by(&mut self, reader: &UserId) -> usize {
        self.messages
            .values_mut()
            .filter(|message| !message.is_from(reader))
            .map(|message| message.mark_read_by(reader))
            .filter(|&changed| changed)
            .count()
    }
}
