use parley_common::{Conversation, User};
use rand::prelude::{Rng, SliceRandom};

use crate::FakeBackend;

const MIN_MESSAGE_WORDS: usize = 1;
const MAX_MESSAGE_WORDS: usize = 15;
const MAX_PAUSE_MILLIS: u64 = 8000;

enum Move {
    Say { chat: Conversation, sender: User, text: String },
    Read { chat: Conversation, reader: User },
}

/// Keeps the bots talking in their chats and reading what others wrote. Runs until its task is
/// aborted.
pub async fn chatter(backend: FakeBackend) {
    let bots = backend.bots();
    if bots.is_empty() {
        return;
    }
    loop {
        let (next, millis) = generate_move(&backend, &bots);
        match next {
            Some(Move::Say { chat, sender, text }) => {
                if let Err(err) = backend.post_as(&sender.identifier, &chat.identifier, &text) {
                    tracing::debug!("bot message rejected: {err}");
                }
            }
            Some(Move::Read { chat, reader }) => {
                if let Err(err) = backend.read_as(&reader.identifier, &chat.identifier) {
                    tracing::debug!("bot read rejected: {err}");
                }
            }
            None => {}
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(millis)).await;
    }
}

fn generate_move(backend: &FakeBackend, bots: &[User]) -> (Option<Move>, u64) {
    let mut rng = rand::thread_rng();
    let millis = rng.gen_range(500..MAX_PAUSE_MILLIS);
    let Some(bot) = bots.choose(&mut rng) else {
        return (None, millis);
    };
    let chats = backend.chats_of(&bot.identifier);
    let Some(chat) = chats.choose(&mut rng).cloned() else {
        return (None, millis);
    };
    let next = if rng.gen_bool(0.3) {
        Move::Read {
            chat,
            reader: bot.clone(),
        }
    } else {
        let words = rng.gen_range(MIN_MESSAGE_WORDS..=MAX_MESSAGE_WORDS);
        Move::Say {
            chat,
            sender: bot.clone(),
            text: lipsum::lipsum_words_with_rng(&mut rng, words),
        }
    };
    (Some(next), millis)
}
