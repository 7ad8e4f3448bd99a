use chrono::{DateTime, Utc};
use serenity::{
    model::id::{ChannelId, GuildId, MessageId, UserId},
    prelude::TypeMapKey,
};
use tokio::sync::mpsc;

use crate::{
    commands::{self, ChatCommand, Invocation, Parsed},
    platform::HistoryMessage,
};

/// `TypeMap` key for the action queue.
pub struct ActionQueue;

/// Associate the `ActionQueue` key with an `mpsc::Sender` for `Action`s in the `TypeMap`.
impl TypeMapKey for ActionQueue {
    type Value = mpsc::Sender<Action>;
}

/// The parts of a server message the worker needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub server: GuildId,
    pub channel: ChannelId,
    pub author: UserId,
    /// The author's server nickname, or their user name.
    pub author_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn invocation(&self) -> Invocation {
        Invocation {
            server: self.server,
            channel: self.channel,
            author: self.author,
        }
    }

    pub fn to_history(&self) -> HistoryMessage {
        HistoryMessage {
            id: self.id,
            author_id: self.author,
            author_name: self.author_name.clone(),
            author_is_bot: false,
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Work for the worker, queued by the event handler.
#[derive(Debug, Clone)]
pub enum Action {
    /// Run a chat command and reply with the outcome.
    Command {
        message: IncomingMessage,
        command: Box<ChatCommand>,
    },
    /// Reply with usage or help text.
    Usage {
        message: IncomingMessage,
        text: String,
    },
    /// Log the message if it was posted in a running roleplay.
    Record { message: IncomingMessage },
}

impl Action {
    /// Decide what to do with a server message.
    ///
    /// Returns `None` for messages that start with `prefix` without naming one of our commands:
    /// those belong to someone else and are neither answered nor logged.
    pub fn from_message(prefix: &str, message: IncomingMessage) -> Option<Self> {
        Some(match commands::parse(prefix, &message.content) {
            Parsed::Command(command) => Action::Command { message, command },
            Parsed::Usage(text) => Action::Usage { message, text },
            Parsed::Ignored => Action::Record { message },
            Parsed::Foreign => return None,
        })
    }
}
