use chrono::{TimeZone, Utc};
use serenity::{
    async_trait,
    client::{Context, EventHandler},
    model::{channel::Message, gateway::Ready, id::GuildId},
};

use crate::action::{Action, ActionQueue, IncomingMessage};

pub struct Handler {
    /// What chat commands start with.
    prefix: String,
}

impl Handler {
    pub fn new(prefix: String) -> Self {
        Handler { prefix }
    }

    fn action(&self, message: Message) -> Option<Action> {
        let server = message.guild_id?;
        let incoming = IncomingMessage {
            id: message.id,
            server,
            channel: message.channel_id,
            author: message.author.id,
            author_name: message
                .member
                .as_ref()
                .and_then(|member| member.nick.clone())
                .unwrap_or_else(|| message.author.name.clone()),
            timestamp: Utc
                .timestamp_opt(message.timestamp.unix_timestamp(), 0)
                .single()
                .unwrap_or_else(Utc::now),
            content: message.content,
        };

        Action::from_message(&self.prefix, incoming)
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, message: Message) {
        // Don't trigger on messages we ourselves send, other bots' messages, or direct messages
        if message.author.bot || message.author.id == ctx.cache.current_user_id() {
            tracing::trace!("ignoring message from a bot");
            return;
        }
        let Some(action) = self.action(message) else {
            tracing::trace!("ignoring direct message or foreign command");
            return;
        };

        // Send the message to the queue, to be processed asynchronously
        tracing::trace!(?action, "sending action to worker queue");
        let queue = ctx.data.read().await.get::<ActionQueue>().cloned();
        match queue {
            Some(queue) => {
                if let Err(error) = queue.send(action).await {
                    tracing::error!(error = ?error, "worker queue is closed");
                }
            }
            None => tracing::error!("action queue missing from the client data"),
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            servers = ready.guilds.len(),
            "connected to discord"
        );
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        for guild_id in guilds {
            let server_name = guild_id
                .name(&ctx.cache)
                .unwrap_or_else(|| "[unknown]".to_string());
            tracing::info!(
                ?server_name,
                server_id = ?guild_id.to_string(),
                "connected to server"
            );
        }
    }
}
