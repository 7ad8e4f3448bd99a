//! The slice of the Discord API the bot depends on.
//!
//! Services talk to Discord through the [`Platform`] trait so that the channel and roleplay
//! logic can be exercised without a gateway connection. [`Discord`] is the real implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::{
    id::{ChannelId, GuildId, MessageId, RoleId, UserId},
    permissions::Permissions,
};

mod discord;
pub use discord::Discord;

#[cfg(test)]
pub mod fake;

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverwriteTarget {
    Role(RoleId),
    User(UserId),
}

/// A channel permission overwrite: bits explicitly allowed and denied for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// A text channel to be created.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub topic: String,
    pub nsfw: bool,
    pub category: Option<ChannelId>,
    pub overwrites: Vec<Overwrite>,
}

/// Settings pushed to an existing channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEdit {
    pub name: String,
    pub topic: String,
    pub nsfw: bool,
}

/// A message read back from a channel's history.
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A file uploaded alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user.
    fn bot_user(&self) -> UserId;

    async fn create_channel(&self, guild: GuildId, channel: NewChannel)
        -> anyhow::Result<ChannelId>;

    /// Whether the channel still exists. Errors other than "not found" are returned.
    async fn channel_exists(&self, channel: ChannelId) -> anyhow::Result<bool>;

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> anyhow::Result<()>;

    async fn delete_channel(&self, channel: ChannelId) -> anyhow::Result<()>;

    /// The permission overwrites currently set on a channel.
    async fn overwrites(&self, channel: ChannelId) -> anyhow::Result<Vec<Overwrite>>;

    /// Create or replace the overwrite for `overwrite.target`.
    async fn upsert_overwrite(&self, channel: ChannelId, overwrite: Overwrite)
        -> anyhow::Result<()>;

    async fn remove_overwrite(&self, channel: ChannelId, target: OverwriteTarget)
        -> anyhow::Result<()>;

    async fn send(&self, channel: ChannelId, content: &str) -> anyhow::Result<()>;

    async fn send_file(
        &self,
        channel: ChannelId,
        content: &str,
        attachment: Attachment,
    ) -> anyhow::Result<()>;

    /// One page of messages posted after `after`, oldest first. Empty once caught up.
    async fn history_after(
        &self,
        channel: ChannelId,
        after: MessageId,
    ) -> anyhow::Result<Vec<HistoryMessage>>;

    /// Whether the user owns the server or holds the administrator permission on it.
    async fn is_administrator(&self, guild: GuildId, user: UserId) -> anyhow::Result<bool>;

    /// Set a member's server nickname; `None` resets it.
    async fn set_nickname(
        &self,
        guild: GuildId,
        user: UserId,
        nickname: Option<&str>,
    ) -> anyhow::Result<()>;
}
