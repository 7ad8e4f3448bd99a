//! An in-memory [`Platform`] for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

use super::{
    Attachment, ChannelEdit, HistoryMessage, NewChannel, Overwrite, OverwriteTarget, Platform,
};

pub const BOT: UserId = UserId(999);

#[derive(Debug, Clone)]
pub struct FakeChannel {
    pub guild: GuildId,
    pub name: String,
    pub topic: String,
    pub nsfw: bool,
    pub category: Option<ChannelId>,
    pub overwrites: Vec<Overwrite>,
}

#[derive(Debug, Default)]
pub struct State {
    next_id: u64,
    pub channels: HashMap<ChannelId, FakeChannel>,
    pub sent: Vec<(ChannelId, String)>,
    pub files: Vec<(ChannelId, String, Attachment)>,
    pub history: HashMap<ChannelId, Vec<HistoryMessage>>,
    pub admins: HashSet<UserId>,
    pub nicknames: HashMap<UserId, Option<String>>,
    /// Targets whose overwrite updates fail.
    pub failing: HashSet<OverwriteTarget>,
    /// Number of overwrite upserts and removals issued.
    pub overwrite_calls: usize,
    pub fail_channel_creation: bool,
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    pub state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let platform = FakePlatform::default();
        platform.state.lock().unwrap().next_id = 1_000;
        platform
    }

    pub fn channel(&self, id: ChannelId) -> Option<FakeChannel> {
        self.state.lock().unwrap().channels.get(&id).cloned()
    }

    pub fn overwrite_for(&self, id: ChannelId, target: OverwriteTarget) -> Option<Overwrite> {
        self.channel(id)?
            .overwrites
            .into_iter()
            .find(|o| o.target == target)
    }

    pub fn sent_to(&self, id: ChannelId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|(channel, _)| *channel == id)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn overwrite_calls(&self) -> usize {
        self.state.lock().unwrap().overwrite_calls
    }
}

fn missing(channel: ChannelId) -> anyhow::Error {
    anyhow::anyhow!("Unknown Channel {}", channel)
}

#[async_trait]
impl Platform for FakePlatform {
    fn bot_user(&self) -> UserId {
        BOT
    }

    async fn create_channel(
        &self,
        guild: GuildId,
        channel: NewChannel,
    ) -> anyhow::Result<ChannelId> {
        let mut state = self.state.lock().unwrap();
        if state.fail_channel_creation {
            anyhow::bail!("Missing Permissions");
        }
        state.next_id += 1;
        let id = ChannelId(state.next_id);
        state.channels.insert(
            id,
            FakeChannel {
                guild,
                name: channel.name,
                topic: channel.topic,
                nsfw: channel.nsfw,
                category: channel.category,
                overwrites: channel.overwrites,
            },
        );
        Ok(id)
    }

    async fn channel_exists(&self, channel: ChannelId) -> anyhow::Result<bool> {
        Ok(self.state.lock().unwrap().channels.contains_key(&channel))
    }

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let existing = state.channels.get_mut(&channel).ok_or_else(|| missing(channel))?;
        existing.name = edit.name;
        existing.topic = edit.topic;
        existing.nsfw = edit.nsfw;
        Ok(())
    }

    async fn delete_channel(&self, channel: ChannelId) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .channels
            .remove(&channel)
            .map(|_| ())
            .ok_or_else(|| missing(channel))
    }

    async fn overwrites(&self, channel: ChannelId) -> anyhow::Result<Vec<Overwrite>> {
        self.channel(channel)
            .map(|c| c.overwrites)
            .ok_or_else(|| missing(channel))
    }

    async fn upsert_overwrite(
        &self,
        channel: ChannelId,
        overwrite: Overwrite,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.overwrite_calls += 1;
        if state.failing.contains(&overwrite.target) {
            anyhow::bail!("Missing Access");
        }
        let existing = state.channels.get_mut(&channel).ok_or_else(|| missing(channel))?;
        existing.overwrites.retain(|o| o.target != overwrite.target);
        existing.overwrites.push(overwrite);
        Ok(())
    }

    async fn remove_overwrite(
        &self,
        channel: ChannelId,
        target: OverwriteTarget,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.overwrite_calls += 1;
        if state.failing.contains(&target) {
            anyhow::bail!("Missing Access");
        }
        let existing = state.channels.get_mut(&channel).ok_or_else(|| missing(channel))?;
        existing.overwrites.retain(|o| o.target != target);
        Ok(())
    }

    async fn send(&self, channel: ChannelId, content: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .sent
            .push((channel, content.to_string()));
        Ok(())
    }

    async fn send_file(
        &self,
        channel: ChannelId,
        content: &str,
        attachment: Attachment,
    ) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .files
            .push((channel, content.to_string(), attachment));
        Ok(())
    }

    async fn history_after(
        &self,
        channel: ChannelId,
        after: MessageId,
    ) -> anyhow::Result<Vec<HistoryMessage>> {
        let state = self.state.lock().unwrap();
        let mut page: Vec<HistoryMessage> = state
            .history
            .get(&channel)
            .into_iter()
            .flatten()
            .filter(|m| m.id > after)
            .cloned()
            .collect();
        page.sort_by_key(|m| m.id);
        page.truncate(2);
        Ok(page)
    }

    async fn is_administrator(&self, _guild: GuildId, user: UserId) -> anyhow::Result<bool> {
        Ok(self.state.lock().unwrap().admins.contains(&user))
    }

    async fn set_nickname(
        &self,
        _guild: GuildId,
        user: UserId,
        nickname: Option<&str>,
    ) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .nicknames
            .insert(user, nickname.map(str::to_string));
        Ok(())
    }
}
