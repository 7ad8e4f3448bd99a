use std::{borrow::Cow, collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use derivative::Derivative;
use serenity::{
    cache::Cache,
    http::{Http, HttpError},
    model::{
        channel::{
            AttachmentType, Channel, ChannelType, PermissionOverwrite, PermissionOverwriteType,
        },
        guild::Role,
        id::{ChannelId, GuildId, MessageId, RoleId, UserId},
        permissions::Permissions,
    },
};

use super::{
    Attachment, ChannelEdit, HistoryMessage, NewChannel, Overwrite, OverwriteTarget, Platform,
};

/// [`Platform`] backed by Discord's REST API, reading from the gateway cache where it can.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Discord {
    #[derivative(Debug = "ignore")]
    http: Arc<Http>,
    #[derivative(Debug = "ignore")]
    cache: Arc<Cache>,
    bot: UserId,
}

impl Discord {
    /// Wrap an authenticated HTTP client and the client's cache, looking up the bot's own user.
    pub async fn new(http: Arc<Http>, cache: Arc<Cache>) -> anyhow::Result<Self> {
        let bot = http
            .get_current_user()
            .await
            .context("failed to look up the bot user; is DISCORD_TOKEN valid?")?
            .id;
        tracing::debug!(bot_id = %bot, "resolved bot user");
        Ok(Discord { http, cache, bot })
    }
}

/// Whether `@everyone` or any of `member_roles` carries the administrator permission.
fn grants_administrator(
    guild: GuildId,
    roles: &HashMap<RoleId, Permissions>,
    member_roles: &[RoleId],
) -> bool {
    let everyone = RoleId(guild.0);
    std::iter::once(&everyone)
        .chain(member_roles)
        .filter_map(|role_id| roles.get(role_id))
        .any(|permissions| permissions.administrator())
}

fn role_permissions(roles: &HashMap<RoleId, Role>) -> HashMap<RoleId, Permissions> {
    roles
        .iter()
        .map(|(&id, role)| (id, role.permissions))
        .collect()
}

fn to_serenity(overwrite: Overwrite) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: overwrite.allow,
        deny: overwrite.deny,
        kind: overwrite_kind(overwrite.target),
    }
}

fn overwrite_kind(target: OverwriteTarget) -> PermissionOverwriteType {
    match target {
        OverwriteTarget::Role(role) => PermissionOverwriteType::Role(role),
        OverwriteTarget::User(user) => PermissionOverwriteType::Member(user),
    }
}

fn from_serenity(overwrite: PermissionOverwrite) -> Option<Overwrite> {
    #[allow(unreachable_patterns)]
    let target = match overwrite.kind {
        PermissionOverwriteType::Member(user) => OverwriteTarget::User(user),
        PermissionOverwriteType::Role(role) => OverwriteTarget::Role(role),
        _ => return None,
    };
    Some(Overwrite {
        target,
        allow: overwrite.allow,
        deny: overwrite.deny,
    })
}

fn is_not_found(error: &HttpError) -> bool {
    matches!(
        error,
        HttpError::UnsuccessfulRequest(response) if response.status_code.as_u16() == 404
    )
}

#[async_trait]
impl Platform for Discord {
    fn bot_user(&self) -> UserId {
        self.bot
    }

    async fn create_channel(
        &self,
        guild: GuildId,
        channel: NewChannel,
    ) -> anyhow::Result<ChannelId> {
        let NewChannel {
            name,
            topic,
            nsfw,
            category,
            overwrites,
        } = channel;
        let overwrites: Vec<PermissionOverwrite> =
            overwrites.into_iter().map(to_serenity).collect();

        let created = guild
            .create_channel(&self.http, |c| {
                c.name(&name)
                    .kind(ChannelType::Text)
                    .topic(&topic)
                    .nsfw(nsfw)
                    .permissions(overwrites);
                if let Some(category) = category {
                    c.category(category);
                }
                c
            })
            .await
            .with_context(|| format!("failed to create channel #{}", name))?;
        Ok(created.id)
    }

    async fn channel_exists(&self, channel: ChannelId) -> anyhow::Result<bool> {
        match self.http.get_channel(channel.0).await {
            Ok(_) => Ok(true),
            Err(serenity::Error::Http(error)) if is_not_found(&error) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> anyhow::Result<()> {
        channel
            .edit(&self.http, |c| {
                c.name(&edit.name).topic(&edit.topic).nsfw(edit.nsfw)
            })
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel: ChannelId) -> anyhow::Result<()> {
        channel.delete(&self.http).await?;
        Ok(())
    }

    async fn overwrites(&self, channel: ChannelId) -> anyhow::Result<Vec<Overwrite>> {
        match self.http.get_channel(channel.0).await? {
            Channel::Guild(guild_channel) => Ok(guild_channel
                .permission_overwrites
                .into_iter()
                .filter_map(from_serenity)
                .collect()),
            _ => Err(anyhow::anyhow!("channel {} is not a server channel", channel)),
        }
    }

    async fn upsert_overwrite(
        &self,
        channel: ChannelId,
        overwrite: Overwrite,
    ) -> anyhow::Result<()> {
        channel
            .create_permission(&self.http, &to_serenity(overwrite))
            .await?;
        Ok(())
    }

    async fn remove_overwrite(
        &self,
        channel: ChannelId,
        target: OverwriteTarget,
    ) -> anyhow::Result<()> {
        channel
            .delete_permission(&self.http, overwrite_kind(target))
            .await?;
        Ok(())
    }

    async fn send(&self, channel: ChannelId, content: &str) -> anyhow::Result<()> {
        channel.say(&self.http, content).await?;
        Ok(())
    }

    async fn send_file(
        &self,
        channel: ChannelId,
        content: &str,
        attachment: Attachment,
    ) -> anyhow::Result<()> {
        let files = vec![AttachmentType::Bytes {
            data: Cow::Owned(attachment.data),
            filename: attachment.filename,
        }];
        channel
            .send_files(&self.http, files, |m| m.content(content))
            .await?;
        Ok(())
    }

    async fn history_after(
        &self,
        channel: ChannelId,
        after: MessageId,
    ) -> anyhow::Result<Vec<HistoryMessage>> {
        let mut messages = channel
            .messages(&self.http, |retriever| retriever.after(after).limit(100))
            .await?;
        // Discord returns the newest message first, even when paging forwards
        messages.sort_by_key(|m| m.id);

        Ok(messages
            .into_iter()
            .map(|m| HistoryMessage {
                id: m.id,
                author_id: m.author.id,
                author_name: m
                    .member
                    .as_ref()
                    .and_then(|member| member.nick.clone())
                    .unwrap_or_else(|| m.author.name.clone()),
                author_is_bot: m.author.bot,
                timestamp: Utc
                    .timestamp_opt(m.timestamp.unix_timestamp(), 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                content: m.content,
            })
            .collect())
    }

    async fn is_administrator(&self, guild: GuildId, user: UserId) -> anyhow::Result<bool> {
        let cached = self
            .cache
            .guild_field(guild, |g| (g.owner_id, role_permissions(&g.roles)));
        let (owner, roles) = match cached {
            Some(cached) => cached,
            None => {
                tracing::trace!(%guild, "server not cached, fetching it");
                let fetched = self.http.get_guild(guild.0).await?;
                (fetched.owner_id, role_permissions(&fetched.roles))
            }
        };
        if owner == user {
            return Ok(true);
        }

        let member_roles = match self.cache.member_field(guild, user, |m| m.roles.clone()) {
            Some(member_roles) => member_roles,
            None => self.http.get_member(guild.0, user.0).await?.roles,
        };
        Ok(grants_administrator(guild, &roles, &member_roles))
    }

    async fn set_nickname(
        &self,
        guild: GuildId,
        user: UserId,
        nickname: Option<&str>,
    ) -> anyhow::Result<()> {
        guild
            .edit_member(&self.http, user, |m| m.nickname(nickname.unwrap_or_default()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_comes_from_everyone_or_a_member_role() {
        let guild = GuildId(1);
        let mut roles = HashMap::new();
        roles.insert(RoleId(1), Permissions::SEND_MESSAGES);
        roles.insert(RoleId(2), Permissions::MANAGE_CHANNELS);
        roles.insert(RoleId(3), Permissions::ADMINISTRATOR | Permissions::SEND_MESSAGES);

        assert!(!grants_administrator(guild, &roles, &[]));
        assert!(!grants_administrator(guild, &roles, &[RoleId(2), RoleId(42)]));
        assert!(grants_administrator(guild, &roles, &[RoleId(2), RoleId(3)]));

        roles.insert(RoleId(1), Permissions::ADMINISTRATOR);
        assert!(grants_administrator(guild, &roles, &[]));
    }
}
