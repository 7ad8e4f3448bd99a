//! Roleplay lifecycle: creation, membership, start and stop, logging and archival.
//!
//! Every mutation is saved first and then pushed to the dedicated channel, best-effort. A
//! channel that is out of date is fixed by the next reconciliation (or `rp refresh`).

use std::{collections::HashSet, sync::Arc};

use async_stream::try_stream;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serenity::{
    model::id::{ChannelId, GuildId, MessageId, UserId},
    prelude::Mentionable,
};

use crate::{
    channels::{DedicatedChannels, Reconciliation},
    model::{NewRoleplay, Participant, ParticipantStatus, Roleplay, RoleplayMessage},
    platform::{HistoryMessage, Platform},
    store::{RoleplayUpdate, Store},
    transcript, Error, Result,
};

/// Longest accepted roleplay name.
pub const MAX_NAME_LENGTH: usize = 80;

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid("Roleplay names can't be empty."));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::invalid(format!(
            "Roleplay names can be at most {} characters long.",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct Roleplays {
    store: Store,
    platform: Arc<dyn Platform>,
    channels: DedicatedChannels,
}

impl Roleplays {
    pub fn new(store: Store, platform: Arc<dyn Platform>, channels: DedicatedChannels) -> Self {
        Roleplays {
            store,
            platform,
            channels,
        }
    }

    /// Look up a roleplay by name.
    pub async fn get(&self, server: GuildId, name: &str) -> Result<Roleplay> {
        self.store
            .roleplay_by_name(server, name.trim())
            .await?
            .ok_or_else(|| Error::not_found(format!("No roleplay named \"{}\" exists.", name)))
    }

    /// The roleplay played in `channel`, if it is a dedicated channel.
    pub async fn in_channel(&self, channel: ChannelId) -> Result<Option<Roleplay>> {
        Ok(self.store.roleplay_by_channel(channel).await?)
    }

    pub async fn list(&self, server: GuildId, owner: Option<UserId>) -> Result<Vec<Roleplay>> {
        Ok(self.store.roleplays(server, owner).await?)
    }

    pub async fn participants(&self, roleplay: &Roleplay) -> Result<Vec<Participant>> {
        self.store.participants(roleplay.id).await
    }

    async fn status(&self, roleplay: &Roleplay, user: UserId) -> Result<ParticipantStatus> {
        if user == roleplay.owner_id {
            return Ok(ParticipantStatus::Joined);
        }
        Ok(self
            .store
            .participant(roleplay.id, user)
            .await?
            .map(|p| p.status)
            .unwrap_or(ParticipantStatus::None))
    }

    async fn ensure_unique(
        &self,
        roleplay: Option<&Roleplay>,
        server: GuildId,
        name: &str,
    ) -> Result<()> {
        match self.store.roleplay_by_name(server, name).await? {
            Some(existing) if Some(existing.id) != roleplay.map(|r| r.id) => Err(Error::conflict(
                format!("A roleplay named \"{}\" already exists.", existing.name),
            )),
            _ => Ok(()),
        }
    }

    async fn ensure_nsfw_allowed(&self, server: GuildId) -> Result<()> {
        if self.store.server_settings(server).await?.allow_nsfw {
            Ok(())
        } else {
            Err(Error::denied("NSFW roleplays are not allowed on this server."))
        }
    }

    /// Create a roleplay and, best-effort, its dedicated channel.
    ///
    /// When the channel can't be created the roleplay still exists without one; check
    /// `dedicated_channel_id` on the result.
    pub async fn create(&self, mut new: NewRoleplay) -> Result<Roleplay> {
        new.name = validate_name(&new.name)?;
        self.ensure_unique(None, new.server_id, &new.name).await?;
        if new.is_nsfw {
            self.ensure_nsfw_allowed(new.server_id).await?;
        }

        let mut roleplay = self.store.insert_roleplay(&new, Utc::now()).await?;
        tracing::info!(
            roleplay = %roleplay.name,
            server = %roleplay.server_id,
            owner = %roleplay.owner_id,
            "created roleplay"
        );

        if let Err(error) = self.channels.create(&mut roleplay).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                error = %error,
                "failed to create dedicated channel"
            );
        }
        Ok(roleplay)
    }

    /// Delete a roleplay, its channel and everything logged for it.
    pub async fn delete(&self, mut roleplay: Roleplay) -> Result<()> {
        self.channels.delete(&mut roleplay).await?;
        self.store.delete_roleplay(roleplay.id).await?;
        tracing::info!(roleplay = %roleplay.name, "deleted roleplay");
        Ok(())
    }

    pub async fn join(&self, roleplay: &Roleplay, user: UserId) -> Result<()> {
        match self.status(roleplay, user).await? {
            ParticipantStatus::Joined => {
                return Err(Error::conflict("You're already in that roleplay."));
            }
            ParticipantStatus::Kicked => {
                return Err(Error::denied("You've been kicked from that roleplay."));
            }
            ParticipantStatus::None if !roleplay.is_public => {
                return Err(Error::denied(
                    "That roleplay is private; you need an invitation to join.",
                ));
            }
            ParticipantStatus::None | ParticipantStatus::Invited => {}
        }

        self.store
            .set_participant(roleplay.id, user, ParticipantStatus::Joined)
            .await?;
        tracing::debug!(roleplay = %roleplay.name, %user, "joined roleplay");
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    pub async fn leave(&self, roleplay: &Roleplay, user: UserId) -> Result<()> {
        if user == roleplay.owner_id {
            return Err(Error::invalid(
                "The owner can't leave their roleplay; transfer it first.",
            ));
        }
        if self.status(roleplay, user).await? != ParticipantStatus::Joined {
            return Err(Error::invalid("You're not in that roleplay."));
        }

        self.store
            .set_participant(roleplay.id, user, ParticipantStatus::None)
            .await?;
        tracing::debug!(roleplay = %roleplay.name, %user, "left roleplay");
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    /// Invite a user. An invitation also lifts a kick.
    pub async fn invite(&self, roleplay: &Roleplay, user: UserId) -> Result<()> {
        if self.status(roleplay, user).await? == ParticipantStatus::Joined {
            return Err(Error::conflict("That user is already in the roleplay."));
        }

        self.store
            .set_participant(roleplay.id, user, ParticipantStatus::Invited)
            .await?;
        tracing::debug!(roleplay = %roleplay.name, %user, "invited user");
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    pub async fn kick(&self, roleplay: &Roleplay, user: UserId) -> Result<()> {
        if user == roleplay.owner_id {
            return Err(Error::invalid("The owner can't be kicked from their roleplay."));
        }
        if self.status(roleplay, user).await? != ParticipantStatus::Joined {
            return Err(Error::invalid("That user isn't in the roleplay."));
        }

        self.store
            .set_participant(roleplay.id, user, ParticipantStatus::Kicked)
            .await?;
        tracing::debug!(roleplay = %roleplay.name, %user, "kicked user");
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    /// Hand the roleplay to another joined participant.
    pub async fn transfer(&self, roleplay: &mut Roleplay, new_owner: UserId) -> Result<()> {
        if new_owner == roleplay.owner_id {
            return Err(Error::invalid("That user already owns the roleplay."));
        }
        if self.status(roleplay, new_owner).await? != ParticipantStatus::Joined {
            return Err(Error::invalid(
                "Roleplays can only be transferred to someone who has joined them.",
            ));
        }

        let previous = roleplay.owner_id;
        // The previous owner stays in as an ordinary participant
        self.store
            .set_participant(roleplay.id, previous, ParticipantStatus::Joined)
            .await?;
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Owner(new_owner))
            .await?;
        tracing::info!(
            roleplay = %roleplay.name,
            from = %previous,
            to = %new_owner,
            "transferred roleplay"
        );
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    pub async fn rename(&self, roleplay: &mut Roleplay, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        self.ensure_unique(Some(roleplay), roleplay.server_id, &name)
            .await?;
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Name(name))
            .await?;
        self.channels.sync_settings(roleplay).await;
        Ok(())
    }

    pub async fn set_summary(&self, roleplay: &mut Roleplay, summary: &str) -> Result<()> {
        let summary = summary.trim().to_string();
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Summary(summary))
            .await?;
        self.channels.sync_settings(roleplay).await;
        Ok(())
    }

    pub async fn set_nsfw(&self, roleplay: &mut Roleplay, nsfw: bool) -> Result<()> {
        if nsfw {
            self.ensure_nsfw_allowed(roleplay.server_id).await?;
        }
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Nsfw(nsfw))
            .await?;
        self.channels.sync_settings(roleplay).await;
        Ok(())
    }

    pub async fn set_public(&self, roleplay: &mut Roleplay, public: bool) -> Result<()> {
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Public(public))
            .await?;
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    /// Start the roleplay, creating its channel if needed, and call its participants to it.
    pub async fn start(&self, roleplay: &mut Roleplay) -> Result<ChannelId> {
        if roleplay.is_active {
            return Err(Error::conflict("That roleplay is already running."));
        }

        let channel_id = self.channels.ensure(roleplay).await?;
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Started(Utc::now()))
            .await?;
        tracing::info!(roleplay = %roleplay.name, %channel_id, "started roleplay");
        self.channels.reconcile_best_effort(roleplay).await;

        let mut call = String::new();
        for participant in self.store.participants(roleplay.id).await? {
            if participant.is_joined() || participant.user_id == roleplay.owner_id {
                call.push_str(&format!("{} ", participant.user_id.mention()));
            }
        }
        call.push_str(&format!(
            "\n**{}** is starting in {}!",
            roleplay.name,
            channel_id.mention()
        ));
        if let Err(error) = self.platform.send(channel_id, &call).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                error = ?error,
                "failed to call participants"
            );
        }
        Ok(channel_id)
    }

    pub async fn stop(&self, roleplay: &mut Roleplay) -> Result<()> {
        if !roleplay.is_active {
            return Err(Error::conflict("That roleplay isn't running."));
        }
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Stopped)
            .await?;
        tracing::info!(roleplay = %roleplay.name, "stopped roleplay");
        self.channels.reconcile_best_effort(roleplay).await;
        Ok(())
    }

    async fn nickname(&self, server: GuildId, message: &HistoryMessage) -> Result<String> {
        Ok(self
            .store
            .current_character(server, message.author_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| message.author_name.clone()))
    }

    async fn log(&self, roleplay: &Roleplay, message: &HistoryMessage) -> Result<bool> {
        let logged = RoleplayMessage {
            roleplay_id: roleplay.id,
            message_id: message.id,
            author_id: message.author_id,
            author_nickname: self.nickname(roleplay.server_id, message).await?,
            contents: message.content.clone(),
            timestamp: message.timestamp,
        };
        Ok(self.store.insert_message(&logged).await?)
    }

    /// Log a message posted in `channel` if it belongs to a running roleplay and its author
    /// has joined it. Returns whether the message was logged.
    pub async fn record_message(
        &self,
        channel: ChannelId,
        message: &HistoryMessage,
    ) -> Result<bool> {
        if message.author_is_bot {
            return Ok(false);
        }
        let Some(mut roleplay) = self.store.roleplay_by_channel(channel).await? else {
            return Ok(false);
        };
        if !roleplay.is_active
            || self.status(&roleplay, message.author_id).await? != ParticipantStatus::Joined
        {
            return Ok(false);
        }

        let logged = self.log(&roleplay, message).await?;
        if logged {
            self.store
                .update_roleplay(&mut roleplay, RoleplayUpdate::Touched(Utc::now()))
                .await?;
        }
        Ok(logged)
    }

    /// Messages posted in `channel` after `after`, oldest first, across as many pages as needed.
    fn history(
        &self,
        channel: ChannelId,
        mut after: MessageId,
    ) -> impl Stream<Item = anyhow::Result<HistoryMessage>> + Send + Unpin + 'static {
        let platform = self.platform.clone();
        Box::pin(try_stream! {
            loop {
                let page = platform.history_after(channel, after).await?;
                if page.is_empty() {
                    break;
                }
                for message in page {
                    after = message.id;
                    yield message;
                }
            }
        })
    }

    /// Backfill the log from the dedicated channel's history after `after`.
    ///
    /// Only messages by joined participants are logged; ones already logged are skipped.
    /// Returns how many messages were added.
    pub async fn include_previous(&self, roleplay: &Roleplay, after: MessageId) -> Result<usize> {
        let Some(channel) = roleplay.dedicated_channel_id else {
            return Err(Error::invalid("That roleplay has no dedicated channel."));
        };

        let joined: HashSet<UserId> = self
            .store
            .participants(roleplay.id)
            .await?
            .into_iter()
            .filter(Participant::is_joined)
            .map(|p| p.user_id)
            .chain(std::iter::once(roleplay.owner_id))
            .collect();

        let mut added = 0;
        let mut history = self.history(channel, after);
        while let Some(message) = history.next().await {
            let message = message?;
            if message.author_is_bot || !joined.contains(&message.author_id) {
                continue;
            }
            if self.log(roleplay, &message).await? {
                added += 1;
            }
        }
        tracing::info!(roleplay = %roleplay.name, added, "included previous messages");
        Ok(added)
    }

    /// Render the roleplay's log as a Markdown transcript.
    pub async fn export(&self, roleplay: &Roleplay) -> Result<crate::platform::Attachment> {
        let participants = self.store.participants(roleplay.id).await?;
        let messages = self.store.messages(roleplay.id).await?;
        Ok(transcript::attachment(roleplay, &participants, &messages))
    }

    /// Force the dedicated channel's permissions back in line.
    pub async fn refresh(&self, roleplay: &Roleplay) -> Result<Reconciliation> {
        if roleplay.dedicated_channel_id.is_none() {
            return Err(Error::invalid("That roleplay has no dedicated channel."));
        }
        self.channels.reconcile(roleplay).await
    }

    /// Post the transcript to the server's archive channel. Returns `false` when none is set.
    pub async fn post_transcript(&self, roleplay: &Roleplay) -> Result<bool> {
        let settings = self.store.server_settings(roleplay.server_id).await?;
        let Some(archive) = settings.archive_channel else {
            return Ok(false);
        };
        let file = self.export(roleplay).await?;
        let owner = roleplay.owner_id.mention();
        self.platform
            .send_file(
                archive,
                &format!("Archived **{}** (owned by {}).", roleplay.name, owner),
                file,
            )
            .await?;
        Ok(true)
    }

    /// Archive a roleplay: post its transcript, delete its channel and stop it.
    pub async fn archive(&self, roleplay: &mut Roleplay) -> Result<()> {
        if roleplay.dedicated_channel_id.is_none() {
            return Err(Error::invalid("That roleplay has no dedicated channel to archive."));
        }
        match self.post_transcript(roleplay).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(roleplay = %roleplay.name, "no archive channel set"),
            Err(error) => tracing::warn!(
                roleplay = %roleplay.name,
                error = %error,
                "failed to post transcript"
            ),
        }
        self.channels.delete(roleplay).await?;
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::Stopped)
            .await?;
        tracing::info!(roleplay = %roleplay.name, "archived roleplay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serenity::model::{id::RoleId, permissions::Permissions};

    use super::*;
    use crate::{
        model::ServerSettings,
        platform::{fake::FakePlatform, OverwriteTarget},
    };

    const SERVER: GuildId = GuildId(1);
    const OWNER: UserId = UserId(10);
    const ALICE: UserId = UserId(11);
    const BOB: UserId = UserId(12);

    async fn setup() -> (Store, Arc<FakePlatform>, Roleplays) {
        let store = Store::in_memory().await.unwrap();
        let platform = Arc::new(FakePlatform::new());
        let channels = DedicatedChannels::new(store.clone(), platform.clone());
        let roleplays = Roleplays::new(store.clone(), platform.clone(), channels);
        (store, platform, roleplays)
    }

    fn new_roleplay(name: &str, public: bool) -> NewRoleplay {
        NewRoleplay {
            server_id: SERVER,
            owner_id: OWNER,
            name: name.to_string(),
            summary: "Hunting dragons".to_string(),
            is_nsfw: false,
            is_public: public,
        }
    }

    fn chat(id: u64, author: UserId, content: &str) -> HistoryMessage {
        HistoryMessage {
            id: MessageId(id),
            author_id: author,
            author_name: format!("user{}", author),
            author_is_bot: false,
            content: content.to_string(),
            timestamp: Utc::now() + Duration::seconds(id as i64),
        }
    }

    #[tokio::test]
    async fn create_validates_names_and_nsfw() {
        let (store, _, roleplays) = setup().await;

        let created = roleplays
            .create(new_roleplay("  Dragon Hunt ", true))
            .await
            .unwrap();
        assert_eq!(created.name, "Dragon Hunt");
        assert!(created.dedicated_channel_id.is_some());

        let duplicate = roleplays.create(new_roleplay("dragon hunt", true)).await;
        assert!(matches!(duplicate, Err(Error::Conflict(_))));

        let long = roleplays.create(new_roleplay(&"x".repeat(81), true)).await;
        assert!(matches!(long, Err(Error::Invalid(_))));
        let empty = roleplays.create(new_roleplay("   ", true)).await;
        assert!(matches!(empty, Err(Error::Invalid(_))));

        let mut nsfw = new_roleplay("Spicy", true);
        nsfw.is_nsfw = true;
        assert!(matches!(
            roleplays.create(nsfw.clone()).await,
            Err(Error::Denied(_))
        ));
        let mut settings = ServerSettings::new(SERVER);
        settings.allow_nsfw = true;
        store.save_server_settings(&settings).await.unwrap();
        assert!(roleplays.create(nsfw).await.unwrap().is_nsfw);
    }

    #[tokio::test]
    async fn create_survives_channel_failure() {
        let (store, platform, roleplays) = setup().await;
        platform.state.lock().unwrap().fail_channel_creation = true;

        let created = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        assert!(created.dedicated_channel_id.is_none());
        assert!(store.roleplay(created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn membership_rules() {
        let (_, platform, roleplays) = setup().await;
        let roleplay = roleplays
            .create(new_roleplay("Private", false))
            .await
            .unwrap();
        let channel = roleplay.dedicated_channel_id.unwrap();

        assert!(matches!(
            roleplays.join(&roleplay, ALICE).await,
            Err(Error::Denied(_))
        ));
        roleplays.invite(&roleplay, ALICE).await.unwrap();
        roleplays.join(&roleplay, ALICE).await.unwrap();
        assert!(matches!(
            roleplays.join(&roleplay, ALICE).await,
            Err(Error::Conflict(_))
        ));
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .is_some());

        roleplays.kick(&roleplay, ALICE).await.unwrap();
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .unwrap()
            .deny
            .contains(Permissions::VIEW_CHANNEL));
        assert!(matches!(
            roleplays.join(&roleplay, ALICE).await,
            Err(Error::Denied(_))
        ));

        // An invitation lifts the kick, and with it the deny overwrite
        roleplays.invite(&roleplay, ALICE).await.unwrap();
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .is_none());
        roleplays.join(&roleplay, ALICE).await.unwrap();
        roleplays.leave(&roleplay, ALICE).await.unwrap();
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .is_none());

        assert!(matches!(
            roleplays.leave(&roleplay, OWNER).await,
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            roleplays.kick(&roleplay, OWNER).await,
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            roleplays.kick(&roleplay, BOB).await,
            Err(Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn transfer_requires_a_joined_participant() {
        let (store, _, roleplays) = setup().await;
        let mut roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();

        assert!(matches!(
            roleplays.transfer(&mut roleplay, ALICE).await,
            Err(Error::Invalid(_))
        ));
        roleplays.join(&roleplay, ALICE).await.unwrap();
        roleplays.transfer(&mut roleplay, ALICE).await.unwrap();

        let saved = store.roleplay(roleplay.id).await.unwrap().unwrap();
        assert_eq!(saved.owner_id, ALICE);
        // The old owner is still in and may now leave
        roleplays.leave(&saved, OWNER).await.unwrap();
    }

    #[tokio::test]
    async fn start_and_stop_toggle_write_access() {
        let (store, platform, roleplays) = setup().await;
        platform.state.lock().unwrap().fail_channel_creation = true;
        let mut roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        roleplays.join(&roleplay, ALICE).await.unwrap();
        platform.state.lock().unwrap().fail_channel_creation = false;

        let channel = roleplays.start(&mut roleplay).await.unwrap();
        assert!(store.roleplay(roleplay.id).await.unwrap().unwrap().is_active);
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .unwrap()
            .allow
            .contains(Permissions::SEND_MESSAGES));
        let call = platform.sent_to(channel);
        assert_eq!(call.len(), 1);
        assert!(call[0].contains("<@11>"));
        assert!(call[0].contains("<@10>"));

        assert!(matches!(
            roleplays.start(&mut roleplay).await,
            Err(Error::Conflict(_))
        ));

        roleplays.stop(&mut roleplay).await.unwrap();
        let alice = platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .unwrap();
        assert!(alice.allow.contains(Permissions::VIEW_CHANNEL));
        assert!(alice.deny.contains(Permissions::SEND_MESSAGES));
    }

    #[tokio::test]
    async fn only_joined_participants_of_running_roleplays_are_logged() {
        let (store, _, roleplays) = setup().await;
        let mut roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        let channel = roleplay.dedicated_channel_id.unwrap();

        // Not running yet
        assert!(!roleplays
            .record_message(channel, &chat(1, OWNER, "too early"))
            .await
            .unwrap());

        roleplays.start(&mut roleplay).await.unwrap();
        assert!(roleplays
            .record_message(channel, &chat(2, OWNER, "The cave is dark."))
            .await
            .unwrap());
        assert!(!roleplays
            .record_message(channel, &chat(3, BOB, "heckling"))
            .await
            .unwrap());
        assert!(!roleplays
            .record_message(ChannelId(4242), &chat(4, OWNER, "elsewhere"))
            .await
            .unwrap());

        let logged = store.messages(roleplay.id).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].author_nickname, "user10");
        assert_eq!(logged[0].contents, "The cave is dark.");
    }

    #[tokio::test]
    async fn include_previous_pages_through_history() {
        let (store, platform, roleplays) = setup().await;
        let roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        roleplays.join(&roleplay, ALICE).await.unwrap();
        let channel = roleplay.dedicated_channel_id.unwrap();

        let mut bot_message = chat(4, UserId(999), "beep");
        bot_message.author_is_bot = true;
        platform.state.lock().unwrap().history.insert(
            channel,
            vec![
                chat(1, OWNER, "before"),
                chat(2, OWNER, "one"),
                chat(3, ALICE, "two"),
                bot_message,
                chat(5, BOB, "not in it"),
                chat(6, OWNER, "three"),
            ],
        );

        let added = roleplays
            .include_previous(&roleplay, MessageId(1))
            .await
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(
            store.latest_message_id(roleplay.id).await.unwrap(),
            Some(MessageId(6))
        );

        // Already-known messages are skipped
        assert_eq!(
            roleplays
                .include_previous(&roleplay, MessageId(0))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn archive_posts_the_transcript_and_removes_the_channel() {
        let (store, platform, roleplays) = setup().await;
        let mut settings = ServerSettings::new(SERVER);
        settings.archive_channel = Some(ChannelId(5));
        store.save_server_settings(&settings).await.unwrap();

        let mut roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        let channel = roleplays.start(&mut roleplay).await.unwrap();
        roleplays
            .record_message(channel, &chat(2, OWNER, "The end."))
            .await
            .unwrap();

        roleplays.archive(&mut roleplay).await.unwrap();
        assert!(platform.channel(channel).is_none());

        let files = platform.state.lock().unwrap().files.clone();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, ChannelId(5));
        let text = String::from_utf8(files[0].2.data.clone()).unwrap();
        assert!(text.contains("**user10**: The end."));

        let saved = store.roleplay(roleplay.id).await.unwrap().unwrap();
        assert!(!saved.is_active);
        assert!(saved.dedicated_channel_id.is_none());
    }

    #[tokio::test]
    async fn rename_keeps_names_unique_and_updates_the_channel() {
        let (_, platform, roleplays) = setup().await;
        let mut first = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        roleplays
            .create(new_roleplay("Sea Voyage", true))
            .await
            .unwrap();

        assert!(matches!(
            roleplays.rename(&mut first, "sea voyage").await,
            Err(Error::Conflict(_))
        ));
        roleplays.rename(&mut first, "DRAGON HUNT").await.unwrap();
        roleplays.rename(&mut first, "Wyrm Hunt").await.unwrap();
        let channel = platform.channel(first.dedicated_channel_id.unwrap()).unwrap();
        assert_eq!(channel.name, "wyrm-hunt-rp");
    }

    #[tokio::test]
    async fn nsfw_can_only_be_turned_on_where_allowed() {
        let (store, platform, roleplays) = setup().await;
        let mut roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        let channel = roleplay.dedicated_channel_id.unwrap();

        assert!(matches!(
            roleplays.set_nsfw(&mut roleplay, true).await,
            Err(Error::Denied(_))
        ));
        assert!(!store.roleplay(roleplay.id).await.unwrap().unwrap().is_nsfw);
        assert!(!platform.channel(channel).unwrap().nsfw);

        let mut settings = ServerSettings::new(SERVER);
        settings.allow_nsfw = true;
        store.save_server_settings(&settings).await.unwrap();
        roleplays.set_nsfw(&mut roleplay, true).await.unwrap();
        assert!(store.roleplay(roleplay.id).await.unwrap().unwrap().is_nsfw);
        assert!(platform.channel(channel).unwrap().nsfw);

        // Turning it off is always allowed
        settings.allow_nsfw = false;
        store.save_server_settings(&settings).await.unwrap();
        roleplays.set_nsfw(&mut roleplay, false).await.unwrap();
        assert!(!platform.channel(channel).unwrap().nsfw);
    }

    #[tokio::test]
    async fn going_private_hides_a_running_roleplay() {
        let (_, platform, roleplays) = setup().await;
        let mut roleplay = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        let channel = roleplays.start(&mut roleplay).await.unwrap();
        let everyone = OverwriteTarget::Role(RoleId(SERVER.0));

        let shown = platform.overwrite_for(channel, everyone).unwrap();
        assert!(shown.allow.contains(Permissions::VIEW_CHANNEL));
        assert!(shown.deny.contains(Permissions::SEND_MESSAGES));

        roleplays.set_public(&mut roleplay, false).await.unwrap();
        let hidden = platform.overwrite_for(channel, everyone).unwrap();
        assert!(hidden.allow.is_empty());
        assert!(hidden.deny.contains(Permissions::VIEW_CHANNEL));

        roleplays.set_public(&mut roleplay, true).await.unwrap();
        assert!(platform
            .overwrite_for(channel, everyone)
            .unwrap()
            .allow
            .contains(Permissions::VIEW_CHANNEL));
    }

    #[tokio::test]
    async fn settings_changes_keep_an_archived_channel_detached() {
        let (store, _, roleplays) = setup().await;
        let mut stale = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        roleplays.start(&mut stale).await.unwrap();
        assert!(stale.dedicated_channel_id.is_some());

        let claimed = store
            .claim_archivable(Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        roleplays
            .set_summary(&mut stale, "Back at the tavern")
            .await
            .unwrap();
        let saved = store.roleplay(stale.id).await.unwrap().unwrap();
        assert_eq!(saved.summary, "Back at the tavern");
        assert_eq!(saved.dedicated_channel_id, None);
        assert!(!saved.is_active);
        assert_eq!(stale, saved);
    }

    #[tokio::test]
    async fn settings_changes_do_not_restart_a_timed_out_roleplay() {
        let (store, platform, roleplays) = setup().await;
        let mut stale = roleplays
            .create(new_roleplay("Dragon Hunt", true))
            .await
            .unwrap();
        roleplays.join(&stale, ALICE).await.unwrap();
        let channel = roleplays.start(&mut stale).await.unwrap();

        let stopped = store
            .stop_expired(Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(stopped.len(), 1);

        roleplays.set_public(&mut stale, true).await.unwrap();
        assert!(!stale.is_active);
        assert!(!store.roleplay(stale.id).await.unwrap().unwrap().is_active);
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .unwrap()
            .deny
            .contains(Permissions::SEND_MESSAGES));
    }
}
