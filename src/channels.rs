//! Dedicated roleplay channels and the reconciliation of their permission overwrites.
//!
//! The permissions a dedicated channel should carry are a pure function of the roleplay, its
//! participants and the server's settings: see [`desired_overwrites`]. [`plan`] diffs that
//! against what Discord reports and yields the smallest set of changes that converges the two.
//! Changes are applied best-effort: a failed call is logged and the rest still go through.

use std::{collections::HashSet, sync::Arc};

use indexmap::IndexMap;
use serenity::model::{
    id::{ChannelId, RoleId, UserId},
    permissions::Permissions,
};

use crate::{
    model::{everyone_role, Participant, ParticipantStatus, Roleplay, ServerSettings},
    platform::{ChannelEdit, NewChannel, Overwrite, OverwriteTarget, Platform},
    store::{RoleplayUpdate, Store},
    Result,
};

/// The allow and deny bits wanted for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Grant {
    fn new(allow: Permissions, deny: Permissions) -> Self {
        Grant { allow, deny }
    }
}

/// What participants may do while the roleplay is running.
pub fn participant_active() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::ADD_REACTIONS
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::EMBED_LINKS
        | Permissions::ATTACH_FILES
}

fn read_only() -> Permissions {
    Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY
}

fn writing() -> Permissions {
    Permissions::SEND_MESSAGES | Permissions::ADD_REACTIONS
}

fn hidden() -> Permissions {
    Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES
}

fn bot_permissions() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::ATTACH_FILES
        | Permissions::EMBED_LINKS
        | Permissions::MANAGE_CHANNELS
}

/// Everything the desired permissions of a dedicated channel depend on.
#[derive(Debug, Clone, Copy)]
pub struct ChannelState<'a> {
    pub roleplay: &'a Roleplay,
    pub participants: &'a [Participant],
    /// The role that may look at public roleplays.
    pub visibility_role: RoleId,
    pub everyone: RoleId,
    pub bot: UserId,
}

impl<'a> ChannelState<'a> {
    pub fn new(
        roleplay: &'a Roleplay,
        participants: &'a [Participant],
        settings: &ServerSettings,
        bot: UserId,
    ) -> Self {
        ChannelState {
            roleplay,
            participants,
            visibility_role: settings.visibility_role(),
            everyone: everyone_role(roleplay.server_id),
            bot,
        }
    }

    fn is_showing(&self) -> bool {
        self.roleplay.is_public && self.roleplay.is_active
    }

    /// Every target whose overwrite the bot owns. Anything else on the channel is left alone.
    pub fn managed_targets(&self) -> HashSet<OverwriteTarget> {
        let mut managed: HashSet<OverwriteTarget> = self
            .participants
            .iter()
            .map(|p| OverwriteTarget::User(p.user_id))
            .collect();
        managed.insert(OverwriteTarget::User(self.roleplay.owner_id));
        managed.insert(OverwriteTarget::User(self.bot));
        managed.insert(OverwriteTarget::Role(self.everyone));
        managed.insert(OverwriteTarget::Role(self.visibility_role));
        managed
    }
}

/// The overwrite one participant should have, if any.
pub fn participant_grant(status: ParticipantStatus, is_active: bool) -> Option<Grant> {
    match status {
        ParticipantStatus::Joined if is_active => {
            Some(Grant::new(participant_active(), Permissions::empty()))
        }
        ParticipantStatus::Joined => Some(Grant::new(read_only(), writing())),
        ParticipantStatus::Kicked => Some(Grant::new(Permissions::empty(), hidden())),
        ParticipantStatus::Invited | ParticipantStatus::None => None,
    }
}

/// Compute the overwrites a dedicated channel should carry, keyed by target.
///
/// Roles come first, then the bot, then participants in the order given.
pub fn desired_overwrites(state: &ChannelState<'_>) -> IndexMap<OverwriteTarget, Grant> {
    let mut desired = IndexMap::new();

    let showing = state.is_showing();
    let public_view = Grant::new(read_only(), writing());

    if showing && state.visibility_role == state.everyone {
        desired.insert(OverwriteTarget::Role(state.everyone), public_view);
    } else {
        desired.insert(
            OverwriteTarget::Role(state.everyone),
            Grant::new(Permissions::empty(), hidden()),
        );
        if showing {
            desired.insert(OverwriteTarget::Role(state.visibility_role), public_view);
        }
    }

    desired.insert(
        OverwriteTarget::User(state.bot),
        Grant::new(bot_permissions(), Permissions::empty()),
    );

    let is_active = state.roleplay.is_active;
    for participant in state.participants {
        // The owner is always in, whatever their record says
        let status = if participant.user_id == state.roleplay.owner_id {
            ParticipantStatus::Joined
        } else {
            participant.status
        };
        if let Some(grant) = participant_grant(status, is_active) {
            desired.insert(OverwriteTarget::User(participant.user_id), grant);
        }
    }
    let owner = OverwriteTarget::User(state.roleplay.owner_id);
    if !desired.contains_key(&owner) {
        if let Some(grant) = participant_grant(ParticipantStatus::Joined, is_active) {
            desired.insert(owner, grant);
        }
    }

    desired
}

/// One call against the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteChange {
    Upsert(Overwrite),
    Remove(OverwriteTarget),
}

/// The minimal changes that turn `actual` into `desired`, touching only `managed` targets.
pub fn plan(
    desired: &IndexMap<OverwriteTarget, Grant>,
    actual: &[Overwrite],
    managed: &HashSet<OverwriteTarget>,
) -> Vec<OverwriteChange> {
    let mut changes = Vec::new();

    for (&target, grant) in desired {
        let current = actual.iter().find(|o| o.target == target);
        let up_to_date =
            matches!(current, Some(o) if o.allow == grant.allow && o.deny == grant.deny);
        if !up_to_date {
            changes.push(OverwriteChange::Upsert(Overwrite {
                target,
                allow: grant.allow,
                deny: grant.deny,
            }));
        }
    }

    for overwrite in actual {
        if managed.contains(&overwrite.target) && !desired.contains_key(&overwrite.target) {
            changes.push(OverwriteChange::Remove(overwrite.target));
        }
    }

    changes
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub applied: usize,
    pub failed: usize,
}

/// Turn a roleplay name into a channel name: `Dragon Hunt!` becomes `dragon-hunt-rp`.
pub fn channel_name(roleplay_name: &str) -> String {
    let mut name = String::with_capacity(roleplay_name.len() + 3);
    for c in roleplay_name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '-' {
            if !name.ends_with('-') && !name.is_empty() {
                name.push('-');
            }
        } else if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
        }
    }
    let name = name.trim_end_matches('-');
    if name.is_empty() {
        "roleplay-rp".to_string()
    } else {
        format!("{}-rp", name)
    }
}

/// Creates, updates and deletes the dedicated channels of roleplays.
#[derive(Clone)]
pub struct DedicatedChannels {
    store: Store,
    platform: Arc<dyn Platform>,
}

impl DedicatedChannels {
    pub fn new(store: Store, platform: Arc<dyn Platform>) -> Self {
        DedicatedChannels { store, platform }
    }

    async fn state_inputs(
        &self,
        roleplay: &Roleplay,
    ) -> Result<(Vec<Participant>, ServerSettings)> {
        let participants = self.store.participants(roleplay.id).await?;
        let settings = self.store.server_settings(roleplay.server_id).await?;
        Ok((participants, settings))
    }

    /// Create a dedicated channel for `roleplay` and record it.
    pub async fn create(&self, roleplay: &mut Roleplay) -> Result<ChannelId> {
        let (participants, settings) = self.state_inputs(roleplay).await?;
        let state = ChannelState::new(roleplay, &participants, &settings, self.platform.bot_user());
        let overwrites = desired_overwrites(&state)
            .into_iter()
            .map(|(target, grant)| Overwrite {
                target,
                allow: grant.allow,
                deny: grant.deny,
            })
            .collect();

        let channel = NewChannel {
            name: channel_name(&roleplay.name),
            topic: roleplay.summary.clone(),
            nsfw: roleplay.is_nsfw,
            category: settings.dedicated_category,
            overwrites,
        };
        let channel_id = self
            .platform
            .create_channel(roleplay.server_id, channel)
            .await?;
        tracing::info!(roleplay = %roleplay.name, %channel_id, "created dedicated channel");

        self.store
            .update_roleplay(roleplay, RoleplayUpdate::DedicatedChannel(Some(channel_id)))
            .await?;
        Ok(channel_id)
    }

    /// Return the roleplay's dedicated channel, creating it if it is missing or was deleted.
    pub async fn ensure(&self, roleplay: &mut Roleplay) -> Result<ChannelId> {
        if let Some(channel_id) = roleplay.dedicated_channel_id {
            if self.platform.channel_exists(channel_id).await? {
                return Ok(channel_id);
            }
            tracing::warn!(
                roleplay = %roleplay.name,
                %channel_id,
                "dedicated channel disappeared, creating a new one"
            );
            self.store
                .update_roleplay(roleplay, RoleplayUpdate::DedicatedChannel(None))
                .await?;
        }
        self.create(roleplay).await
    }

    /// Bring the overwrites of the roleplay's channel in line with its state.
    ///
    /// Does nothing when the roleplay has no channel. Individual failures are logged and
    /// counted, not returned.
    pub async fn reconcile(&self, roleplay: &Roleplay) -> Result<Reconciliation> {
        self.reconcile_releasing(roleplay, None).await
    }

    /// Like [`reconcile`](Self::reconcile), also removing the overwrite of `released`: a target
    /// the bot managed before a settings change, such as a previous default role.
    pub async fn reconcile_releasing(
        &self,
        roleplay: &Roleplay,
        released: Option<OverwriteTarget>,
    ) -> Result<Reconciliation> {
        let Some(channel_id) = roleplay.dedicated_channel_id else {
            return Ok(Reconciliation::default());
        };

        let (participants, settings) = self.state_inputs(roleplay).await?;
        let state = ChannelState::new(roleplay, &participants, &settings, self.platform.bot_user());
        let actual = self.platform.overwrites(channel_id).await?;
        let mut managed = state.managed_targets();
        managed.extend(released);
        let changes = plan(&desired_overwrites(&state), &actual, &managed);

        let mut outcome = Reconciliation::default();
        for change in changes {
            let result = match change {
                OverwriteChange::Upsert(overwrite) => {
                    self.platform.upsert_overwrite(channel_id, overwrite).await
                }
                OverwriteChange::Remove(target) => {
                    self.platform.remove_overwrite(channel_id, target).await
                }
            };
            match result {
                Ok(()) => outcome.applied += 1,
                Err(error) => {
                    tracing::warn!(
                        roleplay = %roleplay.name,
                        %channel_id,
                        ?change,
                        error = ?error,
                        "failed to update channel permissions"
                    );
                    outcome.failed += 1;
                }
            }
        }

        tracing::debug!(roleplay = %roleplay.name, ?outcome, "reconciled dedicated channel");
        Ok(outcome)
    }

    /// [`reconcile`](Self::reconcile), logging rather than returning any error.
    pub async fn reconcile_best_effort(&self, roleplay: &Roleplay) {
        if let Err(error) = self.reconcile(roleplay).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                error = %error,
                "failed to reconcile dedicated channel"
            );
        }
    }

    /// Push the roleplay's name, summary and NSFW flag to its channel, best-effort.
    pub async fn sync_settings(&self, roleplay: &Roleplay) {
        let Some(channel_id) = roleplay.dedicated_channel_id else {
            return;
        };
        let edit = ChannelEdit {
            name: channel_name(&roleplay.name),
            topic: roleplay.summary.clone(),
            nsfw: roleplay.is_nsfw,
        };
        if let Err(error) = self.platform.edit_channel(channel_id, edit).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                %channel_id,
                error = ?error,
                "failed to update dedicated channel"
            );
        }
    }

    /// Delete the roleplay's channel, best-effort, and forget it.
    pub async fn delete(&self, roleplay: &mut Roleplay) -> Result<()> {
        let Some(channel_id) = roleplay.dedicated_channel_id else {
            return Ok(());
        };
        if let Err(error) = self.platform.delete_channel(channel_id).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                %channel_id,
                error = ?error,
                "failed to delete dedicated channel"
            );
        }
        self.store
            .update_roleplay(roleplay, RoleplayUpdate::DedicatedChannel(None))
            .await?;
        Ok(())
    }
}
