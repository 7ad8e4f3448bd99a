//! Records managed by the bot.
//!
//! Discord identifiers are kept as `serenity` id types in memory; see [`crate::store`] for how
//! they are persisted.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// Primary key of a [`Roleplay`].
pub type RoleplayId = i64;

/// Primary key of a [`Character`].
pub type CharacterId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roleplay {
    pub id: RoleplayId,
    pub server_id: GuildId,
    pub owner_id: UserId,
    pub name: String,
    pub summary: String,
    pub is_nsfw: bool,
    pub is_public: bool,
    pub is_active: bool,
    /// The text channel the roleplay is played in, if one currently exists.
    pub dedicated_channel_id: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
    /// Last time the roleplay saw activity: a start, or a logged message.
    pub last_updated: DateTime<Utc>,
}

/// The fields supplied when a roleplay is first created.
#[derive(Debug, Clone)]
pub struct NewRoleplay {
    pub server_id: GuildId,
    pub owner_id: UserId,
    pub name: String,
    pub summary: String,
    pub is_nsfw: bool,
    pub is_public: bool,
}

/// Where a user stands with respect to a roleplay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticipantStatus {
    /// The user was involved once (joined and left, or had an invitation withdrawn).
    None,
    Invited,
    Joined,
    Kicked,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::None => "none",
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Joined => "joined",
            ParticipantStatus::Kicked => "kicked",
        }
    }
}

impl FromStr for ParticipantStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ParticipantStatus::None),
            "invited" => Ok(ParticipantStatus::Invited),
            "joined" => Ok(ParticipantStatus::Joined),
            "kicked" => Ok(ParticipantStatus::Kicked),
            other => Err(anyhow::anyhow!("unknown participant status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub roleplay_id: RoleplayId,
    pub user_id: UserId,
    pub status: ParticipantStatus,
}

impl Participant {
    pub fn is_joined(&self) -> bool {
        self.status == ParticipantStatus::Joined
    }
}

/// A message logged from a roleplay's dedicated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleplayMessage {
    pub roleplay_id: RoleplayId,
    pub message_id: MessageId,
    pub author_id: UserId,
    /// The name the author was playing under when the message was posted.
    pub author_nickname: String,
    pub contents: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub server_id: GuildId,
    /// Channel that receives transcripts of archived roleplays.
    pub archive_channel: Option<ChannelId>,
    /// Role that is granted read access to public roleplays. `@everyone` when unset.
    pub default_role: Option<RoleId>,
    /// Category under which dedicated channels are created.
    pub dedicated_category: Option<ChannelId>,
    pub allow_nsfw: bool,
}

impl ServerSettings {
    pub fn new(server_id: GuildId) -> Self {
        ServerSettings {
            server_id,
            archive_channel: None,
            default_role: None,
            dedicated_category: None,
            allow_nsfw: false,
        }
    }

    /// The role whose members may look at public roleplays.
    pub fn visibility_role(&self) -> RoleId {
        self.default_role.unwrap_or_else(|| everyone_role(self.server_id))
    }
}

/// The `@everyone` role shares its id with the server.
pub fn everyone_role(server_id: GuildId) -> RoleId {
    RoleId(server_id.0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: CharacterId,
    pub server_id: GuildId,
    pub owner_id: UserId,
    pub name: String,
    pub nickname: Option<String>,
    pub summary: String,
    pub description: String,
    pub avatar_url: Option<String>,
    pub pronouns: String,
    pub is_current: bool,
}

impl Character {
    /// The nickname a member should wear while playing this character.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct NewCharacter {
    pub server_id: GuildId,
    pub owner_id: UserId,
    pub name: String,
    pub nickname: Option<String>,
    pub summary: String,
    pub avatar_url: Option<String>,
}

/// An action that can be granted to or withheld from a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    CreateCharacter,
    EditCharacter,
    DeleteCharacter,
    CreateRoleplay,
    EditRoleplay,
    DeleteRoleplay,
    StartStopRoleplay,
    KickRoleplayMember,
    TransferRoleplay,
    ExportRoleplay,
    ManagePermissions,
    EditServerSettings,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 12] = [
        PermissionKind::CreateCharacter,
        PermissionKind::EditCharacter,
        PermissionKind::DeleteCharacter,
        PermissionKind::CreateRoleplay,
        PermissionKind::EditRoleplay,
        PermissionKind::DeleteRoleplay,
        PermissionKind::StartStopRoleplay,
        PermissionKind::KickRoleplayMember,
        PermissionKind::TransferRoleplay,
        PermissionKind::ExportRoleplay,
        PermissionKind::ManagePermissions,
        PermissionKind::EditServerSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::CreateCharacter => "create-character",
            PermissionKind::EditCharacter => "edit-character",
            PermissionKind::DeleteCharacter => "delete-character",
            PermissionKind::CreateRoleplay => "create-roleplay",
            PermissionKind::EditRoleplay => "edit-roleplay",
            PermissionKind::DeleteRoleplay => "delete-roleplay",
            PermissionKind::StartStopRoleplay => "start-stop-roleplay",
            PermissionKind::KickRoleplayMember => "kick-roleplay-member",
            PermissionKind::TransferRoleplay => "transfer-roleplay",
            PermissionKind::ExportRoleplay => "export-roleplay",
            PermissionKind::ManagePermissions => "manage-permissions",
            PermissionKind::EditServerSettings => "edit-server-settings",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        PermissionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown permission `{}` (expected one of: {})",
                    s,
                    PermissionKind::ALL
                        .iter()
                        .map(PermissionKind::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Whose entities a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionTarget {
    /// Things the user owns.
    Own,
    /// Things owned by somebody else.
    Other,
}

impl PermissionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionTarget::Own => "self",
            PermissionTarget::Other => "other",
        }
    }

    /// The target that applies when `actor` acts on something owned by `owner`.
    pub fn for_owner(actor: UserId, owner: UserId) -> Self {
        if actor == owner {
            PermissionTarget::Own
        } else {
            PermissionTarget::Other
        }
    }
}

impl fmt::Display for PermissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "self" | "own" => Ok(PermissionTarget::Own),
            "other" | "others" => Ok(PermissionTarget::Other),
            _ => Err(anyhow::anyhow!("unknown target `{}` (expected self or other)", s)),
        }
    }
}

/// An explicit grant or denial stored for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPermission {
    pub server_id: GuildId,
    pub user_id: UserId,
    pub kind: PermissionKind,
    pub target: PermissionTarget,
    pub granted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_kinds_parse_loosely() {
        assert_eq!(
            "Create_Roleplay".parse::<PermissionKind>().unwrap(),
            PermissionKind::CreateRoleplay
        );
        assert!("fly".parse::<PermissionKind>().is_err());
    }

    #[test]
    fn visibility_role_falls_back_to_everyone() {
        let mut settings = ServerSettings::new(GuildId(42));
        assert_eq!(settings.visibility_role(), RoleId(42));
        settings.default_role = Some(RoleId(7));
        assert_eq!(settings.visibility_role(), RoleId(7));
    }
}
