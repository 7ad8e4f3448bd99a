use clap::Parser;
use serenity::{
    model::id::{ChannelId, RoleId},
    prelude::Mentionable,
};

use super::{parse_bool, parse_channel, parse_role, Invocation, Reply};
use crate::{
    app::App,
    model::{PermissionKind, PermissionTarget, ServerSettings},
    platform::OverwriteTarget,
    Result,
};

#[derive(Debug, Clone, Parser)]
pub enum ServerCommand {
    /// Show this server's settings.
    Show,
    /// Change a setting.
    #[clap(subcommand)]
    Set(Setting),
    /// Reset a setting.
    #[clap(subcommand)]
    Clear(ClearSetting),
}

#[derive(Debug, Clone, Parser)]
pub enum Setting {
    /// Where transcripts of archived roleplays are posted.
    ArchiveChannel {
        #[clap(parse(try_from_str = parse_channel))]
        channel: ChannelId,
    },
    /// The role that may read public roleplays.
    DefaultRole {
        #[clap(parse(try_from_str = parse_role))]
        role: RoleId,
    },
    /// The category dedicated channels are created in.
    Category {
        #[clap(parse(try_from_str = parse_channel))]
        category: ChannelId,
    },
    /// Whether NSFW roleplays are allowed.
    Nsfw {
        #[clap(parse(try_from_str = parse_bool))]
        allowed: bool,
    },
}

#[derive(Debug, Clone, Parser)]
pub enum ClearSetting {
    ArchiveChannel,
    DefaultRole,
    Category,
}

fn describe(settings: &ServerSettings) -> String {
    fn or_unset(value: Option<String>) -> String {
        value.unwrap_or_else(|| "not set".to_string())
    }

    format!(
        "Archive channel: {}\nDefault role: {}\nRoleplay category: {}\nNSFW roleplays: {}",
        or_unset(settings.archive_channel.map(|c| c.mention().to_string())),
        or_unset(settings.default_role.map(|r| r.mention().to_string())),
        or_unset(settings.dedicated_category.map(|c| c.mention().to_string())),
        if settings.allow_nsfw { "allowed" } else { "not allowed" },
    )
}

/// Bring every dedicated channel on the server in line after the visibility role changed.
async fn reconcile_all(app: &App, invocation: &Invocation, previous: RoleId) -> Result<()> {
    let released = Some(OverwriteTarget::Role(previous));
    for roleplay in app.roleplays.list(invocation.server, None).await? {
        if let Err(error) = app.channels.reconcile_releasing(&roleplay, released).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                error = %error,
                "failed to reconcile dedicated channel"
            );
        }
    }
    Ok(())
}

pub async fn execute(app: &App, invocation: &Invocation, command: ServerCommand) -> Result<Reply> {
    if let ServerCommand::Show = command {
        let settings = app.store.server_settings(invocation.server).await?;
        return Ok(Reply::text(describe(&settings)));
    }

    app.access
        .require(
            invocation.server,
            invocation.author,
            PermissionKind::EditServerSettings,
            PermissionTarget::Own,
        )
        .await?;
    let mut settings = app.store.server_settings(invocation.server).await?;
    let visibility = settings.visibility_role();

    match command {
        ServerCommand::Show => {}
        ServerCommand::Set(Setting::ArchiveChannel { channel }) => {
            settings.archive_channel = Some(channel)
        }
        ServerCommand::Set(Setting::DefaultRole { role }) => settings.default_role = Some(role),
        ServerCommand::Set(Setting::Category { category }) => {
            settings.dedicated_category = Some(category)
        }
        ServerCommand::Set(Setting::Nsfw { allowed }) => settings.allow_nsfw = allowed,
        ServerCommand::Clear(ClearSetting::ArchiveChannel) => settings.archive_channel = None,
        ServerCommand::Clear(ClearSetting::DefaultRole) => settings.default_role = None,
        ServerCommand::Clear(ClearSetting::Category) => settings.dedicated_category = None,
    }
    app.store.save_server_settings(&settings).await?;
    tracing::info!(server = %invocation.server, ?settings, "updated server settings");

    if settings.visibility_role() != visibility {
        reconcile_all(app, invocation, visibility).await?;
    }
    Ok(Reply::text(describe(&settings)))
}
