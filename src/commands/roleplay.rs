use clap::Parser;
use serenity::{
    model::id::{MessageId, UserId},
    prelude::Mentionable,
};

use super::{parse_bool, parse_message, parse_user, Invocation, Reply};
use crate::{
    app::App,
    model::{NewRoleplay, PermissionKind, PermissionTarget, Roleplay},
    Error, Result,
};

/// Which roleplay a command is about. Defaults to the one played in the current channel.
#[derive(Debug, Clone, Parser)]
pub struct Target {
    /// Name of the roleplay.
    #[clap(short, long)]
    roleplay: Option<String>,
}

#[derive(Debug, Clone, Parser)]
pub enum RoleplayCommand {
    /// Create a roleplay and its channel.
    Create {
        name: String,
        #[clap(short, long, default_value = "")]
        summary: String,
        /// Mark the roleplay as NSFW.
        #[clap(long)]
        nsfw: bool,
        /// Only invited users may join.
        #[clap(long)]
        private: bool,
    },
    /// Delete a roleplay, its channel and its log.
    Delete { name: Option<String> },
    Show { name: Option<String> },
    /// List the roleplays on this server.
    List {
        #[clap(long, parse(try_from_str = parse_user))]
        owner: Option<UserId>,
    },
    Join { name: Option<String> },
    Leave { name: Option<String> },
    Invite {
        #[clap(parse(try_from_str = parse_user))]
        user: UserId,
        #[clap(flatten)]
        target: Target,
    },
    Kick {
        #[clap(parse(try_from_str = parse_user))]
        user: UserId,
        #[clap(flatten)]
        target: Target,
    },
    /// Hand the roleplay over to another participant.
    Transfer {
        #[clap(parse(try_from_str = parse_user))]
        user: UserId,
        #[clap(flatten)]
        target: Target,
    },
    Rename {
        new_name: String,
        #[clap(flatten)]
        target: Target,
    },
    SetSummary {
        #[clap(required = true)]
        summary: Vec<String>,
        #[clap(flatten)]
        target: Target,
    },
    SetNsfw {
        #[clap(parse(try_from_str = parse_bool))]
        value: bool,
        #[clap(flatten)]
        target: Target,
    },
    SetPublic {
        #[clap(parse(try_from_str = parse_bool))]
        value: bool,
        #[clap(flatten)]
        target: Target,
    },
    /// Open the roleplay's channel for writing and call everyone in.
    Start { name: Option<String> },
    Stop { name: Option<String> },
    /// Log messages from the channel posted after the given message (id or link).
    IncludePrevious {
        #[clap(parse(try_from_str = parse_message))]
        after: MessageId,
        #[clap(flatten)]
        target: Target,
    },
    /// Download the roleplay's log as Markdown.
    Export { name: Option<String> },
    /// Repair the channel's permissions.
    Refresh { name: Option<String> },
    /// Post the log to the archive channel and delete the roleplay's channel.
    Archive { name: Option<String> },
}

async fn resolve(app: &App, invocation: &Invocation, name: Option<&str>) -> Result<Roleplay> {
    match name {
        Some(name) => app.roleplays.get(invocation.server, name).await,
        None => app
            .roleplays
            .in_channel(invocation.channel)
            .await?
            .ok_or_else(|| {
                Error::invalid("Name a roleplay, or use this command in a roleplay's channel.")
            }),
    }
}

async fn require(
    app: &App,
    invocation: &Invocation,
    roleplay: &Roleplay,
    kind: PermissionKind,
) -> Result<()> {
    app.access
        .require(
            invocation.server,
            invocation.author,
            kind,
            PermissionTarget::for_owner(invocation.author, roleplay.owner_id),
        )
        .await
}

/// Resolve the roleplay and check the invoking user may act on it.
async fn guarded(
    app: &App,
    invocation: &Invocation,
    name: Option<&str>,
    kind: PermissionKind,
) -> Result<Roleplay> {
    let roleplay = resolve(app, invocation, name).await?;
    require(app, invocation, &roleplay, kind).await?;
    Ok(roleplay)
}

async fn describe(app: &App, roleplay: &Roleplay) -> Result<String> {
    let mut flags = vec![
        if roleplay.is_active { "running" } else { "stopped" },
        if roleplay.is_public { "public" } else { "private" },
    ];
    if roleplay.is_nsfw {
        flags.push("NSFW");
    }

    let mut text = format!("**{}** ({})\n", roleplay.name, flags.join(", "));
    text.push_str(&format!("Owner: {}\n", roleplay.owner_id.mention()));
    match roleplay.dedicated_channel_id {
        Some(channel) => text.push_str(&format!("Channel: {}\n", channel.mention())),
        None => text.push_str("Channel: none\n"),
    }
    if !roleplay.summary.is_empty() {
        text.push_str(&format!("> {}\n", roleplay.summary));
    }
    let participants: Vec<String> = app
        .roleplays
        .participants(roleplay)
        .await?
        .into_iter()
        .filter(|p| p.is_joined())
        .map(|p| p.user_id.mention().to_string())
        .collect();
    text.push_str(&format!("Participants: {}", participants.join(", ")));
    Ok(text)
}

pub async fn execute(
    app: &App,
    invocation: &Invocation,
    command: RoleplayCommand,
) -> Result<Reply> {
    use PermissionKind::*;

    match command {
        RoleplayCommand::Create {
            name,
            summary,
            nsfw,
            private,
        } => {
            app.access
                .require(
                    invocation.server,
                    invocation.author,
                    CreateRoleplay,
                    PermissionTarget::Own,
                )
                .await?;
            let roleplay = app
                .roleplays
                .create(NewRoleplay {
                    server_id: invocation.server,
                    owner_id: invocation.author,
                    name,
                    summary,
                    is_nsfw: nsfw,
                    is_public: !private,
                })
                .await?;
            Ok(Reply::text(match roleplay.dedicated_channel_id {
                Some(channel) => format!(
                    "Created **{}** in {}. Start it when everyone is ready.",
                    roleplay.name,
                    channel.mention()
                ),
                None => format!(
                    "Created **{}**, but its channel couldn't be created. \
                     It will be created when the roleplay starts.",
                    roleplay.name
                ),
            }))
        }
        RoleplayCommand::Delete { name } => {
            let roleplay = guarded(app, invocation, name.as_deref(), DeleteRoleplay).await?;
            let name = roleplay.name.clone();
            app.roleplays.delete(roleplay).await?;
            Ok(Reply::text(format!("Deleted **{}**.", name)))
        }
        RoleplayCommand::Show { name } => {
            let roleplay = resolve(app, invocation, name.as_deref()).await?;
            Ok(Reply::text(describe(app, &roleplay).await?))
        }
        RoleplayCommand::List { owner } => {
            let roleplays = app.roleplays.list(invocation.server, owner).await?;
            if roleplays.is_empty() {
                return Ok(Reply::text("No roleplays found."));
            }
            let lines: Vec<String> = roleplays
                .iter()
                .map(|r| {
                    format!(
                        "- **{}** by {}{}",
                        r.name,
                        r.owner_id.mention(),
                        if r.is_active { " (running)" } else { "" }
                    )
                })
                .collect();
            Ok(Reply::text(lines.join("\n")))
        }
        RoleplayCommand::Join { name } => {
            let roleplay = resolve(app, invocation, name.as_deref()).await?;
            app.roleplays.join(&roleplay, invocation.author).await?;
            Ok(Reply::text(format!("You joined **{}**.", roleplay.name)))
        }
        RoleplayCommand::Leave { name } => {
            let roleplay = resolve(app, invocation, name.as_deref()).await?;
            app.roleplays.leave(&roleplay, invocation.author).await?;
            Ok(Reply::text(format!("You left **{}**.", roleplay.name)))
        }
        RoleplayCommand::Invite { user, target } => {
            let roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), EditRoleplay).await?;
            app.roleplays.invite(&roleplay, user).await?;
            Ok(Reply::text(format!(
                "Invited {} to **{}**.",
                user.mention(),
                roleplay.name
            )))
        }
        RoleplayCommand::Kick { user, target } => {
            let roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), KickRoleplayMember).await?;
            app.roleplays.kick(&roleplay, user).await?;
            Ok(Reply::text(format!(
                "Kicked {} from **{}**.",
                user.mention(),
                roleplay.name
            )))
        }
        RoleplayCommand::Transfer { user, target } => {
            let mut roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), TransferRoleplay).await?;
            app.roleplays.transfer(&mut roleplay, user).await?;
            Ok(Reply::text(format!(
                "{} now owns **{}**.",
                user.mention(),
                roleplay.name
            )))
        }
        RoleplayCommand::Rename { new_name, target } => {
            let mut roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), EditRoleplay).await?;
            let old = roleplay.name.clone();
            app.roleplays.rename(&mut roleplay, &new_name).await?;
            Ok(Reply::text(format!(
                "Renamed **{}** to **{}**.",
                old, roleplay.name
            )))
        }
        RoleplayCommand::SetSummary { summary, target } => {
            let mut roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), EditRoleplay).await?;
            app.roleplays
                .set_summary(&mut roleplay, &summary.join(" "))
                .await?;
            Ok(Reply::text(format!("Updated the summary of **{}**.", roleplay.name)))
        }
        RoleplayCommand::SetNsfw { value, target } => {
            let mut roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), EditRoleplay).await?;
            app.roleplays.set_nsfw(&mut roleplay, value).await?;
            Ok(Reply::text(format!(
                "**{}** is {} marked NSFW.",
                roleplay.name,
                if value { "now" } else { "no longer" }
            )))
        }
        RoleplayCommand::SetPublic { value, target } => {
            let mut roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), EditRoleplay).await?;
            app.roleplays.set_public(&mut roleplay, value).await?;
            Ok(Reply::text(format!(
                "**{}** is now {}.",
                roleplay.name,
                if value { "public" } else { "private" }
            )))
        }
        RoleplayCommand::Start { name } => {
            let mut roleplay =
                guarded(app, invocation, name.as_deref(), StartStopRoleplay).await?;
            let channel = app.roleplays.start(&mut roleplay).await?;
            Ok(Reply::text(format!(
                "**{}** has started in {}.",
                roleplay.name,
                channel.mention()
            )))
        }
        RoleplayCommand::Stop { name } => {
            let mut roleplay =
                guarded(app, invocation, name.as_deref(), StartStopRoleplay).await?;
            app.roleplays.stop(&mut roleplay).await?;
            Ok(Reply::text(format!("**{}** has stopped.", roleplay.name)))
        }
        RoleplayCommand::IncludePrevious { after, target } => {
            let roleplay =
                guarded(app, invocation, target.roleplay.as_deref(), EditRoleplay).await?;
            let added = app.roleplays.include_previous(&roleplay, after).await?;
            Ok(Reply::text(format!(
                "Added {} earlier message{} to the log of **{}**.",
                added,
                if added == 1 { "" } else { "s" },
                roleplay.name
            )))
        }
        RoleplayCommand::Export { name } => {
            let roleplay = guarded(app, invocation, name.as_deref(), ExportRoleplay).await?;
            let transcript = app.roleplays.export(&roleplay).await?;
            Ok(Reply::file(
                format!("The log of **{}**:", roleplay.name),
                transcript,
            ))
        }
        RoleplayCommand::Refresh { name } => {
            let roleplay = guarded(app, invocation, name.as_deref(), EditRoleplay).await?;
            let outcome = app.roleplays.refresh(&roleplay).await?;
            Ok(Reply::text(if outcome.failed == 0 {
                format!(
                    "Refreshed the channel of **{}** ({} change{}).",
                    roleplay.name,
                    outcome.applied,
                    if outcome.applied == 1 { "" } else { "s" }
                )
            } else {
                format!(
                    "Refreshed the channel of **{}**, but {} change{} failed; \
                     check that I can manage its permissions.",
                    roleplay.name,
                    outcome.failed,
                    if outcome.failed == 1 { "" } else { "s" }
                )
            }))
        }
        RoleplayCommand::Archive { name } => {
            let mut roleplay = guarded(app, invocation, name.as_deref(), DeleteRoleplay).await?;
            app.roleplays.archive(&mut roleplay).await?;
            Ok(Reply::text(format!("Archived **{}**.", roleplay.name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use serenity::model::permissions::Permissions;

    use super::super::tests::{app, run, run_in, ALICE, OWNER, SERVER};
    use crate::{platform::OverwriteTarget, Error};

    #[tokio::test]
    async fn roleplay_lifecycle_through_commands() {
        let (app, platform) = app().await;

        let created = run(&app, OWNER, r#"!rp create "Dragon Hunt" -s "Hunting dragons""#)
            .await
            .unwrap();
        assert!(created.content.contains("**Dragon Hunt**"));
        let roleplay = app.roleplays.get(SERVER, "dragon hunt").await.unwrap();
        let channel = roleplay.dedicated_channel_id.unwrap();

        run(&app, ALICE, r#"!rp join "Dragon Hunt""#).await.unwrap();
        // Commands in the dedicated channel default to its roleplay
        run_in(&app, OWNER, channel, "!rp start").await.unwrap();
        assert!(platform
            .overwrite_for(channel, OverwriteTarget::User(ALICE))
            .unwrap()
            .allow
            .contains(Permissions::SEND_MESSAGES));

        // Alice can't stop someone else's roleplay by default
        assert!(matches!(
            run_in(&app, ALICE, channel, "!rp stop").await,
            Err(Error::Denied(_))
        ));

        let shown = run_in(&app, ALICE, channel, "!rp show").await.unwrap();
        assert!(shown.content.contains("running"));
        assert!(shown.content.contains("<@11>"));

        let export = run_in(&app, OWNER, channel, "!rp export").await.unwrap();
        assert_eq!(export.attachment.unwrap().filename, "dragon-hunt-rp.md");

        assert!(matches!(
            run(&app, OWNER, "!rp start").await,
            Err(Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn private_roleplays_need_invitations() {
        let (app, _) = app().await;
        run(&app, OWNER, "!rp create Secret --private").await.unwrap();

        assert!(matches!(
            run(&app, ALICE, "!rp join Secret").await,
            Err(Error::Denied(_))
        ));
        run(&app, OWNER, "!rp invite <@11> -r Secret").await.unwrap();
        run(&app, ALICE, "!rp join Secret").await.unwrap();

        let listed = run(&app, ALICE, "!rp list").await.unwrap();
        assert!(listed.content.contains("**Secret**"));
    }
}
