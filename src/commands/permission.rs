use clap::Parser;
use serenity::{model::id::UserId, prelude::Mentionable};

use super::{parse_user, Invocation, Reply};
use crate::{
    app::App,
    model::{PermissionKind, PermissionTarget},
    Result,
};

#[derive(Debug, Clone, Parser)]
pub enum PermCommand {
    /// Allow a user to do something.
    Grant {
        #[clap(parse(try_from_str = parse_user))]
        user: UserId,
        /// e.g. `edit-roleplay`, `kick-roleplay-member`.
        permission: PermissionKind,
        /// `self` for the user's own things, `other` for everyone else's.
        #[clap(default_value = "self")]
        target: PermissionTarget,
    },
    /// Forbid a user from doing something.
    Revoke {
        #[clap(parse(try_from_str = parse_user))]
        user: UserId,
        permission: PermissionKind,
        #[clap(default_value = "self")]
        target: PermissionTarget,
    },
    /// Show what a user may do.
    List {
        #[clap(parse(try_from_str = parse_user))]
        user: Option<UserId>,
    },
}

pub async fn execute(app: &App, invocation: &Invocation, command: PermCommand) -> Result<Reply> {
    match command {
        PermCommand::Grant {
            user,
            permission,
            target,
        } => {
            app.access
                .require(
                    invocation.server,
                    invocation.author,
                    PermissionKind::ManagePermissions,
                    PermissionTarget::for_owner(invocation.author, user),
                )
                .await?;
            app.access
                .grant(invocation.server, user, permission, target)
                .await?;
            Ok(Reply::text(format!(
                "{} may now `{}` (`{}`).",
                user.mention(),
                permission,
                target
            )))
        }
        PermCommand::Revoke {
            user,
            permission,
            target,
        } => {
            app.access
                .require(
                    invocation.server,
                    invocation.author,
                    PermissionKind::ManagePermissions,
                    PermissionTarget::for_owner(invocation.author, user),
                )
                .await?;
            app.access
                .revoke(invocation.server, user, permission, target)
                .await?;
            Ok(Reply::text(format!(
                "{} may no longer `{}` (`{}`).",
                user.mention(),
                permission,
                target
            )))
        }
        PermCommand::List { user } => {
            let user = user.unwrap_or(invocation.author);
            let held = app.access.effective(invocation.server, user).await?;
            let mut text = format!("{} may:", user.mention());
            for (kind, target) in held {
                text.push_str(&format!("\n- `{}` (`{}`)", kind, target));
            }
            Ok(Reply::text(text))
        }
    }
}
