use clap::Parser;
use serenity::{model::id::UserId, prelude::Mentionable};

use super::{parse_user, Invocation, Reply};
use crate::{
    app::App,
    characters::CharacterEdit,
    model::{Character, NewCharacter, PermissionKind, PermissionTarget},
    Result,
};

/// A character, by name, belonging to the invoking user unless `--owner` says otherwise.
#[derive(Debug, Clone, Parser)]
pub struct Target {
    name: String,
    #[clap(long, parse(try_from_str = parse_user))]
    owner: Option<UserId>,
}

#[derive(Debug, Clone, Parser)]
pub enum CharacterCommand {
    /// Create a new character.
    Create {
        name: String,
        /// Nickname to wear while playing the character.
        #[clap(long)]
        nickname: Option<String>,
        #[clap(short, long, default_value = "")]
        summary: String,
        #[clap(long)]
        avatar: Option<String>,
    },
    Show {
        #[clap(flatten)]
        target: Target,
    },
    /// List your characters, or someone else's.
    List {
        #[clap(parse(try_from_str = parse_user))]
        user: Option<UserId>,
    },
    /// Play as a character.
    Use { name: String },
    /// Stop playing as any character.
    Clear,
    Rename {
        #[clap(flatten)]
        target: Target,
        new_name: String,
    },
    SetSummary {
        #[clap(flatten)]
        target: Target,
        #[clap(required = true)]
        summary: Vec<String>,
    },
    SetDescription {
        #[clap(flatten)]
        target: Target,
        #[clap(required = true)]
        description: Vec<String>,
    },
    /// Set the avatar URL, or clear it when omitted.
    SetAvatar {
        #[clap(flatten)]
        target: Target,
        url: Option<String>,
    },
    SetPronouns {
        #[clap(flatten)]
        target: Target,
        pronouns: String,
    },
    /// Set the nickname, or clear it when omitted.
    SetNickname {
        #[clap(flatten)]
        target: Target,
        nickname: Option<String>,
    },
    Delete {
        #[clap(flatten)]
        target: Target,
    },
    /// Give a character to another user.
    Transfer {
        #[clap(flatten)]
        target: Target,
        #[clap(parse(try_from_str = parse_user))]
        to: UserId,
    },
}

/// Look up the targeted character, checking the invoking user may `kind` it.
async fn guarded(
    app: &App,
    invocation: &Invocation,
    target: &Target,
    kind: PermissionKind,
) -> Result<Character> {
    let owner = target.owner.unwrap_or(invocation.author);
    app.access
        .require(
            invocation.server,
            invocation.author,
            kind,
            PermissionTarget::for_owner(invocation.author, owner),
        )
        .await?;
    app.characters
        .get(invocation.server, owner, &target.name)
        .await
}

fn describe(character: &Character) -> String {
    let mut text = format!("**{}**", character.name);
    if let Some(nickname) = &character.nickname {
        text.push_str(&format!(" \"{}\"", nickname));
    }
    if !character.pronouns.is_empty() {
        text.push_str(&format!(" ({})", character.pronouns));
    }
    text.push_str(&format!(" played by {}", character.owner_id.mention()));
    if character.is_current {
        text.push_str(", in play");
    }
    for field in [&character.summary, &character.description] {
        if !field.is_empty() {
            text.push_str(&format!("\n> {}", field));
        }
    }
    if let Some(avatar) = &character.avatar_url {
        text.push_str(&format!("\n{}", avatar));
    }
    text
}

async fn edit(
    app: &App,
    invocation: &Invocation,
    target: &Target,
    edit: CharacterEdit,
) -> Result<Reply> {
    let mut character = guarded(app, invocation, target, PermissionKind::EditCharacter).await?;
    app.characters.edit(&mut character, edit).await?;
    Ok(Reply::text(format!("Updated **{}**.", character.name)))
}

pub async fn execute(
    app: &App,
    invocation: &Invocation,
    command: CharacterCommand,
) -> Result<Reply> {
    match command {
        CharacterCommand::Create {
            name,
            nickname,
            summary,
            avatar,
        } => {
            app.access
                .require(
                    invocation.server,
                    invocation.author,
                    PermissionKind::CreateCharacter,
                    PermissionTarget::Own,
                )
                .await?;
            let character = app
                .characters
                .create(NewCharacter {
                    server_id: invocation.server,
                    owner_id: invocation.author,
                    name,
                    nickname,
                    summary,
                    avatar_url: avatar,
                })
                .await?;
            Ok(Reply::text(format!("Created **{}**.", character.name)))
        }
        CharacterCommand::Show { target } => {
            let owner = target.owner.unwrap_or(invocation.author);
            let character = app
                .characters
                .get(invocation.server, owner, &target.name)
                .await?;
            Ok(Reply::text(describe(&character)))
        }
        CharacterCommand::List { user } => {
            let owner = user.unwrap_or(invocation.author);
            let characters = app.characters.list(invocation.server, owner).await?;
            if characters.is_empty() {
                return Ok(Reply::text(format!(
                    "{} has no characters.",
                    owner.mention()
                )));
            }
            let lines: Vec<String> = characters
                .iter()
                .map(|c| {
                    format!(
                        "- **{}**{}",
                        c.name,
                        if c.is_current { " (in play)" } else { "" }
                    )
                })
                .collect();
            Ok(Reply::text(lines.join("\n")))
        }
        CharacterCommand::Use { name } => {
            let character = app
                .characters
                .get(invocation.server, invocation.author, &name)
                .await?;
            app.characters.use_character(&character).await?;
            Ok(Reply::text(format!("You are now playing **{}**.", character.name)))
        }
        CharacterCommand::Clear => {
            app.characters
                .clear(invocation.server, invocation.author)
                .await?;
            Ok(Reply::text("You are no longer playing a character."))
        }
        CharacterCommand::Rename { target, new_name } => {
            let mut character =
                guarded(app, invocation, &target, PermissionKind::EditCharacter).await?;
            let old = character.name.clone();
            app.characters.rename(&mut character, &new_name).await?;
            Ok(Reply::text(format!(
                "Renamed **{}** to **{}**.",
                old, character.name
            )))
        }
        CharacterCommand::SetSummary { target, summary } => {
            edit(app, invocation, &target, CharacterEdit::Summary(summary.join(" "))).await
        }
        CharacterCommand::SetDescription {
            target,
            description,
        } => {
            let text = description.join(" ");
            edit(app, invocation, &target, CharacterEdit::Description(text)).await
        }
        CharacterCommand::SetAvatar { target, url } => {
            edit(app, invocation, &target, CharacterEdit::Avatar(url)).await
        }
        CharacterCommand::SetPronouns { target, pronouns } => {
            edit(app, invocation, &target, CharacterEdit::Pronouns(pronouns)).await
        }
        CharacterCommand::SetNickname { target, nickname } => {
            edit(app, invocation, &target, CharacterEdit::Nickname(nickname)).await
        }
        CharacterCommand::Delete { target } => {
            let character =
                guarded(app, invocation, &target, PermissionKind::DeleteCharacter).await?;
            let name = character.name.clone();
            app.characters.delete(character).await?;
            Ok(Reply::text(format!("Deleted **{}**.", name)))
        }
        CharacterCommand::Transfer { target, to } => {
            let mut character =
                guarded(app, invocation, &target, PermissionKind::EditCharacter).await?;
            app.characters.transfer(&mut character, to).await?;
            Ok(Reply::text(format!(
                "Gave **{}** to {}.",
                character.name,
                to.mention()
            )))
        }
    }
}
