//! Chat commands.
//!
//! A command is a message starting with the configured prefix. The rest of the message is split
//! into words (double quotes group words) and parsed with `clap`, so every command gets usage
//! errors and `--help` for free.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};

use crate::{app::App, platform::Attachment, social, Error, Result};

mod character;
mod permission;
mod roleplay;
mod server;

pub use character::CharacterCommand;
pub use permission::PermCommand;
pub use roleplay::RoleplayCommand;
pub use server::ServerCommand;

#[derive(Debug, Clone, Parser)]
#[clap(
    name = "ambassador",
    no_binary_name = true,
    disable_version_flag = true,
    disable_help_subcommand = true,
    color = clap::ColorChoice::Never
)]
pub enum ChatCommand {
    /// Create, join and run roleplays.
    #[clap(subcommand)]
    Rp(RoleplayCommand),
    /// Manage your characters.
    #[clap(subcommand, alias = "char")]
    Character(CharacterCommand),
    /// Grant and revoke permissions.
    #[clap(subcommand)]
    Perm(PermCommand),
    /// Server-wide settings.
    #[clap(subcommand)]
    Server(ServerCommand),
    /// Give someone a hug.
    Hug {
        #[clap(parse(try_from_str = parse_user))]
        user: UserId,
    },
    /// Roll dice, e.g. `2d6+1`.
    Roll {
        #[clap(required = true, allow_hyphen_values = true)]
        dice: Vec<String>,
    },
    /// Ask the magic 8-ball a question.
    #[clap(name = "8ball")]
    EightBall {
        #[clap(required = true)]
        question: Vec<String>,
    },
    /// Show information about the bot.
    Info,
}

/// Who issued a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub server: GuildId,
    pub channel: ChannelId,
    pub author: UserId,
}

/// What to answer a command with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Reply {
            content: content.into(),
            attachment: None,
        }
    }

    pub fn file(content: impl Into<String>, attachment: Attachment) -> Self {
        Reply {
            content: content.into(),
            attachment: Some(attachment),
        }
    }
}

/// Split a command line into words, keeping double-quoted runs together.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if quoted => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quoted {
        return Err(Error::invalid("Unterminated quote in command."));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// The outcome of reading a message as a command.
#[derive(Debug)]
pub enum Parsed {
    /// Not addressed to the bot.
    Ignored,
    /// Starts with the prefix but names no command of ours, like another bot's `!ooc`.
    Foreign,
    Command(Box<ChatCommand>),
    /// A usage error or help text, to be shown as-is.
    Usage(String),
}

pub fn parse(prefix: &str, content: &str) -> Parsed {
    let Some(line) = content.strip_prefix(prefix) else {
        return Parsed::Ignored;
    };
    let Some(first) = line.split_whitespace().next() else {
        return Parsed::Foreign;
    };
    let help = first == "help";
    if !help && ChatCommand::command().find_subcommand(first).is_none() {
        return Parsed::Foreign;
    }

    let words = match tokenize(line) {
        Ok(_) if help => vec!["--help".to_string()],
        Ok(words) => words,
        Err(error) => return Parsed::Usage(error.to_string()),
    };
    match ChatCommand::try_parse_from(words) {
        Ok(command) => Parsed::Command(Box::new(command)),
        Err(error) => Parsed::Usage(error.to_string()),
    }
}

fn parse_snowflake(s: &str, prefixes: &[&str], what: &str) -> anyhow::Result<u64> {
    let s = s.trim();
    let id = match s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(inner) => prefixes
            .iter()
            .find_map(|prefix| inner.strip_prefix(prefix))
            .with_context(|| format!("`{}` is not a {} mention", s, what))?,
        None => s,
    };
    id.parse()
        .with_context(|| format!("`{}` is not a {} mention or id", s, what))
}

pub fn parse_user(s: &str) -> anyhow::Result<UserId> {
    parse_snowflake(s, &["@!", "@"], "user").map(UserId)
}

pub fn parse_channel(s: &str) -> anyhow::Result<ChannelId> {
    parse_snowflake(s, &["#"], "channel").map(ChannelId)
}

pub fn parse_role(s: &str) -> anyhow::Result<RoleId> {
    parse_snowflake(s, &["@&"], "role").map(RoleId)
}

/// A message id, or a link to the message.
pub fn parse_message(s: &str) -> anyhow::Result<MessageId> {
    let id = s.trim().trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    id.parse()
        .map(MessageId)
        .with_context(|| format!("`{}` is not a message id or link", s))
}

pub fn parse_bool(s: &str) -> anyhow::Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(anyhow::anyhow!("`{}` is not yes or no", s)),
    }
}

pub async fn execute(app: &App, invocation: &Invocation, command: ChatCommand) -> Result<Reply> {
    match command {
        ChatCommand::Rp(command) => roleplay::execute(app, invocation, command).await,
        ChatCommand::Character(command) => character::execute(app, invocation, command).await,
        ChatCommand::Perm(command) => permission::execute(app, invocation, command).await,
        ChatCommand::Server(command) => server::execute(app, invocation, command).await,
        ChatCommand::Hug { user } => Ok(Reply::text(social::hug(invocation.author, user))),
        ChatCommand::Roll { dice } => social::roll(&dice.join("")).map(Reply::text),
        ChatCommand::EightBall { question } => Ok(Reply::text(social::eight_ball(
            &app.config.eight_ball_answers,
            &question.join(" "),
        ))),
        ChatCommand::Info => Ok(Reply::text(social::info(
            "Ambassador",
            app.started.elapsed(),
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::Config, platform::fake::FakePlatform, store::Store};

    pub const SERVER: GuildId = GuildId(1);
    pub const CHANNEL: ChannelId = ChannelId(2);
    pub const OWNER: UserId = UserId(10);
    pub const ALICE: UserId = UserId(11);

    pub async fn app() -> (App, Arc<FakePlatform>) {
        let store = Store::in_memory().await.unwrap();
        let platform = Arc::new(FakePlatform::new());
        (App::new(store, platform.clone(), Config::default()), platform)
    }

    /// Run a command line as `author` in the general channel.
    pub async fn run(app: &App, author: UserId, line: &str) -> Result<Reply> {
        run_in(app, author, CHANNEL, line).await
    }

    pub async fn run_in(
        app: &App,
        author: UserId,
        channel: ChannelId,
        line: &str,
    ) -> Result<Reply> {
        let invocation = Invocation {
            server: SERVER,
            channel,
            author,
        };
        match parse("!", line) {
            Parsed::Command(command) => execute(app, &invocation, *command).await,
            other => panic!("{:?} did not parse: {:?}", line, other),
        }
    }

    #[test]
    fn tokenizer_honors_quotes() {
        assert_eq!(
            tokenize(r#"rp create "Dragon Hunt" --summary "a \"big\" one""#).unwrap(),
            vec!["rp", "create", "Dragon Hunt", "--summary", r#"a "big" one"#]
        );
        assert_eq!(tokenize(r#"say """#).unwrap(), vec!["say", ""]);
        assert!(tokenize(r#"rp create "Dragon"#).is_err());
    }

    #[test]
    fn mentions_and_ids_parse() {
        assert_eq!(parse_user("<@42>").unwrap(), UserId(42));
        assert_eq!(parse_user("<@!42>").unwrap(), UserId(42));
        assert_eq!(parse_user("42").unwrap(), UserId(42));
        assert!(parse_user("<@&42>").is_err());
        assert_eq!(parse_role("<@&7>").unwrap(), RoleId(7));
        assert_eq!(parse_channel("<#9>").unwrap(), ChannelId(9));
        assert_eq!(
            parse_message("https://discord.com/channels/1/2/345").unwrap(),
            MessageId(345)
        );
        assert!(parse_bool("maybe").is_err());
        assert!(parse_bool("On").unwrap());
    }

    #[test]
    fn messages_are_parsed_only_when_addressed_to_the_bot() {
        assert!(matches!(parse("!", "hello"), Parsed::Ignored));
        assert!(matches!(parse("!", "!"), Parsed::Foreign));
        assert!(matches!(parse("!", "!!!"), Parsed::Foreign));
        assert!(matches!(parse("!", "!ooc brb"), Parsed::Foreign));
        assert!(matches!(parse("!", "!ooc \"brb"), Parsed::Foreign));
        assert!(matches!(parse("!", "!roll 2d6"), Parsed::Command(_)));
        match parse("!", "!hug <@11>") {
            Parsed::Command(command) => match *command {
                ChatCommand::Hug { user } => assert_eq!(user, ALICE),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        match parse("!", "!hug nobody") {
            Parsed::Usage(text) => assert!(text.contains("user")),
            other => panic!("unexpected {:?}", other),
        }
        match parse("!", "!help") {
            Parsed::Usage(text) => assert!(text.contains("rp")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn social_commands_reply() {
        let (app, _) = app().await;
        let hug = run(&app, OWNER, "!hug <@11>").await.unwrap();
        assert!(hug.content.contains("<@11>"));
        let roll = run(&app, OWNER, "!roll 2d6 + 1").await.unwrap();
        assert!(roll.content.starts_with("Rolled `2d6+1`"));
        assert!(matches!(
            run(&app, OWNER, "!roll 0d6").await,
            Err(Error::Invalid(_))
        ));
        let info = run(&app, OWNER, "!info").await.unwrap();
        assert!(info.content.contains("Ambassador"));
    }

    #[test]
    fn command_tree_is_well_formed() {
        ChatCommand::command().debug_assert();
    }
}
