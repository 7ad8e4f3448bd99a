use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use serenity::model::id::{GuildId, MessageId, UserId};

use crate::{model::RoleplayMessage, store::Store};

#[derive(Debug, Clone, Parser)]
pub struct Export {
    /// SQLite database URL, e.g. `sqlite:///var/lib/ambassador/ambassador.sqlite`.
    #[clap(long)]
    database_url: String,
    /// The server the roleplay belongs to.
    #[clap(long, short)]
    server: u64,
    /// The roleplay's name.
    #[clap(long, short)]
    name: String,
}

#[derive(Debug, Serialize)]
struct Row {
    timestamp: DateTime<Utc>,
    message_id: MessageId,
    user_id: UserId,
    nickname: String,
    contents: String,
}

impl From<RoleplayMessage> for Row {
    fn from(message: RoleplayMessage) -> Self {
        Row {
            timestamp: message.timestamp,
            message_id: message.message_id,
            user_id: message.author_id,
            nickname: message.author_nickname,
            contents: message.contents,
        }
    }
}

/// Write `messages` as CSV, with a header row.
fn write_csv<W: std::io::Write>(
    out: W,
    messages: impl IntoIterator<Item = RoleplayMessage>,
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(out);
    for message in messages {
        csv.serialize(Row::from(message))?;
    }
    csv.flush()?;
    Ok(())
}

impl Export {
    pub async fn exec(self) -> anyhow::Result<()> {
        let store = Store::connect(&self.database_url).await?;
        let roleplay = store
            .roleplay_by_name(GuildId(self.server), &self.name)
            .await?
            .with_context(|| {
                format!("no roleplay named {:?} on server {}", self.name, self.server)
            })?;

        let messages = store.messages(roleplay.id).await?;
        tracing::debug!(
            roleplay = %roleplay.name,
            count = messages.len(),
            "exporting message log"
        );
        write_csv(std::io::stdout().lock(), messages)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rows_have_a_header_and_quote_contents() {
        let message = RoleplayMessage {
            roleplay_id: 1,
            message_id: MessageId(7),
            author_id: UserId(10),
            author_nickname: "Brann".to_string(),
            contents: "Well, \"hello\" there".to_string(),
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
        };

        let mut out = Vec::new();
        write_csv(&mut out, [message]).unwrap();
        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("timestamp,message_id,user_id,nickname,contents")
        );
        assert_eq!(
            lines.next(),
            Some("1970-01-01T00:00:00Z,7,10,Brann,\"Well, \"\"hello\"\" there\"")
        );
    }
}
