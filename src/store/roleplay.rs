use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use sqlx::FromRow;

use super::{from_db, to_db, Store};
use crate::model::{
    NewRoleplay, Participant, ParticipantStatus, Roleplay, RoleplayId, RoleplayMessage,
};

/// A change to one aspect of a stored roleplay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleplayUpdate {
    Name(String),
    Summary(String),
    Nsfw(bool),
    Public(bool),
    Owner(UserId),
    /// Mark the roleplay running, as of the given time.
    Started(DateTime<Utc>),
    Stopped,
    /// Record activity without changing anything else.
    Touched(DateTime<Utc>),
    DedicatedChannel(Option<ChannelId>),
}

const ROLEPLAY_COLUMNS: &str = "id, server_id, owner_id, name, summary, is_nsfw, is_public, \
     is_active, dedicated_channel_id, created_at, last_updated";

#[derive(Debug, FromRow)]
struct RoleplayRow {
    id: i64,
    server_id: i64,
    owner_id: i64,
    name: String,
    summary: String,
    is_nsfw: bool,
    is_public: bool,
    is_active: bool,
    dedicated_channel_id: Option<i64>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl From<RoleplayRow> for Roleplay {
    fn from(row: RoleplayRow) -> Self {
        Roleplay {
            id: row.id,
            server_id: GuildId(from_db(row.server_id)),
            owner_id: UserId(from_db(row.owner_id)),
            name: row.name,
            summary: row.summary,
            is_nsfw: row.is_nsfw,
            is_public: row.is_public,
            is_active: row.is_active,
            dedicated_channel_id: row.dedicated_channel_id.map(|id| ChannelId(from_db(id))),
            created_at: row.created_at,
            last_updated: row.last_updated,
        }
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRow {
    roleplay_id: i64,
    user_id: i64,
    status: String,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = anyhow::Error;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Participant {
            roleplay_id: row.roleplay_id,
            user_id: UserId(from_db(row.user_id)),
            status: row.status.parse()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    roleplay_id: i64,
    message_id: i64,
    author_id: i64,
    author_nickname: String,
    contents: String,
    timestamp: DateTime<Utc>,
}

impl From<MessageRow> for RoleplayMessage {
    fn from(row: MessageRow) -> Self {
        RoleplayMessage {
            roleplay_id: row.roleplay_id,
            message_id: MessageId(from_db(row.message_id)),
            author_id: UserId(from_db(row.author_id)),
            author_nickname: row.author_nickname,
            contents: row.contents,
            timestamp: row.timestamp,
        }
    }
}

// === roleplays ===

impl Store {
    /// Insert a roleplay, with its owner as its first joined participant.
    pub async fn insert_roleplay(
        &self,
        new: &NewRoleplay,
        now: DateTime<Utc>,
    ) -> Result<Roleplay, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO roleplays
                (server_id, owner_id, name, summary, is_nsfw, is_public, is_active,
                 dedicated_channel_id, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, 0, NULL, ?, ?)
            "#,
        )
        .bind(to_db(new.server_id.0))
        .bind(to_db(new.owner_id.0))
        .bind(&new.name)
        .bind(&new.summary)
        .bind(new.is_nsfw)
        .bind(new.is_public)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO roleplay_participants (roleplay_id, user_id, status) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(to_db(new.owner_id.0))
        .bind(ParticipantStatus::Joined.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Roleplay {
            id,
            server_id: new.server_id,
            owner_id: new.owner_id,
            name: new.name.clone(),
            summary: new.summary.clone(),
            is_nsfw: new.is_nsfw,
            is_public: new.is_public,
            is_active: false,
            dedicated_channel_id: None,
            created_at: now,
            last_updated: now,
        })
    }

    pub async fn roleplay(&self, id: RoleplayId) -> Result<Option<Roleplay>, sqlx::Error> {
        let row = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays WHERE id = ?",
            ROLEPLAY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Roleplay::from))
    }

    /// Look up a roleplay by name, ignoring case.
    pub async fn roleplay_by_name(
        &self,
        server_id: GuildId,
        name: &str,
    ) -> Result<Option<Roleplay>, sqlx::Error> {
        let row = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays WHERE server_id = ? AND name = ? COLLATE NOCASE",
            ROLEPLAY_COLUMNS
        ))
        .bind(to_db(server_id.0))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Roleplay::from))
    }

    pub async fn roleplay_by_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<Roleplay>, sqlx::Error> {
        let row = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays WHERE dedicated_channel_id = ?",
            ROLEPLAY_COLUMNS
        ))
        .bind(to_db(channel_id.0))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Roleplay::from))
    }

    /// All roleplays on a server, optionally only those owned by `owner_id`, by name.
    pub async fn roleplays(
        &self,
        server_id: GuildId,
        owner_id: Option<UserId>,
    ) -> Result<Vec<Roleplay>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays \
             WHERE server_id = ? AND (? IS NULL OR owner_id = ?) \
             ORDER BY name COLLATE NOCASE",
            ROLEPLAY_COLUMNS
        ))
        .bind(to_db(server_id.0))
        .bind(owner_id.map(|id| to_db(id.0)))
        .bind(owner_id.map(|id| to_db(id.0)))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Roleplay::from).collect())
    }

    /// Apply a single-column change to a stored roleplay, then reload `roleplay` from the row.
    ///
    /// Columns other than the one named by `update` keep whatever is stored, so a stale copy
    /// never overwrites concurrent changes such as the sweeper's.
    pub async fn update_roleplay(
        &self,
        roleplay: &mut Roleplay,
        update: RoleplayUpdate,
    ) -> Result<(), crate::Error> {
        let query = match update {
            RoleplayUpdate::Name(name) => {
                sqlx::query("UPDATE roleplays SET name = ? WHERE id = ?").bind(name)
            }
            RoleplayUpdate::Summary(summary) => {
                sqlx::query("UPDATE roleplays SET summary = ? WHERE id = ?").bind(summary)
            }
            RoleplayUpdate::Nsfw(nsfw) => {
                sqlx::query("UPDATE roleplays SET is_nsfw = ? WHERE id = ?").bind(nsfw)
            }
            RoleplayUpdate::Public(public) => {
                sqlx::query("UPDATE roleplays SET is_public = ? WHERE id = ?").bind(public)
            }
            RoleplayUpdate::Owner(owner) => {
                sqlx::query("UPDATE roleplays SET owner_id = ? WHERE id = ?").bind(to_db(owner.0))
            }
            RoleplayUpdate::Started(at) => {
                sqlx::query("UPDATE roleplays SET is_active = 1, last_updated = ? WHERE id = ?")
                    .bind(at)
            }
            RoleplayUpdate::Stopped => {
                sqlx::query("UPDATE roleplays SET is_active = 0 WHERE id = ?")
            }
            RoleplayUpdate::Touched(at) => {
                sqlx::query("UPDATE roleplays SET last_updated = ? WHERE id = ?").bind(at)
            }
            RoleplayUpdate::DedicatedChannel(channel) => {
                sqlx::query("UPDATE roleplays SET dedicated_channel_id = ? WHERE id = ?")
                    .bind(channel.map(|id| to_db(id.0)))
            }
        };

        let mut tx = self.pool.begin().await?;
        query.bind(roleplay.id).execute(&mut *tx).await?;
        let row = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays WHERE id = ?",
            ROLEPLAY_COLUMNS
        ))
        .bind(roleplay.id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        *roleplay = row
            .map(Roleplay::from)
            .ok_or_else(|| crate::Error::not_found("That roleplay no longer exists."))?;
        Ok(())
    }

    /// Delete a roleplay together with its participants and message log.
    pub async fn delete_roleplay(&self, id: RoleplayId) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM roleplay_messages WHERE roleplay_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roleplay_participants WHERE roleplay_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roleplays WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }

    /// Atomically deactivate every active roleplay not updated since `cutoff`.
    ///
    /// Returns the roleplays as they are after the transition.
    pub async fn stop_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Roleplay>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays WHERE is_active = 1 AND last_updated < ? ORDER BY id",
            ROLEPLAY_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query("UPDATE roleplays SET is_active = 0 WHERE id = ?")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(Roleplay::from)
            .map(|mut roleplay| {
                roleplay.is_active = false;
                roleplay
            })
            .collect())
    }

    /// Atomically detach the dedicated channel of every roleplay not updated since `cutoff`.
    ///
    /// Returns the roleplays as they were before the transition, so that the caller still knows
    /// which channels to archive.
    pub async fn claim_archivable(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Roleplay>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays \
             WHERE dedicated_channel_id IS NOT NULL AND last_updated < ? ORDER BY id",
            ROLEPLAY_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query(
                "UPDATE roleplays SET dedicated_channel_id = NULL, is_active = 0 WHERE id = ?",
            )
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(rows.into_iter().map(Roleplay::from).collect())
    }

    /// Active roleplays not updated since `cutoff`, without changing them.
    pub async fn expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<Roleplay>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays WHERE is_active = 1 AND last_updated < ? ORDER BY id",
            ROLEPLAY_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Roleplay::from).collect())
    }

    /// Roleplays with a dedicated channel not updated since `cutoff`, without changing them.
    pub async fn archivable(&self, cutoff: DateTime<Utc>) -> Result<Vec<Roleplay>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RoleplayRow>(&format!(
            "SELECT {} FROM roleplays \
             WHERE dedicated_channel_id IS NOT NULL AND last_updated < ? ORDER BY id",
            ROLEPLAY_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Roleplay::from).collect())
    }
}

// === participants ===

impl Store {
    pub async fn set_participant(
        &self,
        roleplay_id: RoleplayId,
        user_id: UserId,
        status: ParticipantStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO roleplay_participants (roleplay_id, user_id, status) VALUES (?, ?, ?)
            ON CONFLICT (roleplay_id, user_id) DO UPDATE SET status = excluded.status
            "#,
        )
        .bind(roleplay_id)
        .bind(to_db(user_id.0))
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn participant(
        &self,
        roleplay_id: RoleplayId,
        user_id: UserId,
    ) -> Result<Option<Participant>, crate::Error> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            "SELECT roleplay_id, user_id, status FROM roleplay_participants \
             WHERE roleplay_id = ? AND user_id = ?",
        )
        .bind(roleplay_id)
        .bind(to_db(user_id.0))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Participant::try_from).transpose()?)
    }

    /// Every participant record of a roleplay, whatever its status.
    pub async fn participants(
        &self,
        roleplay_id: RoleplayId,
    ) -> Result<Vec<Participant>, crate::Error> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            "SELECT roleplay_id, user_id, status FROM roleplay_participants \
             WHERE roleplay_id = ? ORDER BY rowid",
        )
        .bind(roleplay_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(Participant::try_from)
            .collect::<anyhow::Result<_>>()?)
    }
}

// === message log ===

impl Store {
    /// Log a message, unless one with the same id is already logged. Returns whether it was new.
    pub async fn insert_message(&self, message: &RoleplayMessage) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO roleplay_messages
                (roleplay_id, message_id, author_id, author_nickname, contents, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.roleplay_id)
        .bind(to_db(message.message_id.0))
        .bind(to_db(message.author_id.0))
        .bind(&message.author_nickname)
        .bind(&message.contents)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// The message log of a roleplay, oldest first.
    pub async fn messages(
        &self,
        roleplay_id: RoleplayId,
    ) -> Result<Vec<RoleplayMessage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT roleplay_id, message_id, author_id, author_nickname, contents, timestamp
            FROM roleplay_messages WHERE roleplay_id = ? ORDER BY timestamp, message_id
            "#,
        )
        .bind(roleplay_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RoleplayMessage::from).collect())
    }

    /// The id of the most recent logged message, if any.
    pub async fn latest_message_id(
        &self,
        roleplay_id: RoleplayId,
    ) -> Result<Option<MessageId>, sqlx::Error> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(message_id) FROM roleplay_messages WHERE roleplay_id = ?",
        )
        .bind(roleplay_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id.map(|id| MessageId(from_db(id))))
    }
}
