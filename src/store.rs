//! Persistent state, kept in SQLite.
//!
//! The schema is created idempotently when a [`Store`] is opened. Discord ids are stored as
//! 64-bit signed integers; snowflakes never use the sign bit.

use std::{str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

mod character;
mod permission;
mod roleplay;
mod settings;

pub use roleplay::RoleplayUpdate;

/// Handle to the bot's database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the database at `database_url`, creating the schema if needed.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - in-memory database (see [`Store::in_memory`])
    /// - `sqlite:///var/lib/ambassador/ambassador.sqlite?mode=rwc` - file-based, create if missing
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {}", database_url))?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("failed to open database")?;

        let store = Store { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// An ephemeral database living in a single connection.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory database")?;

        let store = Store { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roleplays (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id INTEGER NOT NULL,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                is_nsfw INTEGER NOT NULL DEFAULT 0,
                is_public INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 0,
                dedicated_channel_id INTEGER,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_roleplays_server_name
                ON roleplays(server_id, name COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_roleplays_channel ON roleplays(dedicated_channel_id);
            CREATE INDEX IF NOT EXISTS idx_roleplays_last_updated ON roleplays(last_updated);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create roleplay tables")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roleplay_participants (
                roleplay_id INTEGER NOT NULL REFERENCES roleplays(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (roleplay_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS roleplay_messages (
                roleplay_id INTEGER NOT NULL REFERENCES roleplays(id) ON DELETE CASCADE,
                message_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                author_nickname TEXT NOT NULL,
                contents TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (roleplay_id, message_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create participant tables")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS server_settings (
                server_id INTEGER PRIMARY KEY,
                archive_channel INTEGER,
                default_role INTEGER,
                dedicated_category INTEGER,
                allow_nsfw INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS user_permissions (
                server_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                permission TEXT NOT NULL,
                target TEXT NOT NULL,
                granted INTEGER NOT NULL,
                PRIMARY KEY (server_id, user_id, permission, target)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create settings tables")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id INTEGER NOT NULL,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                nickname TEXT,
                summary TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                avatar_url TEXT,
                pronouns TEXT NOT NULL DEFAULT '',
                is_current INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_characters_owner_name
                ON characters(server_id, owner_id, name COLLATE NOCASE);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create character tables")?;

        Ok(())
    }
}

fn to_db(id: u64) -> i64 {
    id as i64
}

fn from_db(id: i64) -> u64 {
    id as u64
}
