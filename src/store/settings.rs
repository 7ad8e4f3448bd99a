use serenity::model::id::{ChannelId, GuildId, RoleId};
use sqlx::FromRow;

use super::{from_db, to_db, Store};
use crate::model::ServerSettings;

#[derive(Debug, FromRow)]
struct SettingsRow {
    server_id: i64,
    archive_channel: Option<i64>,
    default_role: Option<i64>,
    dedicated_category: Option<i64>,
    allow_nsfw: bool,
}

impl From<SettingsRow> for ServerSettings {
    fn from(row: SettingsRow) -> Self {
        ServerSettings {
            server_id: GuildId(from_db(row.server_id)),
            archive_channel: row.archive_channel.map(|id| ChannelId(from_db(id))),
            default_role: row.default_role.map(|id| RoleId(from_db(id))),
            dedicated_category: row.dedicated_category.map(|id| ChannelId(from_db(id))),
            allow_nsfw: row.allow_nsfw,
        }
    }
}

impl Store {
    /// The settings of a server, or the defaults if none were ever saved.
    pub async fn server_settings(&self, server_id: GuildId) -> Result<ServerSettings, sqlx::Error> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT server_id, archive_channel, default_role, dedicated_category, allow_nsfw
            FROM server_settings WHERE server_id = ?
            "#,
        )
        .bind(to_db(server_id.0))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(ServerSettings::from)
            .unwrap_or_else(|| ServerSettings::new(server_id)))
    }

    pub async fn save_server_settings(&self, settings: &ServerSettings) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO server_settings
                (server_id, archive_channel, default_role, dedicated_category, allow_nsfw)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (server_id) DO UPDATE SET
                archive_channel = excluded.archive_channel,
                default_role = excluded.default_role,
                dedicated_category = excluded.dedicated_category,
                allow_nsfw = excluded.allow_nsfw
            "#,
        )
        .bind(to_db(settings.server_id.0))
        .bind(settings.archive_channel.map(|id| to_db(id.0)))
        .bind(settings.default_role.map(|id| to_db(id.0)))
        .bind(settings.dedicated_category.map(|id| to_db(id.0)))
        .bind(settings.allow_nsfw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
