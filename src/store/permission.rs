use serenity::model::id::{GuildId, UserId};
use sqlx::FromRow;

use super::{from_db, to_db, Store};
use crate::model::{PermissionKind, PermissionTarget, UserPermission};

#[derive(Debug, FromRow)]
struct PermissionRow {
    server_id: i64,
    user_id: i64,
    permission: String,
    target: String,
    granted: bool,
}

impl TryFrom<PermissionRow> for UserPermission {
    type Error = anyhow::Error;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        Ok(UserPermission {
            server_id: GuildId(from_db(row.server_id)),
            user_id: UserId(from_db(row.user_id)),
            kind: row.permission.parse()?,
            target: row.target.parse()?,
            granted: row.granted,
        })
    }
}

impl Store {
    /// The explicit grant stored for a user, if any.
    pub async fn user_permission(
        &self,
        server_id: GuildId,
        user_id: UserId,
        kind: PermissionKind,
        target: PermissionTarget,
    ) -> Result<Option<bool>, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT granted FROM user_permissions
            WHERE server_id = ? AND user_id = ? AND permission = ? AND target = ?
            "#,
        )
        .bind(to_db(server_id.0))
        .bind(to_db(user_id.0))
        .bind(kind.as_str())
        .bind(target.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn set_user_permission(
        &self,
        permission: &UserPermission,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_permissions (server_id, user_id, permission, target, granted)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (server_id, user_id, permission, target)
                DO UPDATE SET granted = excluded.granted
            "#,
        )
        .bind(to_db(permission.server_id.0))
        .bind(to_db(permission.user_id.0))
        .bind(permission.kind.as_str())
        .bind(permission.target.as_str())
        .bind(permission.granted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every explicit grant stored for a user.
    pub async fn user_permissions(
        &self,
        server_id: GuildId,
        user_id: UserId,
    ) -> Result<Vec<UserPermission>, crate::Error> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT server_id, user_id, permission, target, granted FROM user_permissions
            WHERE server_id = ? AND user_id = ? ORDER BY permission, target
            "#,
        )
        .bind(to_db(server_id.0))
        .bind(to_db(user_id.0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(UserPermission::try_from)
            .collect::<anyhow::Result<_>>()?)
    }
}
