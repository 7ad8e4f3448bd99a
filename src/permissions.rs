//! Gating of bot commands.
//!
//! Users hold each [`PermissionKind`] separately for their own things ([`PermissionTarget::Own`])
//! and for other people's ([`PermissionTarget::Other`]). Explicit grants are stored per server;
//! [`default_grant`] applies otherwise. Server owners and administrators pass every check.

use std::sync::Arc;

use serenity::model::id::{GuildId, UserId};

use crate::{
    model::{PermissionKind, PermissionTarget, UserPermission},
    platform::Platform,
    store::Store,
    Error, Result,
};

/// Whether a permission is held when nothing was granted explicitly.
pub fn default_grant(kind: PermissionKind, target: PermissionTarget) -> bool {
    match target {
        PermissionTarget::Other => false,
        PermissionTarget::Own => !matches!(
            kind,
            PermissionKind::ManagePermissions | PermissionKind::EditServerSettings
        ),
    }
}

#[derive(Clone)]
pub struct Access {
    store: Store,
    platform: Arc<dyn Platform>,
}

impl Access {
    pub fn new(store: Store, platform: Arc<dyn Platform>) -> Self {
        Access { store, platform }
    }

    /// Whether `user` may perform `kind` on things owned by `target`.
    pub async fn check(
        &self,
        server: GuildId,
        user: UserId,
        kind: PermissionKind,
        target: PermissionTarget,
    ) -> Result<bool> {
        if self.platform.is_administrator(server, user).await? {
            return Ok(true);
        }
        let explicit = self
            .store
            .user_permission(server, user, kind, target)
            .await?;
        Ok(explicit.unwrap_or_else(|| default_grant(kind, target)))
    }

    /// Like [`check`](Self::check), failing with [`Error::Denied`] when not permitted.
    pub async fn require(
        &self,
        server: GuildId,
        user: UserId,
        kind: PermissionKind,
        target: PermissionTarget,
    ) -> Result<()> {
        if self.check(server, user, kind, target).await? {
            Ok(())
        } else {
            tracing::debug!(%user, %kind, %target, "permission denied");
            Err(Error::denied(format!(
                "You don't have permission to do that (requires `{}` for `{}`).",
                kind, target
            )))
        }
    }

    pub async fn grant(
        &self,
        server: GuildId,
        user: UserId,
        kind: PermissionKind,
        target: PermissionTarget,
    ) -> Result<()> {
        self.set(server, user, kind, target, true).await
    }

    pub async fn revoke(
        &self,
        server: GuildId,
        user: UserId,
        kind: PermissionKind,
        target: PermissionTarget,
    ) -> Result<()> {
        self.set(server, user, kind, target, false).await
    }

    async fn set(
        &self,
        server: GuildId,
        user: UserId,
        kind: PermissionKind,
        target: PermissionTarget,
        granted: bool,
    ) -> Result<()> {
        self.store
            .set_user_permission(&UserPermission {
                server_id: server,
                user_id: user,
                kind,
                target,
                granted,
            })
            .await?;
        tracing::info!(%server, %user, %kind, %target, granted, "updated permission");
        Ok(())
    }

    /// Every permission a user effectively holds, explicit or default, in declaration order.
    pub async fn effective(
        &self,
        server: GuildId,
        user: UserId,
    ) -> Result<Vec<(PermissionKind, PermissionTarget)>> {
        let explicit = self.store.user_permissions(server, user).await?;
        let mut held = Vec::new();
        for kind in PermissionKind::ALL {
            for target in [PermissionTarget::Own, PermissionTarget::Other] {
                let granted = explicit
                    .iter()
                    .find(|p| p.kind == kind && p.target == target)
                    .map(|p| p.granted)
                    .unwrap_or_else(|| default_grant(kind, target));
                if granted {
                    held.push((kind, target));
                }
            }
        }
        Ok(held)
    }
}
