use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::{app::App, model::Roleplay};

/// What one pass of the sweeper did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub timed_out: usize,
    pub archived: usize,
}

/// Periodically stops idle roleplays and archives abandoned ones.
pub struct Sweeper {
    app: App,
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> anyhow::Result<DateTime<Utc>> {
    let age = chrono::Duration::from_std(age).context("sweep duration out of range")?;
    Ok(now - age)
}

impl Sweeper {
    pub fn new(app: App) -> Self {
        Sweeper { app }
    }

    /// Sweep once per interval, forever.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.app.config.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            every = %humantime::format_duration(self.app.config.sweep_interval),
            dry_run = self.app.config.dry_run,
            "starting sweeper"
        );

        loop {
            interval.tick().await;
            match self.sweep(Utc::now()).await {
                Ok(sweep) => tracing::debug!(?sweep, "sweep finished"),
                Err(error) => tracing::error!(error = ?error, "sweep failed"),
            }
        }
    }

    /// Run the timeout sweep, then the archive sweep, as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<Sweep> {
        let timed_out = self
            .timeout(now)
            .instrument(tracing::info_span!("timeout_sweep"))
            .await?;
        let archived = self
            .archive(now)
            .instrument(tracing::info_span!("archive_sweep"))
            .await?;
        Ok(Sweep {
            timed_out,
            archived,
        })
    }

    async fn timeout(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = cutoff(now, self.app.config.timeout)?;

        if self.app.config.dry_run {
            let expired = self.app.store.expired(cutoff).await?;
            for roleplay in &expired {
                tracing::info!(roleplay = %roleplay.name, "would stop idle roleplay (dry run)");
            }
            return Ok(expired.len());
        }

        let stopped = self
            .app
            .store
            .stop_expired(cutoff)
            .await
            .context("failed to stop idle roleplays")?;
        for roleplay in &stopped {
            tracing::info!(
                roleplay = %roleplay.name,
                server = %roleplay.server_id,
                "stopped idle roleplay"
            );
            self.app.channels.reconcile_best_effort(roleplay).await;
            self.notify_timeout(roleplay).await;
        }
        Ok(stopped.len())
    }

    async fn notify_timeout(&self, roleplay: &Roleplay) {
        let Some(channel) = roleplay.dedicated_channel_id else {
            return;
        };
        let notice = format!(
            "**{}** timed out after {} without activity. Start it again to keep playing.",
            roleplay.name,
            humantime::format_duration(self.app.config.timeout)
        );
        if let Err(error) = self.app.platform.send(channel, &notice).await {
            tracing::warn!(
                roleplay = %roleplay.name,
                error = ?error,
                "failed to post timeout notice"
            );
        }
    }

    async fn archive(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = cutoff(now, self.app.config.archive_after)?;

        if self.app.config.dry_run {
            let archivable = self.app.store.archivable(cutoff).await?;
            for roleplay in &archivable {
                tracing::info!(roleplay = %roleplay.name, "would archive roleplay (dry run)");
            }
            return Ok(archivable.len());
        }

        // The claim has already detached the channels; from here on nothing is retried.
        let claimed = self
            .app
            .store
            .claim_archivable(cutoff)
            .await
            .context("failed to claim roleplays for archival")?;
        for roleplay in &claimed {
            match self.app.roleplays.post_transcript(roleplay).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(roleplay = %roleplay.name, "no archive channel set"),
                Err(error) => tracing::warn!(
                    roleplay = %roleplay.name,
                    error = %error,
                    "failed to post transcript"
                ),
            }
            if let Some(channel_id) = roleplay.dedicated_channel_id {
                if let Err(error) = self.app.platform.delete_channel(channel_id).await {
                    tracing::warn!(
                        roleplay = %roleplay.name,
                        %channel_id,
                        error = ?error,
                        "failed to delete dedicated channel"
                    );
                }
            }
            tracing::info!(
                roleplay = %roleplay.name,
                server = %roleplay.server_id,
                "archived roleplay"
            );
        }
        Ok(claimed.len())
    }
}
