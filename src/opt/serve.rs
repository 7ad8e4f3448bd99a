use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use serenity::prelude::GatewayIntents;
use tap::Tap;
use tokio::sync::mpsc;

use crate::{
    action::{Action, ActionQueue},
    app::App,
    config::{Config, FileConfig, Overrides},
    platform::Discord,
    store::Store,
    sweeper::Sweeper,
    worker::Worker,
    Handler,
};

/// How many actions may wait for the worker before the event handler blocks.
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Parser)]
pub struct Serve {
    /// Path to the directory to use to store data [default: platform appdata directory].
    #[clap(long, short)]
    data_dir: Option<PathBuf>,
    /// SQLite database URL [default: the `ambassador.sqlite` file in the data directory].
    #[clap(long)]
    database_url: Option<String>,
    /// TOML configuration file. Flags given here take precedence over it.
    #[clap(long, short)]
    config: Option<PathBuf>,
    /// What chat commands start with [default: "!"].
    #[clap(long)]
    prefix: Option<String>,
    /// How long a running roleplay may go quiet before it is stopped (e.g. "72h") [default: 72h].
    #[clap(long, parse(try_from_str = humantime::parse_duration))]
    timeout: Option<Duration>,
    /// How long a roleplay may go quiet before its channel is archived [default: 28days].
    #[clap(long, parse(try_from_str = humantime::parse_duration))]
    archive_after: Option<Duration>,
    /// How often to look for idle roleplays [default: 1h].
    #[clap(long, parse(try_from_str = humantime::parse_duration))]
    sweep_interval: Option<Duration>,
    /// Report what sweeps would do without changing anything. Commands still run.
    #[clap(long)]
    dry_run: bool,
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    Ok(ProjectDirs::from("chat", "ambassador", "ambassador")
        .context("can't determine the platform data directory; pass --data-dir")?
        .data_dir()
        .to_owned())
}

fn database_url(data_dir: &Path) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        data_dir.join("ambassador.sqlite").display()
    )
}

impl Serve {
    pub(super) fn overrides(&self) -> Overrides {
        Overrides {
            prefix: self.prefix.clone(),
            timeout: self.timeout,
            archive_after: self.archive_after,
            sweep_interval: self.sweep_interval,
            dry_run: self.dry_run,
        }
    }

    /// Run the bot, listening for commands and roleplay messages, and sweeping idle roleplays.
    ///
    /// This function should never return, unless an error of some kind is encountered.
    pub async fn exec(self) -> anyhow::Result<()> {
        let config = self
            .preflight_checks()
            .await
            .context("failed preflight checks")?;

        let discord_token = env::var("DISCORD_TOKEN")?;

        let database_url = match self.database_url.clone() {
            Some(url) => url,
            None => {
                let data_dir = match self.data_dir.clone() {
                    Some(dir) => dir,
                    None => default_data_dir()?,
                };
                std::fs::create_dir_all(&data_dir).context("can create data dir")?;
                database_url(&data_dir)
            }
        };
        tracing::debug!(%database_url, "opening database");
        let store = Store::connect(&database_url).await?;

        // Make a client for discord, feeding actions to the worker
        let (actions_tx, actions_rx) = mpsc::channel(QUEUE_CAPACITY);
        let mut discord_client = Self::discord_client(discord_token, &config, actions_tx).await?;
        let platform = Discord::new(
            discord_client.cache_and_http.http.clone(),
            discord_client.cache_and_http.cache.clone(),
        )
        .await?;
        let app = App::new(store, Arc::new(platform), config);

        let worker = tokio::spawn(Worker::new(app.clone(), actions_rx).run());
        let discord = tokio::spawn(async move { discord_client.start().await });
        let sweeper = tokio::spawn(Sweeper::new(app).run());

        // Run the client, the worker and the sweeper; the first to stop takes the bot down.
        tokio::select! {
            result = worker => {
                result.context("worker panicked")?;
                Err(anyhow::anyhow!("worker stopped"))
            }
            result = discord => result
                .context("discord client panicked")?
                .context("error in discord client service"),
            result = sweeper => result
                .context("sweeper panicked")?
                .context("error in sweeper service"),
        }
    }

    /// Configures a new discord [`Client`][serenity::Client].
    ///
    /// This will configure a [`Handler`] to handle events, and will send the actions it derives
    /// from messages to the provided [`mpsc`] channel.
    async fn discord_client(
        token: impl AsRef<str>,
        config: &Config,
        actions: mpsc::Sender<Action>,
    ) -> anyhow::Result<serenity::Client> {
        let handler = Handler::new(config.prefix.clone());

        tracing::debug!("configuring discord client");
        let discord_client = serenity::Client::builder(
            &token,
            GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT,
        )
        .event_handler(handler)
        .await?;

        // Put the sending end of the action queue into the global TypeMap
        discord_client
            .data
            .write()
            .await
            .insert::<ActionQueue>(actions);

        Ok(discord_client)
    }

    /// Perform sanity checks on CLI args and configuration prior to running.
    async fn preflight_checks(&self) -> anyhow::Result<Config> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let config = Config::resolve(file, self.overrides())?.tap(|config| {
            tracing::info!(
                prefix = %config.prefix,
                timeout = %humantime::format_duration(config.timeout),
                archive_after = %humantime::format_duration(config.archive_after),
                "resolved configuration"
            )
        });
        if config.dry_run {
            tracing::info!("dry-run mode is enabled, sweeps won't change anything");
        }

        tracing::debug!("checking discord token...");
        let discord_token =
            env::var("DISCORD_TOKEN").context("missing environment variable DISCORD_TOKEN")?;
        if discord_token.trim().is_empty() {
            anyhow::bail!("environment variable DISCORD_TOKEN is empty");
        }
        Ok(config)
    }
}
