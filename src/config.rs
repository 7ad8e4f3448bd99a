//! Runtime configuration.
//!
//! Values come from command-line flags, then an optional TOML file, then built-in defaults,
//! in that order of precedence.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(72 * 60 * 60);
pub const DEFAULT_ARCHIVE_AFTER: Duration = Duration::from_secs(28 * 24 * 60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// The contents of a configuration file. Durations are written the way `humantime` reads them,
/// e.g. `"72h"` or `"4weeks"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub prefix: Option<String>,
    pub timeout: Option<String>,
    pub archive_after: Option<String>,
    pub sweep_interval: Option<String>,
    pub eight_ball_answers: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Values given on the command line, which win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub prefix: Option<String>,
    pub timeout: Option<Duration>,
    pub archive_after: Option<Duration>,
    pub sweep_interval: Option<Duration>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// What chat commands start with.
    pub prefix: String,
    /// How long a running roleplay may go quiet before it is stopped.
    pub timeout: Duration,
    /// How long a roleplay may go quiet before its channel is archived.
    pub archive_after: Duration,
    pub sweep_interval: Duration,
    pub eight_ball_answers: Vec<String>,
    /// Sweeps only report what they would do.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prefix: DEFAULT_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
            archive_after: DEFAULT_ARCHIVE_AFTER,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            eight_ball_answers: Vec::new(),
            dry_run: false,
        }
    }
}

fn file_duration(field: &str, value: Option<String>) -> anyhow::Result<Option<Duration>> {
    value
        .map(|v| humantime::parse_duration(&v).with_context(|| format!("invalid `{}`", field)))
        .transpose()
}

impl Config {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> anyhow::Result<Self> {
        let defaults = Config::default();
        let config = Config {
            prefix: overrides
                .prefix
                .or(file.prefix)
                .unwrap_or(defaults.prefix),
            timeout: overrides
                .timeout
                .or(file_duration("timeout", file.timeout)?)
                .unwrap_or(defaults.timeout),
            archive_after: overrides
                .archive_after
                .or(file_duration("archive_after", file.archive_after)?)
                .unwrap_or(defaults.archive_after),
            sweep_interval: overrides
                .sweep_interval
                .or(file_duration("sweep_interval", file.sweep_interval)?)
                .unwrap_or(defaults.sweep_interval),
            eight_ball_answers: file.eight_ball_answers,
            dry_run: overrides.dry_run,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.prefix.trim().is_empty() || self.prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("the command prefix must be non-empty and contain no whitespace");
        }
        for (name, duration) in [
            ("timeout", self.timeout),
            ("archive-after", self.archive_after),
            ("sweep-interval", self.sweep_interval),
        ] {
            if duration.is_zero() {
                anyhow::bail!("{} must be non-zero", name);
            }
        }
        if self.archive_after < self.timeout {
            anyhow::bail!("archive-after must not be shorter than timeout");
        }
        Ok(())
    }
}
