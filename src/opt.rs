use clap::Parser;

mod export;
mod serve;

#[derive(Debug, Clone, Parser)]
#[clap(author, version, about)]
pub struct Opt {
    #[clap(subcommand)]
    pub command: Command,
}

impl Opt {
    pub async fn exec(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve(serve) => serve.exec().await,
            Command::Export(export) => export.exec().await,
        }
    }
}

#[derive(Debug, Clone, Parser)]
pub enum Command {
    /// Run the bot.
    Serve(serve::Serve),
    /// Export the message log of a roleplay as CSV to stdout.
    Export(export::Export),
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Opt::command().debug_assert();
    }

    #[test]
    fn durations_are_humantime() {
        let opt = Opt::try_parse_from([
            "ambassador",
            "serve",
            "--timeout",
            "2days",
            "--sweep-interval",
            "15m",
            "--dry-run",
        ])
        .unwrap();
        let Command::Serve(serve) = opt.command else {
            panic!("expected serve");
        };
        let overrides = serve.overrides();
        assert_eq!(
            overrides.timeout,
            Some(std::time::Duration::from_secs(2 * 24 * 60 * 60))
        );
        assert_eq!(
            overrides.sweep_interval,
            Some(std::time::Duration::from_secs(15 * 60))
        );
        assert_eq!(overrides.archive_after, None);
        assert!(overrides.dry_run);
    }
}
