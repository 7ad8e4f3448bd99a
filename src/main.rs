mod action;

mod app;
mod channels;
mod characters;
mod commands;
mod config;
mod error;
pub use error::{Error, Result};

mod handler;
pub use handler::Handler;

mod model;
mod permissions;
mod platform;
mod roleplays;
mod social;
mod store;
mod sweeper;
mod transcript;
mod worker;

mod opt;
pub use opt::Opt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets may come from a `.env` file during development
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    use clap::Parser;
    Opt::parse().exec().await
}
