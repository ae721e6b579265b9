mod app;
mod cli;

use anyhow::Context;
use clap::Parser;
use routegate::{config, paths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol frames when serving; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path(args.config.clone())?;
    let cfg = match config::Config::load_optional(&config_path)? {
        Some(cfg) => cfg,
        None if args.config.is_some() => {
            anyhow::bail!("config file not found: {}", config_path.display())
        }
        None => {
            tracing::info!(path = %config_path.display(), "no config file; starting empty");
            config::Config::default()
        }
    };
    tracing::debug!(?config_path, ?cfg, "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    let gw = app::build_gateway(&http, &cfg)?;

    match args.cmd {
        cli::Command::Serve { framing } => app::cmd_serve(&gw, framing).await,
        cli::Command::Tools => app::cmd_tools(&gw).await,
        cli::Command::Call { name, args } => app::cmd_call(&gw, &name, args.as_deref()).await,
        cli::Command::Bridges => app::cmd_bridges(&gw, &cfg).await,
    }
}
