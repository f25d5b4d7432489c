//! gphotos-sync: mirror a set of Google Photos items into a local directory.
//!
//! The items come from the Photos Picker (or a Library album), access is
//! granted through OAuth2 with PKCE, and the directory is reconciled so it
//! holds exactly one `<id>.jpg` per remote item. Downloads run under a
//! fixed concurrency cap; a failed item never leaves a partial file behind.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod google;
mod shutdown;
mod sync;
mod types;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use google::{AlbumSource, ApiError, MediaSource, PickerSource};
use types::PickSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let config = config::Config::from_cli(cli)?;
    tracing::debug!(?config, "Resolved configuration");

    let http = reqwest::Client::builder()
        .user_agent(concat!("gphotos-sync/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let shutdown_token = shutdown::install_signal_handler()?;

    if config.auth_only {
        auth::authenticate(&http, &config.auth_settings(), auth::endpoints::Endpoints::google())
            .await?;
        tracing::info!("Token cached in {}", config.token_directory.display());
        return Ok(());
    }

    // Lock and inventory the directory before anything touches the network.
    let lock = sync::inventory::DirectoryLock::acquire(&config.directory).await?;
    tracing::debug!("Holding {}", lock.path().display());
    if !config.dry_run {
        sync::inventory::sweep_partials(&config.directory).await?;
    }
    let local = sync::inventory::scan(&config.directory).await?;
    tracing::debug!("{} files already in {}", local.len(), config.directory.display());

    let token = auth::authenticate(
        &http,
        &config.auth_settings(),
        auth::endpoints::Endpoints::google(),
    )
    .await?;
    tracing::debug!(expires_at = %token.expires_at, "Access token obtained");

    let source: Box<dyn MediaSource> = match &config.source {
        PickSource::Picker => Box::new(PickerSource::new(
            http.clone(),
            &token.secret,
            shutdown_token.clone(),
        )),
        PickSource::Album(title) => Box::new(AlbumSource::new(http.clone(), &token.secret, title)),
    };

    let remote = match source.list_items().await {
        Ok(items) => items,
        Err(ApiError::Cancelled) => {
            tracing::info!("Shutdown requested before any items were picked");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to list remote items"),
    };
    tracing::info!("Got {} photos", remote.len());

    let plan = sync::plan::plan(&remote, &local);
    if plan.is_empty() {
        tracing::info!("Already in sync");
    }

    let summary = sync::execute(
        &http,
        &plan,
        Some(&token.secret),
        &config.sync_config(),
        shutdown_token,
    )
    .await?;
    summary.log();
    drop(lock);

    Ok(())
}
