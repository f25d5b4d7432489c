use std::path::PathBuf;
use std::time::Duration;

use crate::auth::AuthSettings;
use crate::sync::SyncConfig;
use crate::types::PickSource;

/// Application configuration, resolved from the CLI.
pub struct Config {
    pub directory: PathBuf,
    pub token_directory: PathBuf,
    pub client_id: String,
    pub client_secret: String,
    pub source: PickSource,

    pub auth_timeout: Duration,
    pub item_timeout: Option<Duration>,

    pub concurrency: usize,
    pub redirect_port: u16,

    pub auth_only: bool,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("directory", &self.directory)
            .field("token_directory", &self.token_directory)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("source", &self.source)
            .field("concurrency", &self.concurrency)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: crate::cli::Cli) -> anyhow::Result<Self> {
        if cli.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }
        if cli.client_id.trim().is_empty() || cli.client_secret.trim().is_empty() {
            anyhow::bail!(
                "OAuth client credentials are empty; set --client-id/--client-secret \
                 or GPHOTOS_CLIENT_ID/GPHOTOS_CLIENT_SECRET"
            );
        }
        if cli.item_timeout == Some(0) {
            anyhow::bail!("--item-timeout must be at least 1 second");
        }

        let source = match cli.album {
            Some(title) if !title.is_empty() => PickSource::Album(title),
            Some(_) => anyhow::bail!("--album must not be empty"),
            None => PickSource::Picker,
        };

        Ok(Self {
            directory: expand_tilde(&cli.directory),
            token_directory: expand_tilde(&cli.token_directory),
            client_id: cli.client_id,
            client_secret: cli.client_secret,
            source,
            auth_timeout: Duration::from_secs(cli.auth_timeout),
            item_timeout: cli.item_timeout.map(Duration::from_secs),
            concurrency: cli.concurrency,
            redirect_port: cli.redirect_port,
            auth_only: cli.auth_only,
            dry_run: cli.dry_run,
            no_progress_bar: cli.no_progress_bar,
        })
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scope: self.source.scope().to_string(),
            redirect_port: self.redirect_port,
            redirect_timeout: self.auth_timeout,
            token_directory: self.token_directory.clone(),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            directory: self.directory.clone(),
            concurrency: self.concurrency,
            item_timeout: self.item_timeout,
            dry_run: self.dry_run,
            no_progress_bar: self.no_progress_bar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::endpoints::{LIBRARY_SCOPE, PICKER_SCOPE};
    use clap::Parser;

    fn make_cli(overrides: impl FnOnce(&mut crate::cli::Cli)) -> crate::cli::Cli {
        let mut cli = crate::cli::Cli::try_parse_from([
            "gphotos-sync",
            "--client-id",
            "cid",
            "--client-secret",
            "csecret",
        ])
        .unwrap();
        overrides(&mut cli);
        cli
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/.gphotos-sync");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join(".gphotos-sync"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_tilde("output"), PathBuf::from("output"));
    }

    #[test]
    fn test_defaults_use_picker() {
        let cfg = Config::from_cli(make_cli(|_| {})).unwrap();
        assert_eq!(cfg.source, PickSource::Picker);
        assert_eq!(cfg.auth_settings().scope, PICKER_SCOPE);
        assert_eq!(cfg.directory, PathBuf::from("output"));
        assert_eq!(cfg.auth_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_album_uses_library_scope() {
        let cfg = Config::from_cli(make_cli(|c| c.album = Some("Frame".into()))).unwrap();
        assert_eq!(cfg.source, PickSource::Album("Frame".into()));
        assert_eq!(cfg.auth_settings().scope, LIBRARY_SCOPE);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(Config::from_cli(make_cli(|c| c.concurrency = 0)).is_err());
    }

    #[test]
    fn test_blank_credentials_rejected() {
        assert!(Config::from_cli(make_cli(|c| c.client_secret = "  ".into())).is_err());
    }

    #[test]
    fn test_zero_item_timeout_rejected() {
        assert!(Config::from_cli(make_cli(|c| c.item_timeout = Some(0))).is_err());
    }

    #[test]
    fn test_sync_config_passthrough() {
        let cfg = Config::from_cli(make_cli(|c| {
            c.concurrency = 4;
            c.item_timeout = Some(30);
            c.dry_run = true;
        }))
        .unwrap();
        let sync = cfg.sync_config();
        assert_eq!(sync.concurrency, 4);
        assert_eq!(sync.item_timeout, Some(Duration::from_secs(30)));
        assert!(sync.dry_run);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cfg = Config::from_cli(make_cli(|_| {})).unwrap();
        assert!(!format!("{:?}", cfg).contains("csecret"));
    }
}
