use clap::Parser;

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "gphotos-sync",
    version,
    about = "Mirror a selection of Google Photos into a local directory"
)]
pub struct Cli {
    /// Local directory to mirror into (must exist)
    #[arg(short = 'd', long, default_value = "output")]
    pub directory: String,

    /// Maximum number of simultaneous downloads
    #[arg(short = 'c', long, default_value_t = 10)]
    pub concurrency: usize,

    /// OAuth client id of your Google Cloud project
    #[arg(long, env = "GPHOTOS_CLIENT_ID", hide_env_values = true)]
    pub client_id: String,

    /// OAuth client secret.
    /// Prefer the GPHOTOS_CLIENT_SECRET environment variable; arguments
    /// are visible in process listings.
    #[arg(long, env = "GPHOTOS_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Directory for the cached refresh token
    #[arg(long, default_value = "~/.gphotos-sync")]
    pub token_directory: String,

    /// Sync a Library album by title instead of picking items in the browser
    #[arg(short = 'a', long)]
    pub album: Option<String>,

    /// Local port for the OAuth redirect
    #[arg(long, default_value_t = 3000)]
    pub redirect_port: u16,

    /// Seconds to wait for the browser authorization
    #[arg(long, default_value_t = 300)]
    pub auth_timeout: u64,

    /// Per-item download timeout in seconds
    #[arg(long)]
    pub item_timeout: Option<u64>,

    /// Only authenticate (create/refresh the cached token)
    #[arg(long)]
    pub auth_only: bool,

    /// Show what would be downloaded and deleted without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["gphotos-sync", "--client-id", "cid", "--client-secret", "cs"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.directory, "output");
        assert_eq!(cli.concurrency, 10);
        assert_eq!(cli.redirect_port, 3000);
        assert_eq!(cli.auth_timeout, 300);
        assert_eq!(cli.token_directory, "~/.gphotos-sync");
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(cli.album.is_none());
        assert!(cli.item_timeout.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&["-d", "/tmp/frame", "-c", "3", "-a", "Frame"]);
        assert_eq!(cli.directory, "/tmp/frame");
        assert_eq!(cli.concurrency, 3);
        assert_eq!(cli.album.as_deref(), Some("Frame"));
    }

    #[test]
    fn test_log_level_values() {
        assert_eq!(parse(&["--log-level", "warn"]).log_level, LogLevel::Warn);
        assert!(Cli::try_parse_from([
            "gphotos-sync",
            "--client-id",
            "a",
            "--client-secret",
            "b",
            "--log-level",
            "loud"
        ])
        .is_err());
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
