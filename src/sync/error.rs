use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Run-aborting failures of the sync engine.
///
/// These surface before any download or delete work starts.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cannot read output directory {}: {source}", .path.display())]
    Inventory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot lock output directory {}: {reason}", .path.display())]
    Lock { path: PathBuf, reason: String },

    #[error(transparent)]
    Limiter(#[from] super::limiter::LimiterError),
}

/// Failure of a single item's download. Isolated to that item: recorded
/// in the run summary, never propagated past the item boundary.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("response body interrupted after {bytes_written} bytes: {source}")]
    Body {
        source: reqwest::Error,
        bytes_written: u64,
    },

    #[error("destination {} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl DownloadError {
    /// Whether the item never made it to the network because the run was
    /// shutting down.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message() {
        let e = DownloadError::HttpStatus { status: 404 };
        assert_eq!(e.to_string(), "HTTP status 404");
    }

    #[test]
    fn test_already_exists_message_names_path() {
        let e = DownloadError::AlreadyExists(PathBuf::from("/out/abc.jpg"));
        assert_eq!(e.to_string(), "destination /out/abc.jpg already exists");
    }

    #[test]
    fn test_timeout_message() {
        let e = DownloadError::Timeout(Duration::from_secs(30));
        assert_eq!(e.to_string(), "timed out after 30s");
    }

    #[test]
    fn test_only_cancelled_is_cancelled() {
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::Disk(std::io::Error::other("disk full")).is_cancelled());
    }

    #[test]
    fn test_inventory_error_names_directory() {
        let e = SyncError::Inventory {
            path: PathBuf::from("/missing"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(e.to_string().starts_with("Cannot read output directory /missing"));
    }
}
