//! On-disk cache of the refresh token so later runs skip the browser.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

const TOKEN_FILE_NAME: &str = "tokens.json";

#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub refresh_token: String,
    /// Scope the refresh token was granted for.
    pub scope: String,
    pub saved_at: DateTime<Utc>,
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("refresh_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(token_dir: &Path) -> Self {
        Self {
            path: token_dir.join(TOKEN_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token. A missing or corrupt file means "no token".
    pub async fn load(&self) -> Option<StoredToken> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No token cache at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read token cache {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(token) => Some(token),
            Err(_) => {
                tracing::info!("Token cache corrupt, starting fresh");
                None
            }
        }
    }

    pub async fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create token directory {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(token)?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write token cache {}", self.path.display()))?;
        #[cfg(unix)]
        {
            // Refresh tokens are long-lived credentials; owner-only
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.path, perms).await?;
        }
        tracing::debug!("Saved token cache to {}", self.path.display());
        Ok(())
    }

    /// Forget the cached token, e.g. after the grant was revoked.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove token cache {}", self.path.display())
            }),
        }
    }
}
