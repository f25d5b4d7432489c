//! Remote item listing from Google Photos.
//!
//! Two sources produce the flat `(id, download URL)` list the sync engine
//! consumes: the Photos Picker, where the user selects items in a browser,
//! and a Photos Library album looked up by title.

pub mod error;
pub mod library;
pub mod picker;
pub mod types;

use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::sync::RemoteItem;

pub use self::error::ApiError;
pub use self::library::AlbumSource;
pub use self::picker::PickerSource;

/// Anything that can enumerate the remote item set for one run.
#[async_trait::async_trait]
pub trait MediaSource: Send + Sync {
    async fn list_items(&self) -> Result<Vec<RemoteItem>, ApiError>;
}

/// `=d` asks the media server for the original bytes.
pub(crate) fn remote_item(id: String, base_url: &str) -> RemoteItem {
    RemoteItem {
        id,
        download_url: format!("{}=d", base_url),
    }
}

/// Decode a JSON body, turning non-success statuses into [`ApiError::Status`].
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_item_appends_download_suffix() {
        let item = remote_item("abc".into(), "https://lh3.googleusercontent.com/xyz");
        assert_eq!(item.id, "abc");
        assert_eq!(
            item.download_url,
            "https://lh3.googleusercontent.com/xyz=d"
        );
    }
}
