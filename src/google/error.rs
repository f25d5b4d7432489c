use thiserror::Error;

/// Failures listing remote items. All of them end the run.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Google Photos API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not find album '{0}'")]
    AlbumNotFound(String),

    #[error("Picker session expired after {0}s without a selection")]
    PickerTimeout(u64),

    #[error("Cancelled while waiting for the picker")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
