//! Photos Picker API: create a session, let the user pick in the browser,
//! poll until the selection is made, then page through the picked items.

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::types::{PickedMediaItemsPage, PickingSession};
use super::{read_json, remote_item, ApiError, MediaSource};
use crate::sync::RemoteItem;

pub const PICKER_BASE_URL: &str = "https://photospicker.googleapis.com";

const PAGE_SIZE: u32 = 100;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Upper bound on any server-supplied wait, so deadline arithmetic cannot overflow.
const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

pub struct PickerSource {
    http: Client,
    base_url: String,
    access_token: String,
    shutdown_token: CancellationToken,
}

impl PickerSource {
    pub fn new(http: Client, access_token: &str, shutdown_token: CancellationToken) -> Self {
        Self {
            http,
            base_url: PICKER_BASE_URL.to_string(),
            access_token: access_token.to_string(),
            shutdown_token,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn create_session(&self) -> Result<PickingSession, ApiError> {
        let response = self
            .http
            .post(format!("{}/v1/sessions", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_session(&self, id: &str) -> Result<PickingSession, ApiError> {
        let response = self
            .http
            .get(format!("{}/v1/sessions/{}", self.base_url, id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_session(&self, id: &str) {
        let result = self
            .http
            .delete(format!("{}/v1/sessions/{}", self.base_url, id))
            .bearer_auth(&self.access_token)
            .send()
            .await;
        match result {
            Ok(r) if r.status().is_success() => tracing::debug!("Deleted picker session {}", id),
            Ok(r) => tracing::warn!("Failed to delete picker session {}: HTTP {}", id, r.status()),
            Err(e) => tracing::warn!("Failed to delete picker session {}: {}", id, e),
        }
    }

    /// Poll until the user has finished picking or the session times out.
    async fn wait_for_selection(&self, session: &PickingSession) -> Result<(), ApiError> {
        let polling = session.polling_config.as_ref();
        let timeout = polling
            .and_then(|p| p.timeout_in.as_deref())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_SESSION_TIMEOUT)
            .min(MAX_WAIT);
        let mut interval = polling
            .and_then(|p| p.poll_interval.as_deref())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
            .min(MAX_WAIT);
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() + interval > deadline {
                return Err(ApiError::PickerTimeout(timeout.as_secs()));
            }
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => return Err(ApiError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            let current = self.get_session(&session.id).await?;
            if current.media_items_set {
                return Ok(());
            }
            tracing::debug!("Waiting for picker selection");
            if let Some(next) = current
                .polling_config
                .as_ref()
                .and_then(|p| p.poll_interval.as_deref())
                .and_then(parse_duration)
            {
                interval = next.min(MAX_WAIT);
            }
        }
    }

    async fn picked_items(&self, session_id: &str) -> Result<Vec<RemoteItem>, ApiError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(format!("{}/v1/mediaItems", self.base_url))
                .bearer_auth(&self.access_token)
                .query(&[("sessionId", session_id)])
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: PickedMediaItemsPage = read_json(request.send().await?).await?;
            tracing::debug!("Got {} picked items", page.media_items.len());
            items.extend(
                page.media_items
                    .into_iter()
                    .map(|m| remote_item(m.id, &m.media_file.base_url)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for PickerSource {
    async fn list_items(&self) -> Result<Vec<RemoteItem>, ApiError> {
        let session = self.create_session().await?;
        match &session.picker_uri {
            Some(uri) => println!("Pick photos at: {}", uri),
            None => tracing::warn!("Picker session {} has no picker URI", session.id),
        }

        let result = match self.wait_for_selection(&session).await {
            Ok(()) => self.picked_items(&session.id).await,
            Err(e) => Err(e),
        };
        self.delete_session(&session.id).await;
        result
    }
}

/// Parse a protobuf JSON duration like `"5s"` or `"0.25s"`.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let secs: f64 = s.strip_suffix('s')?.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
