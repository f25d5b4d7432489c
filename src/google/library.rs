//! Photos Library API: items of one album, found by title.

use reqwest::Client;

use super::types::{AlbumsPage, LibraryMediaItemsPage, SearchRequest};
use super::{read_json, remote_item, ApiError, MediaSource};
use crate::sync::RemoteItem;

pub const LIBRARY_BASE_URL: &str = "https://photoslibrary.googleapis.com";

const ALBUM_PAGE_SIZE: u32 = 50;
const SEARCH_PAGE_SIZE: u32 = 100;

pub struct AlbumSource {
    http: Client,
    base_url: String,
    access_token: String,
    title: String,
}

impl AlbumSource {
    pub fn new(http: Client, access_token: &str, title: &str) -> Self {
        Self {
            http,
            base_url: LIBRARY_BASE_URL.to_string(),
            access_token: access_token.to_string(),
            title: title.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Page through the user's albums until one has a matching title.
    async fn find_album_id(&self) -> Result<String, ApiError> {
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(format!("{}/v1/albums", self.base_url))
                .bearer_auth(&self.access_token)
                .query(&[("pageSize", ALBUM_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: AlbumsPage = read_json(request.send().await?).await?;

            if let Some(album) = page
                .albums
                .into_iter()
                .find(|a| a.title.as_deref() == Some(self.title.as_str()))
            {
                tracing::debug!("Album '{}' has id {}", self.title, album.id);
                return Ok(album.id);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Err(ApiError::AlbumNotFound(self.title.clone())),
            }
        }
    }

    async fn album_items(&self, album_id: &str) -> Result<Vec<RemoteItem>, ApiError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = SearchRequest {
                album_id,
                page_size: SEARCH_PAGE_SIZE,
                page_token: page_token.as_deref(),
            };
            let response = self
                .http
                .post(format!("{}/v1/mediaItems:search", self.base_url))
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await?;
            let page: LibraryMediaItemsPage = read_json(response).await?;
            items.extend(
                page.media_items
                    .into_iter()
                    .map(|m| remote_item(m.id, &m.base_url)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }
}

#[async_trait::async_trait]
impl MediaSource for AlbumSource {
    async fn list_items(&self) -> Result<Vec<RemoteItem>, ApiError> {
        let album_id = self.find_album_id().await?;
        self.album_items(&album_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, title: &str) -> AlbumSource {
        AlbumSource::new(Client::new(), "tok", title).with_base_url(&server.uri())
    }

    async fn mount_albums(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/albums"))
            .and(query_param("pageToken", "a2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "albums": [{"id": "al-2", "title": "Frame"}]
            })))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/albums"))
            .and(query_param("pageSize", "50"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "albums": [{"id": "al-1", "title": "Holidays"}, {"id": "al-x"}],
                "nextPageToken": "a2"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_finds_album_on_second_page_and_lists_items() {
        let server = MockServer::start().await;
        mount_albums(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/mediaItems:search"))
            .and(body_partial_json(serde_json::json!({"albumId": "al-2", "pageToken": "m2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mediaItems": [{"id": "Z", "baseUrl": "https://lh3/Z"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/mediaItems:search"))
            .and(body_partial_json(serde_json::json!({"albumId": "al-2", "pageSize": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "mediaItems": [
                    {"id": "X", "baseUrl": "https://lh3/X"},
                    {"id": "Y", "baseUrl": "https://lh3/Y"}
                ],
                "nextPageToken": "m2"
            })))
            .mount(&server)
            .await;

        let items = source(&server, "Frame").list_items().await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["X", "Y", "Z"]);
        assert_eq!(items[2].download_url, "https://lh3/Z=d");
    }

    #[tokio::test]
    async fn test_unknown_album_title() {
        let server = MockServer::start().await;
        mount_albums(&server).await;

        let err = source(&server, "Nope").list_items().await.unwrap_err();
        assert!(matches!(err, ApiError::AlbumNotFound(t) if t == "Nope"));
    }

    #[tokio::test]
    async fn test_empty_album() {
        let server = MockServer::start().await;
        mount_albums(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/mediaItems:search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let items = source(&server, "Holidays").list_items().await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_is_status_error() {
        let server = MockServer::start().await;
        mount_albums(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/mediaItems:search"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = source(&server, "Holidays").list_items().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 403, .. }));
    }
}
