use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;

/// Suffix of the temp file a download streams into before it is published.
pub(crate) const PART_SUFFIX: &str = ".part";

/// `<dir>/<id>.jpg` -> `<dir>/<id>.jpg.part`
pub(crate) fn part_path(download_path: &Path) -> PathBuf {
    let mut name = OsString::from(download_path.as_os_str());
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Removes the `.part` file on drop unless the write completed.
///
/// Drop covers errors, timeouts and futures aborted by shutdown. A process
/// that dies without unwinding leaves only the `.part` file, which the next
/// run sweeps; the final name is never written in place.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Could not remove partial file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Fetch `url` and stream it into a new file at `download_path`.
///
/// The destination must not exist yet. On any failure the destination is
/// absent afterwards. Returns the number of bytes written.
pub async fn download_file(
    client: &Client,
    url: &str,
    access_token: Option<&str>,
    download_path: &Path,
) -> Result<u64, DownloadError> {
    let mut request = client.get(url);
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.map_err(DownloadError::Request)?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status().as_u16(),
        });
    }

    write_new_file(download_path, response.bytes_stream()).await
}

/// Stream `body` into `<download_path>.part`, then publish it under
/// `download_path`, failing if that name already exists.
pub(crate) async fn write_new_file<S, B>(
    download_path: &Path,
    body: S,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    write_new_file_with(download_path, body, |source, bytes_written| {
        DownloadError::Body {
            source,
            bytes_written,
        }
    })
    .await
}

async fn write_new_file_with<S, B, E, F>(
    download_path: &Path,
    body: S,
    on_body_error: F,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    F: Fn(E, u64) -> DownloadError,
{
    if fs::try_exists(download_path).await? {
        return Err(DownloadError::AlreadyExists(download_path.to_path_buf()));
    }

    let part = part_path(download_path);
    // A leftover from an earlier crash; the directory lock rules out a live writer.
    match fs::remove_file(&part).await {
        Ok(()) => tracing::debug!("Removed stale {}", part.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(DownloadError::Disk(e)),
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&part)
        .await?;
    let guard = PartialFile::new(&part);

    let mut bytes_written: u64 = 0;
    tokio::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| on_body_error(e, bytes_written))?;
        let chunk = chunk.as_ref();
        file.write_all(chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    publish(&part, download_path).await?;
    guard.keep();
    Ok(bytes_written)
}

/// Move a finished `.part` file to its final name without overwriting.
///
/// A hard link fails atomically if the destination exists. Filesystems
/// without hard links fall back to an existence check plus rename.
async fn publish(part: &Path, download_path: &Path) -> Result<(), DownloadError> {
    match fs::hard_link(part, download_path).await {
        Ok(()) => {
            if let Err(e) = fs::remove_file(part).await {
                tracing::warn!("Could not remove {}: {}", part.display(), e);
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(DownloadError::AlreadyExists(download_path.to_path_buf()))
        }
        Err(e) => {
            tracing::debug!("Hard link unavailable ({}), renaming", e);
            if fs::try_exists(download_path).await? {
                return Err(DownloadError::AlreadyExists(download_path.to_path_buf()));
            }
            fs::rename(part, download_path).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::fs;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_writes_body_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo=d"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("A.jpg");
        let url = format!("{}/photo=d", server.uri());
        let written = download_file(&Client::new(), &url, Some("tok"), &target)
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(fs::read(&target).unwrap(), b"jpeg-bytes");
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_download_http_error_creates_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("B.jpg");
        let err = download_file(&Client::new(), &server.uri(), None, &target)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::HttpStatus { status: 403 }));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_download_connection_error_creates_no_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("C.jpg");
        let err = download_file(&Client::new(), "http://127.0.0.1:1/x", None, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Request(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_existing_destination_is_left_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let target = dir.path().join("D.jpg");
        fs::write(&target, b"someone else's").unwrap();

        let err = download_file(&Client::new(), &server.uri(), None, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::AlreadyExists(_)));
        assert_eq!(fs::read(&target).unwrap(), b"someone else's");
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_removes_partial_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("E.jpg");
        let body = stream::iter(vec![
            Ok(b"first-chunk".to_vec()),
            Ok(b"second".to_vec()),
            Err("connection reset"),
        ]);

        let err = write_new_file_with(&target, body, |e, n| {
            DownloadError::Disk(std::io::Error::other(format!("{} after {}", e, n)))
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("connection reset after 17"));
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
    }

    #[tokio::test]
    async fn test_dropped_download_removes_partial_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("F.jpg");
        let body = stream::iter(vec![Ok::<_, ()>(b"partial".to_vec())])
            .chain(stream::pending());

        let write = write_new_file_with(&target, body, |_, _| DownloadError::Cancelled);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), write).await;

        assert!(timed_out.is_err());
        assert!(!target.exists());
        assert!(!part_path(&target).exists());
    }

    /// A process killed mid-download runs no destructors. Only the `.part`
    /// file may remain, and the next run must still fetch the item.
    #[tokio::test]
    async fn test_abandoned_download_never_occupies_final_name() {
        use crate::sync::{inventory, plan};
        use std::collections::BTreeSet;

        let dir = tempdir().unwrap();
        let target = dir.path().join("B.jpg");
        let body = stream::iter(vec![Ok::<_, ()>(b"half-a-jpeg".to_vec())])
            .chain(stream::pending());

        let mut write = Box::pin(write_new_file_with(&target, body, |_, _| {
            DownloadError::Cancelled
        }));
        let stalled =
            tokio::time::timeout(std::time::Duration::from_millis(100), &mut write).await;
        assert!(stalled.is_err());
        assert!(part_path(&target).exists());
        // No drop: the guard never runs.
        std::mem::forget(write);

        assert!(!target.exists());
        let local = inventory::scan(dir.path()).await.unwrap();
        assert!(local.is_empty());

        let swept = inventory::sweep_partials(dir.path()).await.unwrap();
        assert_eq!(swept, 1);
        assert!(!part_path(&target).exists());

        let remote = vec![plan::RemoteItem {
            id: "B".into(),
            download_url: "http://example.invalid/B=d".into(),
        }];
        let next = plan::plan(&remote, &BTreeSet::new());
        assert_eq!(next.to_download.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_part_file_is_replaced() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("H.jpg");
        fs::write(part_path(&target), b"old partial bytes").unwrap();

        let body = stream::iter(vec![Ok::<_, reqwest::Error>(b"fresh".to_vec())]);
        let written = write_new_file(&target, body).await.unwrap();

        assert_eq!(written, 5);
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
        assert!(!part_path(&target).exists());
    }

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/out/A.jpg")),
            PathBuf::from("/out/A.jpg.part")
        );
    }

    #[tokio::test]
    async fn test_empty_body_produces_empty_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("G.jpg");
        let body = stream::iter(Vec::<Result<Vec<u8>, reqwest::Error>>::new());
        let written = write_new_file(&target, body).await.unwrap();
        assert_eq!(written, 0);
        assert!(target.exists());
        assert!(!part_path(&target).exists());
    }
}
