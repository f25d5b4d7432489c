//! Loopback listener that receives the browser redirect carrying the
//! authorization code.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use super::error::AuthError;

/// Per-connection read budget, so one idle client cannot stall the wait.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// What a single request to the loopback server carried.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Redirect {
    Code(String),
    Error(String),
    MissingCode,
    NotFound,
    Malformed,
}

pub struct RedirectListener {
    listener: TcpListener,
    port: u16,
}

impl RedirectListener {
    /// Bind `127.0.0.1:port`. Port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| AuthError::Listener { port, source })?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Serve requests until one carries a code or an error.
    ///
    /// Stray requests (favicon, missing code) get a reply and the wait
    /// continues.
    pub async fn wait_for_code(&self, timeout: Duration) -> Result<String, AuthError> {
        tokio::time::timeout(timeout, self.serve())
            .await
            .map_err(|_| AuthError::RedirectTimeout(timeout.as_secs()))?
    }

    async fn serve(&self) -> Result<String, AuthError> {
        loop {
            let (mut stream, peer) = self.listener.accept().await?;
            let request = match read_request(&mut stream).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!("Dropping redirect connection from {}: {}", peer, e);
                    continue;
                }
            };

            match parse_redirect(&request) {
                Redirect::Code(code) => {
                    respond(&mut stream, "200 OK", "Done! You can close this tab.").await;
                    return Ok(code);
                }
                Redirect::Error(error) => {
                    respond(
                        &mut stream,
                        "200 OK",
                        &format!("Something went wrong: {}", error),
                    )
                    .await;
                    return Err(AuthError::Denied(error));
                }
                Redirect::MissingCode => {
                    respond(&mut stream, "400 Bad Request", "URL is missing code param").await;
                }
                Redirect::NotFound => {
                    respond(&mut stream, "404 Not Found", "Not found").await;
                }
                Redirect::Malformed => {
                    respond(&mut stream, "400 Bad Request", "Bad request").await;
                }
            }
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = vec![0u8; 8192];
    let read = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
    Ok(String::from_utf8_lossy(&buf[..read]).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!("Failed to answer redirect request: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// Classify the request line of an HTTP request to the redirect URI.
pub(crate) fn parse_redirect(request: &str) -> Redirect {
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
    else {
        return Redirect::Malformed;
    };
    let Ok(url) = Url::parse(&format!("http://127.0.0.1{}", target)) else {
        return Redirect::Malformed;
    };

    if url.path() != "/" {
        return Redirect::NotFound;
    }

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    if let Some(error) = param("error") {
        return Redirect::Error(error);
    }
    match param("code") {
        Some(code) if !code.is_empty() => Redirect::Code(code),
        _ => Redirect::MissingCode,
    }
}
