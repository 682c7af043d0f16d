//! HTTP polling source.
//!
//! `HEAD` reports the current `Content-Length`; new bytes are fetched with a
//! `Range: bytes=start-end` request. Servers that ignore the range and answer
//! `200` get the body streamed and sliced locally.

use super::config::HttpSettings;
use super::source::LogSource;
use crate::error::{ConfigError, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};

pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(settings: &HttpSettings, file_name: &str) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: format!("{}/{}", settings.base_url.trim_end_matches('/'), file_name),
        })
    }
}

#[async_trait]
impl LogSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn size(&mut self) -> Result<Option<u64>, TransportError> {
        let resp = self.client.head(&self.url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let len = resp
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                Ok(Some(len))
            }
            status => Err(TransportError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            }),
        }
    }

    async fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>, TransportError> {
        if end <= start {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .get(&self.url)
            .header(RANGE, format!("bytes={}-{}", start, end - 1))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let want = (end - start) as usize;
        if status == StatusCode::PARTIAL_CONTENT {
            let body = resp.bytes().await?;
            return Ok(body[..body.len().min(want)].to_vec());
        }

        // Full body: stream it, keep the requested window, stop at `end`
        let mut window = Vec::with_capacity(want);
        let mut pos: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let chunk_start = pos;
            let chunk_end = pos + chunk.len() as u64;
            pos = chunk_end;
            if chunk_end <= start {
                continue;
            }
            let from = start.saturating_sub(chunk_start) as usize;
            let to = (end.min(chunk_end) - chunk_start) as usize;
            window.extend_from_slice(&chunk[from..to]);
            if chunk_end >= end {
                break;
            }
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-request-per-connection HTTP server. `honor_range` toggles 206 vs 200.
    async fn spawn_server(body: &'static str, honor_range: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut buf = vec![0u8; 4096];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();

                let response = if request.contains("missing.log") {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                } else if request.starts_with("HEAD") {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                } else {
                    let range = request
                        .lines()
                        .find_map(|l| l.to_lowercase().strip_prefix("range: bytes=").map(str::to_string));
                    match (honor_range, range) {
                        (true, Some(range)) => {
                            let (s, e) = range.split_once('-').unwrap();
                            let (s, e): (usize, usize) = (s.parse().unwrap(), e.trim().parse().unwrap());
                            let slice = &body[s..=e];
                            format!(
                                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                slice.len(),
                                slice
                            )
                        }
                        _ => format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        ),
                    }
                };
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    fn settings(base_url: String) -> HttpSettings {
        HttpSettings {
            base_url,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_ranged_read() {
        let base = spawn_server("first\nsecond\n", true).await;
        let mut source = HttpSource::new(&settings(base), "console.log").unwrap();

        assert_eq!(source.size().await.unwrap(), Some(13));
        assert_eq!(source.read_range(6, 13).await.unwrap(), b"second\n");
    }

    #[tokio::test]
    async fn test_range_ignored_by_server() {
        let base = spawn_server("first\nsecond\n", false).await;
        let mut source = HttpSource::new(&settings(base), "console.log").unwrap();

        assert_eq!(source.read_range(6, 13).await.unwrap(), b"second\n");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let base = spawn_server("", true).await;
        let mut source = HttpSource::new(&settings(base), "missing.log").unwrap();
        assert_eq!(source.size().await.unwrap(), None);
    }
}
