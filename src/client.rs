use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::fs_util;
use crate::progress::{ProgressEvent, ProgressSink, TransferProgress};

const MAX_BODY_EXCERPT: usize = 500;
const READ_BUFFER: usize = 64 * 1024;
/// Bytes between two progress events of a streaming download.
pub const PROGRESS_CHUNK: u64 = 8 * 1024 * 1024;

/// A response body staged on disk, not yet moved to its destination.
#[derive(Debug)]
pub struct Download {
    pub file: NamedTempFile,
    pub bytes: u64,
}

/// GET access to the Knowledge Center API.
///
/// Implementations own retry handling: a returned error is terminal for that
/// request.
pub trait ApiClient: Send + Sync {
    fn config(&self) -> &ClientConfig;

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, FetchError>;

    /// Fetches `path` into a staging file inside `staging_dir`.
    fn download(
        &self,
        path: &str,
        staging_dir: &Utf8Path,
        progress: &dyn ProgressSink,
    ) -> Result<Download, FetchError> {
        let body = self.get(path, &[])?;
        let mut file = fs_util::staging_file(staging_dir)?;
        file.write_all(&body)
            .map_err(|err| FetchError::Filesystem(format!("write {}: {err}", file.path().display())))?;
        let bytes = body.len() as u64;
        progress.event(TransferProgress::new(bytes, Some(bytes), Duration::ZERO).into());
        Ok(Download { file, bytes })
    }

    fn url(&self, path: &str) -> String {
        self.config().url(path)
    }
}

#[derive(Clone)]
pub struct CfdeHttpClient {
    client: Client,
    config: ClientConfig,
}

enum AttemptError {
    Retryable {
        status: Option<u16>,
        message: String,
    },
    Terminal(FetchError),
}

impl CfdeHttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let base = Url::parse(&config.base_url)
            .map_err(|err| FetchError::ClientBuild(format!("invalid base URL '{}': {err}", config.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(FetchError::ClientBuild(format!(
                "invalid base URL '{}': scheme must be http or https",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|err| FetchError::ClientBuild(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| FetchError::ClientBuild(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Sends one request and returns the response once its status is 2xx.
    fn send(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, AttemptError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Retryable {
                status: Some(status.as_u16()),
                message: body_excerpt(response),
            });
        }
        if !status.is_success() {
            return Err(AttemptError::Terminal(FetchError::ClientRejected {
                url: url.to_string(),
                status: status.as_u16(),
                message: body_excerpt(response),
            }));
        }
        Ok(response)
    }

    fn with_retries<T>(
        &self,
        url: &str,
        mut attempt_once: impl FnMut() -> Result<T, AttemptError>,
    ) -> Result<T, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(url = %url, attempt, "GET");
            match attempt_once() {
                Ok(value) => return Ok(value),
                Err(AttemptError::Terminal(err)) => return Err(err),
                Err(AttemptError::Retryable { status, message }) => {
                    if attempt > self.config.retries {
                        return Err(FetchError::NetworkExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            status,
                            message,
                        });
                    }
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        url = %url,
                        attempt,
                        status = ?status,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure: {message}"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }
}

impl ApiClient for CfdeHttpClient {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, FetchError> {
        let url = self.config.url(path);
        self.with_retries(&url, || {
            self.send(&url, query)?
                .bytes()
                .map(|bytes| bytes.to_vec())
                .map_err(transport_error)
        })
    }

    /// Streams the body to disk; an interrupted body restarts the transfer
    /// with a fresh staging file.
    fn download(
        &self,
        path: &str,
        staging_dir: &Utf8Path,
        progress: &dyn ProgressSink,
    ) -> Result<Download, FetchError> {
        let url = self.config.url(path);
        self.with_retries(&url, || {
            let response = self.send(&url, &[])?;
            stream_to_staging(response, staging_dir, progress)
        })
    }
}

fn stream_to_staging(
    mut response: Response,
    staging_dir: &Utf8Path,
    progress: &dyn ProgressSink,
) -> Result<Download, AttemptError> {
    let mut file = fs_util::staging_file(staging_dir).map_err(AttemptError::Terminal)?;
    let total = response.content_length();
    let start = Instant::now();
    let mut buf = vec![0u8; READ_BUFFER];
    let mut downloaded = 0u64;
    let mut next_report = PROGRESS_CHUNK;

    loop {
        let read = match response.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(AttemptError::Retryable {
                    status: None,
                    message: format!("body read failed after {downloaded} bytes: {err}"),
                });
            }
        };
        file.write_all(&buf[..read]).map_err(|err| {
            AttemptError::Terminal(FetchError::Filesystem(format!(
                "write {}: {err}",
                file.path().display()
            )))
        })?;
        downloaded += read as u64;
        if downloaded >= next_report {
            progress.event(TransferProgress::new(downloaded, total, start.elapsed()).into());
            next_report = downloaded + PROGRESS_CHUNK;
        }
    }

    let done = TransferProgress::new(downloaded, total, start.elapsed());
    progress.event(ProgressEvent {
        message: format!("  {done}"),
        elapsed: Some(done.elapsed),
    });
    Ok(Download {
        file,
        bytes: downloaded,
    })
}

/// Builder errors are local mistakes; every other transport failure is
/// treated as transient.
fn transport_error(err: reqwest::Error) -> AttemptError {
    if err.is_builder() {
        return AttemptError::Terminal(FetchError::ClientBuild(err.to_string()));
    }
    AttemptError::Retryable {
        status: err.status().map(|status| status.as_u16()),
        message: err.to_string(),
    }
}

fn body_excerpt(response: Response) -> String {
    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    let text = match response.text() {
        Ok(text) if !text.trim().is_empty() => text,
        _ => return reason,
    };
    let text = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or(text);
    truncate(&text, MAX_BODY_EXCERPT)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
