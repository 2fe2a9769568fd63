//! JSON-over-HTTP transport shared by the distiller and the embedder.

use crate::cancel::CancelToken;
use crate::config::EndpointConfig;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Connect timeout for model endpoints.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// How often a waiting caller re-checks its cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Posts a JSON body and returns the raw response body.
///
/// Implementations must fail with [`Error::Transport`] on network errors,
/// statuses `>= 300`, or bodies larger than `max_bytes`.
pub trait HttpTransport: Send + Sync {
    /// Posts `body` to `<base>/<path>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on failure, or [`Error::Cancelled`] if
    /// `cancel` fires before the response has been read.
    fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
        max_bytes: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>>;
}

/// Blocking `reqwest` transport with bearer auth and extra headers.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<SecretString>,
    extra_headers: BTreeMap<String, String>,
}

impl ReqwestTransport {
    /// Creates a transport for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            extra_headers: BTreeMap::new(),
        }
    }

    /// Creates a transport from an endpoint configuration.
    #[must_use]
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Self {
        let mut transport = Self::new(endpoint.base_url.clone());
        transport.api_key.clone_from(&endpoint.api_key);
        transport.extra_headers.clone_from(&endpoint.extra_headers);
        transport
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
        max_bytes: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let operation = path.trim_start_matches('/');
        cancel.check(operation)?;
        let timeout = cancel.cap(timeout);
        if timeout.is_zero() {
            return Err(Error::Cancelled(operation.to_string()));
        }

        let url = format!("{}/{operation}", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }
        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let (tx, rx) = mpsc::channel();
        let worker_operation = operation.to_string();
        thread::Builder::new()
            .name(format!("agentmem-http-{operation}"))
            .spawn(move || {
                let outcome = send_request(request, &worker_operation, max_bytes);
                if tx.send(outcome).is_err() {
                    tracing::debug!(operation = %worker_operation, "HTTP caller gone before completion");
                }
            })
            .map_err(|e| Error::Transport {
                operation: operation.to_string(),
                cause: format!("failed to spawn request worker: {e}"),
            })?;

        loop {
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(outcome) => return outcome,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        tracing::debug!(operation, "In-flight HTTP request cancelled");
                        return Err(Error::Cancelled(operation.to_string()));
                    }
                },
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Transport {
                        operation: operation.to_string(),
                        cause: "request worker exited without a result".to_string(),
                    });
                },
            }
        }
    }
}

/// Sends the request and reads a bounded body; runs on a worker thread.
fn send_request(
    request: reqwest::blocking::RequestBuilder,
    operation: &str,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let response = request.send().map_err(|e| transport_error(operation, e))?;
    let status = response.status();
    let bytes = read_limited(response, max_bytes).map_err(|cause| Error::Transport {
        operation: operation.to_string(),
        cause,
    })?;

    if status.as_u16() >= 300 {
        let snippet: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
        return Err(Error::Transport {
            operation: operation.to_string(),
            cause: format!("status {status}: {snippet}"),
        });
    }
    Ok(bytes)
}

/// Reads at most `max_bytes`; a longer body is an error.
///
/// # Errors
///
/// Returns a description of the read failure or the overflow.
pub fn read_limited(reader: impl Read, max_bytes: usize) -> std::result::Result<Vec<u8>, String> {
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let mut body = Vec::new();
    reader
        .take(limit)
        .read_to_end(&mut body)
        .map_err(|e| e.to_string())?;
    if body.len() > max_bytes {
        return Err(format!("response body exceeds {max_bytes} bytes"));
    }
    Ok(body)
}

/// Builds a blocking HTTP client; per-request timeouts are set by callers.
#[must_use]
pub fn build_http_client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("Failed to build HTTP client: {err}");
            reqwest::blocking::Client::new()
        })
}

#[allow(clippy::needless_pass_by_value)]
fn transport_error(operation: &str, e: reqwest::Error) -> Error {
    Error::Transport {
        operation: operation.to_string(),
        cause: if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_limited() {
        assert_eq!(read_limited(&b"abc"[..], 3).unwrap(), b"abc");
        assert!(read_limited(&b"abcd"[..], 3).unwrap_err().contains("exceeds 3"));
    }

    #[test]
    fn test_cancelled_before_send() {
        let transport = ReqwestTransport::new("http://127.0.0.1:9");
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = transport
            .post_json(
                "/embeddings",
                &serde_json::json!({}),
                Duration::from_secs(1),
                1024,
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}
