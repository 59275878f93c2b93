//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so any HTTP library can
//! be plugged in. Records live at `{base_url}/{endpoint}/{id}`: `GET` returns
//! the remote snapshot as JSON, `PUT` stores a new version.

use crate::error::{SyncError, SyncResult};
use crate::transport::{PushAck, RemoteTransport};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use versync_protocol::{RecordType, RemoteSnapshot, Value};

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Errors returned from the client are connection-level failures and are
/// treated as retryable.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    async fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Sends a PUT request with a JSON body.
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

#[derive(Serialize)]
struct PushBody<'a> {
    payload: &'a Value,
    version: u64,
}

/// HTTP-based remote transport with JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the URL of a record.
    pub fn record_url(&self, record_type: RecordType, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            record_type.endpoint(),
            encode_segment(id)
        )
    }

    fn check(&self, result: Result<HttpResponse, String>) -> SyncResult<HttpResponse> {
        let response = result.map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;

        if response.is_success() {
            *self.last_error.write() = None;
            return Ok(response);
        }

        let message = String::from_utf8_lossy(&response.body).into_owned();
        *self.last_error.write() = Some(message.clone());
        Err(SyncError::Remote {
            status: response.status,
            message,
        })
    }
}

#[async_trait]
impl<C: HttpClient> RemoteTransport for HttpTransport<C> {
    async fn fetch(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> SyncResult<Option<RemoteSnapshot>> {
        let url = self.record_url(record_type, id);
        let result = self.client.get(&url).await;

        if matches!(&result, Ok(response) if response.status == 404) {
            return Ok(None);
        }
        let response = self.check(result)?;
        Ok(Some(serde_json::from_slice(&response.body)?))
    }

    async fn push(
        &self,
        record_type: RecordType,
        id: &str,
        payload: &Value,
        version: u64,
    ) -> SyncResult<PushAck> {
        let url = self.record_url(record_type, id);
        let body = serde_json::to_vec(&PushBody { payload, version })?;
        let response = self.check(self.client.put(&url, body).await)?;
        Ok(serde_json::from_slice(&response.body)?)
    }
}

/// Percent-encodes characters that cannot appear in a path segment.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
