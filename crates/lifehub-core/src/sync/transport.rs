//! Transport adapter for the sync endpoint.
//!
//! The engine only sees the [`SyncTransport`] and [`Connectivity`] traits;
//! [`HttpTransport`] is the production implementation speaking
//! JSON-over-HTTP to the Lifehub server.

use log::debug;
use reqwest::header::HeaderValue;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::types::{SyncError, SyncPayload};
use crate::storage::SyncPrefs;

const DEVICE_ID_HEADER: &str = "x-device-id";

/// Network-availability oracle checked before any sync attempt.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Oracle that always reports online. Useful when the host runtime has its
/// own reachability signal and gates sync invocations itself.
pub struct AssumeOnline;

impl Connectivity for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Oracle that attempts a TCP connect to the sync host.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_millis(1_500),
        }
    }

    /// Probe the host/port of the sync base URL. Returns None for URLs
    /// without a host (e.g. unix sockets).
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self::new(host, port))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Connectivity for TcpProbe {
    fn is_online(&self) -> bool {
        let addrs = match (self.host.as_str(), self.port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(_) => return false,
        };
        for addr in addrs {
            if TcpStream::connect_timeout(&addr, self.timeout).is_ok() {
                return true;
            }
        }
        false
    }
}

/// Remote side of the sync protocol.
///
/// `post` returns `Ok(None)` when the server answered without a payload
/// body; the engine treats that as a transport error, never as an empty
/// reconciliation.
pub trait SyncTransport: Send + Sync {
    /// Pull-only read: `GET /sync?lastSyncTimestamp={cursor}`.
    fn fetch(&self, cursor: i64) -> Result<SyncPayload, SyncError>;

    /// Push-and-reconcile: `POST /sync` with the outgoing payload.
    fn post(&self, payload: &SyncPayload) -> Result<Option<SyncPayload>, SyncError>;
}

/// reqwest-based transport.
///
/// The engine is synchronous, so HTTP calls run on a private
/// current-thread tokio runtime owned by the transport.
pub struct HttpTransport {
    base_url: Url,
    prefs: Arc<dyn SyncPrefs>,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpTransport {
    /// Create a transport for the given base URL.
    ///
    /// # Errors
    /// Returns a transport error if the tokio runtime cannot be built.
    pub fn new(base_url: Url, prefs: Arc<dyn SyncPrefs>) -> Result<Self, SyncError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SyncError::Transport(format!("failed to build runtime: {e}")))?;
        Ok(Self {
            base_url,
            prefs,
            client: reqwest::Client::new(),
            runtime,
        })
    }

    fn sync_url(&self) -> Result<Url, SyncError> {
        self.base_url
            .join("sync")
            .map_err(|e| SyncError::Transport(format!("invalid base url: {e}")))
    }

    fn decorate(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, SyncError> {
        let mut req = req.header(DEVICE_ID_HEADER, device_header(&self.prefs.device_id()?));
        if let Some(token) = self.prefs.auth_token()? {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }
}

fn device_header(id: &str) -> HeaderValue {
    HeaderValue::from_str(id).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}

impl SyncTransport for HttpTransport {
    fn fetch(&self, cursor: i64) -> Result<SyncPayload, SyncError> {
        let mut url = self.sync_url()?;
        url.query_pairs_mut()
            .append_pair("lastSyncTimestamp", &cursor.to_string());
        debug!("sync fetch: {url}");

        let req = self.decorate(self.client.get(url))?;
        let payload = self.runtime.block_on(async move {
            req.send()
                .await?
                .error_for_status()?
                .json::<SyncPayload>()
                .await
        })?;
        Ok(payload)
    }

    fn post(&self, payload: &SyncPayload) -> Result<Option<SyncPayload>, SyncError> {
        let url = self.sync_url()?;
        debug!(
            "sync post: {url} ({} tasks, {} habits, {} workout days)",
            payload.tasks.len(),
            payload.habits.len(),
            payload.workout_days.len()
        );

        let req = self.decorate(self.client.post(url).json(payload))?;
        let body = self.runtime.block_on(async move {
            req.send()
                .await?
                .error_for_status()?
                .bytes()
                .await
        })?;

        if body.is_empty() {
            return Ok(None);
        }
        let reply = serde_json::from_slice(&body)
            .map_err(|e| SyncError::Transport(format!("malformed sync response: {e}")))?;
        Ok(Some(reply))
    }
}
