//! Connection management.
//!
//! A [`Connection`] owns at most one socket and runs one command at a time:
//! the request is written and its reply read while holding the stream lock.
//! The notification check only ever *tries* that lock, so it can never read
//! from the middle of a reply.

use crate::error::ClientError;
use crate::stream::{try_peek, PeekStream};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use subd_protocol::codec::Encoder;
use subd_protocol::frame::{self, classify_prefix, Prefix, LENGTH_PREFIX_SIZE};
use subd_protocol::reply;
use subd_protocol::{Command, DEFAULT_HOST, DEFAULT_PORT, MAX_PAYLOAD_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};

/// Largest single read while receiving a reply body (64 KiB).
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the sync event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events raised outside the request/reply flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Another client changed the shared data.
    RemoteChange,
    /// The connection broke and was discarded.
    Disconnected,
}

/// Result of one idle notification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No live socket.
    NotConnected,
    /// A request holds the stream; nothing was read.
    Busy,
    /// Nothing to report; buffered bytes were left untouched.
    Idle,
    /// A notification was consumed and broadcast.
    Notified,
    /// The server closed the connection.
    Disconnected,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout. `None` waits for the reply indefinitely.
    pub request_timeout: Option<Duration>,
    /// Largest reply payload accepted.
    pub max_reply_size: u32,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            max_reply_size: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_reply_size(mut self, size: u32) -> Self {
        self.max_reply_size = size.clamp(1, MAX_PAYLOAD_SIZE);
        self
    }

    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// Clears the busy flag when a request finishes or is cancelled.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A connection to a subd server.
pub struct Connection<S = TcpStream> {
    config: ConnectionConfig,
    /// The socket. `None` when never connected, closed, or broken.
    stream: Mutex<Option<S>>,
    /// Is a live socket attached?
    connected: AtomicBool,
    /// Is a request waiting for its reply?
    busy: AtomicBool,
    /// Broadcast channel for sync events.
    events: broadcast::Sender<SyncEvent>,
}

impl Connection<TcpStream> {
    /// Connects to the configured server, replacing any previous socket.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let addr = self.config.addr();
        tracing::debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;

        stream.set_nodelay(true).ok();
        self.attach(stream).await;

        tracing::info!("Connected to {}", addr);
        Ok(())
    }
}

impl<S: PeekStream> Connection<S> {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            events,
        }
    }

    /// Creates a connection around an already-connected stream.
    pub fn from_stream(config: ConnectionConfig, stream: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            stream: Mutex::new(Some(stream)),
            connected: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            events,
        }
    }

    /// Installs a connected stream, dropping any previous one.
    pub async fn attach(&self, stream: S) {
        *self.stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Subscribes to notifications and disconnect events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns whether a live socket is attached.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns whether a request is waiting for its reply.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Sends a command and waits for its reply text.
    ///
    /// The write and the full read happen under the stream lock. Trailing
    /// whitespace is trimmed from the reply. Connection-level failures
    /// discard the socket; there is no retry.
    pub async fn send(&self, command: &Command) -> Result<String, ClientError> {
        if !self.is_connected() {
            tracing::debug!("send({}) called but not connected", command.verb());
            return Err(ClientError::NotConnected);
        }

        let request = Encoder::encode_command(command)?;

        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        let _busy = BusyGuard::new(&self.busy);

        tracing::debug!(
            verb = %command.verb(),
            bytes = request.len(),
            "Sending command"
        );

        let exchange = exchange(stream, &request, self.config.max_reply_size, &self.events);
        let result = match self.config.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .unwrap_or_else(|_| Err(ClientError::Timeout)),
            None => exchange.await,
        };

        match result {
            Ok(reply) => {
                tracing::debug!(verb = %command.verb(), bytes = reply.len(), "Got reply");
                Ok(reply)
            }
            Err(e) => {
                if e.is_connection_error() {
                    self.discard(&mut guard, &e);
                }
                Err(e)
            }
        }
    }

    /// Checks the idle connection for a change notification.
    ///
    /// Never waits: if a request holds the stream the check is skipped
    /// without touching the socket. Otherwise up to four bytes are peeked;
    /// only a complete sentinel is consumed.
    pub async fn poll_notification(&self) -> PollOutcome {
        if !self.is_connected() {
            return PollOutcome::NotConnected;
        }

        let Ok(mut guard) = self.stream.try_lock() else {
            tracing::trace!("Request in flight, skipping notification check");
            return PollOutcome::Busy;
        };
        let Some(stream) = guard.as_mut() else {
            return PollOutcome::NotConnected;
        };

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let peeked = match try_peek(&*stream, &mut prefix).await {
            Ok(peeked) => peeked,
            Err(e) => {
                self.discard(&mut guard, &e);
                return PollOutcome::Disconnected;
            }
        };

        match peeked {
            None => PollOutcome::Idle,
            Some(0) => {
                self.discard(&mut guard, &"server closed the connection");
                PollOutcome::Disconnected
            }
            Some(n) if n < LENGTH_PREFIX_SIZE => PollOutcome::Idle,
            Some(_) => {
                if classify_prefix(prefix) != Prefix::Sentinel {
                    tracing::debug!("Unexpected data on idle connection, leaving it buffered");
                    return PollOutcome::Idle;
                }
                if let Err(e) = stream.read_exact(&mut prefix).await {
                    self.discard(&mut guard, &e);
                    return PollOutcome::Disconnected;
                }
                tracing::debug!("Remote change notification received");
                let _ = self.events.send(SyncEvent::RemoteChange);
                PollOutcome::Notified
            }
        }
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
            tracing::info!("Connection closed");
        }
        Ok(())
    }

    fn discard(&self, slot: &mut Option<S>, reason: &dyn fmt::Display) {
        if slot.take().is_some() {
            tracing::warn!("Connection to {} dropped: {}", self.config.addr(), reason);
            let _ = self.events.send(SyncEvent::Disconnected);
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Writes one framed request and reads the matching reply.
async fn exchange<S: PeekStream>(
    stream: &mut S,
    request: &[u8],
    max_reply_size: u32,
    events: &broadcast::Sender<SyncEvent>,
) -> Result<String, ClientError> {
    stream.write_all(request).await?;
    stream.flush().await?;

    // The server pushes notifications from other threads, so one may land
    // between our request and its reply.
    let len = loop {
        match classify_prefix(read_prefix(stream).await?) {
            Prefix::Sentinel => {
                tracing::debug!("Remote change notification arrived ahead of reply");
                let _ = events.send(SyncEvent::RemoteChange);
            }
            Prefix::Length(len) => break len,
        }
    };

    frame::check_length(len as u64, max_reply_size)?;
    let body = read_body(stream, len as usize).await?;

    Ok(reply::decode_text(&body)?)
}

async fn read_prefix<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> Result<[u8; LENGTH_PREFIX_SIZE], ClientError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return Err(ClientError::eof("connection closed while reading reply length"));
        }
        filled += n;
    }
    Ok(prefix)
}

async fn read_body<S: AsyncRead + Unpin>(
    stream: &mut S,
    len: usize,
) -> Result<Vec<u8>, ClientError> {
    let mut body = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let chunk = (len - filled).min(READ_CHUNK_SIZE);
        let n = stream.read(&mut body[filled..filled + chunk]).await?;
        if n == 0 {
            return Err(ClientError::eof("connection closed while reading reply body"));
        }
        filled += n;
    }
    Ok(body)
}
