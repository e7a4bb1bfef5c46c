//! Background change-notification poller.

use crate::connection::{Connection, PollOutcome};
use crate::stream::PeekStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;

/// Default time between checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest allowed interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Longest allowed interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Periodically checks an idle connection for change notifications.
///
/// Each tick is non-blocking: it is skipped while a request is in flight and
/// never waits for data. Notifications reach subscribers through
/// [`Connection::subscribe`].
pub struct SyncPoller<S = TcpStream> {
    connection: Arc<Connection<S>>,
    interval: Duration,
    ticks: AtomicU64,
    skipped: AtomicU64,
    notifications: AtomicU64,
    shutdown: AtomicBool,
    notify: Notify,
}

impl<S: PeekStream> SyncPoller<S> {
    /// Creates a poller with the default interval.
    pub fn new(connection: Arc<Connection<S>>) -> Self {
        Self {
            connection,
            interval: DEFAULT_POLL_INTERVAL,
            ticks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Sets the interval, clamped to 200..=1000 ms.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Performs one check.
    pub async fn tick(&self) -> PollOutcome {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let outcome = self.connection.poll_notification().await;
        match outcome {
            PollOutcome::Busy => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            PollOutcome::Notified => {
                self.notifications.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        outcome
    }

    /// Runs the polling loop (call from a background task).
    ///
    /// Keeps running across disconnects; ticks on a dead connection are
    /// no-ops until a new socket is attached.
    pub async fn run(&self) {
        tracing::debug!("Sync poller started (interval={:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            if self.tick().await == PollOutcome::Notified {
                tracing::info!("Server reported a change from another client");
            }
        }

        tracing::debug!("Sync poller stopped");
    }

    /// Signals the poller to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Returns poller statistics.
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }
}

/// Poller statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerStats {
    pub ticks: u64,
    /// Ticks skipped because a request was in flight.
    pub skipped: u64,
    pub notifications: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, SyncEvent};
    use crate::testing::MockServer;
    use subd_protocol::Command;

    #[test]
    fn test_interval_clamping() {
        let conn: Arc<Connection> = Arc::new(Connection::new(ConnectionConfig::default()));

        let poller = SyncPoller::new(conn.clone());
        assert_eq!(poller.interval(), Duration::from_millis(500));

        let poller = SyncPoller::new(conn.clone()).with_interval(Duration::from_millis(10));
        assert_eq!(poller.interval(), MIN_POLL_INTERVAL);

        let poller = SyncPoller::new(conn).with_interval(Duration::from_secs(5));
        assert_eq!(poller.interval(), MAX_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_tick_without_connection() {
        let conn: Arc<Connection> = Arc::new(Connection::new(ConnectionConfig::default()));
        let poller = SyncPoller::new(conn);

        assert_eq!(poller.tick().await, PollOutcome::NotConnected);
        assert_eq!(poller.stats().ticks, 1);
        assert_eq!(poller.stats().notifications, 0);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_busy() {
        let server = MockServer::gated(|_| "ok".to_string()).await;
        let conn = server.connect().await;
        let poller = SyncPoller::new(conn.clone());

        let sender = conn.clone();
        let request = tokio::spawn(async move { sender.send(&Command::save()).await });
        server.wait_for_commands(1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(poller.tick().await, PollOutcome::Busy);
        assert_eq!(poller.stats().skipped, 1);

        server.release();
        assert_eq!(request.await.unwrap().unwrap(), "ok");
        assert_eq!(poller.tick().await, PollOutcome::Idle);
    }

    #[tokio::test]
    async fn test_run_delivers_notification() {
        let server = MockServer::replying(|_| "ok".to_string()).await;
        let conn = server.connect().await;
        let mut events = conn.subscribe();

        let poller = Arc::new(SyncPoller::new(conn).with_interval(MIN_POLL_INTERVAL));
        let runner = poller.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        server.notify();
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SyncEvent::RemoteChange);

        poller.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(poller.stats().notifications, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let conn: Arc<Connection> = Arc::new(Connection::new(ConnectionConfig::default()));
        let poller = SyncPoller::new(conn);

        poller.shutdown();
        tokio::time::timeout(Duration::from_secs(5), poller.run())
            .await
            .unwrap();
        assert_eq!(poller.stats().ticks, 0);
    }
}
