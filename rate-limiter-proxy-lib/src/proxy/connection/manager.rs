use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use super::guards::ConnectionGuard;

/// Errors that can occur when trying to accept a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Server is shutting down")]
    Shutdown,
}

/// Tracks open client connections for graceful shutdown
pub struct ConnectionManager {
    active_connections: Arc<AtomicUsize>,
    shutdown: AtomicBool,
    connections_closed_tx: watch::Sender<()>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (connections_closed_tx, _) = watch::channel(());
        Self {
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
            connections_closed_tx,
        }
    }

    pub fn active(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Stop accepting new connections
    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Returns Ok(guard) if connection is accepted, Err(ConnectionError) if rejected
    pub fn try_accept(&self) -> Result<ConnectionGuard, ConnectionError> {
        if self.is_shutdown() {
            return Err(ConnectionError::Shutdown);
        }
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        Ok(ConnectionGuard::new(self.active_connections.clone(), self.connections_closed_tx.clone()))
    }

    /// Wait until every connection has closed or `timeout` elapses
    ///
    /// Returns the number of connections still open.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut closed = self.connections_closed_tx.subscribe();
        let wait_all = async {
            while self.active() > 0 {
                if closed.changed().await.is_err() {
                    break;
                }
            }
        };

        if tokio::time::timeout(timeout, wait_all).await.is_err() {
            let active = self.active();
            warn!(active_connections = active, "Shutdown timeout reached, {} connections still active", active);
            return active;
        }
        info!("All connections closed");
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_after_shutdown() {
        let manager = ConnectionManager::new();
        let guard = manager.try_accept();
        assert!(guard.is_ok());
        assert_eq!(manager.active(), 1);

        manager.begin_shutdown();
        assert!(matches!(manager.try_accept(), Err(ConnectionError::Shutdown)));

        drop(guard);
        assert_eq!(manager.active(), 0);
    }

    #[tokio::test]
    async fn drain_waits_for_last_connection() {
        let manager = Arc::new(ConnectionManager::new());
        let guard = manager.try_accept();
        let m = manager.clone();
        let waiter = tokio::spawn(async move { m.drain(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(matches!(waiter.await, Ok(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_timeout() {
        let manager = ConnectionManager::new();
        let _guard = manager.try_accept();
        assert_eq!(manager.drain(Duration::from_secs(1)).await, 1);
    }
}
