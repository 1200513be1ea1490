//! Graceful shutdown coordinator
//!
//! Long-running tasks (HTTP server, timeout sweeper) subscribe and exit
//! when a shutdown is triggered.

use tokio::sync::broadcast;
use tracing::info;

/// Broadcast-based shutdown fan-out
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber to stop
    pub fn trigger(&self) {
        info!("Shutdown triggered");
        // Send only fails when nobody is listening, which is fine
        let _ = self.tx.send(());
    }

    /// Wait until a shutdown is triggered
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_reaches_subscribers() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let mut rx = coordinator.subscribe();

        coordinator.trigger();
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("should receive shutdown")
            .expect("channel should be open");
    }

    #[tokio::test]
    async fn test_wait_unblocks_on_trigger() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let waiter = coordinator.clone();

        let handle = tokio::spawn(async move { waiter.wait().await });
        coordinator.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait should return")
            .unwrap();
    }
}
