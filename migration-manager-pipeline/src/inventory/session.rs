use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use migration_manager_shared::Source;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::ExecutionError;
use crate::inventory::InventorySource;

/// An open session with a source plus the task that keeps it alive.
///
/// The heartbeat stops at its first failure and marks the session unhealthy;
/// the next sync then reopens it. Dropping the session stops the heartbeat
/// without logging out.
pub struct KeepAliveSession {
    source: Source,
    client: Arc<dyn InventorySource>,
    healthy: Arc<AtomicBool>,
    heartbeat: JoinHandle<()>,
}

impl KeepAliveSession {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Opens a session on `source` and starts its heartbeat.
    ///
    /// # Arguments
    ///
    /// * `client` - The client for the source's type
    /// * `source` - The source to log in to
    /// * `period` - Time between two keep-alive calls
    ///
    /// # Returns
    ///
    /// * `Ok(KeepAliveSession)` - The session is open
    /// * `Err(ExecutionError)` - Logging in failed
    pub async fn open(
        client: Arc<dyn InventorySource>,
        source: Source,
        period: Duration,
    ) -> Result<Self, ExecutionError> {
        client.open_session(&source).await?;
        info!(source = %source.name, "Opened inventory session");

        let healthy = Arc::new(AtomicBool::new(true));
        let heartbeat = tokio::spawn(heartbeat(
            client.clone(),
            source.clone(),
            period,
            healthy.clone(),
        ));

        Ok(Self {
            source,
            client,
            healthy,
            heartbeat,
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire) && !self.heartbeat.is_finished()
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Stops the heartbeat and logs out. A failed logout is only logged.
    pub async fn close(self) {
        self.heartbeat.abort();
        match self.client.close(&self.source).await {
            Ok(()) => info!(source = %self.source.name, "Closed inventory session"),
            Err(e) => warn!(source = %self.source.name, error = %e, "Failed to close inventory session"),
        }
    }
}

impl Drop for KeepAliveSession {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

async fn heartbeat(
    client: Arc<dyn InventorySource>,
    source: Source,
    period: Duration,
    healthy: Arc<AtomicBool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = client.keep_alive(&source).await {
            warn!(source = %source.name, error = %e, "Inventory session keep-alive failed");
            healthy.store(false, Ordering::Release);
            return;
        }
        debug!(source = %source.name, "Inventory session kept alive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InstanceSnapshot;
    use async_trait::async_trait;
    use migration_manager_shared::SourceType;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingClient {
        keep_alives: AtomicUsize,
        closes: AtomicUsize,
        fail_keep_alive: bool,
    }

    #[async_trait]
    impl InventorySource for CountingClient {
        async fn open_session(&self, _source: &Source) -> Result<(), ExecutionError> {
            Ok(())
        }

        async fn keep_alive(&self, _source: &Source) -> Result<(), ExecutionError> {
            self.keep_alives.fetch_add(1, Ordering::SeqCst);
            if self.fail_keep_alive {
                return Err(ExecutionError::transient("session expired"));
            }
            Ok(())
        }

        async fn fetch_inventory(
            &self,
            _source: &Source,
        ) -> Result<Vec<InstanceSnapshot>, ExecutionError> {
            Ok(vec![])
        }

        async fn close(&self, _source: &Source) -> Result<(), ExecutionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source() -> Source {
        Source {
            id: 1,
            name: "vcenter".to_string(),
            source_type: SourceType::Common,
            properties: json!({}),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_fires_every_period() {
        let client = Arc::new(CountingClient::default());
        let session = KeepAliveSession::open(client.clone(), source(), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(client.keep_alives.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(302)).await;
        settle().await;
        assert_eq!(client.keep_alives.load(Ordering::SeqCst), 2);
        assert!(session.is_healthy());

        session.close().await;
        assert_eq!(client.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_heartbeat_marks_session_unhealthy() {
        let client = Arc::new(CountingClient {
            fail_keep_alive: true,
            ..Default::default()
        });
        let session = KeepAliveSession::open(client.clone(), source(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert!(!session.is_healthy());

        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(client.keep_alives.load(Ordering::SeqCst), 1);
    }
}
