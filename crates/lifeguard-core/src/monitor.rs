//! Feeds every parsed pool through the history and into the notification
//! sink.
//!
//! Both the API handlers and the background poller go through
//! [`PoolMonitor`], so a change is noticed by whichever looks first.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ZfsError;
use crate::history::PoolHistory;
use crate::notify::NotificationSink;
use crate::pool::Pool;
use crate::zfs::Zfs;

pub struct PoolMonitor {
    zfs: Arc<Zfs>,
    history: Arc<PoolHistory>,
    sink: Arc<NotificationSink>,
}

impl PoolMonitor {
    pub fn new(zfs: Arc<Zfs>, history: Arc<PoolHistory>, sink: Arc<NotificationSink>) -> Self {
        Self { zfs, history, sink }
    }

    pub fn zfs(&self) -> &Zfs {
        &self.zfs
    }

    pub fn sink(&self) -> &NotificationSink {
        &self.sink
    }

    /// Store `pool` as the latest observation of `name` and emit a
    /// notification for each change. Returns how many were emitted.
    pub async fn observe(&self, name: &str, pool: &Pool) -> usize {
        let events = self.history.record(name, pool.clone());
        let count = events.len();
        for event in events {
            self.sink
                .send(event.id(), event.severity(), event.message(name))
                .await;
        }
        count
    }

    /// Summaries of every pool, recorded in the history.
    pub async fn pools(&self) -> Result<Vec<Pool>, ZfsError> {
        let pools = self.zfs.pools().await?;
        for pool in &pools {
            self.observe(&pool.name, pool).await;
        }
        Ok(pools)
    }

    /// Detail of one pool, recorded in the history.
    pub async fn pool(&self, name: &str) -> Result<Pool, ZfsError> {
        let pool = self.zfs.pool(name).await?;
        self.observe(&pool.name, &pool).await;
        Ok(pool)
    }

    /// Re-read the status of every pool. A pool that fails to parse is
    /// skipped with a warning. Returns the number of notifications emitted.
    ///
    /// # Errors
    ///
    /// Fails only if the pools cannot be listed.
    pub async fn refresh_all(&self) -> Result<usize, ZfsError> {
        let mut emitted = 0;
        for name in self.zfs.list_pools().await? {
            match self.zfs.pool_status(&name).await {
                Ok(pool) => emitted += self.observe(&pool.name, &pool).await,
                Err(e) => warn!(pool = %name, error = %e, "pool refresh failed"),
            }
        }
        debug!(emitted, "pool refresh finished");
        Ok(emitted)
    }
}

impl std::fmt::Debug for PoolMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMonitor")
            .field("tracked", &self.history.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::exec::CommandRunner;
    use crate::exec::testing::ScriptedRunner;
    use crate::vault::IdentifierVault;
    use crate::zfs::ZfsConfig;

    fn status(state: &str, scan: &str) -> String {
        format!(
            "  pool: tank
 state: {state}
  scan: {scan}
config:

        NAME        STATE     READ WRITE CKSUM
        tank        {state}       0     0     0

errors: No known data errors
"
        )
    }

    fn make_monitor(runner: &Arc<ScriptedRunner>) -> PoolMonitor {
        let vault = Arc::new(IdentifierVault::new(b"k").unwrap());
        let zfs = Zfs::new(
            Arc::clone(runner) as Arc<dyn CommandRunner>,
            vault,
            ZfsConfig::default(),
        );
        PoolMonitor::new(
            Arc::new(zfs),
            Arc::new(PoolHistory::new()),
            Arc::new(NotificationSink::new(None)),
        )
    }

    #[tokio::test]
    async fn refresh_emits_on_change_only() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zpool", "list", "-p", "-H", "-o", "name"], "tank\n");
        runner.on_success(&["/sbin/zpool", "status", "tank"], &status("ONLINE", "none requested"));
        let monitor = make_monitor(&runner);

        assert_eq!(monitor.refresh_all().await.unwrap(), 0);
        assert_eq!(monitor.refresh_all().await.unwrap(), 0);

        runner.on_success(
            &["/sbin/zpool", "status", "tank"],
            &status("DEGRADED", "scrub in progress, 5.00% done"),
        );
        assert_eq!(monitor.refresh_all().await.unwrap(), 2);

        let messages: Vec<String> = monitor
            .sink()
            .list()
            .await
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(
            messages,
            [
                "ID 001 (critical): Pool \"tank\" state changed: ONLINE -> DEGRADED",
                "ID 004 (info): Pool \"tank\" scrub: started",
            ]
        );
    }

    #[tokio::test]
    async fn failing_pool_is_skipped() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zpool", "list", "-p", "-H", "-o", "name"], "broken\ntank\n");
        runner.on_success(&["/sbin/zpool", "status", "tank"], &status("ONLINE", "none requested"));
        let monitor = make_monitor(&runner);

        assert_eq!(monitor.refresh_all().await.unwrap(), 0);
        assert!(monitor.sink().is_empty().await);
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        let runner = Arc::new(ScriptedRunner::new());
        let monitor = make_monitor(&runner);
        assert!(matches!(monitor.refresh_all().await, Err(ZfsError::Command(_))));
    }
}
