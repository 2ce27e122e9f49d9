//! Worker Supervisor: one per host, scales realtime units to queue depth

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::manager::{unix_now, QueueManager};
use crate::shutdown::Shutdown;
use crate::spawn::{Spawner, UnitKind};

/// Why [`Master::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterExit {
    /// Another master holds this host's identity; nothing was touched
    AlreadyRunning,
    /// The identity key was revoked, expired, or could not be refreshed
    LostOwnership,
    Shutdown,
}

/// Number of realtime units to start.
///
/// `live` counts every registered identity on the host, the master
/// included, so one spare slot is added on both sides.
pub fn plan_spawn(pending: i64, live: usize, max_workers: usize, budget: u64) -> usize {
    let live = live as i64;
    let capacity = max_workers as i64 + 1 - live;
    if capacity <= 0 || pending <= 0 {
        return 0;
    }

    let budget = budget.max(1) as i64;
    let needed = (pending + budget - 1) / budget + 1 - live;
    needed.min(capacity).max(0) as usize
}

pub struct Master {
    manager: QueueManager,
    spawner: Arc<dyn Spawner>,
    max_workers: usize,
    budget: u64,
    scan: Duration,
    idle: Duration,
    poll: Duration,
}

impl Master {
    pub fn new(manager: QueueManager, spawner: Arc<dyn Spawner>, config: &QueueConfig) -> Self {
        Self {
            manager,
            spawner,
            max_workers: config.max_workers,
            budget: config.budget,
            scan: config.scan_interval(),
            idle: config.idle_interval(),
            poll: config.poll_timeout(),
        }
    }

    /// Supervise until revoked or shut down.
    ///
    /// The identity key and Watch Set entry are released on every return
    /// path except [`MasterExit::AlreadyRunning`].
    pub async fn run(&self, mut shutdown: Shutdown) -> QueueResult<MasterExit> {
        let store = self.manager.store();
        let key = self.manager.keys().master();
        let token = Uuid::new_v4().to_string();

        if !store.set_nx_ex(&key, &token, self.scan).await? {
            info!(key = %key, "Master already running on this host");
            return Ok(MasterExit::AlreadyRunning);
        }

        info!(
            key = %key,
            max_workers = self.max_workers,
            budget = self.budget,
            "Master started"
        );

        let result = self.supervise(&key, &token, &mut shutdown).await;
        self.release(&key, &token).await;

        match &result {
            Ok(exit) => info!(exit = ?exit, "Master stopped"),
            Err(e) => error!(error = %e, "Master stopped on error"),
        }
        result
    }

    async fn supervise(&self, key: &str, token: &str, shutdown: &mut Shutdown) -> QueueResult<MasterExit> {
        let store = self.manager.store();
        store
            .hset(&self.manager.keys().watch(), key, &unix_now().to_string())
            .await?;

        loop {
            if shutdown.is_triggered() {
                return Ok(MasterExit::Shutdown);
            }

            if let Err(e) = self.spawner.spawn(UnitKind::Delay) {
                warn!(error = %e, "Failed to launch delay unit");
            }

            if !self.heartbeat(key, token).await {
                return Ok(MasterExit::LostOwnership);
            }

            let queues = self.manager.active_queues().await?;
            let workers = self.manager.active_workers().await?;

            if queues.is_empty() || workers.len() > 1 {
                if self.idle_wait(shutdown).await {
                    return Ok(MasterExit::Shutdown);
                }
                continue;
            }

            let keys: Vec<String> = queues.into_keys().collect();
            let popped = tokio::select! {
                popped = store.brpop(&keys, self.poll) => popped?,
                _ = shutdown.recv() => return Ok(MasterExit::Shutdown),
            };

            let Some((queue, payload)) = popped else {
                if self.idle_wait(shutdown).await {
                    return Ok(MasterExit::Shutdown);
                }
                continue;
            };

            // Peek only: the job goes back to the tail it came from
            store.rpush(&queue, &payload).await?;

            self.scale().await?;
        }
    }

    /// Whether this master still owns its identity, refreshing the TTL
    async fn heartbeat(&self, key: &str, token: &str) -> bool {
        let store = self.manager.store();
        match store.get(key).await {
            Ok(Some(held)) if held == token => {}
            Ok(_) => {
                warn!(key = %key, "Master identity revoked");
                return false;
            }
            Err(e) => {
                error!(error = %e, "Master heartbeat failed");
                return false;
            }
        }

        match store.expire(key, self.scan).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(key = %key, "Master identity expired");
                false
            }
            Err(e) => {
                error!(error = %e, "Master heartbeat failed");
                false
            }
        }
    }

    async fn scale(&self) -> QueueResult<usize> {
        let live = self.manager.active_workers().await?.len();

        let mut pending = 0;
        for queue in self.manager.active_queues().await?.keys() {
            pending += self.manager.queue_length(queue).await?;
        }

        let count = plan_spawn(pending, live, self.max_workers, self.budget);
        debug!(pending, live, spawn = count, "Scaling workers");

        let mut started = 0;
        for _ in 0..count {
            match self.spawner.spawn(UnitKind::Realtime) {
                Ok(()) => started += 1,
                Err(e) => warn!(error = %e, "Failed to launch realtime unit"),
            }
        }

        if started > 0 {
            info!(started, pending, live, "Launched realtime units");
        }
        Ok(started)
    }

    /// Sleep for the idle interval; true when interrupted by shutdown
    async fn idle_wait(&self, shutdown: &mut Shutdown) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.idle) => false,
            _ = shutdown.recv() => true,
        }
    }

    /// Drop the identity key and its Watch Set entry while still ours.
    ///
    /// A key that expired or was closed is left to its new holder, and a
    /// stale Watch Set entry is pruned by the next `active_workers` call.
    async fn release(&self, key: &str, token: &str) {
        let store = self.manager.store();

        match store.del_if_eq(key, token).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(key = %key, "Identity no longer held by this master");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to delete master identity");
                return;
            }
        }
        if let Err(e) = store
            .hdel(&self.manager.keys().watch(), &[key.to_string()])
            .await
        {
            warn!(error = %e, "Failed to remove master from watch set");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_spawn_scales_with_backlog() {
        // Master alone, 1 job: one worker
        assert_eq!(plan_spawn(1, 1, 10, 200), 1);
        // 450 jobs at 200 per worker: three workers
        assert_eq!(plan_spawn(450, 1, 10, 200), 3);
        // Exactly one budget worth
        assert_eq!(plan_spawn(200, 1, 10, 200), 1);
    }

    #[test]
    fn test_plan_spawn_respects_capacity() {
        assert_eq!(plan_spawn(10_000, 1, 10, 200), 10);
        assert_eq!(plan_spawn(10_000, 8, 10, 200), 3);
        assert_eq!(plan_spawn(10_000, 11, 10, 200), 0);
        assert_eq!(plan_spawn(10_000, 1, 0, 200), 0);
    }

    #[test]
    fn test_plan_spawn_counts_live_workers() {
        // Master plus one worker already cover 150 jobs
        assert_eq!(plan_spawn(150, 2, 10, 200), 0);
        assert_eq!(plan_spawn(0, 1, 10, 200), 0);
    }
}
