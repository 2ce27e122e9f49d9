//! Units: a single delay pass, or a budgeted realtime worker

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::QueueConfig;
use crate::delay::DelayScheduler;
use crate::dispatch::Dispatcher;
use crate::error::QueueResult;
use crate::executor::JobExecutor;
use crate::manager::{unix_now, QueueManager};
use crate::shutdown::Shutdown;
use crate::spawn::UnitKind;

/// Why [`Worker::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Executed its full budget of jobs
    BudgetExhausted,
    /// Identity key deleted, expired, or not refreshable
    Revoked,
    /// No active group queues left
    Drained,
    Shutdown,
    /// A delay pass finished after promoting this many jobs
    DelayPass(usize),
}

pub struct Worker {
    manager: QueueManager,
    executor: JobExecutor,
    budget: u64,
    scan: Duration,
    poll: Duration,
}

impl Worker {
    pub fn new(manager: QueueManager, dispatcher: Arc<dyn Dispatcher>, config: &QueueConfig) -> Self {
        let executor = JobExecutor::new(dispatcher, manager.ledger().clone());
        Self {
            manager,
            executor,
            budget: config.budget,
            scan: config.scan_interval(),
            poll: config.poll_timeout(),
        }
    }

    pub async fn run(&self, kind: UnitKind, shutdown: Shutdown) -> QueueResult<WorkerExit> {
        match kind {
            UnitKind::Delay => {
                let promoted = DelayScheduler::new(self.manager.clone(), self.budget)
                    .run()
                    .await?;
                Ok(WorkerExit::DelayPass(promoted))
            }
            UnitKind::Realtime => self.run_realtime(shutdown).await,
        }
    }

    /// Register a fresh identity and drain group queues until the budget is
    /// spent, the identity is revoked, or the queues are empty.
    async fn run_realtime(&self, mut shutdown: Shutdown) -> QueueResult<WorkerExit> {
        let identity = hex::encode(rand::random::<[u8; 4]>());
        let key = self.manager.keys().worker(&identity);

        info!(worker = %identity, budget = self.budget, "Worker started");

        let result = self.drain(&key, &mut shutdown).await;

        if let Err(e) = self.manager.close_worker(&identity).await {
            warn!(worker = %identity, error = %e, "Failed to release worker identity");
        }

        match &result {
            Ok(exit) => info!(worker = %identity, exit = ?exit, "Worker stopped"),
            Err(e) => error!(worker = %identity, error = %e, "Worker stopped on error"),
        }
        result
    }

    async fn drain(&self, key: &str, shutdown: &mut Shutdown) -> QueueResult<WorkerExit> {
        let store = self.manager.store();
        store.set_ex(key, "", self.scan).await?;
        store
            .hset(&self.manager.keys().watch(), key, &unix_now().to_string())
            .await?;

        let mut executed: u64 = 0;
        loop {
            if shutdown.is_triggered() {
                return Ok(WorkerExit::Shutdown);
            }

            let queues = self.manager.active_queues().await?;
            if queues.is_empty() {
                return Ok(WorkerExit::Drained);
            }

            let keys: Vec<String> = queues.into_keys().collect();
            let popped = tokio::select! {
                popped = store.brpop(&keys, self.poll) => popped?,
                _ = shutdown.recv() => return Ok(WorkerExit::Shutdown),
            };

            if let Some((_, payload)) = popped {
                self.executor.execute(&payload).await?;
                executed += 1;
            }

            if !self.heartbeat(key).await {
                return Ok(WorkerExit::Revoked);
            }
            if executed >= self.budget {
                return Ok(WorkerExit::BudgetExhausted);
            }
        }
    }

    async fn heartbeat(&self, key: &str) -> bool {
        let store = self.manager.store();
        match store.exists(key).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                error!(error = %e, "Worker heartbeat failed");
                return false;
            }
        }

        match store.expire(key, self.scan).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                error!(error = %e, "Worker heartbeat failed");
                false
            }
        }
    }
}
