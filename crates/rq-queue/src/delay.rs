//! Delay Scheduler: moves due delayed jobs onto their realtime queues

use tracing::{debug, info, warn};

use crate::error::QueueResult;
use crate::job::DelayEntry;
use crate::manager::{unix_now, QueueManager};

#[derive(Debug, Clone)]
pub struct DelayScheduler {
    manager: QueueManager,
    budget: u64,
}

impl DelayScheduler {
    /// `budget` caps how many due timestamps one pass drains.
    pub fn new(manager: QueueManager, budget: u64) -> Self {
        Self { manager, budget }
    }

    /// One pass at the current time. Returns the number of jobs promoted.
    pub async fn run(&self) -> QueueResult<usize> {
        self.promote_due(unix_now()).await
    }

    /// Promote every entry due at or before `now`.
    ///
    /// Entries are popped one at a time, so concurrent passes never promote
    /// the same entry twice.
    pub async fn promote_due(&self, now: i64) -> QueueResult<usize> {
        let store = self.manager.store();
        let keys = self.manager.keys();
        let index = keys.delay_time();

        let due_list = store.zrange_by_score(&index, 0, now).await?;
        let mut promoted = 0;

        for member in due_list.into_iter().take(self.budget as usize) {
            let Ok(due) = member.parse::<i64>() else {
                warn!(member = %member, "Dropping invalid delay index member");
                self.release(&member).await?;
                continue;
            };

            let list = keys.delay_jobs(due);
            while let Some(raw) = store.rpop(&list).await? {
                match DelayEntry::decode(&raw) {
                    Ok(entry) => {
                        self.manager.push_realtime(&entry.group, &entry.job).await?;
                        promoted += 1;
                    }
                    Err(e) => {
                        warn!(due, error = %e, "Undecodable delay entry");
                        self.manager.ledger().record(&raw, e.to_string()).await?;
                    }
                }
            }

            self.release(&member).await?;
            debug!(due, "Delay slot drained");
        }

        if promoted > 0 {
            info!(promoted, "Promoted delayed jobs");
        }
        Ok(promoted)
    }

    async fn release(&self, member: &str) -> QueueResult<()> {
        let store = self.manager.store();
        let keys = self.manager.keys();
        store.zrem(&keys.delay_time(), member).await?;
        store.hdel(&keys.delay_lock(), &[member.to_string()]).await?;
        Ok(())
    }
}
