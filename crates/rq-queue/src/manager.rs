//! Queue Manager: enqueue semantics and read-side introspection

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rq_store::StoreBackend;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::job::{DelayEntry, EnqueueOutcome, Job, JobKind, DEFAULT_GROUP};
use crate::keys::KeySpace;
use crate::ledger::{FailureLedger, FailureList};

/// Longest accepted delay or unique-lock TTL (100 years)
pub const MAX_DELAY_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Current unix time in seconds
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Producer-facing handle onto one key space.
///
/// Cheap to clone; every clone shares the same store handle.
#[derive(Debug, Clone)]
pub struct QueueManager {
    store: Arc<dyn StoreBackend>,
    keys: KeySpace,
    ledger: FailureLedger,
}

impl QueueManager {
    pub fn new(store: Arc<dyn StoreBackend>, keys: KeySpace) -> Self {
        let ledger = FailureLedger::new(store.clone(), &keys);
        Self {
            store,
            keys,
            ledger,
        }
    }

    pub fn store(&self) -> &Arc<dyn StoreBackend> {
        &self.store
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Enqueue `cmd` with `data` on `group` (empty means `main`).
    ///
    /// A zero delay always enqueues as realtime. Unique jobs use the delay
    /// as their lock TTL; delayed jobs become eligible `delay_secs` from now.
    /// Delays above [`MAX_DELAY_SECS`] are rejected.
    pub async fn enqueue(
        &self,
        cmd: &str,
        data: Map<String, Value>,
        group: &str,
        kind: JobKind,
        delay_secs: u64,
    ) -> QueueResult<EnqueueOutcome> {
        if delay_secs > MAX_DELAY_SECS {
            return Err(QueueError::Config(format!(
                "delay of {delay_secs}s exceeds the {MAX_DELAY_SECS}s maximum"
            )));
        }
        let group = if group.is_empty() { DEFAULT_GROUP } else { group };
        let kind = if delay_secs == 0 { JobKind::Realtime } else { kind };
        let job = Job::new(cmd, data);

        match kind {
            JobKind::Realtime => self.push_realtime(group, &job.encode()?).await,
            JobKind::Unique => self.push_unique(group, &job, delay_secs).await,
            JobKind::Delay => self.push_delayed(group, &job, delay_secs).await,
        }
    }

    /// Register `group` in the Listen Set and push an already-encoded job.
    pub(crate) async fn push_realtime(&self, group: &str, payload: &str) -> QueueResult<EnqueueOutcome> {
        let queue = self.keys.group_queue(group);
        self.store
            .hset(&self.keys.listen(), &queue, &unix_now().to_string())
            .await?;
        let len = self.store.lpush(&queue, payload).await?;

        debug!(queue = %queue, len, "Job queued");
        Ok(EnqueueOutcome::Queued { len })
    }

    async fn push_unique(&self, group: &str, job: &Job, ttl_secs: u64) -> QueueResult<EnqueueOutcome> {
        let token = job.dedup_token();
        let lock = self.keys.unique(&token);

        let created = self
            .store
            .set_nx_ex(&lock, &unix_now().to_string(), Duration::from_secs(ttl_secs))
            .await?;
        if !created {
            debug!(token = %token, "Unique job already pending");
            return Ok(EnqueueOutcome::Duplicate);
        }

        self.push_realtime(group, &job.encode()?).await
    }

    async fn push_delayed(&self, group: &str, job: &Job, delay_secs: u64) -> QueueResult<EnqueueOutcome> {
        let due_at = i64::try_from(delay_secs)
            .ok()
            .and_then(|delay| unix_now().checked_add(delay))
            .ok_or_else(|| QueueError::Config(format!("delay of {delay_secs}s is out of range")))?;
        let due = due_at.to_string();

        if self.store.hset_nx(&self.keys.delay_lock(), &due, &due).await? {
            self.store.zadd(&self.keys.delay_time(), &due, due_at).await?;
        }

        let entry = DelayEntry {
            group: group.to_string(),
            job: job.encode()?,
        };
        let pending = self
            .store
            .lpush(&self.keys.delay_jobs(due_at), &entry.encode()?)
            .await?;

        debug!(due_at, pending, "Job delayed");
        Ok(EnqueueOutcome::Delayed { due_at, pending })
    }

    /// Failure ledger slice, newest first
    pub async fn list_failures(&self, start: isize, end: isize) -> QueueResult<FailureList> {
        self.ledger.list(start, end).await
    }

    /// Length of the list stored at `key`
    pub async fn queue_length(&self, key: &str) -> QueueResult<i64> {
        Ok(self.store.llen(key).await?)
    }

    pub async fn group_length(&self, group: &str) -> QueueResult<i64> {
        let group = if group.is_empty() { DEFAULT_GROUP } else { group };
        self.queue_length(&self.keys.group_queue(group)).await
    }

    /// Group queues holding jobs, with their last enqueue time. Drained
    /// queues are pruned from the Listen Set.
    pub async fn active_queues(&self) -> QueueResult<BTreeMap<String, i64>> {
        self.live_entries(&self.keys.listen()).await
    }

    /// Workers whose identity key is still alive, with their registration
    /// time. Expired identities are pruned from the Watch Set.
    pub async fn active_workers(&self) -> QueueResult<BTreeMap<String, i64>> {
        self.live_entries(&self.keys.watch()).await
    }

    async fn live_entries(&self, set: &str) -> QueueResult<BTreeMap<String, i64>> {
        let mut live = BTreeMap::new();
        let mut stale = Vec::new();

        for (key, stamp) in self.store.hgetall(set).await? {
            if self.store.exists(&key).await? {
                live.insert(key, stamp.parse().unwrap_or_default());
            } else {
                stale.push(key);
            }
        }

        if !stale.is_empty() {
            self.store.hdel(set, &stale).await?;
        }
        Ok(live)
    }

    /// Revoke one worker identity, or every identity registered on this
    /// host when `identity` is empty. Returns the number of identity keys
    /// deleted.
    pub async fn close_worker(&self, identity: &str) -> QueueResult<i64> {
        let watch = self.keys.watch();
        let targets: Vec<String> = if identity.is_empty() {
            self.store.hgetall(&watch).await?.into_keys().collect()
        } else {
            vec![self.keys.worker(identity)]
        };

        if targets.is_empty() {
            return Ok(0);
        }

        let closed = self.store.del(&targets).await?;
        self.store.hdel(&watch, &targets).await?;

        info!(closed, requested = targets.len(), "Closed worker identities");
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_store::MemoryStore;
    use serde_json::json;

    fn manager() -> QueueManager {
        QueueManager::new(Arc::new(MemoryStore::new()), KeySpace::new("", None))
    }

    fn data(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_realtime_enqueue_registers_group() {
        let qm = manager();
        let outcome = qm
            .enqueue("orders-create", data(json!({"id": 1})), "", JobKind::Realtime, 0)
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued { len: 1 });

        let active = qm.active_queues().await.unwrap();
        assert!(active.contains_key("RQ:jobs:main"));
        assert_eq!(qm.group_length("main").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_delay_forces_realtime() {
        let qm = manager();
        let outcome = qm
            .enqueue("orders-create", Map::new(), "main", JobKind::Delay, 0)
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued { len: 1 });

        let outcome = qm
            .enqueue("orders-create", Map::new(), "main", JobKind::Unique, 0)
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued { len: 2 });
    }

    #[tokio::test]
    async fn test_unique_collision() {
        let qm = manager();
        let first = qm
            .enqueue("orders-sync", Map::new(), "main", JobKind::Unique, 60)
            .await
            .unwrap();
        let second = qm
            .enqueue("orders-sync", Map::new(), "main", JobKind::Unique, 60)
            .await
            .unwrap();

        assert_eq!(first.code(), 1);
        assert_eq!(second, EnqueueOutcome::Duplicate);
        assert_eq!(second.code(), -1);
        assert_eq!(qm.group_length("main").await.unwrap(), 1);

        // A different unique suffix is a different token
        let other = qm
            .enqueue("orders-sync", data(json!({"unique": "b"})), "main", JobKind::Unique, 60)
            .await
            .unwrap();
        assert_eq!(other, EnqueueOutcome::Queued { len: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unique_lock_expires() {
        let qm = manager();
        qm.enqueue("orders-sync", Map::new(), "main", JobKind::Unique, 2)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;

        let again = qm
            .enqueue("orders-sync", Map::new(), "main", JobKind::Unique, 2)
            .await
            .unwrap();
        assert_eq!(again, EnqueueOutcome::Queued { len: 2 });
    }

    #[tokio::test]
    async fn test_delayed_jobs_share_one_index_entry() {
        let qm = manager();
        let a = qm
            .enqueue("mail-send", Map::new(), "mail", JobKind::Delay, 3600)
            .await
            .unwrap();
        let b = qm
            .enqueue("mail-send", Map::new(), "mail", JobKind::Delay, 3600)
            .await
            .unwrap();

        let (EnqueueOutcome::Delayed { due_at: due_a, .. }, EnqueueOutcome::Delayed { due_at: due_b, pending }) = (a, b) else {
            panic!("expected delayed outcomes");
        };

        assert!(qm.active_queues().await.unwrap().is_empty());

        let store = qm.store();
        let index = store
            .zrange_by_score(&qm.keys().delay_time(), 0, i64::MAX)
            .await
            .unwrap();
        if due_a == due_b {
            assert_eq!(pending, 2);
            assert_eq!(index.len(), 1);
        } else {
            // The clock ticked between the two calls
            assert_eq!(index.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_out_of_range_delays_are_rejected() {
        let qm = manager();
        for delay in [MAX_DELAY_SECS + 1, i64::MAX as u64, u64::MAX] {
            for kind in [JobKind::Delay, JobKind::Unique] {
                let result = qm
                    .enqueue("mail-send", Map::new(), "mail", kind, delay)
                    .await;
                assert!(matches!(result, Err(QueueError::Config(_))), "{kind:?} {delay}");
            }
        }

        assert!(qm.active_queues().await.unwrap().is_empty());
        let index = qm
            .store()
            .zrange_by_score(&qm.keys().delay_time(), i64::MIN, i64::MAX)
            .await
            .unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_longest_delay_is_still_in_the_future() {
        let qm = manager();
        let now = unix_now();
        let outcome = qm
            .enqueue("mail-send", Map::new(), "mail", JobKind::Delay, MAX_DELAY_SECS)
            .await
            .unwrap();
        let EnqueueOutcome::Delayed { due_at, .. } = outcome else {
            panic!("expected a delayed outcome");
        };
        assert!(due_at >= now + MAX_DELAY_SECS as i64);

        let unique = qm
            .enqueue("mail-digest", Map::new(), "mail", JobKind::Unique, MAX_DELAY_SECS)
            .await
            .unwrap();
        assert_eq!(unique, EnqueueOutcome::Queued { len: 1 });
    }

    #[tokio::test]
    async fn test_active_queues_prune_drained_groups() {
        let qm = manager();
        qm.enqueue("orders-create", Map::new(), "orders", JobKind::Realtime, 0)
            .await
            .unwrap();
        qm.enqueue("mail-send", Map::new(), "mail", JobKind::Realtime, 0)
            .await
            .unwrap();

        qm.store().rpop("RQ:jobs:mail").await.unwrap();

        let active = qm.active_queues().await.unwrap();
        assert_eq!(active.keys().collect::<Vec<_>>(), vec!["RQ:jobs:orders"]);

        let listen = qm.store().hgetall("RQ:listen").await.unwrap();
        assert!(!listen.contains_key("RQ:jobs:mail"));
    }

    #[tokio::test]
    async fn test_close_worker() {
        let qm = manager();
        let store = qm.store();
        let watch = qm.keys().watch();

        for id in ["aa", "bb"] {
            let key = qm.keys().worker(id);
            store.set_ex(&key, "", Duration::from_secs(60)).await.unwrap();
            store.hset(&watch, &key, "0").await.unwrap();
        }

        assert_eq!(qm.close_worker("aa").await.unwrap(), 1);
        assert!(!store.exists("RQ:worker:aa").await.unwrap());
        assert_eq!(qm.active_workers().await.unwrap().len(), 1);

        // Unknown identity
        assert_eq!(qm.close_worker("zz").await.unwrap(), 0);

        // Empty identity closes everything on this host
        assert_eq!(qm.close_worker("").await.unwrap(), 1);
        assert!(qm.active_workers().await.unwrap().is_empty());
        assert!(store.hgetall(&watch).await.unwrap().is_empty());
    }
}
