//! In-memory store with Redis-compatible semantics (for testing and single-process use)

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::backend::{StoreBackend, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
    ZSet(BTreeMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn is_empty(&self) -> bool {
        match &self.value {
            Value::Str(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }
}

/// Deadline `ttl` from now; `None` when it lies beyond what `Instant` holds
fn expiry(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Live entry for `key`, dropping it first if its TTL has elapsed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn list_mut(&mut self, key: &str, create: bool) -> Result<Option<&mut VecDeque<String>>, StoreError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::List(VecDeque::new())));
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::List(list)) => Ok(Some(list)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn hash_mut(&mut self, key: &str, create: bool) -> Result<Option<&mut HashMap<String, String>>, StoreError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::Hash(HashMap::new())));
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Hash(hash)) => Ok(Some(hash)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn zset_mut(&mut self, key: &str, create: bool) -> Result<Option<&mut BTreeMap<String, i64>>, StoreError> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_string(), Entry::new(Value::ZSet(BTreeMap::new())));
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::ZSet(zset)) => Ok(Some(zset)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    /// Containers that became empty cease to exist, as in Redis.
    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Entry::is_empty) {
            self.entries.remove(key);
        }
    }

    fn pop_tail(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let popped = match self.list_mut(key, false)? {
            Some(list) => list.pop_back(),
            None => None,
        };
        self.drop_if_empty(key);
        Ok(popped)
    }
}

/// In-memory store backend.
///
/// Cloning shares the same keyspace, so several queue components (or
/// simulated processes in a test) can coordinate through one instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    keyspace: Arc<Mutex<Keyspace>>,
    pushed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        let len = {
            let mut ks = self.keyspace.lock().await;
            let list = ks
                .list_mut(key, true)?
                .ok_or_else(|| StoreError::Command(format!("cannot create list {key}")))?;
            list.push_front(value.to_string());
            list.len() as i64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        let len = {
            let mut ks = self.keyspace.lock().await;
            let list = ks
                .list_mut(key, true)?
                .ok_or_else(|| StoreError::Command(format!("cannot create list {key}")))?;
            list.push_back(value.to_string());
            list.len() as i64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.keyspace.lock().await.pop_tail(key)
    }

    async fn brpop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        let deadline = expiry(timeout);

        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut ks = self.keyspace.lock().await;
                for key in keys {
                    if let Some(value) = ks.pop_tail(key)? {
                        return Ok(Some((key.clone(), value)));
                    }
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        let mut ks = self.keyspace.lock().await;
        Ok(ks.list_mut(key, false)?.map(|l| l.len() as i64).unwrap_or(0))
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let Some(list) = ks.list_mut(key, false)? else {
            return Ok(Vec::new());
        };

        let len = list.len() as isize;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock().await;
        if let Some(hash) = ks.hash_mut(key, true)? {
            hash.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let Some(hash) = ks.hash_mut(key, true)? else {
            return Ok(false);
        };
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut ks = self.keyspace.lock().await;
        Ok(ks.hash_mut(key, false)?.cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<i64, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let removed = match ks.hash_mut(key, false)? {
            Some(hash) => fields.iter().filter(|f| hash.remove(*f).is_some()).count() as i64,
            None => 0,
        };
        ks.drop_if_empty(key);
        Ok(removed)
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock().await;
        if let Some(zset) = ks.zset_mut(key, true)? {
            zset.insert(member.to_string(), score);
        }
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let Some(zset) = ks.zset_mut(key, false)? else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(i64, String)> = zset
            .iter()
            .filter(|(_, score)| (min..=max).contains(*score))
            .map(|(member, score)| (*score, member.clone()))
            .collect();
        hits.sort();
        Ok(hits.into_iter().map(|(_, member)| member).collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let removed = match ks.zset_mut(key, false)? {
            Some(zset) => zset.remove(member).is_some(),
            None => false,
        };
        ks.drop_if_empty(key);
        Ok(removed)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut ks = self.keyspace.lock().await;
        match ks.live(key).map(|e| &e.value) {
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock().await;
        if ks.live(key).is_some() {
            return Ok(false);
        }
        ks.entries
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(true)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut ks = self.keyspace.lock().await;
        ks.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: expiry(ttl),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock().await;
        if ks.live(key).is_some() {
            return Ok(false);
        }
        ks.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock().await;
        match ks.live(key) {
            Some(entry) => {
                entry.expires_at = expiry(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keyspace.lock().await.live(key).is_some())
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let held = match ks.live(key).map(|e| &e.value) {
            Some(Value::Str(s)) => s == expected,
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
            None => false,
        };
        if held {
            ks.entries.remove(key);
        }
        Ok(held)
    }

    async fn del(&self, keys: &[String]) -> Result<i64, StoreError> {
        let mut ks = self.keyspace.lock().await;
        let mut removed = 0;
        for key in keys {
            if ks.live(key).is_some() {
                ks.entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_list_push_head_pop_tail_is_fifo() {
        let store = MemoryStore::new();
        assert_eq!(store.lpush("q", "a").await.unwrap(), 1);
        assert_eq!(store.lpush("q", "b").await.unwrap(), 2);

        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.rpop("q").await.unwrap(), None);

        // Drained lists disappear
        assert!(!store.exists("q").await.unwrap());
    }

    #[tokio::test]
    async fn test_lrange_handles_negative_indexes() {
        let store = MemoryStore::new();
        for v in ["c", "b", "a"] {
            store.lpush("l", v).await.unwrap();
        }
        assert_eq!(store.lrange("l", 0, -1).await.unwrap(), keys(&["a", "b", "c"]));
        assert_eq!(store.lrange("l", 1, 1).await.unwrap(), keys(&["b"]));
        assert_eq!(store.lrange("l", -2, -1).await.unwrap(), keys(&["b", "c"]));
        assert!(store.lrange("l", 5, 10).await.unwrap().is_empty());
        assert!(store.lrange("missing", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_brpop_times_out_on_empty_lists() {
        let store = MemoryStore::new();
        let start = Instant::now();
        let popped = store
            .brpop(&keys(&["a", "b"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(popped.is_none());
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_brpop_checks_keys_in_order() {
        let store = MemoryStore::new();
        store.lpush("b", "from-b").await.unwrap();
        store.lpush("a", "from-a").await.unwrap();

        let popped = store
            .brpop(&keys(&["a", "b"]), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(popped, Some(("a".to_string(), "from-a".to_string())));
    }

    #[tokio::test]
    async fn test_push_wakes_blocked_brpop() {
        let store = MemoryStore::new();
        let waiter = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .brpop(&["q".to_string()], Duration::from_secs(5))
                    .await
                    .unwrap()
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.lpush("q", "job").await.unwrap();

        let popped = waiter.await.unwrap();
        assert_eq!(popped, Some(("q".to_string(), "job".to_string())));
    }

    #[tokio::test]
    async fn test_set_nx_only_first_caller_wins() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock", "1").await.unwrap());
        assert!(!store.set_nx("lock", "2").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_removes_key() {
        let store = MemoryStore::new();
        store.set_ex("hb", "", Duration::from_secs(2)).await.unwrap();
        assert!(store.exists("hb").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.expire("hb", Duration::from_secs(2)).await.unwrap());

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(store.exists("hb").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!store.exists("hb").await.unwrap());
        assert!(!store.expire("hb", Duration::from_secs(2)).await.unwrap());
        // An expired lock can be taken again
        assert!(store.set_nx("hb", "again").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_nx_ex_creates_with_ttl() {
        let store = MemoryStore::new();
        assert!(store.set_nx_ex("lock", "1", Duration::from_secs(2)).await.unwrap());
        assert!(!store.set_nx_ex("lock", "2", Duration::from_secs(2)).await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!store.exists("lock").await.unwrap());
        assert!(store.set_nx_ex("lock", "3", Duration::from_secs(2)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let store = MemoryStore::new();
        assert!(store.set_nx_ex("u", "1", Duration::MAX).await.unwrap());
        store.set_ex("e", "1", Duration::MAX).await.unwrap();
        assert!(store.expire("u", Duration::from_secs(u64::MAX)).await.unwrap());

        assert!(store.exists("u").await.unwrap());
        assert!(store.exists("e").await.unwrap());
    }

    #[tokio::test]
    async fn test_del_if_eq_only_removes_own_value() {
        let store = MemoryStore::new();
        store.set_nx("master", "session-a").await.unwrap();

        assert!(!store.del_if_eq("master", "session-b").await.unwrap());
        assert!(store.exists("master").await.unwrap());
        assert!(store.del_if_eq("master", "session-a").await.unwrap());
        assert!(!store.exists("master").await.unwrap());
        assert!(!store.del_if_eq("master", "session-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();
        assert!(store.hset_nx("h", "f", "1").await.unwrap());
        assert!(!store.hset_nx("h", "f", "2").await.unwrap());
        store.hset("h", "g", "3").await.unwrap();

        let all = store.hgetall("h").await.unwrap();
        assert_eq!(all.get("f").map(String::as_str), Some("1"));
        assert_eq!(all.len(), 2);

        assert_eq!(store.hdel("h", &keys(&["f", "nope"])).await.unwrap(), 1);
        assert_eq!(store.hdel("h", &keys(&["g"])).await.unwrap(), 1);
        assert!(!store.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn test_sorted_set_range_by_score() {
        let store = MemoryStore::new();
        store.zadd("z", "300", 300).await.unwrap();
        store.zadd("z", "100", 100).await.unwrap();
        store.zadd("z", "200", 200).await.unwrap();

        assert_eq!(
            store.zrange_by_score("z", 0, 200).await.unwrap(),
            keys(&["100", "200"])
        );
        assert!(store.zrem("z", "100").await.unwrap());
        assert!(!store.zrem("z", "100").await.unwrap());
        assert_eq!(store.zrange_by_score("z", 0, 1000).await.unwrap(), keys(&["200", "300"]));
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.set_nx("k", "v").await.unwrap();
        assert!(matches!(
            store.lpush("k", "x").await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn test_del_counts_existing_keys() {
        let store = MemoryStore::new();
        store.set_nx("a", "1").await.unwrap();
        store.lpush("b", "1").await.unwrap();
        assert_eq!(store.del(&keys(&["a", "b", "c"])).await.unwrap(), 2);
        assert!(!store.exists("a").await.unwrap());
    }
}
