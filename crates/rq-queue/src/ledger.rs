//! Failure ledger: append-only list of jobs that did not complete

use std::sync::Arc;

use rq_store::StoreBackend;
use serde::Serialize;
use tracing::warn;

use crate::error::QueueResult;
use crate::job::FailureRecord;
use crate::keys::KeySpace;

/// A slice of the ledger together with its total size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureList {
    pub count: i64,
    pub entries: Vec<FailureRecord>,
}

#[derive(Debug, Clone)]
pub struct FailureLedger {
    store: Arc<dyn StoreBackend>,
    key: String,
}

impl FailureLedger {
    pub fn new(store: Arc<dyn StoreBackend>, keys: &KeySpace) -> Self {
        Self {
            store,
            key: keys.failed(),
        }
    }

    /// Record a failure at the head of the ledger
    pub async fn append(&self, record: &FailureRecord) -> QueueResult<i64> {
        let raw = serde_json::to_string(record)?;
        Ok(self.store.lpush(&self.key, &raw).await?)
    }

    /// Convenience wrapper building the record from a payload and a reason
    pub async fn record(&self, payload: &str, reason: impl Into<String>) -> QueueResult<i64> {
        self.append(&FailureRecord {
            data: payload.to_string(),
            reason: reason.into(),
        })
        .await
    }

    /// Inclusive slice, newest first. Entries that are not valid records are
    /// skipped.
    pub async fn list(&self, start: isize, end: isize) -> QueueResult<FailureList> {
        let count = self.store.llen(&self.key).await?;
        let entries = self
            .store
            .lrange(&self.key, start, end)
            .await?
            .into_iter()
            .filter_map(|raw| match serde_json::from_str(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable failure record");
                    None
                }
            })
            .collect();

        Ok(FailureList { count, entries })
    }

    pub async fn len(&self) -> QueueResult<i64> {
        Ok(self.store.llen(&self.key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rq_store::MemoryStore;

    fn ledger() -> FailureLedger {
        FailureLedger::new(Arc::new(MemoryStore::new()), &KeySpace::new("", None))
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let ledger = ledger();
        ledger.record("{\"cmd\":\"a-1\"}", "first").await.unwrap();
        ledger.record("{\"cmd\":\"a-2\"}", "second").await.unwrap();
        ledger.record("{\"cmd\":\"a-3\"}", "third").await.unwrap();

        let page = ledger.list(0, 1).await.unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].reason, "third");
        assert_eq!(page.entries[1].reason, "second");

        let all = ledger.list(0, -1).await.unwrap();
        assert_eq!(all.entries.len(), 3);
        assert_eq!(all.entries[2].data, "{\"cmd\":\"a-1\"}");
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = ledger();
        assert_eq!(ledger.list(0, 9).await.unwrap(), FailureList::default());
        assert_eq!(ledger.len().await.unwrap(), 0);
    }
}
