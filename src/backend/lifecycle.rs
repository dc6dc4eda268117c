//! Bookkeeping shared by the concrete backends.

use crate::error::CrawlError;
use crate::types::CrawlTransaction;
use futures::lock::Mutex;
use log::warn;
use std::collections::HashMap;
use std::ops::{Bound, Range};
use std::sync::Arc;

/// Transactions opened by `CrawlEngine::transaction` that have not been
/// committed or rolled back yet.
#[derive(Clone)]
pub struct ActiveTransactions<T> {
    inner: Arc<Mutex<HashMap<String, T>>>,
}

impl<T> Default for ActiveTransactions<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> ActiveTransactions<T>
where
    T: CrawlTransaction<Error = CrawlError> + Clone,
{
    pub async fn register(&self, id: String, tx: T) {
        self.inner.lock().await.insert(id, tx);
    }

    /// Commits or rolls back the registered copy of `id`, falling back to
    /// `tx` when cleanup already took it. Finalization errors are logged,
    /// the caller's own result wins.
    pub async fn finish(&self, id: &str, tx: T, commit: bool) {
        let registered = self.inner.lock().await.remove(id);
        let tx = registered.unwrap_or(tx);

        let outcome = if commit {
            tx.commit().await
        } else {
            tx.rollback().await
        };

        if let Err(e) = outcome {
            warn!("Transaction {} finalization failed: {}", id, e);
        }
    }

    pub async fn rollback_all(&self) {
        let transactions: Vec<_> = self.inner.lock().await.drain().collect();

        for (id, tx) in transactions {
            if let Err(e) = tx.rollback().await {
                warn!("Failed to rollback transaction {}: {}", id, e);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

/// Owned scan bounds. An empty end key means no upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    start: Vec<u8>,
    end: Option<Vec<u8>>,
}

impl ScanRange {
    pub fn new<K: AsRef<[u8]>>(range: Range<K>) -> Self {
        let end = range.end.as_ref();
        Self {
            start: range.start.as_ref().to_vec(),
            end: (!end.is_empty()).then(|| end.to_vec()),
        }
    }

    /// True when no key can fall in the range, e.g. `z..a`.
    pub fn is_empty(&self) -> bool {
        matches!(&self.end, Some(end) if self.start >= *end)
    }

    pub fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let upper = match &self.end {
            Some(end) => Bound::Excluded(end.as_slice()),
            None => Bound::Unbounded,
        };
        (Bound::Included(self.start.as_slice()), upper)
    }

    pub fn into_parts(self) -> (Vec<u8>, Option<Vec<u8>>) {
        (self.start, self.end)
    }
}
