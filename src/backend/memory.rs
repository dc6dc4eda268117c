//! In-process backend over an ordered map.
//!
//! Each transaction buffers its writes and applies them on commit. Reads and
//! scans inside a transaction see its own pending writes.

use super::lifecycle::{ActiveTransactions, ScanRange};
use crate::error::CrawlError;
use crate::types::{CrawlConfigs, CrawlEngine, CrawlKvPair, CrawlTransaction, CrawlValue, DBUuid};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;
// None marks a pending delete
type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

#[derive(Clone)]
pub struct MemoryBackend {
    pub data: Arc<RwLock<Table>>,
    pub configs: CrawlConfigs,
    pub active_transactions: ActiveTransactions<MemoryTransaction>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(CrawlConfigs::default())
    }
}

impl MemoryBackend {
    pub fn new(configs: CrawlConfigs) -> Self {
        Self {
            data: Arc::new(RwLock::new(Table::new())),
            configs,
            active_transactions: ActiveTransactions::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl CrawlEngine for MemoryBackend {
    type Transaction = MemoryTransaction;
    type Error = CrawlError;

    async fn begin_transaction(&self) -> Result<Self::Transaction, Self::Error> {
        Ok(MemoryTransaction {
            id: DBUuid::new_v4().to_string(),
            data: self.data.clone(),
            writes: Arc::new(Mutex::new(WriteSet::new())),
        })
    }

    fn configs(&self) -> CrawlConfigs {
        self.configs.clone()
    }

    async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Self::Transaction) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<CrawlError> + Send,
    {
        let tx = self.begin_transaction().await.map_err(E::from)?;
        let id = tx.id.clone();
        self.active_transactions.register(id.clone(), tx.clone()).await;

        let result = f(tx.clone()).await;
        self.active_transactions.finish(&id, tx, result.is_ok()).await;

        result
    }

    async fn clear_active_transactions(&self) -> Result<(), CrawlError> {
        self.active_transactions.rollback_all().await;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryTransaction {
    pub id: String,
    data: Arc<RwLock<Table>>,
    writes: Arc<Mutex<WriteSet>>,
}

impl MemoryTransaction {
    async fn merged_range(&self, range: &ScanRange) -> Table {
        if range.is_empty() {
            return Table::new();
        }
        let bounds = range.bounds();

        let mut merged: Table = self
            .data
            .read()
            .await
            .range::<[u8], _>(bounds)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let writes = self.writes.lock().await;
        for (key, write) in writes.range::<[u8], _>(bounds) {
            match write {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        merged
    }
}

#[async_trait]
impl CrawlTransaction for MemoryTransaction {
    type Error = CrawlError;

    async fn get<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<Option<CrawlValue>, Self::Error> {
        let key = key.as_ref().to_vec();

        if let Some(write) = self.writes.lock().await.get(&key) {
            return Ok(write.clone());
        }

        Ok(self.data.read().await.get(&key).cloned())
    }

    async fn put<K: AsRef<[u8]> + Send, V: AsRef<[u8]> + Send>(
        &self,
        key: K,
        value: V,
    ) -> Result<(), Self::Error> {
        let key = key.as_ref().to_vec();
        let value = value.as_ref().to_vec();

        self.writes.lock().await.insert(key, Some(value));
        Ok(())
    }

    async fn delete<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<(), Self::Error> {
        let key = key.as_ref().to_vec();

        self.writes.lock().await.insert(key, None);
        Ok(())
    }

    async fn scan<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        let merged = self.merged_range(&ScanRange::new(range)).await;

        Ok(merged.into_iter().take(limit as usize).collect())
    }

    async fn scan_reverse<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        let merged = self.merged_range(&ScanRange::new(range)).await;

        Ok(merged.into_iter().rev().take(limit as usize).collect())
    }

    async fn batch_get<K: AsRef<[u8]> + Send>(
        &self,
        keys: Vec<K>,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref().to_vec();
            if let Some(value) = self.get(&key).await? {
                pairs.push((key, value));
            }
        }
        Ok(pairs)
    }

    async fn commit(self) -> Result<(), Self::Error> {
        let writes = std::mem::take(&mut *self.writes.lock().await);
        let mut data = self.data.write().await;

        for (key, write) in writes {
            match write {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        self.writes.lock().await.clear();
        Ok(())
    }
}
