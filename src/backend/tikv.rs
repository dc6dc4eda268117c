//! TiKV backend.
//!
//! Page keys are plain reversed-URL strings, so a host or domain scan maps to
//! one contiguous TiKV key range and stays within few regions.

use super::lifecycle::{ActiveTransactions, ScanRange};
use crate::error::CrawlError;
use crate::types::{CrawlConfigs, CrawlEngine, CrawlKvPair, CrawlTransaction, CrawlValue, DBUuid};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use tikv_client::{BoundRange, Key, KvPair, Transaction, TransactionClient};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone)]
pub struct TiKvBackend {
    pub client: Arc<TransactionClient>,
    pub configs: CrawlConfigs,
    pub active_transactions: ActiveTransactions<TiKvTransaction>,
}

impl TiKvBackend {
    /// Connects to the placement driver at `endpoints`.
    pub async fn connect<S: AsRef<str>>(
        endpoints: &[S],
        configs: CrawlConfigs,
    ) -> Result<Self, CrawlError> {
        if endpoints.is_empty() {
            return Err(CrawlError::Configuration(
                "At least one PD endpoint is required".to_string(),
            ));
        }

        let endpoints: Vec<String> = endpoints.iter().map(|s| s.as_ref().to_string()).collect();
        debug!("Connecting to TiKV through {:?}", endpoints);

        let client = TransactionClient::new(endpoints)
            .await
            .map_err(|e| CrawlError::ConnectionFailed(format!("Failed to connect to TiKV: {}", e)))?;

        Ok(TiKvBackend {
            client: Arc::new(client),
            configs,
            active_transactions: ActiveTransactions::default(),
        })
    }
}

#[async_trait]
impl CrawlEngine for TiKvBackend {
    type Transaction = TiKvTransaction;
    type Error = CrawlError;

    async fn begin_transaction(&self) -> Result<Self::Transaction, Self::Error> {
        let tx = self
            .client
            .begin_pessimistic()
            .await
            .map_err(tikv_error("begin", CrawlError::TransactionFailed))?;

        Ok(TiKvTransaction {
            id: DBUuid::new_v4().to_string(),
            inner: Arc::new(Mutex::new(tx)),
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

/// A pessimistic TiKV transaction. Clones share the same underlying
/// transaction.
#[derive(Clone)]
pub struct TiKvTransaction {
    pub id: String,
    inner: Arc<Mutex<Transaction>>,
}

impl TiKvTransaction {
    async fn lock(&self) -> MutexGuard<'_, Transaction> {
        self.inner.lock().await
    }
}

fn tikv_error(
    operation: &'static str,
    variant: fn(String) -> CrawlError,
) -> impl FnOnce(tikv_client::Error) -> CrawlError {
    move |e| variant(format!("TiKV {} failed: {}", operation, e))
}

fn to_bound_range(range: ScanRange) -> BoundRange {
    match range.into_parts() {
        (start, Some(end)) => (start..end).into(),
        (start, None) => (start..).into(),
    }
}

fn to_pairs(pairs: impl Iterator<Item = KvPair>) -> Vec<CrawlKvPair> {
    pairs.map(|KvPair(key, value)| (key.into(), value)).collect()
}

#[async_trait]
impl CrawlTransaction for TiKvTransaction {
    type Error = CrawlError;

    async fn get<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<Option<CrawlValue>, Self::Error> {
        let key = Key::from(key.as_ref().to_vec());
        self.lock()
            .await
            .get(key)
            .await
            .map_err(tikv_error("get", CrawlError::QueryFailed))
    }

    async fn put<K: AsRef<[u8]> + Send, V: AsRef<[u8]> + Send>(
        &self,
        key: K,
        value: V,
    ) -> Result<(), Self::Error> {
        let key = Key::from(key.as_ref().to_vec());
        self.lock()
            .await
            .put(key, value.as_ref().to_vec())
            .await
            .map_err(tikv_error("put", CrawlError::UpdateFailed))
    }

    async fn delete<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<(), Self::Error> {
        let key = Key::from(key.as_ref().to_vec());
        self.lock()
            .await
            .delete(key)
            .await
            .map_err(tikv_error("delete", CrawlError::DeleteFailed))
    }

    async fn scan<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        let range = ScanRange::new(range);
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let pairs = self
            .lock()
            .await
            .scan(to_bound_range(range), limit)
            .await
            .map_err(tikv_error("scan", CrawlError::QueryFailed))?;
        Ok(to_pairs(pairs))
    }

    async fn scan_reverse<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        let range = ScanRange::new(range);
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let pairs = self
            .lock()
            .await
            .scan_reverse(to_bound_range(range), limit)
            .await
            .map_err(tikv_error("reverse scan", CrawlError::QueryFailed))?;
        Ok(to_pairs(pairs))
    }

    /// Returns the pairs that exist, in the order the keys were requested.
    async fn batch_get<K: AsRef<[u8]> + Send>(
        &self,
        keys: Vec<K>,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        let requested: Vec<Vec<u8>> = keys.iter().map(|k| k.as_ref().to_vec()).collect();

        let pairs = self
            .lock()
            .await
            .batch_get(requested.iter().cloned().map(Key::from))
            .await
            .map_err(tikv_error("batch get", CrawlError::QueryFailed))?;
        let mut found: HashMap<Vec<u8>, Vec<u8>> = to_pairs(pairs).into_iter().collect();

        Ok(requested
            .into_iter()
            .filter_map(|key| found.remove(&key).map(|value| (key, value)))
            .collect())
    }

    async fn commit(self) -> Result<(), Self::Error> {
        self.lock()
            .await
            .commit()
            .await
            .map(|_| ())
            .map_err(tikv_error("commit", CrawlError::TransactionFailed))
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        self.lock()
            .await
            .rollback()
            .await
            .map_err(tikv_error("rollback", CrawlError::TransactionFailed))
    }
}
