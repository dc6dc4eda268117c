pub mod lifecycle;
pub mod memory;
pub mod tikv;

pub use memory::{MemoryBackend, MemoryTransaction};
pub use tikv::{TiKvBackend, TiKvTransaction};

use crate::error::CrawlError;
use crate::types::{CrawlConfigs, CrawlEngine, CrawlKvPair, CrawlTransaction, CrawlValue};
use async_trait::async_trait;
use std::future::Future;
use std::ops::Range;

/// A backend chosen at runtime from [`crate::types::StoreConfig`].
#[derive(Clone)]
pub enum Backend {
    TiKv(TiKvBackend),
    Memory(MemoryBackend),
}

#[derive(Clone)]
pub enum BackendTransaction {
    TiKv(TiKvTransaction),
    Memory(MemoryTransaction),
}

#[async_trait]
impl CrawlEngine for Backend {
    type Transaction = BackendTransaction;
    type Error = CrawlError;

    async fn begin_transaction(&self) -> Result<Self::Transaction, Self::Error> {
        match self {
            Backend::TiKv(backend) => backend.begin_transaction().await.map(BackendTransaction::TiKv),
            Backend::Memory(backend) => backend
                .begin_transaction()
                .await
                .map(BackendTransaction::Memory),
        }
    }

    fn configs(&self) -> CrawlConfigs {
        match self {
            Backend::TiKv(backend) => backend.configs(),
            Backend::Memory(backend) => backend.configs(),
        }
    }

    async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Self::Transaction) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<CrawlError> + Send,
    {
        match self {
            Backend::TiKv(backend) => {
                backend
                    .transaction(|tx| f(BackendTransaction::TiKv(tx)))
                    .await
            }
            Backend::Memory(backend) => {
                backend
                    .transaction(|tx| f(BackendTransaction::Memory(tx)))
                    .await
            }
        }
    }

    async fn clear_active_transactions(&self) -> Result<(), CrawlError> {
        match self {
            Backend::TiKv(backend) => backend.clear_active_transactions().await,
            Backend::Memory(backend) => backend.clear_active_transactions().await,
        }
    }
}

#[async_trait]
impl CrawlTransaction for BackendTransaction {
    type Error = CrawlError;

    async fn get<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<Option<CrawlValue>, Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.get(key).await,
            BackendTransaction::Memory(tx) => tx.get(key).await,
        }
    }

    async fn put<K: AsRef<[u8]> + Send, V: AsRef<[u8]> + Send>(
        &self,
        key: K,
        value: V,
    ) -> Result<(), Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.put(key, value).await,
            BackendTransaction::Memory(tx) => tx.put(key, value).await,
        }
    }

    async fn delete<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<(), Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.delete(key).await,
            BackendTransaction::Memory(tx) => tx.delete(key).await,
        }
    }

    async fn scan<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.scan(range, limit).await,
            BackendTransaction::Memory(tx) => tx.scan(range, limit).await,
        }
    }

    async fn scan_reverse<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.scan_reverse(range, limit).await,
            BackendTransaction::Memory(tx) => tx.scan_reverse(range, limit).await,
        }
    }

    async fn batch_get<K: AsRef<[u8]> + Send>(
        &self,
        keys: Vec<K>,
    ) -> Result<Vec<CrawlKvPair>, Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.batch_get(keys).await,
            BackendTransaction::Memory(tx) => tx.batch_get(keys).await,
        }
    }

    async fn commit(self) -> Result<(), Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.commit().await,
            BackendTransaction::Memory(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), Self::Error> {
        match self {
            BackendTransaction::TiKv(tx) => tx.rollback().await,
            BackendTransaction::Memory(tx) => tx.rollback().await,
        }
    }
}
