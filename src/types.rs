use crate::error::CrawlError;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use std::future::Future;
use std::ops::Range;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct CrawlConfigs {
    pub is_read_only: Arc<AtomicBool>,
}

impl CrawlConfigs {
    pub fn new(read_only: bool) -> Self {
        Self {
            is_read_only: Arc::new(AtomicBool::new(read_only)),
        }
    }
}

pub type CrawlKey = Vec<u8>;
pub type CrawlValue = Vec<u8>;
pub type CrawlKvPair = (CrawlKey, CrawlValue);

pub type DBUuid = Uuid;

/// A key-value store that hands out transactions.
#[async_trait]
pub trait CrawlEngine: Send + Sync + Clone {
    type Transaction: CrawlTransaction;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn begin_transaction(&self) -> Result<Self::Transaction, Self::Error>;

    fn configs(&self) -> CrawlConfigs;

    /// Runs `f` in a new transaction, committing when it returns `Ok` and
    /// rolling back otherwise.
    async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Self::Transaction) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<CrawlError> + Send;

    async fn clear_active_transactions(&self) -> Result<(), CrawlError>;
}

/// Operations on an open transaction. In scans an empty range end means
/// "no upper bound".
#[async_trait]
pub trait CrawlTransaction: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<Option<CrawlValue>, Self::Error>;

    async fn put<K: AsRef<[u8]> + Send, V: AsRef<[u8]> + Send>(
        &self,
        key: K,
        value: V,
    ) -> Result<(), Self::Error>;

    async fn delete<K: AsRef<[u8]> + Send>(&self, key: K) -> Result<(), Self::Error>;

    async fn scan<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error>;

    async fn scan_reverse<K: AsRef<[u8]> + Send>(
        &self,
        range: Range<K>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, Self::Error>;

    async fn batch_get<K: AsRef<[u8]> + Send>(
        &self,
        keys: Vec<K>,
    ) -> Result<Vec<CrawlKvPair>, Self::Error>;

    async fn commit(self) -> Result<(), Self::Error>;

    async fn rollback(self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    TiKv,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tikv" => Ok(BackendKind::TiKv),
            "memory" => Ok(BackendKind::Memory),
            other => Err(CrawlError::Configuration(format!(
                "Unknown backend '{}', expected 'tikv' or 'memory'",
                other
            ))),
        }
    }
}

pub const DEFAULT_PD_ENDPOINT: &str = "127.0.0.1:2379";

pub const ENV_BACKEND: &str = "CRAWLDB_BACKEND";
pub const ENV_PD_ENDPOINTS: &str = "CRAWLDB_PD_ENDPOINTS";
pub const ENV_READ_ONLY: &str = "CRAWLDB_READ_ONLY";

/// Which store to open and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub pd_endpoints: Vec<String>,
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            pd_endpoints: vec![DEFAULT_PD_ENDPOINT.to_string()],
            read_only: false,
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CrawlError> {
        serde_json::from_str(json)
            .map_err(|e| CrawlError::Configuration(format!("Invalid store config: {}", e)))
    }

    /// Reads `CRAWLDB_BACKEND`, `CRAWLDB_PD_ENDPOINTS` (comma separated) and
    /// `CRAWLDB_READ_ONLY`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, CrawlError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<L>(lookup: L) -> Result<Self, CrawlError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup(ENV_BACKEND) {
            config.backend = backend.parse()?;
        }

        if let Some(endpoints) = lookup(ENV_PD_ENDPOINTS) {
            config.pd_endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(read_only) = lookup(ENV_READ_ONLY) {
            config.read_only = read_only.trim().parse().map_err(|_| {
                CrawlError::Configuration(format!(
                    "{} must be 'true' or 'false', got '{}'",
                    ENV_READ_ONLY, read_only
                ))
            })?;
        }

        Ok(config)
    }
}

#[derive(Default, Serialize, Debug)]
pub struct CrawlPaginated<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> CrawlPaginated<T> {
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self { items, cursor }
    }
}

#[derive(Default, Serialize, Deserialize, Debug)]
pub struct CrawlCursor {
    pub last_key: String,
}
