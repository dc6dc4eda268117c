use std::ops::Range;
use std::sync::atomic::Ordering;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use crate::error::CrawlError;
use crate::key_encoder::{reverse_url, reverse_url_str, Locator, ReversedKey};
use crate::types::{CrawlCursor, CrawlEngine, CrawlKvPair, CrawlPaginated, CrawlTransaction};
use crate::utils::{domain_scan_ranges, host_scan_range, next_key};
use crate::webpage::{decode_page, encode_page, ProjectedPage, WebPage, WebPageField};

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
const MAX_WRITE_RETRIES: u32 = 5;
const INITIAL_RETRY_DELAY_MS: u64 = 10;

/// A range query over stored pages that loads only `fields`.
/// No fields means all of them; no `end` means "to the end of the table".
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PageQuery {
    pub fields: Vec<WebPageField>,
    pub start: String,
    pub end: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

pub type PageRecord = (String, ProjectedPage);

/// Pages keyed by reversed URL.
#[derive(Clone)]
pub struct WebPageStore<E: CrawlEngine> {
    pub engine: E,
}

impl<E: CrawlEngine> WebPageStore<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    fn decode_cursor(&self, cursor: &str) -> Result<CrawlCursor, CrawlError> {
        let bytes = STANDARD.decode(cursor).map_err(|_| {
            CrawlError::DeserializationFailed("Failed to decode cursor".to_string())
        })?;
        serde_json::from_slice::<CrawlCursor>(&bytes).map_err(|_| {
            CrawlError::DeserializationFailed("Failed to deserialize cursor".to_string())
        })
    }

    fn encode_cursor(&self, last_key: &str) -> Result<String, CrawlError> {
        let cursor = CrawlCursor {
            last_key: last_key.to_string(),
        };
        let json_bytes = serde_json::to_vec(&cursor).map_err(|_| {
            CrawlError::SerializationFailed("Failed to serialize cursor".to_string())
        })?;
        Ok(STANDARD.encode(json_bytes))
    }

    /// Stores `page` under the reversed key of `url` and returns that key.
    pub async fn put(&self, url: &str, page: &WebPage) -> Result<String, CrawlError> {
        let key = reverse_url_str(url)?;
        self.put_key(&key, page).await?;
        Ok(key)
    }

    pub async fn put_locator(&self, locator: &Locator, page: &WebPage) -> Result<String, CrawlError> {
        let key = reverse_url(locator);
        self.put_key(&key, page).await?;
        Ok(key)
    }

    /// Stores `page` under an already reversed key.
    pub async fn put_key(&self, key: &str, page: &WebPage) -> Result<(), CrawlError> {
        ReversedKey::parse(key)?;
        let bytes = encode_page(page)?;

        self.engine
            .transaction(|tx| async move { self.write_in_tx(key, &bytes, &tx).await })
            .await
    }

    /// Stores several pages, keyed by reversed key, in one transaction.
    pub async fn put_batch(&self, pages: Vec<(String, WebPage)>) -> Result<usize, CrawlError> {
        let mut encoded = Vec::with_capacity(pages.len());
        for (key, page) in pages.iter() {
            ReversedKey::parse(key)?;
            encoded.push((key.as_str(), encode_page(page)?));
        }
        let count = encoded.len();

        self.engine
            .transaction(|tx| async move {
                for (key, bytes) in encoded.iter() {
                    self.write_in_tx(key, bytes, &tx).await?;
                }
                Ok::<_, CrawlError>(())
            })
            .await?;

        Ok(count)
    }

    /// Writes inside `tx`, waiting with exponential backoff while the store
    /// is read-only.
    pub async fn write_in_tx(
        &self,
        key: &str,
        bytes: &[u8],
        tx: &E::Transaction,
    ) -> Result<(), CrawlError> {
        let configs = self.engine.configs();
        let mut retries = 0;
        let mut delay = INITIAL_RETRY_DELAY_MS;

        while configs.is_read_only.load(Ordering::SeqCst) {
            if retries >= MAX_WRITE_RETRIES {
                return Err(CrawlError::ReadOnlyMode);
            }

            sleep(Duration::from_millis(delay)).await;
            retries += 1;
            delay *= 2;
        }

        tx.put(key, bytes)
            .await
            .map_err(|e| CrawlError::UpdateFailed(e.to_string()))
    }

    pub async fn get(&self, url: &str) -> Result<WebPage, CrawlError> {
        let key = reverse_url_str(url)?;
        self.get_by_key(&key).await
    }

    pub async fn get_by_key(&self, key: &str) -> Result<WebPage, CrawlError> {
        let bytes = self.read_key(key).await?;
        decode_page(&bytes)
    }

    pub async fn get_fields(
        &self,
        url: &str,
        fields: &[WebPageField],
    ) -> Result<ProjectedPage, CrawlError> {
        let key = reverse_url_str(url)?;
        let bytes = self.read_key(&key).await?;
        ProjectedPage::from_record(&bytes, fields)
    }

    async fn read_key(&self, key: &str) -> Result<Vec<u8>, CrawlError> {
        let value = self
            .engine
            .transaction(|tx| async move {
                tx.get(key)
                    .await
                    .map_err(|e| CrawlError::QueryFailed(e.to_string()))
            })
            .await?;

        value.ok_or_else(|| CrawlError::NotFound(format!("No page stored under '{}'", key)))
    }

    pub async fn delete(&self, url: &str) -> Result<(), CrawlError> {
        let key = reverse_url_str(url)?;

        self.engine
            .transaction(|tx| async move {
                tx.delete(&key)
                    .await
                    .map_err(|e| CrawlError::DeleteFailed(e.to_string()))
            })
            .await
    }

    /// Runs a projected range query, one page of results at a time. Pass the
    /// returned cursor back in to continue after the last returned key.
    pub async fn query(&self, query: PageQuery) -> Result<CrawlPaginated<PageRecord>, CrawlError> {
        let limit = query.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if limit == 0 {
            return Err(CrawlError::InvalidInput(
                "Query limit must be at least 1".to_string(),
            ));
        }

        let start = match &query.cursor {
            Some(cursor) => next_key(self.decode_cursor(cursor)?.last_key.as_bytes()),
            None => query.start.into_bytes(),
        };
        let end = query.end.map(String::into_bytes).unwrap_or_default();

        let pairs = self.scan_raw(start..end, limit.saturating_add(1)).await?;
        let has_more = pairs.len() > limit as usize;

        let items = to_records(pairs.into_iter().take(limit as usize), &query.fields)?;

        let cursor = match items.last() {
            Some((last_key, _)) if has_more => Some(self.encode_cursor(last_key)?),
            _ => None,
        };

        debug!("Page query returned {} records, more: {}", items.len(), has_more);

        Ok(CrawlPaginated::new(items, cursor))
    }

    /// Pages of exactly `host`, in key order.
    pub async fn scan_host(
        &self,
        host: &str,
        fields: &[WebPageField],
        limit: u32,
    ) -> Result<Vec<PageRecord>, CrawlError> {
        let pairs = self.scan_raw(host_scan_range(host), limit).await?;
        to_records(pairs, fields)
    }

    /// Pages of `domain` and all of its subdomains, in key order.
    pub async fn scan_domain(
        &self,
        domain: &str,
        fields: &[WebPageField],
        limit: u32,
    ) -> Result<Vec<PageRecord>, CrawlError> {
        let [subdomains, exact] = domain_scan_ranges(domain);

        let pairs = self
            .engine
            .transaction(|tx| async move {
                let mut pairs = tx
                    .scan(subdomains, limit)
                    .await
                    .map_err(|e| CrawlError::QueryFailed(e.to_string()))?;

                let remaining = limit.saturating_sub(pairs.len() as u32);
                if remaining > 0 {
                    let rest = tx
                        .scan(exact, remaining)
                        .await
                        .map_err(|e| CrawlError::QueryFailed(e.to_string()))?;
                    pairs.extend(rest);
                }

                Ok::<_, CrawlError>(pairs)
            })
            .await?;

        to_records(pairs, fields)
    }

    async fn scan_raw(
        &self,
        range: Range<Vec<u8>>,
        limit: u32,
    ) -> Result<Vec<CrawlKvPair>, CrawlError> {
        self.engine
            .transaction(|tx| async move {
                tx.scan(range, limit)
                    .await
                    .map_err(|e| CrawlError::QueryFailed(e.to_string()))
            })
            .await
    }
}

fn to_records(
    pairs: impl IntoIterator<Item = CrawlKvPair>,
    fields: &[WebPageField],
) -> Result<Vec<PageRecord>, CrawlError> {
    pairs
        .into_iter()
        .map(|(key, value)| {
            let key = String::from_utf8(key)
                .map_err(|_| CrawlError::MalformedKey("Stored key is not UTF-8".to_string()))?;
            let page = ProjectedPage::from_record(&value, fields)?;
            Ok((key, page))
        })
        .collect()
}
