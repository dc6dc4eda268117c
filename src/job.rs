//! Batch jobs over stored pages.
//!
//! A job pages through a projected range query, hands each record to a
//! mapper, groups the mapper output by key and feeds each group to a reducer
//! whose output is written back to the store.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use log::{debug, info};
use typed_builder::TypedBuilder;

use crate::error::CrawlError;
use crate::key_encoder::reversed_host;
use crate::store::{PageQuery, PageRecord, WebPageStore};
use crate::types::CrawlEngine;
use crate::webpage::{ProjectedPage, WebPage, WebPageField};

pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// Partition of `key` among `partition_count` workers. All keys of a host
/// map to the same partition.
pub fn host_partition(key: &str, partition_count: u32) -> Result<u32, CrawlError> {
    if partition_count == 0 {
        return Err(CrawlError::InvalidInput(
            "Partition count must be at least 1".to_string(),
        ));
    }

    let host = reversed_host(key)?;
    let mut hasher = DefaultHasher::new();
    host.hash(&mut hasher);
    Ok((hasher.finish() % partition_count as u64) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub records_read: u64,
    /// Records belonging to another partition
    pub records_skipped: u64,
    pub map_outputs: u64,
    pub records_written: u64,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct PageJob {
    #[builder(default)]
    pub fields: Vec<WebPageField>,
    #[builder(default, setter(into))]
    pub start: String,
    #[builder(default, setter(into, strip_option))]
    pub end: Option<String>,
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: u32,
    #[builder(default, setter(strip_option))]
    pub partition: Option<Partition>,
}

impl PageJob {
    fn owns(&self, key: &str) -> Result<bool, CrawlError> {
        match self.partition {
            None => Ok(true),
            Some(partition) => Ok(host_partition(key, partition.count)? == partition.index),
        }
    }

    async fn next_batch<E: CrawlEngine>(
        &self,
        store: &WebPageStore<E>,
        cursor: Option<String>,
    ) -> Result<(Vec<PageRecord>, Option<String>), CrawlError> {
        if self.batch_size == 0 {
            return Err(CrawlError::InvalidInput(
                "Batch size must be at least 1".to_string(),
            ));
        }

        let page = store
            .query(PageQuery {
                fields: self.fields.clone(),
                start: self.start.clone(),
                end: self.end.clone(),
                limit: Some(self.batch_size),
                cursor,
            })
            .await?;

        debug!("Job fetched a batch of {} records", page.items.len());
        Ok((page.items, page.cursor))
    }

    /// Runs `mapper` over every record in range and `reducer` over each group
    /// of mapper output. Reducers return `(reversed_key, page)` pairs.
    pub async fn run<E, K, V, M, R>(
        &self,
        store: &WebPageStore<E>,
        mut mapper: M,
        mut reducer: R,
    ) -> Result<JobStats, CrawlError>
    where
        E: CrawlEngine,
        K: Ord,
        M: FnMut(&str, &ProjectedPage) -> Result<Vec<(K, V)>, CrawlError>,
        R: FnMut(&K, Vec<V>) -> Result<Vec<(String, WebPage)>, CrawlError>,
    {
        let mut stats = JobStats::default();
        let mut grouped: BTreeMap<K, Vec<V>> = BTreeMap::new();
        let mut cursor = None;

        loop {
            let (records, next) = self.next_batch(store, cursor.take()).await?;

            for (key, record) in records {
                stats.records_read += 1;
                if !self.owns(&key)? {
                    stats.records_skipped += 1;
                    continue;
                }

                let outputs = mapper(&key, &record).map_err(|e| {
                    CrawlError::JobFailed(format!("Mapper failed on '{}': {}", key, e))
                })?;
                for (out_key, value) in outputs {
                    stats.map_outputs += 1;
                    grouped.entry(out_key).or_default().push(value);
                }
            }

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut writes = Vec::new();
        for (key, values) in grouped {
            let output = reducer(&key, values)
                .map_err(|e| CrawlError::JobFailed(format!("Reducer failed: {}", e)))?;
            writes.extend(output);
        }

        stats.records_written = store.put_batch(writes).await? as u64;

        info!(
            "Job finished: read {}, skipped {}, mapped {}, wrote {}",
            stats.records_read, stats.records_skipped, stats.map_outputs, stats.records_written
        );

        Ok(stats)
    }

    /// Runs `mapper` over every record in range, writing back each page it
    /// returns under the record's own key. Writes happen batch by batch.
    pub async fn run_mapper_only<E, M>(
        &self,
        store: &WebPageStore<E>,
        mut mapper: M,
    ) -> Result<JobStats, CrawlError>
    where
        E: CrawlEngine,
        M: FnMut(&str, ProjectedPage) -> Result<Option<WebPage>, CrawlError>,
    {
        let mut stats = JobStats::default();
        let mut cursor = None;

        loop {
            let (records, next) = self.next_batch(store, cursor.take()).await?;

            let mut updates = Vec::new();
            for (key, record) in records {
                stats.records_read += 1;
                if !self.owns(&key)? {
                    stats.records_skipped += 1;
                    continue;
                }

                let update = mapper(&key, record).map_err(|e| {
                    CrawlError::JobFailed(format!("Mapper failed on '{}': {}", key, e))
                })?;
                if let Some(page) = update {
                    stats.map_outputs += 1;
                    updates.push((key, page));
                }
            }

            if !updates.is_empty() {
                stats.records_written += store.put_batch(updates).await? as u64;
            }

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            "Mapper job finished: read {}, skipped {}, wrote {}",
            stats.records_read, stats.records_skipped, stats.records_written
        );

        Ok(stats)
    }
}
