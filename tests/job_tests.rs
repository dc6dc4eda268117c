//! Batch jobs over the in-memory backend.

use std::collections::BTreeSet;

use crawldb::backend::MemoryBackend;
use crawldb::job::{host_partition, JobStats, PageJob, Partition};
use crawldb::webpage::CrawlStatus;
use crawldb::*;

const URLS: &[&str] = &[
    "http://example.com/",
    "http://example.com/about",
    "http://www.example.com/news",
    "http://example.org/",
    "http://example.org/contact",
    "https://blog.example.net/post/1",
    "https://blog.example.net/post/2",
];

async fn seeded_store() -> WebPageStore<MemoryBackend> {
    let store = WebPageStore::new(MemoryBackend::default());
    for url in URLS {
        let page = WebPage::builder()
            .base_url(*url)
            .status(CrawlStatus::Unfetched)
            .build();
        store.put(url, &page).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_counts_pages_per_host() {
    let store = seeded_store().await;
    let job = PageJob::builder()
        .fields(vec![WebPageField::BaseUrl])
        .batch_size(2)
        .build();

    let stats = job
        .run(
            &store,
            |key, record| {
                assert!(record.contains(WebPageField::BaseUrl));
                assert!(!record.contains(WebPageField::Text));
                let host = reversed_host(key)?.to_string();
                Ok(vec![(host, 1u32)])
            },
            |host, counts| {
                let summary = WebPage::builder()
                    .base_url(format!("summary://{}", reverse_host(host)))
                    .title(counts.iter().sum::<u32>().to_string())
                    .build();
                Ok(vec![(format!("{}:summary", host), summary)])
            },
        )
        .await
        .unwrap();

    assert_eq!(
        stats,
        JobStats {
            records_read: 7,
            records_skipped: 0,
            map_outputs: 7,
            records_written: 4,
        }
    );

    assert_eq!(store.get_by_key("com.example:summary").await.unwrap().title, "2");
    assert_eq!(store.get_by_key("com.example.www:summary").await.unwrap().title, "1");
    assert_eq!(store.get_by_key("org.example:summary").await.unwrap().title, "2");
    assert_eq!(store.get_by_key("net.example.blog:summary").await.unwrap().title, "2");
}

#[tokio::test]
async fn test_job_respects_key_range() {
    let store = seeded_store().await;
    let job = PageJob::builder()
        .start("com.")
        .end("com/")
        .batch_size(1)
        .build();

    let mut seen = Vec::new();
    let stats = job
        .run_mapper_only(&store, |key, _| {
            seen.push(key.to_string());
            Ok(None)
        })
        .await
        .unwrap();

    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.records_written, 0);
    assert_eq!(
        seen,
        vec![
            "com.example.www:http/news",
            "com.example:http/",
            "com.example:http/about",
        ]
    );
}

#[tokio::test]
async fn test_mapper_only_updates_in_place() {
    let store = seeded_store().await;
    let job = PageJob::builder().batch_size(3).build();

    let stats = job
        .run_mapper_only(&store, |_, record| {
            let mut page = record.into_page()?;
            page.mark_fetched(CrawlStatus::Fetched);
            Ok(Some(page))
        })
        .await
        .unwrap();

    assert_eq!(stats.records_read, 7);
    assert_eq!(stats.records_written, 7);

    for url in URLS {
        let page = store.get(url).await.unwrap();
        assert_eq!(page.status, CrawlStatus::Fetched);
        assert_eq!(page.base_url, *url);
        assert!(page.fetched_at().is_some());
    }
}

#[tokio::test]
async fn test_partitions_cover_every_record_once() {
    let store = seeded_store().await;
    let count = 3;

    let mut visited = Vec::new();
    let mut skipped = 0;
    for index in 0..count {
        let job = PageJob::builder()
            .partition(Partition { index, count })
            .build();

        let stats = job
            .run_mapper_only(&store, |key, _| {
                assert_eq!(host_partition(key, count).unwrap(), index);
                visited.push(key.to_string());
                Ok(None)
            })
            .await
            .unwrap();

        assert_eq!(stats.records_read, URLS.len() as u64);
        skipped += stats.records_skipped;
    }

    assert_eq!(skipped, URLS.len() as u64 * (count as u64 - 1));

    let unique: BTreeSet<&String> = visited.iter().collect();
    assert_eq!(visited.len(), URLS.len());
    assert_eq!(unique.len(), URLS.len());
}

#[tokio::test]
async fn test_mapper_error_aborts_job() {
    let store = seeded_store().await;
    let job = PageJob::builder().build();

    let result = job
        .run(
            &store,
            |key, _| -> Result<Vec<(String, ())>, CrawlError> {
                Err(CrawlError::InvalidInput(format!("cannot map {}", key)))
            },
            |_, _| Ok(vec![]),
        )
        .await;

    assert!(matches!(result, Err(CrawlError::JobFailed(_))));
}

#[tokio::test]
async fn test_reducer_output_must_be_reversed_keys() {
    let store = seeded_store().await;
    let job = PageJob::builder().build();

    let result = job
        .run(
            &store,
            |_, _| Ok(vec![((), ())]),
            |_, _| Ok(vec![("not-a-key".to_string(), WebPage::default())]),
        )
        .await;

    assert!(matches!(result, Err(CrawlError::MalformedKey(_))));
}

#[tokio::test]
async fn test_zero_batch_size_is_rejected() {
    let store = seeded_store().await;
    let job = PageJob::builder().batch_size(0).build();

    let result = job.run_mapper_only(&store, |_, _| Ok(None)).await;
    assert!(matches!(result, Err(CrawlError::InvalidInput(_))));
}
