//! Integration tests for the crawl loop over fake transport and store.

use certscan::crawler::{CrawlState, PageOutcome};
use certscan::fetcher::RetryPolicy;
use certscan::merger::MergeSummary;
use certscan::network::TransportError;
use certscan::test_utils::{FakeSearchTransport, MemoryDomainStore};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

mod helpers;
use helpers::{ok_page, test_crawler, ts};

#[tokio::test(start_paused = true)]
async fn test_pagination_wraps_around() {
    let transport = Arc::new(FakeSearchTransport::new());
    for page in 1..=3 {
        transport.set_page(page, ok_page(3, &[]));
    }
    let store = Arc::new(MemoryDomainStore::new());
    let mut crawler = test_crawler(transport.clone(), store, RetryPolicy::default());
    let (_tx, mut rx) = watch::channel(false);

    let mut cursors = Vec::new();
    let mut wraps = Vec::new();
    for _ in 0..6 {
        let report = crawler.step(&mut rx).await.unwrap();
        cursors.push(report.page);
        wraps.push(report.wrapped);
        if report.wrapped {
            assert_eq!(crawler.state(), CrawlState::WrappingAround);
        } else {
            assert_eq!(crawler.state(), CrawlState::Running);
        }
    }

    // The cursor reaching the reported total (3) completes the pass.
    assert_eq!(cursors, vec![1, 2, 1, 2, 1, 2]);
    assert_eq!(wraps, vec![false, true, false, true, false, true]);
    assert_eq!(crawler.passes_completed(), 3);
    assert_eq!(transport.requested_pages(), vec![1, 2, 1, 2, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_total_pages_follows_latest_response() {
    let transport = Arc::new(FakeSearchTransport::new());
    transport.set_page(1, ok_page(3, &[]));
    transport.set_page(2, ok_page(5, &[]));
    transport.set_page(3, ok_page(5, &[]));
    transport.set_page(4, ok_page(5, &[]));
    let store = Arc::new(MemoryDomainStore::new());
    let mut crawler = test_crawler(transport.clone(), store, RetryPolicy::default());
    let (_tx, mut rx) = watch::channel(false);

    for _ in 0..4 {
        crawler.step(&mut rx).await.unwrap();
    }

    assert_eq!(transport.requested_pages(), vec![1, 2, 3, 4]);
    assert_eq!(crawler.cursor().page, 1);
    assert_eq!(crawler.passes_completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_page_still_advances_cursor() {
    let transport = Arc::new(FakeSearchTransport::new());
    transport.set_page(1, ok_page(4, &[(&["one.example.com.au"], 10)]));
    // Page 2 has no configured response and always fails.
    transport.set_page(3, ok_page(4, &[(&["three.example.com.au"], 30)]));
    let store = Arc::new(MemoryDomainStore::new());
    let mut crawler = test_crawler(
        transport.clone(),
        store.clone(),
        RetryPolicy::fixed(3, Duration::from_secs(60)),
    );
    let (_tx, mut rx) = watch::channel(false);

    crawler.step(&mut rx).await.unwrap();
    let start = tokio::time::Instant::now();
    let report = crawler.step(&mut rx).await.unwrap();
    // One permit wait of 2.5s, then two retry intervals.
    assert_eq!(start.elapsed(), Duration::from_millis(122_500));
    assert_eq!(report.page, 2);
    assert_eq!(report.outcome, PageOutcome::Exhausted { attempts: 3 });
    assert!(!report.wrapped);
    assert_eq!(report.next_page, 3);
    // The stale total from page 1 is kept.
    assert_eq!(crawler.cursor().total_pages, 4);

    let report = crawler.step(&mut rx).await.unwrap();
    assert_eq!(report.page, 3);
    assert_eq!(transport.requested_pages(), vec![1, 2, 2, 2, 3]);
    assert_eq!(store.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_status_not_ok_merges_nothing() {
    let transport = Arc::new(FakeSearchTransport::new());
    let mut page = ok_page(0, &[(&["ignored.example.com.au"], 10)]);
    page.status = "error".to_string();
    transport.set_page(1, page);
    let store = Arc::new(MemoryDomainStore::new());
    let mut crawler = test_crawler(transport.clone(), store.clone(), RetryPolicy::default());
    let (_tx, mut rx) = watch::channel(false);

    let report = crawler.step(&mut rx).await.unwrap();

    assert_eq!(report.outcome, PageOutcome::StatusNotOk("error".to_string()));
    assert!(store.is_empty());
    assert!(report.wrapped);
    assert_eq!(transport.requested_pages(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_merges_follow_page_order() {
    let transport = Arc::new(FakeSearchTransport::new());
    transport.push_response(1, Ok(ok_page(3, &[(&["WWW.Example.com.au."], 100)])));
    transport.push_response(2, Ok(ok_page(3, &[(&["www.example.com.au", "example.org"], 50)])));
    transport.push_response(1, Ok(ok_page(3, &[(&["www.example.com.au"], 200)])));
    let store = Arc::new(MemoryDomainStore::new());
    let mut crawler = test_crawler(transport.clone(), store.clone(), RetryPolicy::default());
    let (_tx, mut rx) = watch::channel(false);

    let expected = [(100, 100), (50, 100), (50, 200)];
    for (first, last) in expected {
        crawler.step(&mut rx).await.unwrap();
        let record = store.record("www.example.com.au").unwrap();
        assert_eq!(record.first_seen, ts(first));
        assert_eq!(record.last_seen, ts(last));
        assert_eq!(record.etld, "example.com.au");
    }
    assert!(store.record("example.org").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_record_failure_does_not_stop_the_page() {
    let transport = Arc::new(FakeSearchTransport::new());
    transport.set_page(
        1,
        ok_page(
            2,
            &[
                (&["a.example.com.au"], 1),
                (&["bad.example.com.au"], 2),
                (&["c.example.com.au"], 3),
            ],
        ),
    );
    let store = Arc::new(MemoryDomainStore::new());
    store.fail_on("bad.example.com.au");
    let mut crawler = test_crawler(transport, store.clone(), RetryPolicy::default());
    let (_tx, mut rx) = watch::channel(false);

    let report = crawler.step(&mut rx).await.unwrap();

    assert_eq!(
        report.outcome,
        PageOutcome::Merged(MergeSummary { merged: 2, failed: 1 })
    );
    assert_eq!(store.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let transport = Arc::new(FakeSearchTransport::new());
    transport.push_response(1, Err(TransportError::Decode("truncated".into())));
    transport.set_page(1, ok_page(2, &[(&["example.com.au"], 5)]));
    let store = Arc::new(MemoryDomainStore::new());
    let crawler = test_crawler(transport.clone(), store.clone(), RetryPolicy::fixed(3, Duration::from_secs(1)));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(crawler.run(rx));
    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(store.record("example.com.au").is_some());
    assert!(transport.requested_pages().len() > 2);
}
