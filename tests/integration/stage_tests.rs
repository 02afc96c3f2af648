//! Worker pool behaviour observed through single stage runs

use crate::support::{pipeline, recipe_urls, test_config, FakeFactory, FakeSite, Step};
use mise_crawler::checkpoint::CrawlResult;
use mise_crawler::session::FetchError;
use mise_crawler::state::item_identifier;
use mise_crawler::{MiseError, Stage};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

#[tokio::test]
async fn test_all_items_succeed() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));

    let report = pipeline
        .run_stage(Stage::Details, recipe_urls(10))
        .await
        .unwrap();

    assert_eq!(report.input_total, 10);
    assert_eq!(report.done, 10);
    assert_eq!(report.failed, 0);
    assert_eq!(report.retried, 0);
    assert_eq!(report.hang_timeouts, 0);
    assert!(report.failed_items.is_empty());
    assert_eq!(site.total_fetches(), 10);
    assert_eq!(
        pipeline.store().already_done(Stage::Details).unwrap().len(),
        10
    );
}

#[tokio::test(start_paused = true)]
async fn test_hung_item_recovers_on_third_attempt() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(10);
    let slow = urls[3].clone();
    site.script(&slow, vec![Step::Hang, Step::Hang]);

    let factory = FakeFactory::new(site.clone());
    let pipeline = pipeline(test_config(&dir, ""), factory.clone());
    let report = pipeline.run_stage(Stage::Details, urls).await.unwrap();

    assert_eq!(report.done, 10);
    assert_eq!(report.failed, 0);
    assert_eq!(report.hang_timeouts, 2);
    assert_eq!(report.retried, 2);
    assert_eq!(report.session_restarts, 2);
    assert_eq!(site.fetches_of(&slow), 3);

    let artifact: CrawlResult = pipeline
        .store()
        .load(Stage::Details, &item_identifier(Stage::Details, &slow))
        .unwrap()
        .unwrap();
    assert_eq!(artifact.attempts, 3);
    assert_eq!(artifact.payload["title"], "recipe-04");

    // Three initial sessions plus one per restart
    assert_eq!(factory.created.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_hung_fetch_does_not_block_other_slots() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(6);
    site.script(&urls[0], vec![Step::Hang]);

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let start = Instant::now();
    let report = pipeline.run_stage(Stage::Details, urls.clone()).await.unwrap();

    assert_eq!(report.done, 6);
    assert_eq!(report.hang_timeouts, 1);

    // Deadline is 2s; every other item finishes while the hang is in flight
    let deadline = Duration::from_secs(2);
    for url in &urls[1..] {
        let served = site.served_at(url).unwrap();
        assert!(served.duration_since(start) < deadline, "{} waited on the hang", url);
    }
    let recovered = site.served_at(&urls[0]).unwrap();
    assert!(recovered.duration_since(start) >= deadline);
}

#[tokio::test]
async fn test_forbidden_restarts_session_instead_of_rejecting() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(2);
    site.script(&urls[0], vec![Step::Fail(FetchError::Status { code: 403 })]);

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls.clone()).await.unwrap();

    assert_eq!(report.done, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.retried, 1);
    assert_eq!(report.session_restarts, 1);
    assert_eq!(site.fetches_of(&urls[0]), 2);
    assert!(pipeline.store().rejected(Stage::Details).unwrap().is_empty());
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(10);
    let broken = urls[6].clone();
    site.serve(&broken, "<html>no recipe here</html>");

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls).await.unwrap();

    assert_eq!(report.done, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 0);
    assert_eq!(site.fetches_of(&broken), 1);

    let failed = &report.failed_items[0];
    assert_eq!(failed.url, broken);
    assert_eq!(failed.attempts, 1);
    assert!(failed.permanent);
    assert!(failed.error.contains("title"));

    let list = std::fs::read_to_string(dir.path().join("failed-details.txt")).unwrap();
    assert_eq!(list.trim(), broken);
    assert!(pipeline
        .store()
        .rejected(Stage::Details)
        .unwrap()
        .contains(&item_identifier(Stage::Details, &broken)));
}

#[tokio::test]
async fn test_permanent_http_status_fails_once() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(3);
    site.script(&urls[0], vec![Step::Fail(FetchError::Status { code: 404 })]);

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls.clone()).await.unwrap();

    assert_eq!(report.done, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(site.fetches_of(&urls[0]), 1);
}

#[tokio::test]
async fn test_transient_failures_exhaust_attempts() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(4);
    let flaky = urls[1].clone();
    site.script(
        &flaky,
        vec![Step::Fail(FetchError::Network("connection reset".to_string())); 5],
    );

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls).await.unwrap();

    assert_eq!(report.done, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 2);
    assert_eq!(site.fetches_of(&flaky), 3);
    assert_eq!(report.failed_items[0].attempts, 3);
    assert!(!report.failed_items[0].permanent);
    // Exhausted transient failures stay eligible for the next run
    assert!(pipeline.store().rejected(Stage::Details).unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(2);
    site.script(
        &urls[0],
        vec![Step::Fail(FetchError::Status { code: 503 })],
    );

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls).await.unwrap();

    assert_eq!(report.done, 2);
    assert_eq!(report.retried, 1);
    assert_eq!(report.session_restarts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_bounds_hung_attempts() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(1);
    site.script(&urls[0], vec![Step::Hang; 3]);

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let start = Instant::now();
    let report = pipeline.run_stage(Stage::Details, urls).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.failed, 1);
    assert_eq!(report.hang_timeouts, 3);
    assert_eq!(report.failed_items[0].attempts, 3);
    assert!(elapsed >= Duration::from_secs(6));
    assert!(elapsed < Duration::from_secs(6) + Duration::from_millis(500));
}

#[tokio::test]
async fn test_session_fault_restarts_and_retries() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(3);
    site.script(
        &urls[2],
        vec![Step::Fail(FetchError::Challenge("Just a moment...".to_string()))],
    );

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls).await.unwrap();

    assert_eq!(report.done, 3);
    assert_eq!(report.session_restarts, 1);
    assert_eq!(report.retried, 1);
}

#[tokio::test]
async fn test_no_session_aborts_stage() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let factory = FakeFactory::broken(site.clone());
    let pipeline = pipeline(test_config(&dir, ""), factory.clone());

    let result = pipeline.run_stage(Stage::Details, recipe_urls(5)).await;

    assert!(matches!(
        result,
        Err(MiseError::SessionUnavailable {
            stage: Stage::Details,
            ..
        })
    ));
    assert_eq!(site.total_fetches(), 0);
    // Three slots, two creation attempts each
    assert_eq!(factory.created.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_empty_input_aborts_before_workers_start() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let factory = FakeFactory::new(site.clone());
    let pipeline = pipeline(test_config(&dir, ""), factory.clone());

    let result = pipeline.run_stage(Stage::Links, Vec::new()).await;

    assert!(matches!(result, Err(MiseError::EmptyInput { .. })));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_more_workers_than_items() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let factory = FakeFactory::new(site.clone());
    let mut config = test_config(&dir, "");
    config.crawler.workers = 8;
    let pipeline = pipeline(config, factory.clone());

    let report = pipeline.run_stage(Stage::Details, recipe_urls(2)).await.unwrap();

    assert_eq!(report.done, 2);
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
}
