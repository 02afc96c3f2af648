//! Checkpoint and resume behaviour across runs

use crate::support::{pipeline, recipe_urls, test_config, FakeFactory, FakeSite};
use mise_crawler::state::item_identifier;
use mise_crawler::Stage;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

#[tokio::test]
async fn test_cursor_skips_earlier_items() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(10);
    let config = test_config(
        &dir,
        r#"
[resume]
stage = "details"
from = 5
"#,
    );
    let pipeline = pipeline(config, FakeFactory::new(site.clone()));

    let report = pipeline.run_stage(Stage::Details, urls.clone()).await.unwrap();

    assert_eq!(report.skipped_cursor, 4);
    assert_eq!(report.done, 6);
    for url in &urls[..4] {
        assert_eq!(site.fetches_of(url), 0);
    }
    for url in &urls[4..] {
        assert_eq!(site.fetches_of(url), 1);
    }
}

#[tokio::test]
async fn test_cursor_ignores_done_status_of_later_items() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(10);

    // Items 1-4 were processed by an earlier run
    let first = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    first.run_stage(Stage::Details, urls[..4].to_vec()).await.unwrap();

    let config = test_config(
        &dir,
        r#"
[resume]
stage = "details"
from = "https://example.com/recipe-05/"
"#,
    );
    let second = pipeline(config, FakeFactory::new(site.clone()));
    let report = second.run_stage(Stage::Details, urls.clone()).await.unwrap();

    assert_eq!(report.skipped_cursor, 4);
    assert_eq!(report.skipped_existing, 0);
    assert_eq!(report.done, 6);
}

#[tokio::test]
async fn test_cursor_for_other_stage_is_ignored() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let config = test_config(
        &dir,
        r#"
[resume]
stage = "links"
from = 5
"#,
    );
    let pipeline = pipeline(config, FakeFactory::new(site.clone()));

    let report = pipeline.run_stage(Stage::Details, recipe_urls(10)).await.unwrap();

    assert_eq!(report.skipped_cursor, 0);
    assert_eq!(report.done, 10);
}

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(10);

    let first = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    first.run_stage(Stage::Details, urls.clone()).await.unwrap();
    let fetched = site.total_fetches();
    let before = first.store().already_done(Stage::Details).unwrap();

    let factory = FakeFactory::new(site.clone());
    let second = pipeline(test_config(&dir, ""), factory.clone());
    let report = second.run_stage(Stage::Details, urls).await.unwrap();

    assert_eq!(report.skipped_existing, 10);
    assert_eq!(report.done, 0);
    assert_eq!(site.total_fetches(), fetched);
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    assert_eq!(second.store().already_done(Stage::Details).unwrap(), before);
}

#[tokio::test]
async fn test_done_set_only_grows() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(8);

    let first = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    first.run_stage(Stage::Details, urls[..3].to_vec()).await.unwrap();
    let before = first.store().already_done(Stage::Details).unwrap();

    let second = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    second.run_stage(Stage::Details, urls.clone()).await.unwrap();
    let after = second.store().already_done(Stage::Details).unwrap();

    assert!(before.is_subset(&after));
    let expected: HashSet<String> = urls
        .iter()
        .map(|url| item_identifier(Stage::Details, url))
        .collect();
    assert_eq!(after, expected);
}

#[tokio::test]
async fn test_interrupted_write_is_not_done() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(2);

    // A crash between write and rename leaves only a temporary file behind
    let stage_dir = dir.path().join("recipes");
    std::fs::create_dir_all(&stage_dir).unwrap();
    let partial = stage_dir.join(".tmpA1b2C3");
    std::fs::write(&partial, br#"{"url": "https://example.com/recipe-01/", "sta"#).unwrap();

    let pipeline = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = pipeline.run_stage(Stage::Details, urls.clone()).await.unwrap();

    assert_eq!(report.skipped_existing, 0);
    assert_eq!(report.done, 2);
    assert_eq!(site.fetches_of(&urls[0]), 1);
    assert!(!partial.exists());
}

#[tokio::test]
async fn test_rejected_items_wait_for_operator() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(3);
    site.serve(&urls[1], "not a recipe");

    let first = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = first.run_stage(Stage::Details, urls.clone()).await.unwrap();
    assert_eq!(report.failed, 1);

    let second = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = second.run_stage(Stage::Details, urls.clone()).await.unwrap();
    assert_eq!(report.skipped_existing, 2);
    assert_eq!(report.skipped_rejected, 1);
    assert_eq!(site.fetches_of(&urls[1]), 1);

    // Disabling skip-existing reprocesses everything
    let mut config = test_config(&dir, "");
    config.resume.skip_existing = false;
    let third = pipeline(config, FakeFactory::new(site.clone()));
    let report = third.run_stage(Stage::Details, urls.clone()).await.unwrap();
    assert_eq!(report.done, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(site.fetches_of(&urls[1]), 2);
}

#[tokio::test]
async fn test_failed_items_are_retried_next_run() {
    let dir = TempDir::new().unwrap();
    let site = FakeSite::new();
    let urls = recipe_urls(2);
    site.script(
        &urls[0],
        vec![
            crate::support::Step::Fail(mise_crawler::session::FetchError::Network(
                "reset".to_string()
            ));
            3
        ],
    );

    let first = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = first.run_stage(Stage::Details, urls.clone()).await.unwrap();
    assert_eq!(report.failed, 1);

    let second = pipeline(test_config(&dir, ""), FakeFactory::new(site.clone()));
    let report = second.run_stage(Stage::Details, urls.clone()).await.unwrap();
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.done, 1);
    assert_eq!(site.fetches_of(&urls[0]), 4);
}
