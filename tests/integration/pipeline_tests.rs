//! HTTP session and full pipeline runs against wiremock servers

use mise_crawler::config::{parse_config, Config};
use mise_crawler::session::{FetchError, HttpSessionFactory, SessionFactory, SessionOptions};
use mise_crawler::state::item_identifier;
use mise_crawler::{MiseError, Pipeline, Stage};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEED_PAGE: &str = r#"<html><head><title>Recipe Box</title></head><body>
<a href="/category/dinner/">Dinner</a>
</body></html>"#;

const LISTING_PAGE: &str = r#"<html><body>
<article><a href="/lemon-bars/">Lemon Bars</a></article>
<article><a href="/weekly-meal-plan-1/">Meal Plan</a></article>
<a href="/category/dinner/page/2/">Next</a>
</body></html>"#;

const END_PAGE: &str = r#"<html><body><h1>Nothing Found</h1></body></html>"#;

const RECIPE_PAGE: &str = r#"<html><head><title>Lemon Bars | Example</title></head><body>
<div class="wprm-recipe-container">
  <h2 class="wprm-recipe-name">Lemon Bars</h2>
  <div class="wprm-recipe-summary">Tangy and sweet.</div>
  <ul>
    <li class="wprm-recipe-ingredient">1 cup flour</li>
    <li class="wprm-recipe-ingredient">2 lemons</li>
  </ul>
  <ul>
    <li class="wprm-recipe-instruction">Make the crust.</li>
    <li class="wprm-recipe-instruction">Bake the filling.</li>
  </ul>
</div>
</body></html>"#;

fn options() -> SessionOptions {
    SessionOptions {
        headless: true,
        user_agent: "mise-crawler/test".to_string(),
    }
}

fn site_config(dir: &TempDir, base: &str) -> Config {
    let toml = format!(
        r#"
[crawler]
workers = 2
attempt-deadline-ms = 5000
politeness-min-ms = 0
politeness-max-ms = 0
backoff-base-ms = 0
backoff-max-ms = 0

[site]
base-url = "{base}/"
seeds = ["{base}/recipe-box/"]

[output]
data-dir = "{dir}"
"#,
        base = base,
        dir = dir.path().display()
    );
    parse_config(&toml).unwrap()
}

async fn mount_page(server: &MockServer, at: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_http_session_classifies_responses() {
    let server = MockServer::start().await;
    mount_page(&server, "/ok/", 200, "<h1>Lemon Bars</h1>").await;
    mount_page(&server, "/gone/", 404, "not found").await;
    mount_page(&server, "/busy/", 503, "try later").await;
    mount_page(&server, "/challenge/", 200, "<title>Just a moment...</title>").await;
    mount_page(
        &server,
        "/blocked/",
        403,
        "Checking if the site connection is secure",
    )
    .await;

    let session = HttpSessionFactory.create(0, &options()).await.unwrap();
    let url = |p: &str| format!("{}{}", server.uri(), p);

    assert_eq!(session.fetch(&url("/ok/")).await.unwrap(), "<h1>Lemon Bars</h1>");
    assert_eq!(
        session.fetch(&url("/gone/")).await,
        Err(FetchError::Status { code: 404 })
    );
    assert_eq!(
        session.fetch(&url("/busy/")).await,
        Err(FetchError::Status { code: 503 })
    );
    assert!(matches!(
        session.fetch(&url("/challenge/")).await,
        Err(FetchError::Challenge(_))
    ));
    assert!(matches!(
        session.fetch(&url("/blocked/")).await,
        Err(FetchError::Challenge(_))
    ));
}

#[tokio::test]
async fn test_full_pipeline_run() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(&server, "/recipe-box/", 200, SEED_PAGE).await;
    mount_page(&server, "/category/dinner/page/1/", 200, LISTING_PAGE).await;
    mount_page(&server, "/category/dinner/page/2/", 200, END_PAGE).await;
    mount_page(&server, "/lemon-bars/", 200, RECIPE_PAGE).await;

    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(site_config(&dir, &base));
    let summary = pipeline.run(&Stage::ALL).await.unwrap();

    assert_eq!(summary.stages.len(), 3);
    assert!(summary.aborted.is_none());
    assert!(summary.stages.iter().all(|s| s.failed == 0 && s.done == 1));

    let categories = std::fs::read_to_string(dir.path().join("categories.txt")).unwrap();
    assert_eq!(categories.trim(), format!("{}/category/dinner/", base));

    let recipes = std::fs::read_to_string(dir.path().join("recipes.txt")).unwrap();
    let recipe_url = format!("{}/lemon-bars/", base);
    assert_eq!(recipes.trim(), recipe_url);

    let artifact = pipeline
        .store()
        .load(Stage::Details, &item_identifier(Stage::Details, &recipe_url))
        .unwrap()
        .unwrap();
    assert_eq!(artifact.payload["title"], "Lemon Bars");
    assert_eq!(artifact.payload["ingredients"][1], "2 lemons");
    assert_eq!(artifact.payload["instructions"][0], "Make the crust.");

    let category_id = item_identifier(Stage::Links, &format!("{}/category/dinner/", base));
    assert!(dir
        .path()
        .join("links")
        .join(&category_id)
        .join("page-1.json")
        .exists());

    let report = std::fs::read_to_string(dir.path().join("report.md")).unwrap();
    assert!(report.contains("# Mise Crawl Report"));
}

#[tokio::test]
async fn test_listing_stops_at_missing_page() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(&server, "/category/dinner/page/1/", 200, LISTING_PAGE).await;

    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(site_config(&dir, &base));
    let category = format!("{}/category/dinner/", base);
    let report = pipeline
        .run_stage(Stage::Links, vec![category])
        .await
        .unwrap();

    assert_eq!(report.done, 1);
    let recipes = std::fs::read_to_string(dir.path().join("recipes.txt")).unwrap();
    assert_eq!(recipes.trim(), format!("{}/lemon-bars/", base));
}

#[tokio::test]
async fn test_missing_category_fails_permanently() {
    let server = MockServer::start().await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(site_config(&dir, &base));
    let report = pipeline
        .run_stage(Stage::Links, vec![format!("{}/category/gone/", base)])
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert!(report.failed_items[0].permanent);
    assert_eq!(report.failed_items[0].attempts, 1);
}

#[tokio::test]
async fn test_run_stops_at_unreadable_input() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(site_config(&dir, &server.uri()));

    let result = pipeline.run(&[Stage::Links, Stage::Details]).await;

    assert!(matches!(result, Err(MiseError::InputUnreadable { .. })));
    let report = std::fs::read_to_string(dir.path().join("report.md")).unwrap();
    assert!(report.contains("links"));
}
