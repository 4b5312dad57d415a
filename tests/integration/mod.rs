// Shared fixtures: a mock retailer + LINE endpoint and a throwaway SQLite file.

pub mod pipeline_tests;
pub mod scheduler_tests;
pub mod store_tests;

use listing_watcher::config::CategoryConfig;
use listing_watcher::AppConfig;
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LINE_PATH: &str = "/v2/bot/message/broadcast";

pub struct Item {
    pub href: &'static str,
    pub name: &'static str,
    pub color: &'static str,
    pub price: &'static str,
}

pub const BAG_A: Item = Item {
    href: "/tw/zh/product/evelyne-bag-p-111/",
    name: "Evelyne 16",
    color: "Gold",
    price: "NT$ 112,300",
};

pub const BAG_B: Item = Item {
    href: "/tw/zh/product/kelly-pocket-p-222/",
    name: "Kelly Pocket",
    color: "Noir",
    price: "NT$ 98,000",
};

pub struct TestHarness {
    pub server: MockServer,
    pub config: AppConfig,
    _db_dir: TempDir,
}

/// Listing markup shaped like the retailer's grid.
pub fn listing_page(items: &[&Item]) -> String {
    let grid: String = items
        .iter()
        .map(|item| {
            format!(
                r#"<div class="product-grid-list-item">
                     <a class="product-item-name" href="{}"><span>{}</span></a>
                     <div class="product-item-colors">顏色: {}</div>
                     <span class="price">{}</span>
                     <img src="//assets.example.com/{}.jpg" />
                   </div>"#,
                item.href, item.name, item.color, item.price, item.name
            )
        })
        .collect();
    format!("<html><body><div class=\"product-grid-list\">{}</div></body></html>", grid)
}

pub async fn harness() -> anyhow::Result<TestHarness> {
    let server = MockServer::start().await;
    let db_dir = tempfile::tempdir()?;

    let mut config = AppConfig::default();
    config.fetcher.categories = vec![CategoryConfig {
        label: "包包".to_string(),
        url: format!("{}/bags/", server.uri()),
    }];
    config.fetcher.delay_between_ms = 0;
    config.identity.base_origin = server.uri();
    config.retry.max_attempts = 2;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.store.database_url = format!("sqlite://{}", db_dir.path().join("watcher.db").display());
    config.notifications.line.channel_access_token = Some("test-token".to_string());
    config.notifications.line.api_url = format!("{}{}", server.uri(), LINE_PATH);
    config.notifications.line.chunk_delay_ms = 0;
    config.validate()?;

    Ok(TestHarness {
        server,
        config,
        _db_dir: db_dir,
    })
}

pub async fn serve_page(server: &MockServer, page_path: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

pub async fn accept_line(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(LINE_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Text of every LINE message the mock server received, in order.
pub async fn line_messages(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == LINE_PATH)
        .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
        .filter_map(|body| body["messages"][0]["text"].as_str().map(str::to_string))
        .collect()
}
