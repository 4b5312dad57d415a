use super::*;
use listing_watcher::models::IdentityKey;
use listing_watcher::store::{MemoryStore, SqliteStore};
use listing_watcher::{RunOutcome, Watcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_first_run_sends_one_digest() -> anyhow::Result<()> {
    let h = harness().await?;
    accept_line(&h.server, 200).await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_A, &BAG_B])).await;

    let report = Watcher::from_config(&h.config).await?.run_once().await?;
    assert_eq!(report.outcome, RunOutcome::Notified);
    assert_eq!(report.listings, 2);

    let messages = line_messages(&h.server).await;
    assert_eq!(messages.len(), 1);

    let expected_a = format!(
        "[Hermès官網 包包]\nEvelyne 16 Gold NT$ 112,300\n{}/tw/zh/product/evelyne-bag-p-111/",
        h.server.uri()
    );
    assert!(messages[0].starts_with(&expected_a));
    assert!(messages[0].contains("\n\n[Hermès官網 包包]\nKelly Pocket Noir NT$ 98,000\n"));

    let store = SqliteStore::connect(&h.config.store).await?;
    let memory = store.load_memory().await?;
    assert_eq!(memory.len(), 2);
    assert_eq!(memory[&IdentityKey::new("pid:111")].as_str(), "112300");

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].name, "Evelyne 16");
    assert_eq!(snapshot[1].image.as_deref(), Some("https://assets.example.com/Kelly Pocket.jpg"));

    Ok(())
}

#[tokio::test]
async fn test_duplicate_listing_across_categories_notified_once() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.config.fetcher.categories.push(listing_watcher::config::CategoryConfig {
        label: "小皮件".to_string(),
        url: format!("{}/slg/", h.server.uri()),
    });
    accept_line(&h.server, 200).await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_A])).await;
    serve_page(&h.server, "/slg/", listing_page(&[&BAG_A, &BAG_B])).await;

    let report = Watcher::from_config(&h.config).await?.run_once().await?;

    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.listings, 3);
    assert_eq!(report.new_items, 2);
    assert_eq!(report.duplicates_skipped, 1);

    let messages = line_messages(&h.server).await;
    assert_eq!(messages[0].matches("Evelyne 16").count(), 1);
    // first sighting wins, so the bag is attributed to the first category
    assert!(messages[0].starts_with("[Hermès官網 包包]"));

    Ok(())
}

#[tokio::test]
async fn test_failed_category_is_skipped() -> anyhow::Result<()> {
    let mut h = harness().await?;
    h.config.fetcher.categories.insert(
        0,
        listing_watcher::config::CategoryConfig {
            label: "gone".to_string(),
            url: format!("{}/gone/", h.server.uri()),
        },
    );
    accept_line(&h.server, 200).await;
    Mock::given(method("GET"))
        .and(path("/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_B])).await;

    let report = Watcher::from_config(&h.config).await?.run_once().await?;

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.outcome, RunOutcome::Notified);
    assert_eq!(report.new_items, 1);

    Ok(())
}

#[tokio::test]
async fn test_empty_page_touches_nothing() -> anyhow::Result<()> {
    let h = harness().await?;
    accept_line(&h.server, 200).await;
    serve_page(&h.server, "/bags/", "<html><body>maintenance</body></html>".to_string()).await;

    let report = Watcher::from_config(&h.config).await?.run_once().await?;

    assert_eq!(report.outcome, RunOutcome::NoListings);
    assert!(line_messages(&h.server).await.is_empty());

    let store = SqliteStore::connect(&h.config.store).await?;
    assert!(store.load_memory().await?.is_empty());
    assert!(store.snapshot().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_notifier_failure_does_not_undo_memory() -> anyhow::Result<()> {
    let h = harness().await?;
    accept_line(&h.server, 401).await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_A])).await;

    let watcher = Watcher::from_config(&h.config).await?;

    let first = watcher.run_once().await?;
    assert_eq!(first.outcome, RunOutcome::Notified);
    assert_eq!(first.dispatch.len(), 1);
    assert!(!first.dispatch[0].succeeded());

    // memory was written before dispatch, so the item is not announced twice
    let second = watcher.run_once().await?;
    assert_eq!(second.outcome, RunOutcome::NoChanges);

    Ok(())
}
