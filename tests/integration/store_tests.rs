use super::*;
use listing_watcher::models::IdentityKey;
use listing_watcher::store::SqliteStore;
use listing_watcher::{RunOutcome, Watcher};

#[tokio::test]
async fn test_memory_survives_restart() -> anyhow::Result<()> {
    let h = harness().await?;
    accept_line(&h.server, 200).await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_A])).await;

    {
        let watcher = Watcher::from_config(&h.config).await?;
        assert_eq!(watcher.run_once().await?.outcome, RunOutcome::Notified);
    }

    let restarted = Watcher::from_config(&h.config).await?;
    assert_eq!(restarted.run_once().await?.outcome, RunOutcome::NoChanges);

    Ok(())
}

#[tokio::test]
async fn test_price_history_is_append_only() -> anyhow::Result<()> {
    let h = harness().await?;
    let watcher = Watcher::from_config(&h.config).await?;

    for price in ["NT$ 100", "NT$ 120", "NT$ 100"] {
        h.server.reset().await;
        accept_line(&h.server, 200).await;
        let item = Item { price, ..BAG_A };
        serve_page(&h.server, "/bags/", listing_page(&[&item])).await;
        assert_eq!(watcher.run_once().await?.outcome, RunOutcome::Notified);
    }

    let store = SqliteStore::connect(&h.config.store).await?;
    let history = store.history(&IdentityKey::new("pid:111")).await?;

    let prices: Vec<&str> = history.iter().map(|row| row.last_price.as_str()).collect();
    assert_eq!(prices, vec!["100", "120", "100"]);
    assert!(history.iter().all(|row| row.first_seen_at == history[0].first_seen_at));

    Ok(())
}
