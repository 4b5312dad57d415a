use super::*;
use listing_watcher::scheduler::{RunAttempt, WatchScheduler};
use listing_watcher::{RunOutcome, Watcher};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_scheduler_run_now_drives_watcher() -> anyhow::Result<()> {
    let h = harness().await?;
    accept_line(&h.server, 200).await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_A])).await;

    let watcher = Arc::new(Watcher::from_config(&h.config).await?);
    let mut scheduler = WatchScheduler::new(watcher, &h.config.scheduler).await?;

    match scheduler.run_now().await {
        RunAttempt::Completed(report) => assert_eq!(report.outcome, RunOutcome::Notified),
        other => panic!("unexpected attempt: {:?}", other),
    }

    scheduler.start().await?;
    scheduler.shutdown().await?;

    let stats = scheduler.stats().await;
    assert_eq!(stats.run_count, 1);
    assert_eq!(stats.success_count, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cron_tick_runs_watcher() -> anyhow::Result<()> {
    let mut h = harness().await?;
    accept_line(&h.server, 200).await;
    serve_page(&h.server, "/bags/", listing_page(&[&BAG_A])).await;
    h.config.scheduler.cron = "* * * * * *".to_string();

    let watcher = Arc::new(Watcher::from_config(&h.config).await?);
    let mut scheduler = WatchScheduler::new(watcher, &h.config.scheduler).await?;
    scheduler.start().await?;

    let mut stats = scheduler.stats().await;
    for _ in 0..40 {
        if stats.success_count >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        stats = scheduler.stats().await;
    }
    scheduler.shutdown().await?;

    assert!(stats.run_count >= 1);
    assert_eq!(stats.error_count, 0);
    assert!(stats.last_outcome.is_some());

    let messages = line_messages(&h.server).await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Evelyne 16"));

    Ok(())
}
