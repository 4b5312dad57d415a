use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::{is_valid_cron, SchedulerConfig};
use crate::utils::error::{AppError, Result};
use crate::watcher::{RunOutcome, RunReport, Watcher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub started_at: DateTime<Utc>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub skipped_overlaps: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
}

impl SchedulerStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            run_count: 0,
            success_count: 0,
            error_count: 0,
            skipped_overlaps: 0,
            last_run: None,
            last_outcome: None,
            last_error: None,
        }
    }
}

#[derive(Debug)]
pub enum RunAttempt {
    Completed(RunReport),
    Failed(AppError),
    /// A previous run was still in progress.
    Skipped,
}

/// Runs the watcher on a cron schedule, one run at a time.
pub struct WatchScheduler {
    scheduler: JobScheduler,
    watcher: Arc<Watcher>,
    cron: String,
    running: Arc<Mutex<()>>,
    stats: Arc<RwLock<SchedulerStats>>,
    job_id: Option<Uuid>,
}

impl WatchScheduler {
    pub async fn new(watcher: Arc<Watcher>, config: &SchedulerConfig) -> Result<Self> {
        if !is_valid_cron(&config.cron) {
            return Err(AppError::config(format!(
                "Invalid cron expression '{}': expected six fields, seconds first",
                config.cron
            )));
        }

        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            watcher,
            cron: config.cron.clone(),
            running: Arc::new(Mutex::new(())),
            stats: Arc::new(RwLock::new(SchedulerStats::new())),
            job_id: None,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let watcher = Arc::clone(&self.watcher);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);

        let job = Job::new_async(self.cron.as_str(), move |_uuid, _l| {
            let watcher = Arc::clone(&watcher);
            let running = Arc::clone(&running);
            let stats = Arc::clone(&stats);

            Box::pin(async move {
                Self::execute_run(watcher, running, stats).await;
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;

        tracing::info!(cron = %self.cron, "watch scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }
        self.scheduler.shutdown().await?;

        // let an in-flight run finish its persist/notify step
        let _guard = self.running.lock().await;
        tracing::info!("watch scheduler shutdown");
        Ok(())
    }

    /// Runs immediately, outside the schedule, honouring the overlap guard.
    pub async fn run_now(&self) -> RunAttempt {
        Self::execute_run(Arc::clone(&self.watcher), Arc::clone(&self.running), Arc::clone(&self.stats)).await
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    async fn execute_run(
        watcher: Arc<Watcher>,
        running: Arc<Mutex<()>>,
        stats: Arc<RwLock<SchedulerStats>>,
    ) -> RunAttempt {
        let Ok(_guard) = running.try_lock() else {
            tracing::warn!("previous run still in progress, skipping this tick");
            stats.write().await.skipped_overlaps += 1;
            return RunAttempt::Skipped;
        };

        let start_time = tokio::time::Instant::now();
        let result = watcher.run_once().await;

        let mut stats = stats.write().await;
        stats.run_count += 1;
        stats.last_run = Some(Utc::now());

        match result {
            Ok(report) => {
                tracing::info!(
                    run_id = %report.run_id,
                    outcome = ?report.outcome,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "scheduled run completed"
                );
                stats.success_count += 1;
                stats.last_outcome = Some(report.outcome);
                stats.last_error = None;
                RunAttempt::Completed(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduled run failed");
                stats.error_count += 1;
                stats.last_outcome = None;
                stats.last_error = Some(e.to_string());
                RunAttempt::Failed(e)
            }
        }
    }
}
