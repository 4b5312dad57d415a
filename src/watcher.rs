use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{AppConfig, CategoryConfig};
use crate::core::{DiffEngine, Digest, IdentityResolver, RunDiffResult};
use crate::extractor::ListingExtractor;
use crate::models::{ListingRecord, MemoryUpdate};
use crate::plugins::{DispatchOutcome, NotifierManager};
use crate::scraper::{fetch_all, HttpFetcher, ListingFetcher};
use crate::store::{MemoryStore, SqliteStore};
use crate::utils::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing could be extracted; store and notifiers untouched.
    NoListings,
    NoChanges,
    /// Changes were persisted but there was no channel to announce them on.
    NoNotifier,
    Notified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_fetched: usize,
    pub listings: usize,
    pub new_items: usize,
    pub price_changes: usize,
    pub duplicates_skipped: usize,
    pub outcome: RunOutcome,
    pub dispatch: Vec<DispatchOutcome>,
}

impl RunReport {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            pages_fetched: 0,
            listings: 0,
            new_items: 0,
            price_changes: 0,
            duplicates_skipped: 0,
            outcome: RunOutcome::NoListings,
            dispatch: Vec::new(),
        }
    }

    fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }
}

/// One full fetch, diff, persist and notify cycle.
pub struct Watcher {
    fetcher: Arc<dyn ListingFetcher>,
    extractor: ListingExtractor,
    resolver: IdentityResolver,
    store: Arc<dyn MemoryStore>,
    notifiers: NotifierManager,
    categories: Vec<CategoryConfig>,
    max_concurrent_fetches: usize,
    delay_between: Duration,
    subject: String,
}

impl Watcher {
    pub fn new(
        config: &AppConfig,
        fetcher: Arc<dyn ListingFetcher>,
        store: Arc<dyn MemoryStore>,
        notifiers: NotifierManager,
    ) -> Result<Self> {
        let resolver = IdentityResolver::from_config(&config.identity)?;
        let extractor = ListingExtractor::from_config(&config.extractor, resolver.base())?;

        Ok(Self {
            fetcher,
            extractor,
            resolver,
            store,
            notifiers,
            categories: config.fetcher.categories.clone(),
            max_concurrent_fetches: config.fetcher.max_concurrent_fetches,
            delay_between: Duration::from_millis(config.fetcher.delay_between_ms),
            subject: config.notifications.subject.clone(),
        })
    }

    /// Wires the production collaborators: HTTP fetcher, SQLite store, configured notifiers.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);
        let fetcher = HttpFetcher::new(&config.fetcher, retry.clone())?;
        let store = SqliteStore::connect(&config.store).await?;
        let notifiers = NotifierManager::from_config(&config.notifications, retry)?;

        Self::new(config, Arc::new(fetcher), Arc::new(store), notifiers)
    }

    pub fn notifiers(&self) -> &NotifierManager {
        &self.notifiers
    }

    pub async fn run_once(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("watch_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunReport> {
        let mut report = RunReport::new(run_id, Utc::now());
        info!(categories = self.categories.len(), "run started");

        let records = self.collect_listings(&mut report).await;
        report.listings = records.len();

        if records.is_empty() {
            warn!("no listings extracted; the page layout may have changed");
            return Ok(report.finish(RunOutcome::NoListings));
        }

        let memory = self
            .store
            .load_memory()
            .await
            .map_err(|e| AppError::Persistence(format!("could not load seen memory: {}", e)))?;
        debug!(known_keys = memory.len(), "seen memory loaded");

        let diff = DiffEngine::new(memory, &self.resolver).diff(&records);
        report.new_items = diff.new_count();
        report.price_changes = diff.changed_count();
        report.duplicates_skipped = diff.duplicates_skipped;

        if diff.is_empty() {
            self.store
                .write_snapshot(&records)
                .await
                .map_err(|e| AppError::Persistence(format!("could not write snapshot: {}", e)))?;
            info!(listings = records.len(), "no new items or price changes");
            return Ok(report.finish(RunOutcome::NoChanges));
        }

        let digest = Digest::new(self.subject.clone(), diff.notification_lines());
        let updates = memory_updates(diff, Utc::now());

        // memory must be durable before anyone hears about the change
        self.persist(updates, records).await?;

        if self.notifiers.is_empty() {
            warn!(
                new_items = report.new_items,
                price_changes = report.price_changes,
                "changes recorded but no notifier is configured"
            );
            return Ok(report.finish(RunOutcome::NoNotifier));
        }

        report.dispatch = self.notifiers.dispatch(&digest).await;

        info!(
            new_items = report.new_items,
            price_changes = report.price_changes,
            delivered = report.dispatch.iter().filter(|o| o.succeeded()).count(),
            "run finished"
        );
        Ok(report.finish(RunOutcome::Notified))
    }

    async fn collect_listings(&self, report: &mut RunReport) -> Vec<ListingRecord> {
        let pages = fetch_all(
            self.fetcher.as_ref(),
            &self.categories,
            self.max_concurrent_fetches,
            self.delay_between,
        )
        .await;
        report.pages_fetched = pages.len();

        pages
            .iter()
            .flat_map(|page| self.extractor.extract_page(page))
            .collect()
    }

    async fn persist(&self, updates: Vec<MemoryUpdate>, snapshot: Vec<ListingRecord>) -> Result<()> {
        self.store.record_run(&updates, &snapshot).await.map_err(|e| {
            warn!(error = %e, "persisting run failed; skipping notifications");
            AppError::Persistence(e.to_string())
        })
    }
}

fn memory_updates(diff: RunDiffResult, recorded_at: DateTime<Utc>) -> Vec<MemoryUpdate> {
    diff.to_persist
        .into_iter()
        .map(|(key, price)| MemoryUpdate::new(key, price, recorded_at))
        .collect()
}
