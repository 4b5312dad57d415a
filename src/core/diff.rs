//! Classifies the current run's listings against the seen memory.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::digest::format_notification_line;
use super::identity::{normalize_price, IdentityResolver};
use crate::models::{IdentityKey, ListingRecord, NormalizedPrice, SeenMemory};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    PriceChanged { previous: NormalizedPrice },
}

/// A listing that should be notified this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedChange {
    pub record: ListingRecord,
    pub key: IdentityKey,
    pub price: NormalizedPrice,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiffResult {
    /// First-seen order.
    pub changes: Vec<DetectedChange>,
    pub to_persist: Vec<(IdentityKey, NormalizedPrice)>,
    pub duplicates_skipped: usize,
}

impl RunDiffResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn new_count(&self) -> usize {
        self.changes.iter().filter(|c| c.kind == ChangeKind::New).count()
    }

    pub fn changed_count(&self) -> usize {
        self.changes.len() - self.new_count()
    }

    pub fn notification_lines(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|change| format_notification_line(&change.record))
            .collect()
    }
}

/// Run-scoped diff state: the in-process memory copy and the dedupe set.
#[derive(Debug)]
pub struct DiffEngine<'a> {
    resolver: &'a IdentityResolver,
    memory: SeenMemory,
    seen_this_run: HashSet<(IdentityKey, NormalizedPrice)>,
    result: RunDiffResult,
}

impl<'a> DiffEngine<'a> {
    pub fn new(memory: SeenMemory, resolver: &'a IdentityResolver) -> Self {
        Self {
            resolver,
            memory,
            seen_this_run: HashSet::new(),
            result: RunDiffResult::default(),
        }
    }

    /// Classifies one record; returns the change if it should be notified.
    pub fn observe(&mut self, record: &ListingRecord) -> Option<&DetectedChange> {
        let key = self.resolver.key_for(record);
        let price = normalize_price(record.price());

        if !self.seen_this_run.insert((key.clone(), price.clone())) {
            self.result.duplicates_skipped += 1;
            debug!(key = %key, price = %price, "duplicate listing in this run, skipped");
            return None;
        }

        let kind = match self.memory.get(&key) {
            None => ChangeKind::New,
            Some(previous) if !price.is_empty() && &price != previous => ChangeKind::PriceChanged {
                previous: previous.clone(),
            },
            Some(_) => {
                debug!(key = %key, price = %price, "unchanged");
                return None;
            }
        };

        debug!(key = %key, price = %price, ?kind, "listing classified");

        self.memory.insert(key.clone(), price.clone());
        self.result.to_persist.push((key.clone(), price.clone()));
        self.result.changes.push(DetectedChange {
            record: record.clone(),
            key,
            price,
            kind,
        });

        self.result.changes.last()
    }

    pub fn diff<'r, I>(mut self, records: I) -> RunDiffResult
    where
        I: IntoIterator<Item = &'r ListingRecord>,
    {
        for record in records {
            self.observe(record);
        }
        self.finish()
    }

    pub fn finish(self) -> RunDiffResult {
        self.result
    }
}

pub fn diff_records(records: &[ListingRecord], memory: SeenMemory, resolver: &IdentityResolver) -> RunDiffResult {
    DiffEngine::new(memory, resolver).diff(records)
}
