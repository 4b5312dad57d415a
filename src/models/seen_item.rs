use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;

/// Stable string that recognises the same product across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

/// Digit-only projection of a displayed price. Compared, never added up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPrice(String);

/// Identity key to last-notified price, as read at the start of a run.
pub type SeenMemory = HashMap<IdentityKey, NormalizedPrice>;

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl NormalizedPrice {
    pub fn new(digits: impl Into<String>) -> Self {
        Self(digits.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NormalizedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row to append to the memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub key: IdentityKey,
    pub price: NormalizedPrice,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryUpdate {
    pub fn new(key: IdentityKey, price: NormalizedPrice, recorded_at: DateTime<Utc>) -> Self {
        Self { key, price, recorded_at }
    }
}

/// A persisted memory row; the latest row per key is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SeenItem {
    pub id: i64,
    pub id_key: String,
    pub last_price: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl SeenItem {
    pub fn key(&self) -> IdentityKey {
        IdentityKey::new(self.id_key.clone())
    }

    pub fn price(&self) -> NormalizedPrice {
        NormalizedPrice::new(self.last_price.clone())
    }
}
