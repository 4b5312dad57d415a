use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, Result};

/// Fields exactly as the extractor pulled them off the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub source: String,
    pub name: String,
    pub color: String,
    pub price: String,
    pub link: String,
    pub image: String,
}

/// One scraped product entry that carries at least a name or a link.
///
/// Construction goes through [`ListingRecord::new`], so every value of this
/// type already satisfies that invariant and the diff engine never has to
/// recheck it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawListing", into = "RawListing")]
pub struct ListingRecord {
    source: String,
    name: String,
    color: String,
    price: String,
    link: String,
    image: Option<String>,
}

impl ListingRecord {
    pub fn new(raw: RawListing) -> Result<Self> {
        let name = raw.name.trim().to_string();
        let link = raw.link.trim().to_string();

        if name.is_empty() && link.is_empty() {
            return Err(AppError::Validation(format!(
                "listing from '{}' has neither name nor link",
                raw.source
            )));
        }

        let image = raw.image.trim();

        Ok(Self {
            source: raw.source.trim().to_string(),
            name,
            color: raw.color.trim().to_string(),
            price: raw.price.trim().to_string(),
            link,
            image: (!image.is_empty()).then(|| image.to_string()),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    /// Price as displayed, e.g. `NT$ 12,300`.
    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

impl TryFrom<RawListing> for ListingRecord {
    type Error = AppError;

    fn try_from(raw: RawListing) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<ListingRecord> for RawListing {
    fn from(record: ListingRecord) -> Self {
        RawListing {
            source: record.source,
            name: record.name,
            color: record.color,
            price: record.price,
            link: record.link,
            image: record.image.unwrap_or_default(),
        }
    }
}
