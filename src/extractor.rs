use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::ExtractorConfig;
use crate::models::{ListingRecord, RawListing};
use crate::scraper::FetchedPage;
use crate::utils::error::{AppError, Result};

/// Labels some sites prepend to the color text.
const COLOR_LABELS: &[&str] = &["顏色:", "顏色：", "颜色:", "颜色：", "Color:", "Colour:"];

/// Turns a listing page into flat records using configured CSS selectors.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    source_prefix: String,
    base: Url,
    item: Selector,
    link: Selector,
    name: Selector,
    color: Selector,
    price: Selector,
    image: Selector,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::config(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl ListingExtractor {
    pub fn from_config(config: &ExtractorConfig, base: &Url) -> Result<Self> {
        Ok(Self {
            source_prefix: config.source_prefix.clone(),
            base: base.clone(),
            item: parse_selector(&config.item_selector)?,
            link: parse_selector(&config.link_selector)?,
            name: parse_selector(&config.name_selector)?,
            color: parse_selector(&config.color_selector)?,
            price: parse_selector(&config.price_selector)?,
            image: parse_selector(&config.image_selector)?,
        })
    }

    pub fn extract_page(&self, page: &FetchedPage) -> Vec<ListingRecord> {
        self.extract(&page.category.label, &page.body)
    }

    /// Records with neither name nor link are dropped here.
    pub fn extract(&self, category_label: &str, html: &str) -> Vec<ListingRecord> {
        let raw = self.extract_raw(category_label, html);
        let found = raw.len();

        let records: Vec<ListingRecord> = raw
            .into_iter()
            .filter_map(|listing| ListingRecord::new(listing).ok())
            .collect();

        if records.len() < found {
            debug!(
                category = category_label,
                dropped = found - records.len(),
                "dropped rows without name or link"
            );
        }
        info!(category = category_label, count = records.len(), "extracted listings");

        records
    }

    pub fn extract_raw(&self, category_label: &str, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);
        let source = format!("{} {}", self.source_prefix, category_label).trim().to_string();

        document
            .select(&self.item)
            .map(|item| self.extract_item(item, &source))
            .collect()
    }

    fn extract_item(&self, item: ElementRef<'_>, source: &str) -> RawListing {
        let mut listing = RawListing {
            source: source.to_string(),
            ..RawListing::default()
        };

        if let Some(anchor) = item.select(&self.link).next() {
            let href = anchor.value().attr("href").unwrap_or_default().trim();
            listing.link = self.absolute_link(href);

            listing.name = anchor
                .select(&self.name)
                .map(element_text)
                .find(|text| !text.is_empty())
                .unwrap_or_else(|| element_text(anchor));
        }

        if let Some(color) = item.select(&self.color).next() {
            listing.color = strip_color_label(&element_text(color));
        }

        if let Some(price) = item.select(&self.price).next() {
            listing.price = element_text(price);
        }

        if let Some(image) = item.select(&self.image).next() {
            let src = image
                .value()
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| image.value().attr("data-src"))
                .unwrap_or_default()
                .trim();
            listing.image = absolute_image(src);
        }

        listing
    }

    fn absolute_link(&self, href: &str) -> String {
        if href.starts_with('/') && !href.starts_with("//") {
            self.base
                .join(href)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| href.to_string())
        } else {
            href.to_string()
        }
    }
}

fn absolute_image(src: &str) -> String {
    match src.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => src.to_string(),
    }
}

fn strip_color_label(text: &str) -> String {
    let mut color = text.to_string();
    for label in COLOR_LABELS {
        color = color.replace(label, "");
    }
    color.trim().to_string()
}
