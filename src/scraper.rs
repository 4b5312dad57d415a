use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::{CategoryConfig, FetcherConfig};
use crate::utils::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub category: CategoryConfig,
    pub status: u16,
    pub body: String,
    pub response_time_ms: u64,
    pub final_url: String, // After redirects
}

/// Retrieves one raw listing page.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    async fn fetch(&self, category: &CategoryConfig) -> Result<FetchedPage>;
}

pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, retry })
    }

    async fn get_once(&self, url: &str) -> Result<(u16, String, String)> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok((status.as_u16(), final_url, body))
    }
}

#[async_trait]
impl ListingFetcher for HttpFetcher {
    async fn fetch(&self, category: &CategoryConfig) -> Result<FetchedPage> {
        let start_time = Instant::now();

        let (status, final_url, body) = self
            .retry
            .run("fetch listing page", || self.get_once(&category.url))
            .await?;

        Ok(FetchedPage {
            category: category.clone(),
            status,
            body,
            response_time_ms: start_time.elapsed().as_millis() as u64,
            final_url,
        })
    }
}

/// Fetches every category, keeping configuration order in the result.
///
/// Categories that still fail after retries are logged and left out.
pub async fn fetch_all<F>(
    fetcher: &F,
    categories: &[CategoryConfig],
    max_concurrent: usize,
    delay_between: Duration,
) -> Vec<FetchedPage>
where
    F: ListingFetcher + ?Sized,
{
    let results: Vec<Result<FetchedPage>> = if max_concurrent <= 1 {
        let mut results = Vec::with_capacity(categories.len());
        for (index, category) in categories.iter().enumerate() {
            if index > 0 && !delay_between.is_zero() {
                tokio::time::sleep(delay_between).await;
            }
            info!(category = %category.label, url = %category.url, "fetching category");
            results.push(fetcher.fetch(category).await);
        }
        results
    } else {
        // build the boxed futures up front so the stream holds no borrowing closure
        let requests: Vec<_> = categories
            .iter()
            .map(|category| {
                info!(category = %category.label, url = %category.url, "fetching category");
                fetcher.fetch(category)
            })
            .collect();

        stream::iter(requests).buffered(max_concurrent).collect().await
    };

    results
        .into_iter()
        .zip(categories)
        .filter_map(|(result, category)| match result {
            Ok(page) => Some(page),
            Err(e) => {
                warn!(category = %category.label, error = %e, "could not load category, skipping");
                None
            }
        })
        .collect()
}
