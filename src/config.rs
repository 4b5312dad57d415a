use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetcher: FetcherConfig,
    pub extractor: ExtractorConfig,
    pub identity: IdentityConfig,
    pub retry: RetryConfig,
    pub store: StoreConfig,
    pub notifications: NotificationsConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub categories: Vec<CategoryConfig>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Pause between sequential category requests.
    pub delay_between_ms: u64,
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub source_prefix: String,
    pub item_selector: String,
    pub link_selector: String,
    pub name_selector: String,
    pub color_selector: String,
    pub price_selector: String,
    pub image_selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub base_origin: String,
    /// Regex with one capture group applied to the canonical link path.
    /// Empty disables product-id keys.
    pub product_id_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retryable_statuses: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub subject: String,
    pub line: LineConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub channel_access_token: Option<String>,
    pub api_url: String,
    pub max_message_bytes: usize,
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub to_addresses: Vec<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Six-field cron expression, seconds first.
    pub cron: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub file_prefix: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            categories: vec![
                CategoryConfig {
                    label: "包包&手拿包".to_string(),
                    url: "https://www.hermes.com/tw/zh/category/women/bags-and-small-leather-goods/bags-and-clutches/".to_string(),
                },
                CategoryConfig {
                    label: "小皮件".to_string(),
                    url: "https://www.hermes.com/tw/zh/category/women/bags-and-small-leather-goods/small-leather-goods/".to_string(),
                },
            ],
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36"
                .to_string(),
            request_timeout_secs: 20,
            delay_between_ms: 1000,
            max_concurrent_fetches: 1,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            source_prefix: "Hermès官網".to_string(),
            item_selector: "div.product-grid-list-item, div.product-grid-item".to_string(),
            link_selector: ".product-item-name".to_string(),
            name_selector: "span".to_string(),
            color_selector: ".product-item-colors".to_string(),
            price_selector: "span.price".to_string(),
            image_selector: "img".to_string(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_origin: "https://www.hermes.com".to_string(),
            product_id_pattern: crate::core::identity::DEFAULT_PRODUCT_ID_PATTERN.to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/listing-watcher.db".to_string(),
            max_connections: 4,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            subject: "Hermès 新上架／變價通知".to_string(),
            line: LineConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            api_url: "https://api.line.me/v2/bot/message/broadcast".to_string(),
            max_message_bytes: 4900,
            chunk_delay_ms: 500,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            username: None,
            password: None,
            from_address: None,
            to_addresses: Vec::new(),
            use_tls: true,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 */30 * * * *".to_string(),
        }
    }
}

impl EmailConfig {
    /// Sender address, falling back to the SMTP login.
    pub fn sender(&self) -> Option<&str> {
        self.from_address.as_deref().or(self.username.as_deref())
    }

    pub fn is_configured(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
            && !self.to_addresses.is_empty()
    }
}

impl LineConfig {
    pub fn is_configured(&self) -> bool {
        self.channel_access_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }
}

impl AppConfig {
    /// Layered load: defaults, `config/default`, `config/local` (or an explicit
    /// file), `WATCHER__*` variables, then the legacy credential variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name("config/local").required(false)),
        };

        let s = builder
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_legacy_env(|key| env::var(key).ok());

        config.validate()?;
        Ok(config)
    }

    /// Honour the bare credential variables older deployments export.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("LINE_CHANNEL_ACCESS_TOKEN") {
            self.notifications.line.channel_access_token = Some(token);
        }
        if let Some(user) = non_empty("GMAIL_USER") {
            self.notifications.email.username = Some(user);
        }
        if let Some(password) = non_empty("GMAIL_APP_PASSWORD") {
            self.notifications.email.password = Some(password);
        }
        if let Some(to) = non_empty("GMAIL_TO") {
            self.notifications.email.to_addresses = to
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Fetcher
        if self.fetcher.categories.is_empty() {
            return Err(ConfigError::Message("At least one category must be configured".into()));
        }

        for category in &self.fetcher.categories {
            if Url::parse(&category.url).is_err() {
                return Err(ConfigError::Message(format!(
                    "Invalid URL for category '{}'",
                    category.label
                )));
            }
        }

        if self.fetcher.request_timeout_secs == 0 {
            return Err(ConfigError::Message("Fetcher request_timeout_secs must be greater than 0".into()));
        }

        if self.fetcher.max_concurrent_fetches == 0 {
            return Err(ConfigError::Message("Fetcher max_concurrent_fetches must be greater than 0".into()));
        }

        // Extractor
        for selector in [
            &self.extractor.item_selector,
            &self.extractor.link_selector,
            &self.extractor.name_selector,
            &self.extractor.color_selector,
            &self.extractor.price_selector,
            &self.extractor.image_selector,
        ] {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ConfigError::Message(format!("Invalid CSS selector '{}'", selector)));
            }
        }

        // Identity
        match Url::parse(&self.identity.base_origin) {
            Ok(url) if url.has_host() && matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::Message("Invalid base origin URL".into())),
        }

        if !self.identity.product_id_pattern.is_empty() {
            match Regex::new(&self.identity.product_id_pattern) {
                Ok(re) if re.captures_len() >= 2 => {}
                Ok(_) => {
                    return Err(ConfigError::Message(
                        "product_id_pattern needs a capture group for the product code".into(),
                    ));
                }
                Err(e) => {
                    return Err(ConfigError::Message(format!("Invalid product_id_pattern: {}", e)));
                }
            }
        }

        // Retry
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("Retry max_attempts must be at least 1".into()));
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Message("Retry max_delay_ms cannot be below initial_delay_ms".into()));
        }

        // Store
        if self.store.database_url.is_empty() {
            return Err(ConfigError::Message("Store database_url must be set".into()));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::Message("Store max_connections must be greater than 0".into()));
        }

        // Notifications
        if self.notifications.line.max_message_bytes == 0 || self.notifications.line.max_message_bytes > 5000 {
            return Err(ConfigError::Message("LINE max_message_bytes must be between 1 and 5000".into()));
        }

        if Url::parse(&self.notifications.line.api_url).is_err() {
            return Err(ConfigError::Message("Invalid LINE api_url".into()));
        }

        if self.notifications.email.smtp_port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        // Scheduler
        if !is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        Ok(())
    }
}

/// Shape check for a cron expression: sec min hour day month weekday [year].
pub fn is_valid_cron(cron_expr: &str) -> bool {
    let parts: Vec<&str> = cron_expr.split_whitespace().collect();
    if parts.len() != 6 && parts.len() != 7 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?')
        })
    })
}
