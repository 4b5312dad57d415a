use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::notifiers::{EmailNotifier, LineNotifier};
use super::traits::{NotificationResult, Notifier};
use crate::config::NotificationsConfig;
use crate::core::Digest;
use crate::utils::error::Result;
use crate::utils::retry::RetryPolicy;

pub type NotifierBox = Arc<dyn Notifier>;

/// What one notifier did with one digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Plugin type, e.g. `line`.
    pub notifier: String,
    pub name: String,
    pub result: NotificationResult,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.success
    }
}

/// Fans a digest out to every registered notifier, in registration order.
#[derive(Clone, Default)]
pub struct NotifierManager {
    notifiers: Vec<NotifierBox>,
}

impl NotifierManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers only the channels whose credentials are present.
    pub fn from_config(config: &NotificationsConfig, retry: RetryPolicy) -> Result<Self> {
        let mut manager = Self::new();

        if config.line.is_configured() {
            manager.register(Arc::new(LineNotifier::new(&config.line, retry.clone())?));
        } else {
            info!("LINE token not set, LINE notifier disabled");
        }

        if config.email.is_configured() {
            manager.register(Arc::new(EmailNotifier::new(&config.email, retry)?));
        } else {
            info!("email credentials incomplete, email notifier disabled");
        }

        Ok(manager)
    }

    pub fn register(&mut self, notifier: NotifierBox) {
        info!(notifier = notifier.plugin_type(), name = notifier.name(), "registered notifier");
        self.notifiers.push(notifier);
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn notifier_types(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|n| n.plugin_type()).collect()
    }

    /// Sends to every notifier; a failing one does not stop the rest.
    pub async fn dispatch(&self, digest: &Digest) -> Vec<DispatchOutcome> {
        if digest.is_empty() {
            return Vec::new();
        }
        if self.notifiers.is_empty() {
            warn!(entries = digest.lines.len(), "changes detected but no notifier is configured");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(self.notifiers.len());
        for notifier in &self.notifiers {
            let result = match notifier.notify(digest).await {
                Ok(result) => result,
                Err(e) => NotificationResult::failed(0, e),
            };

            if result.success {
                info!(
                    notifier = notifier.plugin_type(),
                    name = notifier.name(),
                    parts = result.parts_sent,
                    "notification delivered"
                );
            } else {
                warn!(
                    notifier = notifier.plugin_type(),
                    name = notifier.name(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "notification failed"
                );
            }

            outcomes.push(DispatchOutcome {
                notifier: notifier.plugin_type().to_string(),
                name: notifier.name().to_string(),
                result,
            });
        }

        outcomes
    }
}
