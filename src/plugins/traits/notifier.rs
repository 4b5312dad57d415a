use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Digest;
use crate::utils::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    /// Messages actually delivered; LINE may split one digest into several.
    pub parts_sent: usize,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(parts_sent: usize, message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            parts_sent,
            error: None,
        }
    }

    pub fn failed(parts_sent: usize, error: impl ToString) -> Self {
        Self {
            success: false,
            message_id: None,
            parts_sent,
            error: Some(error.to_string()),
        }
    }
}

/// A delivery channel for run digests (LINE, email, ...).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn plugin_type(&self) -> &'static str;

    /// Sends the whole digest. Delivery failures are reported in the result;
    /// `Err` is reserved for failures before anything could be attempted.
    async fn notify(&self, digest: &Digest) -> Result<NotificationResult>;
}
