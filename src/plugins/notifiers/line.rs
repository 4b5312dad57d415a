use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LineConfig;
use crate::core::Digest;
use crate::plugins::traits::{NotificationResult, Notifier};
use crate::utils::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Splits `text` into pieces of at most `max_bytes`, never inside a char.
///
/// A piece always holds at least one char, so a single char wider than
/// `max_bytes` still makes progress.
fn split_on_char_boundaries(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > max_bytes {
        let mut end = max_bytes;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Packs digest entries into messages of at most `max_bytes` bytes.
///
/// Whole entries are kept together; only an entry that alone exceeds the
/// limit is split.
pub fn chunk_message(lines: &[String], separator: &str, max_bytes: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        let pieces = if line.len() > max_bytes {
            split_on_char_boundaries(line, max_bytes)
        } else {
            vec![line.as_str()]
        };

        for piece in pieces {
            if !current.is_empty() && current.len() + separator.len() + piece.len() > max_bytes {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str(separator);
            }
            current.push_str(piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Broadcasts digests through the LINE Messaging API.
pub struct LineNotifier {
    client: Client,
    token: String,
    api_url: String,
    max_message_bytes: usize,
    chunk_delay: Duration,
    retry: RetryPolicy,
}

impl LineNotifier {
    pub fn new(config: &LineConfig, retry: RetryPolicy) -> Result<Self> {
        let token = config
            .channel_access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::config("LINE channel access token is not set"))?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            token: token.to_string(),
            api_url: config.api_url.clone(),
            max_message_bytes: config.max_message_bytes,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            retry,
        })
    }

    async fn post_once(&self, text: &str) -> Result<Option<String>> {
        let payload = json!({
            "messages": [{ "type": "text", "text": text }]
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-line-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "LINE broadcast rejected");
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: self.api_url.clone(),
            });
        }

        Ok(request_id)
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    fn name(&self) -> &'static str {
        "LINE Broadcast"
    }

    fn plugin_type(&self) -> &'static str {
        "line"
    }

    async fn notify(&self, digest: &Digest) -> Result<NotificationResult> {
        let chunks = chunk_message(&digest.lines, Digest::SEPARATOR, self.max_message_bytes);
        let mut last_request_id = None;

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }

            match self.retry.run("LINE broadcast", || self.post_once(chunk)).await {
                Ok(request_id) => {
                    info!(part = index + 1, parts = chunks.len(), bytes = chunk.len(), "LINE message sent");
                    last_request_id = request_id;
                }
                Err(e) => {
                    warn!(part = index + 1, parts = chunks.len(), error = %e, "LINE message failed");
                    return Ok(NotificationResult::failed(index, e));
                }
            }
        }

        Ok(NotificationResult::delivered(chunks.len(), last_request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_digest_is_one_chunk() {
        let chunks = chunk_message(&lines(&["a", "b", "c"]), "\n\n", 4900);
        assert_eq!(chunks, vec!["a\n\nb\n\nc".to_string()]);
    }

    #[test]
    fn test_entries_are_packed_whole() {
        let entry = "x".repeat(40);
        let chunks = chunk_message(&lines(&[&entry, &entry, &entry]), "\n\n", 90);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n\n{}", entry, entry));
        assert_eq!(chunks[1], entry);
    }

    #[test]
    fn test_oversized_entry_splits_on_char_boundary() {
        // 3 bytes per char, limit falls mid-char
        let entry = "包".repeat(10);
        let chunks = chunk_message(&lines(&[&entry]), "\n\n", 10);

        assert!(chunks.iter().all(|c| c.len() <= 10));
        assert_eq!(chunks.concat(), entry);
        assert_eq!(chunks[0].chars().count(), 3);
    }

    #[test]
    fn test_every_chunk_respects_limit() {
        let digest: Vec<String> = (0..200)
            .map(|i| format!("[Hermès官網 包包]\nBag {} 黑色 NT$ {}\nhttps://www.hermes.com/p-{}", i, i * 1000, i))
            .collect();

        let chunks = chunk_message(&digest, "\n\n", 4900);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 4900));
        assert_eq!(chunks.join("\n\n"), digest.join("\n\n"));
    }

    #[test]
    fn test_empty_digest_has_no_chunks() {
        assert!(chunk_message(&[], "\n\n", 4900).is_empty());
    }

    fn line_config(server: &MockServer, max_bytes: usize) -> LineConfig {
        LineConfig {
            channel_access_token: Some("test-token".to_string()),
            api_url: format!("{}/v2/bot/message/broadcast", server.uri()),
            max_message_bytes: max_bytes,
            chunk_delay_ms: 0,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(2), Duration::from_millis(5), vec![429, 500, 503])
    }

    #[tokio::test]
    async fn test_line_notifier_metadata() {
        let server = MockServer::start().await;
        let notifier = LineNotifier::new(&line_config(&server, 4900), RetryPolicy::none()).unwrap();

        assert_eq!(notifier.name(), "LINE Broadcast");
        assert_eq!(notifier.plugin_type(), "line");
    }

    #[tokio::test]
    async fn test_notify_posts_bearer_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/broadcast"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({ "messages": [{ "type": "text", "text": "one\n\ntwo" }] })))
            .respond_with(ResponseTemplate::new(200).insert_header("x-line-request-id", "req-1"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = LineNotifier::new(&line_config(&server, 4900), fast_retry()).unwrap();
        let result = notifier
            .notify(&Digest::new("subject", lines(&["one", "two"])))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.parts_sent, 1);
        assert_eq!(result.message_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_notify_sends_one_post_per_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let notifier = LineNotifier::new(&line_config(&server, 12), fast_retry()).unwrap();
        let digest = Digest::new("subject", lines(&["0123456789", "abcdefghij", "klmnopqrst"]));
        let result = notifier.notify(&digest).await.unwrap();

        assert!(result.success);
        assert_eq!(result.parts_sent, 3);
    }

    #[tokio::test]
    async fn test_notify_retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let notifier = LineNotifier::new(&line_config(&server, 4900), fast_retry()).unwrap();
        let result = notifier.notify(&Digest::new("s", lines(&["hi"]))).await.unwrap();

        assert!(result.success);
    }

    #[tokio::test]
    async fn test_unauthorized_is_reported_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = LineNotifier::new(&line_config(&server, 4900), fast_retry()).unwrap();
        let result = notifier.notify(&Digest::new("s", lines(&["hi"]))).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.parts_sent, 0);
        assert!(result.error.unwrap().contains("401"));
    }

    #[test]
    fn test_missing_token_rejected() {
        let config = LineConfig {
            channel_access_token: Some("   ".to_string()),
            ..LineConfig::default()
        };
        assert!(matches!(
            LineNotifier::new(&config, RetryPolicy::none()),
            Err(AppError::Config(_))
        ));
    }
}
