//! Direct-request HTTP publisher: one POST per record against a fixed
//! endpoint, with a pooled client and bounded retry.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::record::Record;
use crate::retry::{backoff_delay, MAX_ATTEMPTS};

use super::{LanePublisher, SendOutcome};

#[derive(Clone, Debug)]
pub struct HttpPublisherConfig {
    pub base_url: String,
    pub path: String,
    pub max_pool: usize,
    pub timeout: Duration,
}

/// Joins `base_url` and `path` the way a hand-rolled URL composer would:
/// exactly one slash between them, regardless of whether either side
/// already carries one.
pub fn compose_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let trimmed_path = path.trim_start_matches('/');
    if trimmed_path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{trimmed_path}")
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub struct DirectRequestPublisher {
    client: reqwest::Client,
    url: String,
}

impl DirectRequestPublisher {
    pub fn new(config: &HttpPublisherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_pool)
            .connect_timeout(Duration::from_secs(1))
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            url: compose_url(&config.base_url, &config.path),
        })
    }
}

#[async_trait]
impl LanePublisher for DirectRequestPublisher {
    async fn send(&mut self, record: &Record) -> SendOutcome {
        let body = json!({
            "loanNumber": record.loan,
            "eventName": record.event_name,
            "payload": record.payload,
        });

        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return SendOutcome::immediate(true);
                    }
                    let code = status.as_u16();
                    if is_retryable_status(code) && attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    warn!(status = code, url = %self.url, loan = %record.loan, "direct-request publish failed");
                    return SendOutcome::immediate(false);
                }
                Err(err) => {
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    warn!(error = %err, url = %self.url, loan = %record.loan, "direct-request publish transport error");
                    return SendOutcome::immediate(false);
                }
            }
        }
        SendOutcome::immediate(false)
    }

    async fn flush(&mut self) -> (u64, u64) {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_url_joins_with_exactly_one_slash() {
        assert_eq!(compose_url("https://host", "/sendMessage"), "https://host/sendMessage");
        assert_eq!(compose_url("https://host/", "sendMessage"), "https://host/sendMessage");
        assert_eq!(compose_url("https://host/", "/sendMessage"), "https://host/sendMessage");
        assert_eq!(compose_url("https://host", "sendMessage"), "https://host/sendMessage");
    }

    #[test]
    fn compose_url_with_empty_path_is_just_the_base() {
        assert_eq!(compose_url("https://host/", ""), "https://host");
    }

    #[test]
    fn retryable_status_set_covers_429_and_5xx() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(code));
        }
        for code in [400, 401, 403, 404, 422] {
            assert!(!is_retryable_status(code));
        }
    }
}
