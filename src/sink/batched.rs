//! Batched pub/sub publisher: buffers entries and flushes them in
//! SNS-FIFO-style batches of at most ten, grouped and deduplicated by loan.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::SendError;
use crate::record::Record;
use crate::retry::{backoff_delay, MAX_ATTEMPTS};

use super::{LanePublisher, SendOutcome};

/// The largest single message body a batched transport will accept.
pub const MAX_ENTRY_BYTES: usize = 256_000;

/// The number of entries a final, lane-close flush drains per round,
/// independent of the configured in-flight batch size.
const CLOSE_FLUSH_SIZE: usize = 10;

#[derive(Clone, Debug)]
pub struct BatchEntry {
    pub id: String,
    pub message: String,
    pub group_id: String,
    pub dedup_id: String,
    pub attributes: std::collections::BTreeMap<String, String>,
}

/// Abstraction over the pub/sub transport a batched publisher flushes
/// through. Kept separate from [`BatchedPublisher`] so tests can swap in an
/// in-memory sink without touching AWS.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Attempt to publish up to ten entries. Returns the ids of entries
    /// that failed (an empty vec means everything in `entries` succeeded).
    async fn publish_batch(&self, entries: &[BatchEntry]) -> Result<Vec<String>, SendError>;
}

/// Publishes batches to a standard (FIFO) SNS topic.
pub struct SnsBatchSink {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsBatchSink {
    pub async fn new(topic_arn: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_sns::Client::new(&config);
        Self {
            client,
            topic_arn: topic_arn.into(),
        }
    }
}

#[async_trait]
impl BatchSink for SnsBatchSink {
    async fn publish_batch(&self, entries: &[BatchEntry]) -> Result<Vec<String>, SendError> {
        use aws_sdk_sns::types::{MessageAttributeValue, PublishBatchRequestEntry};

        let mut request_entries = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut builder = PublishBatchRequestEntry::builder()
                .id(&entry.id)
                .message(&entry.message)
                .message_group_id(&entry.group_id)
                .message_deduplication_id(&entry.dedup_id);
            for (key, value) in &entry.attributes {
                let attr = MessageAttributeValue::builder()
                    .data_type("String")
                    .string_value(value)
                    .build()
                    .map_err(|e| SendError::Transport(e.to_string()))?;
                builder = builder.message_attributes(key, attr);
            }
            let built = builder.build().map_err(|e| SendError::Transport(e.to_string()))?;
            request_entries.push(built);
        }

        let resp = self
            .client
            .publish_batch()
            .topic_arn(&self.topic_arn)
            .set_publish_batch_request_entries(Some(request_entries))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        Ok(resp.failed().iter().map(|f| f.id().to_string()).collect())
    }
}

pub struct BatchedPublisher {
    sink: Arc<dyn BatchSink>,
    batch_size: usize,
    pending: Vec<BatchEntry>,
}

impl BatchedPublisher {
    pub fn new(sink: Arc<dyn BatchSink>, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.clamp(1, 10),
            pending: Vec::new(),
        }
    }

    fn build_entry(&self, record: &Record) -> Option<BatchEntry> {
        let message = serde_json::to_string(&record.payload).ok()?;
        if message.len() > MAX_ENTRY_BYTES {
            return None;
        }
        let job_id = record
            .attributes
            .get("jobId")
            .map(String::as_str)
            .unwrap_or("job");
        let dedup_id =
            format!("{job_id}:{}:{}:{}:{}", record.loan, record.event_name, record.seq, Uuid::new_v4());
        Some(BatchEntry {
            id: Uuid::new_v4().to_string(),
            message,
            group_id: record.loan.clone(),
            dedup_id,
            attributes: record.attributes.clone(),
        })
    }

    /// Drains up to `max` pending entries, publishes them with retry, and
    /// returns the ids that ultimately failed. The drained entries are
    /// removed from `pending` before the first publish attempt, so a
    /// mid-flush failure can never leave an entry counted twice.
    async fn flush_batch(&mut self, max: usize) -> HashSet<String> {
        let n = self.pending.len().min(max);
        if n == 0 {
            return HashSet::new();
        }
        let batch: Vec<BatchEntry> = self.pending.drain(0..n).collect();
        self.publish_with_retry(batch).await
    }

    async fn publish_with_retry(&self, entries: Vec<BatchEntry>) -> HashSet<String> {
        let mut remaining = entries;
        for attempt in 1..=MAX_ATTEMPTS {
            if remaining.is_empty() {
                return HashSet::new();
            }
            match self.sink.publish_batch(&remaining).await {
                Ok(failed_ids) if failed_ids.is_empty() => return HashSet::new(),
                Ok(failed_ids) => {
                    let failed_set: HashSet<String> = failed_ids.into_iter().collect();
                    remaining.retain(|e| failed_set.contains(&e.id));
                }
                Err(err) => {
                    warn!(error = %err, "batch publish transport error");
                }
            }
            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
        remaining.into_iter().map(|e| e.id).collect()
    }
}

#[async_trait]
impl LanePublisher for BatchedPublisher {
    async fn send(&mut self, record: &Record) -> SendOutcome {
        let Some(entry) = self.build_entry(record) else {
            warn!(loan = %record.loan, "record too large for batched transport, dropping");
            return SendOutcome::immediate(false);
        };
        let entry_id = entry.id.clone();
        self.pending.push(entry);

        if self.pending.len() < self.batch_size {
            return SendOutcome::immediate(true);
        }

        let batch_len = self.batch_size;
        let failed_ids = self.flush_batch(batch_len).await;
        let this_failed = failed_ids.contains(&entry_id);
        let total = batch_len as u64;
        let failed_count = failed_ids.len() as u64;
        let success_count = total - failed_count;

        SendOutcome {
            ok: !this_failed,
            extra_processed: success_count - u64::from(!this_failed),
            extra_failed: failed_count - u64::from(this_failed),
        }
    }

    async fn flush(&mut self) -> (u64, u64) {
        let mut success = 0u64;
        let mut failed = 0u64;
        while !self.pending.is_empty() {
            let before = self.pending.len();
            let failed_ids = self.flush_batch(CLOSE_FLUSH_SIZE).await;
            let drained = before.min(CLOSE_FLUSH_SIZE) as u64;
            failed += failed_ids.len() as u64;
            success += drained - failed_ids.len() as u64;
        }
        (success, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct AlwaysOkSink {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl BatchSink for AlwaysOkSink {
        async fn publish_batch(&self, entries: &[BatchEntry]) -> Result<Vec<String>, SendError> {
            self.calls.lock().unwrap().push(entries.len());
            Ok(Vec::new())
        }
    }

    struct FailFirstIdSink;

    #[async_trait]
    impl BatchSink for FailFirstIdSink {
        async fn publish_batch(&self, entries: &[BatchEntry]) -> Result<Vec<String>, SendError> {
            Ok(entries.first().map(|e| vec![e.id.clone()]).unwrap_or_default())
        }
    }

    fn record(loan: &str, seq: u64) -> Record {
        Record {
            loan: loan.to_string(),
            event_name: "TestEvent".to_string(),
            payload: serde_json::json!({"loanNumber": loan}),
            attributes: BTreeMap::new(),
            seq,
        }
    }

    #[tokio::test]
    async fn buffers_until_batch_size_then_flushes() {
        let sink = Arc::new(AlwaysOkSink { calls: Mutex::new(Vec::new()) });
        let mut publisher = BatchedPublisher::new(sink.clone(), 2);

        let outcome1 = publisher.send(&record("1", 0)).await;
        assert!(outcome1.ok);
        assert_eq!(outcome1.extra_processed, 0);

        let outcome2 = publisher.send(&record("2", 1)).await;
        assert!(outcome2.ok);
        assert_eq!(outcome2.extra_processed, 1);

        assert_eq!(*sink.calls.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn flush_drains_remaining_entries() {
        let sink = Arc::new(AlwaysOkSink { calls: Mutex::new(Vec::new()) });
        let mut publisher = BatchedPublisher::new(sink, 10);

        publisher.send(&record("1", 0)).await;
        publisher.send(&record("2", 1)).await;
        let (success, failed) = publisher.flush().await;
        assert_eq!(success, 2);
        assert_eq!(failed, 0);
    }

    #[tokio::test]
    async fn repeated_failure_is_reported_after_retries_exhaust() {
        let sink = Arc::new(FailFirstIdSink);
        let mut publisher = BatchedPublisher::new(sink, 2);

        publisher.send(&record("1", 0)).await;
        let outcome = publisher.send(&record("2", 1)).await;
        // first entry in the batch (loan "1") always fails; second always succeeds.
        assert!(outcome.ok);
        assert_eq!(outcome.extra_failed, 1);
        assert_eq!(outcome.extra_processed, 0);
    }

    #[tokio::test]
    async fn oversized_message_fails_without_buffering() {
        let sink = Arc::new(AlwaysOkSink { calls: Mutex::new(Vec::new()) });
        let mut publisher = BatchedPublisher::new(sink, 10);
        let huge = "x".repeat(MAX_ENTRY_BYTES + 1);
        let mut rec = record("1", 0);
        rec.payload = serde_json::json!({"blob": huge});
        let outcome = publisher.send(&rec).await;
        assert!(!outcome.ok);
        assert!(publisher.pending.is_empty());
    }

    #[tokio::test]
    async fn batch_size_is_clamped_to_ten() {
        let sink = Arc::new(AlwaysOkSink { calls: Mutex::new(Vec::new()) });
        let publisher = BatchedPublisher::new(sink, 50);
        assert_eq!(publisher.batch_size, 10);
    }
}
