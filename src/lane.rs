//! A single lane: one bounded queue, one task, one publisher, processed in
//! strict FIFO order.
//!
//! Translated from a thread-plus-queue worker into a `tokio::task` reading
//! off a bounded `tokio::sync::mpsc` channel — the channel's bounded
//! capacity is the pipeline's only backpressure mechanism; a full lane
//! suspends whoever is trying to submit to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::record::Record;
use crate::sink::LanePublisher;

/// Bounded capacity of each lane's queue.
pub const LANE_QUEUE_CAPACITY: usize = 10_000;

pub struct LaneHandle {
    lane_id: usize,
    sender: Option<mpsc::Sender<Record>>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<(u64, u64)>>,
}

impl LaneHandle {
    pub fn spawn(lane_id: usize, publisher: Box<dyn LanePublisher>) -> Self {
        let (tx, rx) = mpsc::channel(LANE_QUEUE_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let join = tokio::spawn(lane_loop(lane_id, rx, publisher, worker_stop));
        Self {
            lane_id,
            sender: Some(tx),
            stop,
            join: Some(join),
        }
    }

    pub fn lane_id(&self) -> usize {
        self.lane_id
    }

    /// Enqueues a record, suspending the caller if the lane's queue is full.
    pub async fn submit(&self, record: Record) {
        if let Some(tx) = &self.sender {
            // The receiver only goes away once the task has exited, which
            // only happens after `close`/`force_close`; a send past that
            // point is a caller bug we silently absorb rather than panic on.
            let _ = tx.send(record).await;
        }
    }

    /// Stops accepting new submissions. The worker drains what is already
    /// queued, then exits.
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Signals the worker to stop processing after its current item,
    /// discarding anything still queued.
    pub fn request_force_close(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the worker to finish, up to `timeout`. On timeout the
    /// worker task is abandoned (not aborted) and `(0, 0)` is returned.
    pub async fn join_with_timeout(&mut self, timeout: Duration) -> (u64, u64) {
        let Some(handle) = self.join.take() else {
            return (0, 0);
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(counts)) => counts,
            Ok(Err(_)) => (0, 0),
            Err(_) => (0, 0),
        }
    }
}

async fn lane_loop(
    lane_id: usize,
    mut rx: mpsc::Receiver<Record>,
    mut publisher: Box<dyn LanePublisher>,
    stop: Arc<AtomicBool>,
) -> (u64, u64) {
    let mut processed = 0u64;
    let mut failed = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let record = match rx.recv().await {
            Some(record) => record,
            None => break,
        };
        let outcome = publisher.send(&record).await;
        if outcome.ok {
            processed += 1;
        } else {
            failed += 1;
        }
        processed += outcome.extra_processed;
        failed += outcome.extra_failed;
    }

    if stop.load(Ordering::Relaxed) {
        while rx.try_recv().is_ok() {}
    }

    let (flush_ok, flush_failed) = publisher.flush().await;
    processed += flush_ok;
    failed += flush_failed;

    debug!(lane_id, processed, failed, "lane drained");
    (processed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SendOutcome;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct CountingPublisher {
        fail_even_seq: bool,
    }

    #[async_trait]
    impl LanePublisher for CountingPublisher {
        async fn send(&mut self, record: &Record) -> SendOutcome {
            let ok = !(self.fail_even_seq && record.seq % 2 == 0);
            SendOutcome::immediate(ok)
        }

        async fn flush(&mut self) -> (u64, u64) {
            (0, 0)
        }
    }

    fn record(seq: u64) -> Record {
        Record {
            loan: "0000000001".to_string(),
            event_name: "Test".to_string(),
            payload: serde_json::json!({}),
            attributes: BTreeMap::new(),
            seq,
        }
    }

    #[tokio::test]
    async fn processes_records_in_order_and_counts_outcomes() {
        let publisher = Box::new(CountingPublisher { fail_even_seq: true });
        let mut lane = LaneHandle::spawn(0, publisher);

        for seq in 0..4 {
            lane.submit(record(seq)).await;
        }
        lane.close();

        let (processed, failed) = lane.join_with_timeout(Duration::from_secs(5)).await;
        assert_eq!(processed, 2);
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn force_close_stops_without_hanging() {
        let publisher = Box::new(CountingPublisher { fail_even_seq: false });
        let mut lane = LaneHandle::spawn(0, publisher);
        lane.request_force_close();
        lane.close();
        let (_, _) = lane.join_with_timeout(Duration::from_secs(5)).await;
    }
}
