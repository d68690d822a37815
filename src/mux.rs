//! Keyed fan-out multiplexer: routes records to a fixed number of lanes by
//! stable hash, preserving strict per-lane FIFO order.

use std::time::Instant;

use crate::lane::LaneHandle;
use crate::record::Record;
use crate::sink::LanePublisher;

pub struct LaneMultiplexer {
    lanes: Vec<LaneHandle>,
    #[allow(dead_code)]
    max_workers: usize,
}

impl LaneMultiplexer {
    /// Spawns one lane per entry in `publishers`. `max_workers` is carried
    /// for callers that want to size the hosting tokio runtime accordingly;
    /// the multiplexer itself always spawns exactly `publishers.len()`
    /// tasks regardless of its value.
    pub fn new(publishers: Vec<Box<dyn LanePublisher>>, max_workers: usize) -> Self {
        let lanes = publishers
            .into_iter()
            .enumerate()
            .map(|(id, publisher)| LaneHandle::spawn(id, publisher))
            .collect();
        Self { lanes, max_workers }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub async fn submit(&self, lane_id: usize, record: Record) {
        self.lanes[lane_id].submit(record).await;
    }

    /// Closes every lane to new submissions and waits, up to `deadline`,
    /// for each to drain and flush. Returns the accumulated processed/failed
    /// counts across every lane that finished before the deadline.
    pub async fn drain_and_close(&mut self, deadline: Instant) -> (u64, u64) {
        for lane in &mut self.lanes {
            lane.close();
        }

        let mut processed = 0u64;
        let mut failed = 0u64;
        for lane in &mut self.lanes {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (p, f) = lane.join_with_timeout(remaining).await;
            processed += p;
            failed += f;
        }
        (processed, failed)
    }

    /// Signals every lane to stop immediately, discarding anything still
    /// queued. Always safe to call, including after `drain_and_close`
    /// already joined every lane.
    pub fn force_close(&self) {
        for lane in &self.lanes {
            lane.request_force_close();
        }
    }
}
