//! End-to-end tests for the fan-out/lane/publisher pipeline, using an
//! in-memory publisher so no network access is required.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use lane_replay::hashing::stable_hash;
use lane_replay::mux::LaneMultiplexer;
use lane_replay::record::Record;
use lane_replay::sink::{LanePublisher, SendOutcome};

struct RecordingPublisher {
    received: Arc<Mutex<Vec<(String, u64)>>>,
    fail_loans: Vec<String>,
}

#[async_trait]
impl LanePublisher for RecordingPublisher {
    async fn send(&mut self, record: &Record) -> SendOutcome {
        self.received.lock().unwrap().push((record.loan.clone(), record.seq));
        SendOutcome::immediate(!self.fail_loans.contains(&record.loan))
    }

    async fn flush(&mut self) -> (u64, u64) {
        (0, 0)
    }
}

fn record(loan: &str, seq: u64) -> Record {
    Record {
        loan: loan.to_string(),
        event_name: "LoanOnboardCompleted".to_string(),
        payload: serde_json::json!({"loanNumber": loan, "seq": seq}),
        attributes: BTreeMap::new(),
        seq,
    }
}

fn lane_for(loan: &str, lane_count: u64) -> usize {
    (stable_hash(loan) % lane_count) as usize
}

#[tokio::test]
async fn fans_out_across_lanes_and_preserves_per_lane_order() {
    const LANE_COUNT: usize = 4;
    let received = Arc::new(Mutex::new(Vec::new()));

    let publishers: Vec<Box<dyn LanePublisher>> = (0..LANE_COUNT)
        .map(|_| {
            Box::new(RecordingPublisher {
                received: received.clone(),
                fail_loans: Vec::new(),
            }) as Box<dyn LanePublisher>
        })
        .collect();
    let mut mux = LaneMultiplexer::new(publishers, LANE_COUNT);

    let loans = ["0000000001", "0000000002", "0000000003", "0000000004", "0000000005"];
    let mut expected_per_loan: std::collections::HashMap<&str, Vec<u64>> = std::collections::HashMap::new();

    for round in 0..10u64 {
        for loan in loans {
            let seq = round * loans.len() as u64;
            let lane_id = lane_for(loan, LANE_COUNT as u64);
            mux.submit(lane_id, record(loan, seq)).await;
            expected_per_loan.entry(loan).or_default().push(seq);
        }
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    let (processed, failed) = mux.drain_and_close(deadline).await;
    mux.force_close();

    assert_eq!(processed, (loans.len() as u64) * 10);
    assert_eq!(failed, 0);

    let all = received.lock().unwrap();
    for loan in loans {
        let seqs: Vec<u64> = all.iter().filter(|(l, _)| l == loan).map(|(_, s)| *s).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted, "loan {loan} was processed out of order");
    }
}

#[tokio::test]
async fn counts_failures_separately_from_successes() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let publishers: Vec<Box<dyn LanePublisher>> = vec![Box::new(RecordingPublisher {
        received,
        fail_loans: vec!["0000000009".to_string()],
    })];
    let mut mux = LaneMultiplexer::new(publishers, 1);

    for seq in 0..3 {
        mux.submit(0, record("0000000001", seq)).await;
    }
    mux.submit(0, record("0000000009", 99)).await;

    let deadline = Instant::now() + Duration::from_secs(5);
    let (processed, failed) = mux.drain_and_close(deadline).await;
    mux.force_close();

    assert_eq!(processed, 3);
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn force_close_after_drain_is_always_safe() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let publishers: Vec<Box<dyn LanePublisher>> = vec![Box::new(RecordingPublisher {
        received,
        fail_loans: Vec::new(),
    })];
    let mut mux = LaneMultiplexer::new(publishers, 1);
    mux.submit(0, record("0000000001", 0)).await;

    let deadline = Instant::now() + Duration::from_secs(5);
    mux.drain_and_close(deadline).await;
    mux.force_close();
    mux.force_close();
}

#[tokio::test]
async fn stable_hash_assigns_the_same_loan_to_the_same_lane_every_time() {
    let lane_count = 64u64;
    let loan = "0000004242";
    let first = stable_hash(loan) % lane_count;
    for _ in 0..100 {
        assert_eq!(stable_hash(loan) % lane_count, first);
    }
}
