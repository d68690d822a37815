//! Shared retry backoff for the direct-request and batched sinks.
//!
//! Both sinks retry up to a fixed number of attempts with the same
//! jittered linear backoff, capped at two seconds.

use rand::Rng;
use std::time::Duration;

/// Maximum number of attempts for a single send, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay to sleep before retry attempt number `attempt` (1-based: the delay
/// slept after the first attempt fails is `backoff_delay(1)`).
pub fn backoff_delay(attempt: u32) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..0.2);
    let secs = (0.5 * attempt as f64 + jitter).min(2.0);
    Duration::from_secs_f64(secs)
}
