//! Plain data types shared across the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One record in flight through a lane: a loan number, the event name it
/// will be published under, the payload to send, a set of attributes
/// attached to the outgoing message, and the source-order sequence number
/// it was read at.
#[derive(Debug, Clone)]
pub struct Record {
    pub loan: String,
    pub event_name: String,
    pub payload: Value,
    pub attributes: BTreeMap<String, String>,
    pub seq: u64,
}

/// The outcome of one invocation, returned to the caller and (in the ALB
/// path) embedded in the HTTP response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub processed: u64,
    pub failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u64>,
    pub partial: bool,
    pub elapsed_ms: u64,
}
