//! Bounded-time, order-preserving loan-event replay and synthesis engine.
//!
//! The core of this crate is the publishing pipeline: a keyed fan-out
//! multiplexer ([`mux::LaneMultiplexer`]) routes records to serial
//! per-loan lanes ([`lane`]), each backed by a sink publisher
//! ([`sink::LanePublisher`]) that is either a direct-request HTTP sink or a
//! batched pub/sub sink. [`driver::handle_invocation`] ties the pipeline to
//! one invocation event; [`lambda`] adapts that to raw Lambda/ALB events.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use lane_replay::{handle_invocation, InvocationEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let event: InvocationEvent = serde_json::from_value(serde_json::json!({
//!         "mode": "S3_REPLAY",
//!         "http": {"base_url": "https://example.com"},
//!         "s3_replay": {"s3_uri": "s3://bucket/loans.ndjson"},
//!     }))?;
//!     let result = handle_invocation(event, None).await?;
//!     println!("processed {} failed {}", result.processed, result.failed);
//!     Ok(())
//! }
//! ```

pub mod driver;
pub mod error;
pub mod event_name;
pub mod hashing;
pub mod invocation;
pub mod lambda;
pub mod lane;
pub mod mux;
pub mod record;
pub mod retry;
pub mod sink;
pub mod source;
pub mod template;

pub use driver::handle_invocation;
pub use error::{ConfigError, SendError, SourceError};
pub use invocation::InvocationEvent;
pub use record::{InvocationResult, Record};
