//! Orchestrates one invocation: validates configuration, opens the record
//! source, fans records out across lanes, and drains everything within the
//! invocation's time budget.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::event_name::derive_event_name;
use crate::hashing::{generate_loan, normalize_loan, stable_hash, LoanError};
use crate::invocation::{Backend, InvocationEvent, LoanNumberRule, Mode};
use crate::mux::LaneMultiplexer;
use crate::record::{InvocationResult, Record};
use crate::sink::batched::{BatchedPublisher, SnsBatchSink};
use crate::sink::http::{DirectRequestPublisher, HttpPublisherConfig};
use crate::sink::LanePublisher;
use crate::source::{self, JsonArraySource, NdjsonSource, RecordSource};
use crate::template;

/// Once less than this much time remains before the invocation's deadline,
/// stop submitting new records and let the multiplexer drain what's
/// already in flight.
const DEADLINE_HEADROOM: Duration = Duration::from_secs(5);

const LOAN_FALLBACK_FIELDS: [&str; 5] = ["LoanNumber", "loan_no", "loanId", "loan_id", "Loan_No"];

/// Runs one invocation end to end and returns its result.
///
/// `remaining_ms_hint` is the host runtime's own remaining-time hint (e.g.
/// a Lambda context's `get_remaining_time_in_millis`); when present it
/// clamps the configured time budget so the pipeline never outlives its
/// host.
pub async fn handle_invocation(
    event: InvocationEvent,
    remaining_ms_hint: Option<u64>,
) -> Result<InvocationResult, ConfigError> {
    let start = Instant::now();
    let job_id = event.job_id.clone().unwrap_or_else(|| format!("JOB-{}", unix_seconds()));

    validate_backend(&event)?;

    let lane_count = event.publish.lane_count.max(1) as usize;
    let max_workers = event.publish.max_workers.unwrap_or(event.publish.lane_count).max(1) as usize;
    let time_budget_secs = time_budget_seconds(event.publish.time_budget_secs, remaining_ms_hint);
    let deadline = start + Duration::from_secs(time_budget_secs);
    let max_messages = event.publish.max_messages_per_invocation;
    let loan_field = event.grouping.loan_field.clone();

    let mut base_attrs = event.attributes.clone();
    base_attrs.entry("jobId".to_string()).or_insert_with(|| job_id.clone());

    info!(mode = ?event.mode, backend = ?event.backend, job_id = %job_id, lane_count, "starting invocation");

    match event.mode {
        Mode::S3Replay => {
            run_replay(
                event,
                job_id,
                base_attrs,
                loan_field,
                lane_count,
                max_workers,
                max_messages,
                deadline,
                start,
            )
            .await
        }
        Mode::TemplateClone => {
            run_clone(event, job_id, base_attrs, lane_count, max_workers, max_messages, deadline, start).await
        }
    }
}

fn validate_backend(event: &InvocationEvent) -> Result<(), ConfigError> {
    match event.backend {
        Backend::SubmitterHttp => {
            if event.http.base_url.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::MissingBaseUrl);
            }
        }
        Backend::Sns => {
            if event.sns.topic_arn.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::MissingTopicArn);
            }
        }
    }
    Ok(())
}

async fn build_publishers(event: &InvocationEvent, lane_count: usize) -> Result<Vec<Box<dyn LanePublisher>>, ConfigError> {
    let mut publishers: Vec<Box<dyn LanePublisher>> = Vec::with_capacity(lane_count);
    match event.backend {
        Backend::SubmitterHttp => {
            let config = HttpPublisherConfig {
                base_url: event.http.base_url.clone().expect("validated above"),
                path: event.http.path.clone(),
                max_pool: event.http.max_pool,
                timeout: Duration::from_secs_f64(event.http.timeout_s),
            };
            for _ in 0..lane_count {
                publishers.push(Box::new(DirectRequestPublisher::new(&config)?));
            }
        }
        Backend::Sns => {
            let topic_arn = event.sns.topic_arn.clone().expect("validated above");
            for _ in 0..lane_count {
                let sink = SnsBatchSink::new(topic_arn.clone()).await;
                publishers.push(Box::new(BatchedPublisher::new(Arc::new(sink), 10)));
            }
        }
    }
    Ok(publishers)
}

fn extract_payload(value: &Value) -> Value {
    value
        .as_object()
        .and_then(|obj| obj.get("payload"))
        .cloned()
        .unwrap_or_else(|| value.clone())
}

fn value_to_loan_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Looks up the loan number under the configured field first, then the
/// fixed set of legacy aliases, in order, and normalizes whichever is found
/// first.
fn extract_loan(value: &Value, loan_field: &str) -> Result<String, LoanError> {
    let Some(obj) = value.as_object() else {
        return Err(LoanError::FieldMissing);
    };
    if let Some(raw) = obj.get(loan_field).and_then(value_to_loan_text) {
        return normalize_loan(&raw);
    }
    for key in LOAN_FALLBACK_FIELDS {
        if key == loan_field {
            continue;
        }
        if let Some(raw) = obj.get(key).and_then(value_to_loan_text) {
            return normalize_loan(&raw);
        }
    }
    Err(LoanError::FieldMissing)
}

fn should_stop_submitting(processed_submissions: u64, max_messages: u64, deadline: Instant) -> bool {
    if max_messages > 0 && processed_submissions >= max_messages {
        return true;
    }
    deadline.saturating_duration_since(Instant::now()) <= DEADLINE_HEADROOM
}

#[allow(clippy::too_many_arguments)]
async fn run_replay(
    event: InvocationEvent,
    job_id: String,
    base_attrs: BTreeMap<String, String>,
    loan_field: String,
    lane_count: usize,
    max_workers: usize,
    max_messages: u64,
    deadline: Instant,
    start: Instant,
) -> Result<InvocationResult, ConfigError> {
    let s3_cfg = event.s3_replay.clone();
    let uri = s3_cfg.s3_uri.clone().ok_or(ConfigError::MissingS3Uri)?;
    let format = s3_cfg.format.clone().unwrap_or_else(|| "ndjson".to_string()).to_lowercase();
    let src_name = source::basename_from_uri(&uri);

    let client = source::build_s3_client().await;
    let mut src: Box<dyn RecordSource> = match format.as_str() {
        "ndjson" => Box::new(NdjsonSource::load(&client, &uri, s3_cfg.offset, s3_cfg.limit).await?),
        "json_array" => Box::new(JsonArraySource::load(&client, &uri, s3_cfg.offset, s3_cfg.limit).await?),
        _ => return Err(ConfigError::InvalidFormat),
    };

    let publishers = build_publishers(&event, lane_count).await?;
    let mut mux = LaneMultiplexer::new(publishers, max_workers);

    let mut processed_submissions = 0u64;
    let mut pre_lane_failed = 0u64;
    let mut next_offset: Option<u64> = None;

    while let Some((seq, parsed)) = src.next().await {
        let value = match parsed {
            Ok(v) => v,
            Err(err) => {
                warn!(seq, job_id = %job_id, error = %err, "skipping malformed source record");
                pre_lane_failed += 1;
                processed_submissions += 1;
                next_offset = Some(seq + 1);
                if should_stop_submitting(processed_submissions, max_messages, deadline) {
                    break;
                }
                continue;
            }
        };

        let loan = match extract_loan(&value, &loan_field) {
            Ok(loan) => loan,
            Err(err) => {
                warn!(seq, job_id = %job_id, error = %err, "skipping record with no loan number");
                pre_lane_failed += 1;
                processed_submissions += 1;
                next_offset = Some(seq + 1);
                if should_stop_submitting(processed_submissions, max_messages, deadline) {
                    break;
                }
                continue;
            }
        };

        let event_name = derive_event_name(Some(&src_name), s3_cfg.event_name.as_deref(), Some(&value));

        let mut attributes = base_attrs.clone();
        attributes.insert("eventName".to_string(), event_name.clone());
        attributes.insert("loanNumber".to_string(), loan.clone());

        let payload = extract_payload(&value);
        let lane_id = (stable_hash(&loan) % lane_count as u64) as usize;
        let record = Record {
            loan,
            event_name,
            payload,
            attributes,
            seq,
        };
        mux.submit(lane_id, record).await;

        processed_submissions += 1;
        next_offset = Some(seq + 1);

        if should_stop_submitting(processed_submissions, max_messages, deadline) {
            break;
        }
    }

    finish(mux, start, deadline, processed_submissions, pre_lane_failed, next_offset, max_messages).await
}

#[allow(clippy::too_many_arguments)]
async fn run_clone(
    event: InvocationEvent,
    job_id: String,
    base_attrs: BTreeMap<String, String>,
    lane_count: usize,
    max_workers: usize,
    max_messages: u64,
    deadline: Instant,
    start: Instant,
) -> Result<InvocationResult, ConfigError> {
    let t_cfg = event.template_clone.clone();
    if t_cfg.count <= 0 {
        return Err(ConfigError::InvalidCount);
    }

    let s3_client = if t_cfg.template_s3_uri.is_some() {
        Some(source::build_s3_client().await)
    } else {
        None
    };
    let (template, src_name) = template::load_template(
        t_cfg.template_name.as_deref(),
        t_cfg.template_s3_uri.as_deref(),
        t_cfg.template_inline.clone(),
        s3_client.as_ref(),
    )
    .await?;

    let default_event_name = derive_event_name(Some(&src_name), t_cfg.event_name.as_deref(), Some(&template));
    let count = t_cfg.count as u64;
    let seq_start = t_cfg.seq_start;
    let sequence_prefix = t_cfg.sequence_prefix.clone().unwrap_or_default();

    let publishers = build_publishers(&event, lane_count).await?;
    let mut mux = LaneMultiplexer::new(publishers, max_workers);

    let mut next_offset: Option<u64> = None;
    let mut processed_submissions = 0u64;

    for seq in seq_start..(seq_start + count) {
        let loan = match t_cfg.loan_number_rule {
            LoanNumberRule::DerivePerSeq => generate_loan(&sequence_prefix, seq, &job_id),
            LoanNumberRule::Template => {
                let raw = template
                    .as_object()
                    .and_then(|obj| obj.get("loanNumber").or_else(|| obj.get("LoanNumber")))
                    .and_then(Value::as_str);
                match raw {
                    Some(raw) if !raw.is_empty() => normalize_loan(raw)?,
                    _ => return Err(ConfigError::MissingTemplateLoan),
                }
            }
        };

        let payload = template::render_with_loan(&template, &loan, seq);

        let mut attributes = base_attrs.clone();
        attributes.insert("eventName".to_string(), default_event_name.clone());
        attributes.insert("loanNumber".to_string(), loan.clone());

        let lane_id = (stable_hash(&loan) % lane_count as u64) as usize;
        let record = Record {
            loan,
            event_name: default_event_name.clone(),
            payload,
            attributes,
            seq,
        };
        mux.submit(lane_id, record).await;
        next_offset = Some(seq + 1);
        processed_submissions += 1;

        if deadline.saturating_duration_since(Instant::now()) <= DEADLINE_HEADROOM {
            break;
        }
    }

    finish(mux, start, deadline, processed_submissions, 0, next_offset, max_messages).await
}

async fn finish(
    mut mux: LaneMultiplexer,
    start: Instant,
    deadline: Instant,
    processed_submissions: u64,
    pre_lane_failed: u64,
    next_offset: Option<u64>,
    max_messages: u64,
) -> Result<InvocationResult, ConfigError> {
    let (drained_processed, drained_failed) = mux.drain_and_close(deadline).await;
    mux.force_close();

    let elapsed = start.elapsed();
    let time_budget = deadline.saturating_duration_since(start);
    let partial = elapsed.as_secs_f64() >= (time_budget.as_secs_f64() - 1.0)
        || (max_messages > 0 && processed_submissions >= max_messages);

    Ok(InvocationResult {
        processed: drained_processed,
        failed: drained_failed + pre_lane_failed,
        next_offset,
        partial,
        elapsed_ms: elapsed.as_millis() as u64,
    })
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Clamps a configured time budget to the host runtime's own remaining-time
/// hint, leaving five seconds of headroom, when such a hint is available.
fn time_budget_seconds(configured: u64, remaining_ms_hint: Option<u64>) -> u64 {
    match remaining_ms_hint {
        Some(remaining_ms) => {
            let headroom_secs = (remaining_ms / 1000).saturating_sub(5);
            configured.min(headroom_secs.max(1))
        }
        None => configured,
    }
}
