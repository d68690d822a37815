//! Error types for the replay/synthesis pipeline.

use thiserror::Error;

use crate::hashing::LoanError;

/// Configuration and invocation-level errors: these fail the invocation
/// synchronously, before any record is submitted to a lane.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not deserialize invocation event: {0}")]
    Deserialize(String),

    #[error("http.base_url is required for the submitter_http backend")]
    MissingBaseUrl,

    #[error("sns.topic_arn is required for the sns backend")]
    MissingTopicArn,

    #[error("s3_replay.s3_uri is required in S3_REPLAY mode")]
    MissingS3Uri,

    #[error("s3_replay.format must be ndjson or json_array")]
    InvalidFormat,

    #[error("template_clone.count must be greater than zero")]
    InvalidCount,

    #[error(
        "template has no loanNumber/LoanNumber field; set loan_number_rule=derive_per_seq \
         or provide one in template_inline"
    )]
    MissingTemplateLoan,

    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error("http client build error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Errors raised while reading or decoding an external record source
/// (S3 objects, templates).
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("invalid s3 uri: {0}")]
    InvalidS3Uri(String),

    #[error("s3 error: {0}")]
    S3(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),
}

/// Errors raised transporting a batch to the underlying pub/sub backend.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),
}
