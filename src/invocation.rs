//! Invocation event schema: what one invocation of the pipeline is asked
//! to do, deserialized from the raw Lambda event (or its ALB envelope).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

fn default_lane_count() -> u32 {
    64
}

fn default_time_budget_secs() -> u64 {
    840
}

fn default_http_path() -> String {
    "/sendMessage".to_string()
}

fn default_max_pool() -> usize {
    256
}

fn default_timeout_s() -> f64 {
    3.0
}

fn default_loan_field() -> String {
    "loanNumber".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Mode {
    #[serde(rename = "S3_REPLAY")]
    S3Replay,
    #[serde(rename = "TEMPLATE_CLONE")]
    TemplateClone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    SubmitterHttp,
    Sns,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::SubmitterHttp
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_http_path")]
    pub path: String,
    #[serde(default = "default_max_pool")]
    pub max_pool: usize,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: default_http_path(),
            max_pool: default_max_pool(),
            timeout_s: default_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnsConfig {
    pub topic_arn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_lane_count")]
    pub lane_count: u32,
    pub max_workers: Option<u32>,
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    #[serde(default)]
    pub max_messages_per_invocation: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            lane_count: default_lane_count(),
            max_workers: None,
            time_budget_secs: default_time_budget_secs(),
            max_messages_per_invocation: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "default_loan_field")]
    pub loan_field: String,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            loan_field: default_loan_field(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3ReplayConfig {
    pub s3_uri: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub offset: u64,
    pub limit: Option<u64>,
    pub event_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanNumberRule {
    DerivePerSeq,
    Template,
}

impl Default for LoanNumberRule {
    fn default() -> Self {
        LoanNumberRule::DerivePerSeq
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateCloneConfig {
    pub template_name: Option<String>,
    pub template_s3_uri: Option<String>,
    pub template_inline: Option<Value>,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub seq_start: u64,
    pub sequence_prefix: Option<String>,
    #[serde(default)]
    pub loan_number_rule: LoanNumberRule,
    pub event_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEvent {
    pub mode: Mode,
    #[serde(default)]
    pub backend: Backend,
    pub job_id: Option<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sns: SnsConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub s3_replay: S3ReplayConfig,
    #[serde(default)]
    pub template_clone: TemplateCloneConfig,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}
