//! Invocation envelope handling: accepts either a bare invocation event or
//! one wrapped in an Application Load Balancer request, and wraps the
//! result back into an ALB response when it came in that way.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::driver::handle_invocation;
use crate::error::ConfigError;
use crate::invocation::InvocationEvent;
use crate::record::InvocationResult;

fn is_alb_envelope(raw: &Value) -> bool {
    raw.get("requestContext").and_then(|rc| rc.get("elb")).is_some()
}

fn unwrap_alb_body(raw: &Value) -> Result<Value, ConfigError> {
    let body = raw.get("body").and_then(Value::as_str).unwrap_or("");
    let is_base64 = raw.get("isBase64Encoded").and_then(Value::as_bool).unwrap_or(false);

    let decoded = if is_base64 {
        let bytes = STANDARD
            .decode(body)
            .map_err(|e| ConfigError::Deserialize(format!("invalid base64 body: {e}")))?;
        String::from_utf8(bytes).map_err(|e| ConfigError::Deserialize(format!("body is not utf-8: {e}")))?
    } else {
        body.to_string()
    };

    serde_json::from_str(&decoded).map_err(|e| ConfigError::Deserialize(format!("invalid JSON body: {e}")))
}

pub fn wrap_alb_response(result: &InvocationResult) -> Value {
    serde_json::json!({
        "statusCode": 200,
        "headers": {"Content-Type": "application/json"},
        "isBase64Encoded": false,
        "body": serde_json::to_string(result).expect("InvocationResult always serializes"),
    })
}

/// Handles one raw Lambda event, transparently unwrapping an ALB envelope
/// when present, and returns either a bare `InvocationResult` or an ALB
/// response body, matching the shape the event arrived in.
pub async fn handle_raw_event(raw: Value, remaining_ms_hint: Option<u64>) -> Result<Value, ConfigError> {
    let is_alb = is_alb_envelope(&raw);
    let event_value = if is_alb { unwrap_alb_body(&raw)? } else { raw };

    let event: InvocationEvent =
        serde_json::from_value(event_value).map_err(|e| ConfigError::Deserialize(e.to_string()))?;
    let result = handle_invocation(event, remaining_ms_hint).await?;

    if is_alb {
        Ok(wrap_alb_response(&result))
    } else {
        Ok(serde_json::to_value(&result).expect("InvocationResult always serializes"))
    }
}
