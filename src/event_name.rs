//! Event-name derivation.
//!
//! Priority order: an explicit override always wins; failing that, a
//! well-known source-name prefix maps to a fixed event name; failing that,
//! the record itself is consulted; failing that, `"UnknownEvent"`.

use serde_json::Value;

const LOAN_PREFIX: &str = "LOAN_";
const LOAN_EVENT: &str = "LoanOnboardCompleted";
const REPORTING_PREFIX: &str = "REPORTINGPAYLOAD_";
const REPORTING_EVENT: &str = "ServicerFileReported";
const RECORD_FIELDS: [&str; 3] = ["eventName", "event_type", "eventType"];
const UNKNOWN_EVENT: &str = "UnknownEvent";

/// Derives the event name attached to a published record.
///
/// `source_name` is typically the basename of the file or object a record
/// was read from (e.g. an S3 key); `explicit` is an operator-supplied
/// override from the invocation event; `record` is the raw record the
/// event name is ultimately describing.
pub fn derive_event_name(source_name: Option<&str>, explicit: Option<&str>, record: Option<&Value>) -> String {
    if let Some(name) = explicit {
        if !name.is_empty() {
            return name.to_string();
        }
    }

    let upper = source_name.unwrap_or("").trim().to_uppercase();
    if upper.starts_with(LOAN_PREFIX) {
        return LOAN_EVENT.to_string();
    }
    if upper.starts_with(REPORTING_PREFIX) {
        return REPORTING_EVENT.to_string();
    }

    if let Some(obj) = record.and_then(Value::as_object) {
        for field in RECORD_FIELDS {
            if let Some(value) = obj.get(field) {
                return stringify_record_field(value);
            }
        }
    }

    UNKNOWN_EVENT.to_string()
}

/// Renders a record field's value the way Python's `str()` would, so a
/// borrowed field reads the same regardless of its JSON type.
fn stringify_record_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_wins_over_everything() {
        let record = json!({"eventName": "Ignored"});
        assert_eq!(
            derive_event_name(Some("LOAN_20260101.ndjson"), Some("Explicit"), Some(&record)),
            "Explicit"
        );
    }

    #[test]
    fn loan_prefix_maps_to_loan_onboard_completed() {
        assert_eq!(derive_event_name(Some("LOAN_batch_01.ndjson"), None, None), LOAN_EVENT);
    }

    #[test]
    fn reporting_prefix_is_case_insensitive() {
        assert_eq!(
            derive_event_name(Some("reportingpayload_q1.json"), None, None),
            REPORTING_EVENT
        );
    }

    #[test]
    fn falls_back_to_record_field() {
        let record = json!({"event_type": "CustomEvent"});
        assert_eq!(derive_event_name(Some("misc.ndjson"), None, Some(&record)), "CustomEvent");
    }

    #[test]
    fn falls_back_to_unknown_event() {
        assert_eq!(derive_event_name(Some("misc.ndjson"), None, None), UNKNOWN_EVENT);
    }

    #[test]
    fn empty_explicit_is_ignored() {
        assert_eq!(derive_event_name(Some("LOAN_x.ndjson"), Some(""), None), LOAN_EVENT);
    }

    #[test]
    fn empty_record_field_is_returned_as_is() {
        let record = json!({"eventName": ""});
        assert_eq!(derive_event_name(Some("misc.ndjson"), None, Some(&record)), "");
    }

    #[test]
    fn non_string_record_field_is_stringified_python_style() {
        let record = json!({"eventName": true});
        assert_eq!(derive_event_name(Some("misc.ndjson"), None, Some(&record)), "True");
    }
}
