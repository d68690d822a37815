//! Template loading and placeholder rendering for `TEMPLATE_CLONE` mode.

use std::path::Path;

use serde_json::Value;

use crate::error::SourceError;

const DEFAULT_SAMPLE_NAME: &str = "Loan_Event_Sample.json";
const DEFAULT_SAMPLE_JSON: &str = include_str!("../templates/Loan_Event_Sample.json");

/// Ordered placeholder tokens substituted into every string value of a
/// template, in this order. `#loanNumberPlacehoder` (missing the second
/// `l`) is a legacy misspelling some older templates still carry.
const TOKENS: [&str; 4] = ["#loanNumberPlacehoder", "#loanNumberPlaceholder", "{seq}", "{loanNumber}"];

/// Renders `template` by substituting every occurrence of the known
/// placeholder tokens, in every string value, recursively.
pub fn render_with_loan(template: &Value, loan: &str, seq: u64) -> Value {
    match template {
        Value::String(s) => Value::String(substitute(s, loan, seq)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_with_loan(v, loan, seq)).collect()),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), render_with_loan(value, loan, seq));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn substitute(input: &str, loan: &str, seq: u64) -> String {
    let mut out = input.to_string();
    for token in TOKENS {
        let replacement = if token == "{seq}" { seq.to_string() } else { loan.to_string() };
        if out.contains(token) {
            out = out.replace(token, &replacement);
        }
    }
    out
}

/// Loads the template for `TEMPLATE_CLONE` mode and returns it alongside a
/// name usable for event-name derivation (the basename the template was
/// loaded from, or a synthetic name for an inline template).
///
/// Precedence: `template_inline` > `template_s3_uri` > `template_name`
/// (checked against a bundled default sample, then against `./templates/`
/// and `./samples/` on disk).
pub async fn load_template(
    template_name: Option<&str>,
    template_s3_uri: Option<&str>,
    template_inline: Option<Value>,
    s3_client: Option<&aws_sdk_s3::Client>,
) -> Result<(Value, String), SourceError> {
    if let Some(inline) = template_inline {
        return Ok((inline, template_name.unwrap_or("inline_template.json").to_string()));
    }

    if let Some(uri) = template_s3_uri {
        let client = s3_client.ok_or_else(|| SourceError::S3("s3 client unavailable for template_s3_uri".to_string()))?;
        let bytes = crate::source::get_object_bytes(client, uri).await?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse(e.to_string()))?;
        let name = crate::source::basename_from_uri(uri);
        return Ok((value, name));
    }

    let name = template_name.unwrap_or(DEFAULT_SAMPLE_NAME);
    if name == DEFAULT_SAMPLE_NAME {
        let value: Value = serde_json::from_str(DEFAULT_SAMPLE_JSON).expect("bundled sample template is valid JSON");
        return Ok((value, DEFAULT_SAMPLE_NAME.to_string()));
    }

    for dir in ["templates", "samples"] {
        let path = Path::new(dir).join(name);
        if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| SourceError::Io(e.to_string()))?;
            let value: Value = serde_json::from_str(&data).map_err(|e| SourceError::Parse(e.to_string()))?;
            return Ok((value, name.to_string()));
        }
    }

    Err(SourceError::TemplateNotFound(name.to_string()))
}
