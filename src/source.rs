//! Record source adapters: S3-backed NDJSON and JSON-array readers used by
//! `S3_REPLAY` mode.

use std::io::Read;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;

pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

pub fn parse_s3_uri(uri: &str) -> Result<S3Location, SourceError> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| SourceError::InvalidS3Uri(uri.to_string()))?;
    let mut parts = rest.splitn(2, '/');
    let bucket = parts.next().unwrap_or_default().to_string();
    let key = parts.next().unwrap_or_default().to_string();
    if bucket.is_empty() || key.is_empty() {
        return Err(SourceError::InvalidS3Uri(uri.to_string()));
    }
    Ok(S3Location { bucket, key })
}

pub fn basename_from_uri(uri: &str) -> String {
    match parse_s3_uri(uri) {
        Ok(loc) => loc.key.rsplit('/').next().unwrap_or(&loc.key).to_string(),
        Err(_) => uri.rsplit('/').next().unwrap_or(uri).to_string(),
    }
}

pub async fn build_s3_client() -> aws_sdk_s3::Client {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    aws_sdk_s3::Client::new(&config)
}

/// Downloads an S3 object, transparently gunzipping it when the key ends in
/// `.gz` or the object's `Content-Encoding` says `gzip`.
pub async fn get_object_bytes(client: &aws_sdk_s3::Client, uri: &str) -> Result<Vec<u8>, SourceError> {
    let location = parse_s3_uri(uri)?;
    let resp = client
        .get_object()
        .bucket(&location.bucket)
        .key(&location.key)
        .send()
        .await
        .map_err(|e| SourceError::S3(e.to_string()))?;

    let is_gzip_encoded = resp.content_encoding().map(|v| v.eq_ignore_ascii_case("gzip")).unwrap_or(false);
    let data = resp
        .body
        .collect()
        .await
        .map_err(|e| SourceError::S3(e.to_string()))?
        .into_bytes()
        .to_vec();

    if is_gzip_encoded || location.key.ends_with(".gz") {
        let mut decoder = flate2::read::GzDecoder::new(&data[..]);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| SourceError::Io(e.to_string()))?;
        Ok(out)
    } else {
        Ok(data)
    }
}

/// Yields `(seq, parsed_record)` pairs from an external source in source
/// order. A `None` from `next` means the source is exhausted; an `Err`
/// inside `Some` means this one record could not be parsed and should be
/// counted as a per-record failure without stopping iteration.
#[async_trait]
pub trait RecordSource: Send {
    async fn next(&mut self) -> Option<(u64, Result<Value, SourceError>)>;
}

/// Reads newline-delimited JSON, one record per line, skipping blank lines.
pub struct NdjsonSource {
    lines: std::vec::IntoIter<String>,
    idx: u64,
    start_offset: u64,
    limit: Option<u64>,
    yielded: u64,
}

impl NdjsonSource {
    pub async fn load(
        client: &aws_sdk_s3::Client,
        uri: &str,
        start_offset: u64,
        limit: Option<u64>,
    ) -> Result<Self, SourceError> {
        let bytes = get_object_bytes(client, uri).await?;
        let text = String::from_utf8(bytes).map_err(|e| SourceError::Io(e.to_string()))?;
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Ok(Self {
            lines: lines.into_iter(),
            idx: 0,
            start_offset,
            limit,
            yielded: 0,
        })
    }
}

#[async_trait]
impl RecordSource for NdjsonSource {
    async fn next(&mut self) -> Option<(u64, Result<Value, SourceError>)> {
        loop {
            if let Some(limit) = self.limit {
                if self.yielded >= limit {
                    return None;
                }
            }
            let line = self.lines.next()?;
            let seq = self.idx;
            self.idx += 1;
            if seq < self.start_offset || line.trim().is_empty() {
                continue;
            }
            self.yielded += 1;
            let parsed = serde_json::from_str(&line).map_err(|e| SourceError::Parse(format!("seq {seq}: {e}")));
            return Some((seq, parsed));
        }
    }
}

/// Reads a single JSON array document, one record per element.
pub struct JsonArraySource {
    items: Vec<(u64, Value)>,
    pos: usize,
}

impl JsonArraySource {
    pub async fn load(
        client: &aws_sdk_s3::Client,
        uri: &str,
        start_offset: u64,
        limit: Option<u64>,
    ) -> Result<Self, SourceError> {
        let bytes = get_object_bytes(client, uri).await?;
        let array: Vec<Value> = serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse(e.to_string()))?;
        let mut items: Vec<(u64, Value)> = array
            .into_iter()
            .enumerate()
            .skip(start_offset as usize)
            .map(|(i, v)| (i as u64, v))
            .collect();
        if let Some(limit) = limit {
            items.truncate(limit as usize);
        }
        Ok(Self { items, pos: 0 })
    }
}

#[async_trait]
impl RecordSource for JsonArraySource {
    async fn next(&mut self) -> Option<(u64, Result<Value, SourceError>)> {
        if self.pos >= self.items.len() {
            return None;
        }
        let (seq, value) = self.items[self.pos].clone();
        self.pos += 1;
        Some((seq, Ok(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_s3_uri_splits_bucket_and_key() {
        let loc = parse_s3_uri("s3://my-bucket/path/to/file.ndjson").unwrap();
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.key, "path/to/file.ndjson");
    }

    #[test]
    fn parse_s3_uri_rejects_non_s3_scheme() {
        assert!(parse_s3_uri("https://example.com/file").is_err());
    }

    #[test]
    fn basename_from_uri_takes_last_path_segment() {
        assert_eq!(basename_from_uri("s3://bucket/a/b/LOAN_20260101.ndjson"), "LOAN_20260101.ndjson");
    }
}
