//! Wire encoding for crawl tasks
//!
//! Two formats share one queue:
//!
//! - JSON: `{"url": "...", "depth": 2, "enqueued_at": "2024-05-01T12:00:00Z"}`
//! - Plain: the bare URL as UTF-8, as written by older producers
//!
//! Decoding accepts either. Every decoded URL is normalized, so a task that
//! arrives from a foreign producer still dedups correctly.

use crate::config::WireFormat;
use crate::frontier::CrawlTask;
use crate::url::normalize_url;
use crate::UrlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while decoding a queue payload
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Payload is empty")]
    Empty,

    #[error("Invalid task JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid task URL: {0}")]
    Url(#[from] UrlError),
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTask {
    url: String,
    #[serde(default)]
    depth: u32,
    #[serde(default = "Utc::now")]
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct WireDeadLetter<'a> {
    url: &'a str,
    depth: u32,
    enqueued_at: DateTime<Utc>,
    reason: &'a str,
    failed_at: DateTime<Utc>,
}

/// Returns the MIME type of payloads written in `format`
pub fn content_type(format: WireFormat) -> &'static str {
    match format {
        WireFormat::Json => "application/json",
        WireFormat::Plain => "text/plain",
    }
}

/// Encodes a task in the given wire format
pub fn encode_task(task: &CrawlTask, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    match format {
        WireFormat::Json => Ok(serde_json::to_vec(&WireTask {
            url: task.url.to_string(),
            depth: task.depth,
            enqueued_at: task.enqueued_at,
        })?),
        WireFormat::Plain => Ok(task.url.as_str().as_bytes().to_vec()),
    }
}

/// Decodes a task from either wire format
pub fn decode_task(payload: &[u8]) -> Result<CrawlTask, CodecError> {
    let text = std::str::from_utf8(payload)?.trim();
    if text.is_empty() {
        return Err(CodecError::Empty);
    }

    if text.starts_with('{') {
        let wire: WireTask = serde_json::from_str(text)?;
        return Ok(CrawlTask {
            url: normalize_url(&wire.url)?,
            depth: wire.depth,
            enqueued_at: wire.enqueued_at,
        });
    }

    Ok(CrawlTask::seed(normalize_url(text)?))
}

/// Encodes a dead-lettered task together with the reason it was given up on
pub fn encode_dead_letter(task: &CrawlTask, reason: &str) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(&WireDeadLetter {
        url: task.url.as_str(),
        depth: task.depth,
        enqueued_at: task.enqueued_at,
        reason,
        failed_at: Utc::now(),
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn task(url: &str, depth: u32) -> CrawlTask {
        CrawlTask::new(Url::parse(url).unwrap(), depth)
    }

    #[test]
    fn test_json_keeps_depth_and_time() {
        let original = task("https://example.com/a", 4);
        let bytes = encode_task(&original, WireFormat::Json).unwrap();
        let decoded = decode_task(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_plain_is_bare_url() {
        let bytes = encode_task(&task("https://example.com/a", 4), WireFormat::Plain).unwrap();
        assert_eq!(bytes, b"https://example.com/a");
    }

    #[test]
    fn test_decode_legacy_url_payload() {
        let decoded = decode_task(b"https://Example.com/docs/#intro\n").unwrap();
        assert_eq!(decoded.url.as_str(), "https://example.com/docs");
        assert_eq!(decoded.depth, 0);
    }

    #[test]
    fn test_decode_json_without_optional_fields() {
        let decoded = decode_task(br#"{"url":"https://example.com/x/"}"#).unwrap();
        assert_eq!(decoded.url.as_str(), "https://example.com/x");
        assert_eq!(decoded.depth, 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_task(b""), Err(CodecError::Empty)));
        assert!(matches!(decode_task(&[0xff, 0xfe]), Err(CodecError::Utf8(_))));
        assert!(matches!(decode_task(b"{not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode_task(b"mailto:a@b.c"), Err(CodecError::Url(_))));
    }

    #[test]
    fn test_dead_letter_carries_reason() {
        let bytes = encode_dead_letter(&task("https://example.com/a", 1), "HTTP 404").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["url"], "https://example.com/a");
        assert_eq!(value["depth"], 1);
        assert_eq!(value["reason"], "HTTP 404");
        assert!(value["failed_at"].is_string());
    }
}
