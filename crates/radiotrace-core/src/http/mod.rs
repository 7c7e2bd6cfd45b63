//! HTTP request/response extraction from reassembled session streams.
//!
//! The parser scans each direction's byte stream as CRLF-terminated
//! lines, frames bodies by Content-Length or chunked transfer coding,
//! recognizes a fixed set of headers, and pairs requests with responses
//! in time order. Sessions that do not look like HTTP (TLS) degrade to
//! opaque messages.

pub mod headers;
pub mod parser;
pub mod reader;

use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;

use crate::session::StreamBuffer;

/// Errors surfaced by HTTP content access.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The recorded body range extends past the reassembled buffer: the
    /// headers promise more than the capture holds, which indicates a
    /// corrupted or oversized declaration rather than a clean truncation.
    #[error("content range {offset}+{len} exceeds reassembled buffer of {available} bytes")]
    ContentTooLarge { offset: usize, len: usize, available: usize },
}

/// Message direction within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpDirection {
    Request,
    Response,
}

/// Per-transaction timing breakdown, attached to the request of a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestResponseTimeline {
    pub start_time: f64,
    pub dns_lookup_duration: Option<f64>,
    pub initial_connection_duration: Option<f64>,
    pub ssl_negotiation_duration: Option<f64>,
    pub request_duration: f64,
    pub time_to_first_byte: f64,
    pub content_download_duration: f64,
}

/// One HTTP message (request or response) located in a session stream.
#[derive(Debug, Clone)]
pub struct HttpRequestResponseInfo {
    pub direction: HttpDirection,
    /// Raw request or status line, absent for opaque (non-HTTP) blocks.
    pub status_line: Option<String>,
    /// Request method (GET, POST, ...).
    pub request_type: Option<String>,
    /// Request target as written on the request line.
    pub obj_name: Option<String>,
    pub host_name: Option<String>,
    pub version: Option<String>,
    pub scheme: Option<String>,
    pub port: Option<u16>,
    pub status_code: Option<u16>,
    pub response_result: Option<String>,
    pub content_length: u64,
    pub content_encoding: Option<String>,
    pub content_type: Option<String>,
    pub charset: Option<String>,
    pub chunked: bool,
    pub chunk_mode_finished: bool,
    pub date: Option<OffsetDateTime>,
    pub expires: Option<OffsetDateTime>,
    pub last_modified: Option<OffsetDateTime>,
    pub has_cache_headers: bool,
    pub pragma_no_cache: bool,
    pub no_cache: bool,
    pub no_store: bool,
    pub public_cache: bool,
    pub private_cache: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub only_if_cached: bool,
    pub max_age: Option<u64>,
    pub s_max_age: Option<u64>,
    pub min_fresh: Option<u64>,
    pub max_stale: Option<u64>,
    pub etag: Option<String>,
    pub age: Option<u64>,
    pub range_response: bool,
    pub range_first: i64,
    pub range_last: i64,
    pub range_full: u64,
    pub referrer: Option<String>,
    pub if_modified_since: bool,
    pub if_none_match: bool,
    /// Unparsed header lines accumulated verbatim.
    pub all_headers: String,
    /// TLS traffic parsed as an opaque block.
    pub ssl: bool,
    /// Byte offset of the message start within its stream.
    pub rr_start: usize,
    /// Total bytes from message start through its body.
    pub raw_size: usize,
    /// body offset -> length within the session stream.
    pub content_offsets: BTreeMap<usize, usize>,
    /// Index (into the filtered packet list) of the first/last packet
    /// carrying this message.
    pub first_data_packet: Option<usize>,
    pub last_data_packet: Option<usize>,
    /// Index of the paired message within the session's message list.
    pub assoc: Option<usize>,
    pub timeline: Option<RequestResponseTimeline>,
}

impl HttpRequestResponseInfo {
    pub fn new(direction: HttpDirection, rr_start: usize) -> Self {
        Self {
            direction,
            status_line: None,
            request_type: None,
            obj_name: None,
            host_name: None,
            version: None,
            scheme: None,
            port: None,
            status_code: None,
            response_result: None,
            content_length: 0,
            content_encoding: None,
            content_type: None,
            charset: None,
            chunked: false,
            chunk_mode_finished: false,
            date: None,
            expires: None,
            last_modified: None,
            has_cache_headers: false,
            pragma_no_cache: false,
            no_cache: false,
            no_store: false,
            public_cache: false,
            private_cache: false,
            must_revalidate: false,
            proxy_revalidate: false,
            only_if_cached: false,
            max_age: None,
            s_max_age: None,
            min_fresh: None,
            max_stale: None,
            etag: None,
            age: None,
            range_response: false,
            range_first: 0,
            range_last: 0,
            range_full: 0,
            referrer: None,
            if_modified_since: false,
            if_none_match: false,
            all_headers: String::new(),
            ssl: false,
            rr_start,
            raw_size: 0,
            content_offsets: BTreeMap::new(),
            first_data_packet: None,
            last_data_packet: None,
            assoc: None,
            timeline: None,
        }
    }

    pub fn is_request(&self) -> bool {
        self.direction == HttpDirection::Request
    }

    /// Request target with any query string stripped.
    pub fn obj_name_without_params(&self) -> Option<&str> {
        self.obj_name
            .as_deref()
            .map(|name| name.split('?').next().unwrap_or(name))
    }

    /// Host component of the Referer header, when one was recorded.
    pub fn referrer_host(&self) -> Option<String> {
        let referrer = self.referrer.as_deref()?;
        let after_scheme = referrer.split_once("://").map(|(_, rest)| rest)?;
        let host_port = after_scheme.split(['/', '?']).next()?;
        let host = host_port.split(':').next()?;
        if host.is_empty() { None } else { Some(host.to_string()) }
    }

    /// Bytes of the declared body actually present in the buffer.
    ///
    /// Reading never mutates the session; repeated calls return the same
    /// count.
    pub fn actual_byte_count(&self, buffer: &StreamBuffer) -> usize {
        let available = buffer.storage.len();
        self.content_offsets
            .iter()
            .map(|(&offset, &len)| {
                if offset >= available {
                    0
                } else {
                    len.min(available - offset)
                }
            })
            .sum()
    }

    /// The declared body bytes, failing when a recorded range extends
    /// past the buffer (corrupted declaration, as opposed to a capture
    /// that legitimately ends early and shortens `actual_byte_count`).
    pub fn content_bytes(&self, buffer: &StreamBuffer) -> Result<Vec<u8>, HttpError> {
        let available = buffer.storage.len();
        let mut bytes = Vec::new();
        for (&offset, &len) in &self.content_offsets {
            if offset + len > available {
                return Err(HttpError::ContentTooLarge { offset, len, available });
            }
            bytes.extend_from_slice(&buffer.storage[offset..offset + len]);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obj_name_params_stripped() {
        let mut message = HttpRequestResponseInfo::new(HttpDirection::Request, 0);
        message.obj_name = Some("/path/query.do?a=1&b=2".to_string());
        assert_eq!(message.obj_name_without_params(), Some("/path/query.do"));
    }

    #[test]
    fn referrer_host_extraction() {
        let mut message = HttpRequestResponseInfo::new(HttpDirection::Request, 0);
        message.referrer = Some("http://www.example.com:8080/page?x=1".to_string());
        assert_eq!(message.referrer_host().as_deref(), Some("www.example.com"));
        message.referrer = Some("not a uri".to_string());
        assert_eq!(message.referrer_host(), None);
    }

    #[test]
    fn actual_byte_count_is_idempotent_and_clamped() {
        let mut buffer = StreamBuffer::default();
        buffer.storage = vec![0u8; 10];
        let mut message = HttpRequestResponseInfo::new(HttpDirection::Response, 0);
        message.content_offsets.insert(4, 20);
        let first = message.actual_byte_count(&buffer);
        let second = message.actual_byte_count(&buffer);
        assert_eq!(first, 6);
        assert_eq!(first, second);
        assert!(matches!(
            message.content_bytes(&buffer),
            Err(HttpError::ContentTooLarge { available: 10, .. })
        ));
    }
}
