//! Recognition of the individual HTTP headers the analysis consumes.
//!
//! Matching is prefix-based and case-insensitive on the header name;
//! unrecognized lines only land in the raw header accumulator. Malformed
//! numeric values are logged and leave the field unset.

use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::macros::format_description;
use tracing::warn;

use super::{HttpDirection, HttpRequestResponseInfo};

/// Value of `name: value` when `line` starts with that header name
/// (case-insensitive), trimmed.
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    if line.len() > name.len()
        && line.as_bytes()[name.len()] == b':'
        && line[..name.len()].eq_ignore_ascii_case(name)
    {
        Some(line[name.len() + 1..].trim())
    } else {
        None
    }
}

fn parse_u64(field: &'static str, value: &str) -> Option<u64> {
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(field, value, "unparseable numeric header value");
            None
        }
    }
}

/// Parse an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let format = format_description!(
        "[weekday repr:short case_sensitive:false], [day] [month repr:short case_sensitive:false] \
         [year] [hour]:[minute]:[second] GMT"
    );
    match PrimitiveDateTime::parse(value.trim(), &format) {
        Ok(datetime) => Some(datetime.assume_utc()),
        Err(_) => {
            warn!(value, "unparseable HTTP date");
            None
        }
    }
}

/// Parse one header line into `info`, always appending it to the raw
/// header accumulator first.
pub fn parse_header_line(line: &str, info: &mut HttpRequestResponseInfo) {
    if !info.all_headers.is_empty() {
        info.all_headers.push(' ');
    }
    info.all_headers.push_str(line);

    if let Some(value) = header_value(line, "Host") {
        // Strip any port suffix.
        let host = value.split(':').next().unwrap_or(value);
        info.host_name = Some(host.to_string());
        return;
    }

    if let Some(value) = header_value(line, "Content-Length") {
        if info.content_length == 0 {
            if let Some(length) = parse_u64("content-length", value) {
                info.content_length = length;
            }
        }
        return;
    }

    if let Some(value) = header_value(line, "Transfer-Encoding") {
        info.chunked = value.eq_ignore_ascii_case("chunked");
        return;
    }

    if let Some(value) = header_value(line, "Content-Encoding") {
        info.content_encoding = Some(value.to_ascii_lowercase());
        return;
    }

    if let Some(value) = header_value(line, "Content-Type") {
        let mut parts = value.split(';');
        if let Some(content_type) = parts.next() {
            info.content_type = Some(content_type.trim().to_ascii_lowercase());
        }
        for attribute in parts {
            if let Some((name, val)) = attribute.split_once('=') {
                if name.trim() == "charset" {
                    info.charset = Some(val.trim().to_string());
                }
            }
        }
        return;
    }

    if let Some(value) = header_value(line, "Date") {
        info.date = parse_http_date(value);
        return;
    }

    if let Some(value) = header_value(line, "Pragma") {
        if value.eq_ignore_ascii_case("no-cache") {
            info.has_cache_headers = true;
            info.pragma_no_cache = true;
        }
        return;
    }

    if let Some(value) = header_value(line, "Cache-Control") {
        let directives: Vec<&str> = value.split(',').map(str::trim).collect();
        if !directives.is_empty() {
            info.has_cache_headers = true;
        }
        for directive in directives {
            parse_cache_directive(directive, info);
        }
        return;
    }

    match info.direction {
        HttpDirection::Response => {
            if let Some(value) = header_value(line, "ETag") {
                let value = value.strip_prefix("W/").unwrap_or(value);
                info.etag = Some(value.trim_matches('"').to_string());
            } else if let Some(value) = header_value(line, "Age") {
                info.age = parse_u64("age", value);
            } else if let Some(value) = header_value(line, "Expires") {
                info.expires = parse_http_date(value);
            } else if let Some(value) = header_value(line, "Last-Modified") {
                info.last_modified = parse_http_date(value);
            } else if let Some(value) = header_value(line, "Content-Range") {
                parse_content_range(value, info);
            }
        }
        HttpDirection::Request => {
            if let Some(value) = header_value(line, "Referer") {
                info.referrer = Some(value.to_string());
            } else if header_value(line, "If-Modified-Since").is_some() {
                info.if_modified_since = true;
            } else if header_value(line, "If-None-Match").is_some() {
                info.if_none_match = true;
            }
        }
    }
}

fn parse_cache_directive(directive: &str, info: &mut HttpRequestResponseInfo) {
    match directive {
        "no-cache" => {
            info.no_cache = true;
            return;
        }
        "no-store" => {
            info.no_store = true;
            return;
        }
        _ => {}
    }

    if let Some(value) = directive.strip_prefix("max-age=") {
        info.max_age = parse_u64("max-age", value);
        return;
    }

    match info.direction {
        HttpDirection::Request => {
            if directive == "only-if-cached" {
                info.only_if_cached = true;
            } else if let Some(value) = directive.strip_prefix("min-fresh=") {
                info.min_fresh = parse_u64("min-fresh", value);
            } else if directive == "max-stale" {
                // Valueless max-stale accepts any staleness.
                info.max_stale = Some(u64::MAX);
            } else if let Some(value) = directive.strip_prefix("max-stale=") {
                info.max_stale = parse_u64("max-stale", value);
            }
        }
        HttpDirection::Response => match directive {
            "public" => info.public_cache = true,
            "private" => info.private_cache = true,
            "must-revalidate" => info.must_revalidate = true,
            "proxy-revalidate" => info.proxy_revalidate = true,
            _ => {
                if let Some(value) = directive.strip_prefix("s-maxage=") {
                    info.s_max_age = parse_u64("s-maxage", value);
                }
            }
        },
    }
}

/// `Content-Range: bytes first-last/full`
fn parse_content_range(value: &str, info: &mut HttpRequestResponseInfo) {
    let Some(range) = value.strip_prefix("bytes ") else {
        return;
    };
    let Some((bounds, full)) = range.split_once('/') else {
        return;
    };
    let Some((first, last)) = bounds.split_once('-') else {
        return;
    };
    info.range_response = true;
    match first.trim().parse() {
        Ok(parsed) => info.range_first = parsed,
        Err(_) => warn!(value = first, "unparseable content-range start"),
    }
    match last.trim().parse() {
        Ok(parsed) => info.range_last = parsed,
        Err(_) => warn!(value = last, "unparseable content-range end"),
    }
    match full.trim().parse() {
        Ok(parsed) => info.range_full = parsed,
        Err(_) => warn!(value = full, "unparseable content-range total"),
    }
    if info.content_length == 0 && info.range_last >= info.range_first {
        info.content_length = (info.range_last - info.range_first + 1) as u64;
    }
}
