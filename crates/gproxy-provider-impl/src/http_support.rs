//! Shared HTTP-call plumbing for the OpenAI/Anthropic/Gemini adapters:
//! request/response tracing and upstream-status classification, grounded on
//! the teacher's `gproxy-provider-impl/src/upstream.rs` logging and
//! `classify_status`/`retry_after_seconds` functions, rewritten against the
//! current `GatewayError`/`ErrorKind` taxonomy (§7) and `reqwest` instead of
//! the teacher's patched `wreq` fork.

use std::time::{Instant, SystemTime};

use gproxy_provider_core::{ErrorKind, GatewayError};
use http::{HeaderMap, StatusCode};
use tracing::{info, warn};

pub fn log_upstream_request(trace_id: u128, provider: &str, method: &str, url: &str, is_stream: bool) -> Instant {
    info!(
        event = "upstream_request",
        trace_id = %trace_id,
        provider = %provider,
        method = %method,
        url = %url,
        is_stream = is_stream
    );
    Instant::now()
}

pub fn log_upstream_response_ok(trace_id: u128, provider: &str, status: StatusCode, elapsed_ms: u128, is_stream: bool) {
    info!(
        event = "upstream_response",
        trace_id = %trace_id,
        provider = %provider,
        status = status.as_u16(),
        elapsed_ms = elapsed_ms,
        is_stream = is_stream
    );
}

pub fn log_upstream_response_err(trace_id: u128, provider: &str, elapsed_ms: u128, err: impl std::fmt::Display) {
    warn!(
        event = "upstream_response",
        trace_id = %trace_id,
        provider = %provider,
        status = "error",
        elapsed_ms = elapsed_ms,
        error = %err
    );
}

pub fn network_failure(provider: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::new(ErrorKind::UpstreamTransient, format!("{provider}: network error: {err}"))
        .with_retry_after_secs(30)
}

/// Maps a non-2xx upstream status into the §7 error taxonomy, carrying a
/// `Retry-After` hint when the upstream supplied one — the Dispatcher and
/// Circuit components use this to decide retryability and cooldown (§4.5,
/// §4.8).
pub fn classify_status(provider: &str, status: StatusCode, headers: &HeaderMap, body_snippet: &str) -> GatewayError {
    let (kind, retry_after) = match status {
        // §7: upstream 400 is `InvalidRequest`, fatal — never retried, even
        // though it arrives on the same "client error" axis as the others.
        StatusCode::BAD_REQUEST => (ErrorKind::InvalidRequest, None),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => (ErrorKind::Forbidden, None),
        StatusCode::TOO_MANY_REQUESTS => (ErrorKind::RateLimited, Some(retry_after_seconds(headers).unwrap_or(60))),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            (ErrorKind::UpstreamTransient, Some(retry_after_seconds(headers).unwrap_or(30)))
        }
        status if status.is_client_error() => (ErrorKind::UpstreamProtocol, None),
        _ => (ErrorKind::UpstreamTransient, Some(30)),
    };
    let mut err = GatewayError::new(kind, format!("{provider} upstream responded {status}: {body_snippet}"));
    if let Some(secs) = retry_after {
        err = err.with_retry_after_secs(secs);
    }
    err
}

pub fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(http::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            let value = value.trim();
            if let Ok(seconds) = value.parse::<u64>() {
                return Some(seconds);
            }
            httpdate::parse_http_date(value)
                .ok()
                .and_then(|when| when.duration_since(SystemTime::now()).ok())
                .map(|duration| duration.as_secs())
        })
}

/// Char-boundary-safe truncation for error bodies logged/surfaced in
/// `GatewayError::message` (never echo a full upstream error body verbatim).
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers_with(name: &str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn classify_status_maps_each_status_family_to_its_error_kind() {
        let empty = HeaderMap::new();

        let bad_request = classify_status("openai", StatusCode::BAD_REQUEST, &empty, "bad");
        assert_eq!(bad_request.kind, ErrorKind::InvalidRequest);
        assert!(bad_request.retry_after_secs.is_none(), "§7: 400 is fatal, never retried");

        assert_eq!(classify_status("openai", StatusCode::UNAUTHORIZED, &empty, "").kind, ErrorKind::Forbidden);
        assert_eq!(classify_status("openai", StatusCode::FORBIDDEN, &empty, "").kind, ErrorKind::Forbidden);

        let rate_limited = classify_status("openai", StatusCode::TOO_MANY_REQUESTS, &empty, "");
        assert_eq!(rate_limited.kind, ErrorKind::RateLimited);
        assert_eq!(rate_limited.retry_after_secs, Some(60), "defaults to 60s with no Retry-After header");

        let upstream_down = classify_status("openai", StatusCode::SERVICE_UNAVAILABLE, &empty, "");
        assert_eq!(upstream_down.kind, ErrorKind::UpstreamTransient);
        assert_eq!(upstream_down.retry_after_secs, Some(30));

        assert_eq!(classify_status("openai", StatusCode::NOT_FOUND, &empty, "").kind, ErrorKind::UpstreamProtocol);

        let server_error = classify_status("openai", StatusCode::INTERNAL_SERVER_ERROR, &empty, "");
        assert_eq!(server_error.kind, ErrorKind::UpstreamTransient);
        assert_eq!(server_error.retry_after_secs, Some(30));
    }

    #[test]
    fn classify_status_honors_an_explicit_retry_after_header_in_seconds() {
        let headers = headers_with("retry-after", "42");
        let err = classify_status("openai", StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert_eq!(err.retry_after_secs, Some(42));
    }

    #[test]
    fn classify_status_message_carries_provider_status_and_body_snippet() {
        let empty = HeaderMap::new();
        let err = classify_status("anthropic", StatusCode::BAD_REQUEST, &empty, "missing field foo");
        assert!(err.message.contains("anthropic"));
        assert!(err.message.contains("missing field foo"));
    }

    #[test]
    fn retry_after_seconds_parses_a_numeric_header() {
        let headers = headers_with("retry-after", "7");
        assert_eq!(retry_after_seconds(&headers), Some(7));
    }

    #[test]
    fn retry_after_seconds_is_none_when_the_header_is_absent() {
        assert_eq!(retry_after_seconds(&HeaderMap::new()), None);
    }

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_appends_an_ellipsis_when_over_the_limit() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_is_char_boundary_safe_on_multibyte_text() {
        let text = "h\u{e9}llo world";
        assert_eq!(truncate(text, 3), "h\u{e9}l...");
    }
}
