//! Request observability layers.
//!
//! # Data Flow
//!
//! 1. `track` (outermost) stamps a monotonic start instant and, after the
//!    response is ready, logs the completion line with both latencies
//! 2. `log_request` tags the request with an id, buffers the body under the
//!    configured limit, and logs method, source address, headers, and the
//!    redacted body before the handler runs
//! 3. `expose_matched_path` runs as a route layer and copies the matched
//!    route template into the response extensions for `track`
//!
//! # Design Decisions
//!
//! - Bodies are buffered once here; handlers downstream see the replayed
//!   bytes, and oversized payloads become `EntityTooLarge` before any
//!   handler runs. A transport that drops mid-body is an Internal failure,
//!   not an over-limit request
//! - Top-level `password` fields are masked before the body is logged

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, FixedOffset, Utc};
use http_body_util::LengthLimitError;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorKind, SiteError};
use crate::http::server::SiteContext;

const PASSWORD_MASK: &str = "********";

/// Route template the request matched, copied into response extensions.
#[derive(Debug, Clone)]
pub struct MatchedRoute(pub String);

/// Identifier assigned to the request by `log_request`; echoed back to the
/// client in the `x-request-id` response header.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Route-layer middleware exposing the matched route template to `track`.
pub async fn expose_matched_path(
    matched: MatchedPath,
    request: Request<Body>,
    next: Next,
) -> Response {
    let route = matched.as_str().to_owned();
    let mut response = next.run(request).await;
    response.extensions_mut().insert(MatchedRoute(route));
    response
}

/// Outermost layer: logs one completion line per request.
///
/// `Route: [<status>] <METHOD> <route> -> Client Latency: <n>ms ->
/// Response Latency: <n>ms`, with `Unknown` when no route matched and the
/// redirect target appended for 301/302.
pub async fn track(
    State(ctx): State<SiteContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let started_at = Utc::now();
    let client_sent = parse_client_date(request.headers());
    let method = request.method().clone();

    let response = next.run(request).await;

    let mut latency = String::new();
    if let Some(sent) = client_sent {
        let client_ms = (started_at - sent.with_timezone(&Utc)).num_milliseconds();
        latency.push_str(&format!("Client Latency: {client_ms}ms -> "));
    }
    latency.push_str(&format!(
        "Response Latency: {}ms",
        start.elapsed().as_millis()
    ));

    let route = match response.extensions().get::<MatchedRoute>() {
        Some(MatchedRoute(route)) => format!("{method} {route}"),
        None => "Unknown".to_owned(),
    };
    let mut message = format!(
        "Route: [{}] {} -> {}",
        response.status().as_u16(),
        route,
        latency
    );
    if matches!(
        response.status(),
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
    ) {
        if let Some(target) = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
        {
            message.push_str(&format!(" => {target}"));
        }
    }
    ctx.logger.info(message);
    response
}

/// Logs the incoming request before dispatch and replays the buffered body
/// to the inner service.
pub async fn log_request(
    State(ctx): State<SiteContext>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, SiteError> {
    let request_id = Uuid::new_v4();
    let (mut parts, body) = request.into_parts();

    let mut lines = vec![
        format!("Url: {} {}", parts.method, parts.uri),
        format!("Id: {request_id}"),
        format!("IP: {}", source_address(&parts.headers, &parts.extensions)),
    ];

    if !parts.headers.is_empty() {
        lines.push(format!(
            "Headers: {}",
            pretty(&headers_as_json(&parts.headers))
        ));
    }

    let bytes = axum::body::to_bytes(body, ctx.body_limit)
        .await
        .map_err(buffer_failure)?;
    if !bytes.is_empty() {
        if let Ok(mut parsed) = serde_json::from_slice::<Value>(&bytes) {
            redact_password(&mut parsed);
            lines.push(format!("Body: {}", pretty(&parsed)));
        }
    }

    ctx.logger.info(lines.join("\n"));

    parts.extensions.insert(RequestId(request_id));
    let request = Request::from_parts(parts, Body::from(bytes));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    Ok(response)
}

/// Types a body-buffering failure: an exceeded length limit is the
/// client's payload size, anything else is a transport fault.
fn buffer_failure(err: axum::Error) -> SiteError {
    if hit_length_limit(&err) {
        SiteError::new(ErrorKind::EntityTooLarge, "The request payload is too large.")
            .with_source(err)
    } else {
        SiteError::new(ErrorKind::Internal, "Unable to read the request body.").with_source(err)
    }
}

fn hit_length_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Originating address, preferring the proxy-supplied header.
fn source_address(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn parse_client_date(headers: &HeaderMap) -> Option<DateTime<FixedOffset>> {
    headers
        .get(header::DATE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
}

fn headers_as_json(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.entry(name.as_str().to_owned()) {
            serde_json::map::Entry::Occupied(mut entry) => {
                if let Value::String(existing) = entry.get_mut() {
                    existing.push_str(", ");
                    existing.push_str(&text);
                }
            }
            serde_json::map::Entry::Vacant(entry) => {
                entry.insert(Value::String(text));
            }
        }
    }
    Value::Object(map)
}

fn redact_password(body: &mut Value) {
    if let Some(password) = body.get_mut("password") {
        *password = Value::String(PASSWORD_MASK.to_owned());
    }
}

/// Render with four-space indentation, matching the server's log style.
fn pretty(value: &Value) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    let _ = value.serialize(&mut serializer);
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_redact_password_masks_top_level_field() {
        let mut body = json!({"user": "kay", "password": "hunter2"});
        redact_password(&mut body);
        assert_eq!(body, json!({"user": "kay", "password": "********"}));

        let mut no_password = json!({"user": "kay"});
        redact_password(&mut no_password);
        assert_eq!(no_password, json!({"user": "kay"}));

        let mut not_an_object = json!([1, 2, 3]);
        redact_password(&mut not_an_object);
        assert_eq!(not_an_object, json!([1, 2, 3]));
    }

    #[test]
    fn test_headers_as_json_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("accept", "text/html".parse().unwrap());
        headers.append("x-tag", "a".parse().unwrap());
        headers.append("x-tag", "b".parse().unwrap());

        let value = headers_as_json(&headers);
        assert_eq!(value["accept"], "text/html");
        assert_eq!(value["x-tag"], "a, b");
    }

    #[test]
    fn test_pretty_uses_four_space_indent() {
        let text = pretty(&json!({"outer": {"inner": 1}}));
        assert!(text.contains("\n    \"outer\""));
        assert!(text.contains("\n        \"inner\": 1"));
    }

    #[test]
    fn test_parse_client_date_reads_http_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::DATE,
            "Tue, 15 Nov 1994 08:12:31 GMT".parse().unwrap(),
        );
        let parsed = parse_client_date(&headers).expect("http date should parse");
        assert_eq!(parsed.with_timezone(&Utc).to_rfc3339(), "1994-11-15T08:12:31+00:00");

        headers.insert(header::DATE, "yesterday-ish".parse().unwrap());
        assert!(parse_client_date(&headers).is_none());
    }

    #[tokio::test]
    async fn test_buffer_failure_separates_limit_from_transport() {
        let over = axum::body::to_bytes(Body::from("0123456789"), 4)
            .await
            .unwrap_err();
        let failure = buffer_failure(over);
        assert_eq!(failure.kind(), ErrorKind::EntityTooLarge);
        assert_eq!(failure.message(), "The request payload is too large.");

        let dropped = axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        let failure = buffer_failure(dropped);
        assert_eq!(failure.kind(), ErrorKind::Internal);
        assert_eq!(failure.message(), "Unable to read the request body.");
        assert!(failure.inner().is_some());
    }

    #[test]
    fn test_source_address_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let mut extensions = axum::http::Extensions::new();
        extensions.insert(ConnectInfo::<SocketAddr>("10.0.0.9:4444".parse().unwrap()));

        assert_eq!(source_address(&headers, &extensions), "10.0.0.9");

        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        assert_eq!(source_address(&headers, &extensions), "203.0.113.7");

        assert_eq!(
            source_address(&HeaderMap::new(), &axum::http::Extensions::new()),
            "unknown"
        );
    }
}
