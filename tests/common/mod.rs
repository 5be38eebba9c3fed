//! Shared fixtures for the integration suites.
//!
//! Builds a fully assembled site over a set of routes that can fail in
//! every supported way, with the logger writing into a recording sink so
//! tests can assert on emitted lines.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use sitekit::config::AppConfig;
use sitekit::error::{ErrorKind, SiteError, SiteResult};
use sitekit::http::envelope;
use sitekit::http::observe::RequestId;
use sitekit::http::{BasicRenderer, Site, SiteContext, ViewRenderer};
use sitekit::logging::{LineSink, Logger};
use sitekit::validation::{self, Findings};

static ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").unwrap());

/// Captures every emitted log line for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Everything logged so far, newline-joined.
    pub fn joined(&self) -> String {
        self.lines.lock().unwrap().join("\n")
    }
}

impl LineSink for RecordingSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// A site assembled over the failing routes, its router ready to drive
/// with `tower::ServiceExt::oneshot`.
pub fn build_site(config: AppConfig) -> (Router, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let logger = Logger::with_sink(Box::new(Arc::clone(&sink)), None);
    logger.set(config.logger_options());
    let renderer: Arc<dyn ViewRenderer> = Arc::new(BasicRenderer::new());
    let site = Site::new(config, logger, renderer, test_routes());
    (site.into_router(), sink)
}

pub fn production_site() -> (Router, Arc<RecordingSink>) {
    build_site(AppConfig::default())
}

#[allow(dead_code)]
pub fn development_site() -> (Router, Arc<RecordingSink>) {
    let mut config = AppConfig::default();
    config.env = "development".to_string();
    build_site(config)
}

/// Collect a response body as text.
pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn test_routes() -> Router<SiteContext> {
    Router::new()
        .route("/ok", get(ok))
        .route("/slow", get(slow))
        .route("/redirect", get(redirect))
        .route("/guarded", post(guarded))
        .route("/fail/classified", get(fail_classified))
        .route("/fail/internal", get(fail_internal))
        .route("/fail/{kind}", get(fail_with_kind))
}

/// Echoes the request id the logging layer attached.
async fn ok(Extension(id): Extension<RequestId>) -> Json<Value> {
    Json(envelope::ok(
        "All good.",
        Some(json!({ "request": id.0.to_string() })),
    ))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(envelope::ok("Too late.", None))
}

async fn redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/ok")]).into_response()
}

/// Fails with the kind named in the path.
async fn fail_with_kind(
    axum::extract::Path(kind): axum::extract::Path<String>,
) -> SiteResult<Json<Value>> {
    let kind = match kind.as_str() {
        "payment" => ErrorKind::PaymentRequired,
        "forbidden" => ErrorKind::NotAuthorized,
        "missing" => ErrorKind::NotFound,
        "timeout" => ErrorKind::Timeout,
        "invalid" => ErrorKind::InvalidArgument,
        "length" => ErrorKind::ContentLength,
        "large" => ErrorKind::EntityTooLarge,
        "dependency" => ErrorKind::DependencyFailed,
        "parameter" => ErrorKind::MissingParameter,
        _ => ErrorKind::Internal,
    };
    Err(SiteError::new(
        kind,
        format!("Forced {} failure.", kind.code_label()),
    ))
}

async fn fail_classified() -> SiteError {
    SiteError::new(ErrorKind::NotAuthorized, "Restricted record.")
        .with_data(json!({ "classification": "internal-only" }))
}

async fn fail_internal() -> SiteError {
    let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk offline");
    SiteError::new(ErrorKind::Internal, "Unable to load the record.").with_source(cause)
}

/// Requires a five-digit `zip` and, when present, a well-formed `email`.
async fn guarded(body: Bytes) -> SiteResult<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| {
        SiteError::new(ErrorKind::InvalidArgument, "The request body must be JSON.")
    })?;

    let checked = payload.clone();
    validation::parameters(move || async move {
        let mut findings = BTreeMap::new();
        let zip_ok = checked
            .get("zip")
            .is_some_and(|zip| validation::custom_pattern(zip, &ZIP));
        if !zip_ok {
            findings.insert("zip".to_string(), "Requires a valid zip code.".to_string());
        }
        if !validation::optional_field(checked.get("email"), validation::email) {
            findings.insert(
                "email".to_string(),
                "Requires a valid email address.".to_string(),
            );
        }
        Ok::<_, std::convert::Infallible>(Findings::from(findings))
    })
    .await?;

    Ok(Json(envelope::ok("Accepted.", Some(payload))))
}
