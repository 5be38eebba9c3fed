//! Error rendering dispatcher.
//!
//! # Data Flow
//!
//! 1. A handler or middleware returns a `SiteError`; its `IntoResponse`
//!    impl stashes the error in the response extensions as a placeholder
//! 2. The boundary layer removes the carried error and hands it to
//!    [`Responder::respond`] together with the request headers
//! 3. `respond` logs the failure once, negotiates a representation, and
//!    renders the body with the status from the kind table
//!
//! # Design Decisions
//!
//! - One kind→(status, label) table drives every representation, so JSON,
//!   text, and HTML can never disagree on the status of a given kind
//! - Internal failures log the full causal chain at error severity; every
//!   other kind is an expected client-facing condition and logs its display
//!   line at debug
//! - A client accepting none of the three representations gets the table
//!   status with an empty body

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Json, Response};
use serde_json::{json, Value};

use crate::error::{ErrorKind, SiteError, OPAQUE_MESSAGE};
use crate::http::envelope;
use crate::http::negotiate::{negotiate, Representation};
use crate::http::observe::MatchedRoute;
use crate::http::render::{self, ViewRenderer};
use crate::http::server::SiteContext;
use crate::logging::Logger;

/// Extension stashed on placeholder responses until the boundary layer
/// renders the real representation.
#[derive(Clone)]
pub(crate) struct CarriedError(pub(crate) Arc<SiteError>);

impl IntoResponse for SiteError {
    /// Placeholder carrying the error outward. If the boundary layer is not
    /// installed the client still receives a bare 500.
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(CarriedError(Arc::new(self)));
        response
    }
}

/// Middleware that turns carried errors into negotiated responses.
///
/// Sits outside the request logger and timeout stack so that everything
/// they produce flows through the same dispatcher.
pub async fn error_boundary(
    State(ctx): State<SiteContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let mut response = next.run(request).await;
    let Some(CarriedError(err)) = response.extensions_mut().remove::<CarriedError>() else {
        return response;
    };
    let mut rendered = ctx.responder.respond(&err, &headers);
    // Keep the matched-route label visible to the completion tracker.
    if let Some(route) = response.extensions().get::<MatchedRoute>() {
        rendered.extensions_mut().insert(route.clone());
    }
    rendered
}

/// The dispatcher: logs a typed error and renders its one negotiated
/// representation.
#[derive(Clone)]
pub struct Responder {
    logger: Logger,
    renderer: Arc<dyn ViewRenderer>,
    show_raw_errors: bool,
}

impl Responder {
    /// `show_raw_errors` should be true only outside production; it gates
    /// raw Internal messages and stacks in HTML output.
    pub fn new(logger: Logger, renderer: Arc<dyn ViewRenderer>, show_raw_errors: bool) -> Responder {
        Responder {
            logger,
            renderer,
            show_raw_errors,
        }
    }

    /// Render `err` for a client described by `headers`. Logs exactly once.
    pub fn respond(&self, err: &SiteError, headers: &HeaderMap) -> Response {
        if err.kind() == ErrorKind::Internal {
            self.logger.log_error(err);
        } else {
            self.logger.debug(err.to_string());
        }

        match negotiate(headers) {
            Some(Representation::Html) => self.render_html(err),
            Some(Representation::Json) => self.render_json(err),
            Some(Representation::Text) => self.render_text(err),
            None => (err.kind().status(), Body::empty()).into_response(),
        }
    }

    fn render_json(&self, err: &SiteError) -> Response {
        let body = envelope::error(err.kind().code_label(), err.message());
        (err.kind().status(), Json(body)).into_response()
    }

    fn render_text(&self, err: &SiteError) -> Response {
        let mut body = format!("{}\n{}", err.kind().code_label(), err.message());
        let classification = err
            .data()
            .and_then(|data| data.get("classification"))
            .and_then(Value::as_str);
        if let Some(classification) = classification {
            body.push('\n');
            body.push_str(classification);
        }
        (err.kind().status(), body).into_response()
    }

    fn render_html(&self, err: &SiteError) -> Response {
        let kind = err.kind();
        let status = kind.status();
        let (template, locals) = match kind {
            ErrorKind::NotAuthorized => ("403", json!({})),
            ErrorKind::NotFound => ("404", json!({})),
            _ => {
                let message = if kind == ErrorKind::Internal && !self.show_raw_errors {
                    OPAQUE_MESSAGE
                } else {
                    err.message()
                };
                let mut locals = json!({
                    "code": status.as_u16(),
                    "title": kind.title(),
                    "message": message,
                    "showerr": self.show_raw_errors,
                });
                if self.show_raw_errors {
                    locals["err"] = Value::String(err.full_stack());
                }
                ("error", locals)
            }
        };

        let body = match self.renderer.render(template, &locals) {
            Ok(body) => body,
            Err(render_err) => {
                self.logger
                    .warning(format!("View '{template}' failed to render: {render_err}"));
                render::fallback_page(status.as_u16(), kind.title())
            }
        };
        (status, Html(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use axum::http::header;

    use crate::http::render::BasicRenderer;
    use crate::logging::{LineSink, Logger, LoggerOptions, Severity};

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl LineSink for RecordingSink {
        fn write_line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_owned());
        }
    }

    fn responder(show_raw_errors: bool) -> (Responder, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let logger = Logger::with_sink(Box::new(Arc::clone(&sink)), None);
        logger.set(LoggerOptions {
            level: Some(Severity::Debug),
            ..LoggerOptions::default()
        });
        let responder = Responder::new(logger, Arc::new(BasicRenderer::new()), show_raw_errors);
        (responder, sink)
    }

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, value.parse().unwrap());
        headers
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_json_representation() {
        let (responder, _) = responder(false);
        let err = SiteError::new(ErrorKind::InvalidArgument, "bad zip");
        let response = responder.respond(&err, &accept("application/json"));

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            body,
            json!({"code": "InvalidArgumentError", "message": "bad zip"})
        );
    }

    #[tokio::test]
    async fn test_text_representation_with_classification() {
        let (responder, _) = responder(false);
        let err = SiteError::new(ErrorKind::NotAuthorized, "restricted")
            .with_data(json!({"classification": "internal-only"}));
        let response = responder.respond(&err, &accept("text/plain"));

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_text(response).await,
            "NotAuthorizedError\nrestricted\ninternal-only"
        );
    }

    #[tokio::test]
    async fn test_html_dedicated_pages_bypass_generic_template() {
        let (responder, _) = responder(false);

        let not_found = SiteError::new(ErrorKind::NotFound, "oops");
        let body = body_text(responder.respond(&not_found, &accept("text/html"))).await;
        assert!(body.contains("The page you are looking for does not exist."));
        assert!(!body.contains("oops"));

        let forbidden = SiteError::new(ErrorKind::NotAuthorized, "keep out");
        let body = body_text(responder.respond(&forbidden, &accept("text/html"))).await;
        assert!(body.contains("You are not authorized to view this page."));
    }

    #[tokio::test]
    async fn test_html_internal_message_is_canned_in_production() {
        let (responder, _) = responder(false);
        let err = SiteError::new(ErrorKind::Internal, "db password wrong");
        let response = responder.respond(&err, &accept("text/html"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert!(!body.contains("db password wrong"));
        assert!(body.contains("An unknown error occurred."));
    }

    #[tokio::test]
    async fn test_html_shows_raw_error_outside_production() {
        let (responder, _) = responder(true);
        let err = SiteError::new(ErrorKind::Internal, "db password wrong");
        let body = body_text(responder.respond(&err, &accept("text/html"))).await;

        assert!(body.contains("db password wrong"));
        assert!(body.contains("<pre>"));
    }

    #[tokio::test]
    async fn test_html_non_internal_always_shows_message() {
        let (responder, _) = responder(false);
        let err = SiteError::new(ErrorKind::Timeout, "upstream too slow");
        let body = body_text(responder.respond(&err, &accept("text/html"))).await;

        assert!(body.contains("upstream too slow"));
    }

    #[tokio::test]
    async fn test_unacceptable_client_gets_empty_body_with_table_status() {
        let (responder, _) = responder(false);
        let err = SiteError::new(ErrorKind::PaymentRequired, "pay up");
        let response = responder.respond(&err, &accept("image/png"));

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_log_severity_split() {
        let (responder, sink) = responder(false);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk offline");
        let internal = SiteError::new(ErrorKind::Internal, "query failed").with_source(io);
        responder.respond(&internal, &accept("application/json"));

        let expected = SiteError::new(ErrorKind::InvalidArgument, "bad zip");
        responder.respond(&expected, &accept("application/json"));

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" E | SiteError[Internal]: query failed"));
        assert!(lines[0].contains("disk offline"));
        assert!(lines[1].contains(" D | SiteError[InvalidArgument]: bad zip"));
        assert!(!lines[1].contains('\n'));
    }

    #[tokio::test]
    async fn test_carrier_round_trip() {
        let err = SiteError::new(ErrorKind::DependencyFailed, "upstream down");
        let mut response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let carried = response
            .extensions_mut()
            .remove::<CarriedError>()
            .expect("carried error");
        assert_eq!(carried.0.kind(), ErrorKind::DependencyFailed);
        assert_eq!(carried.0.message(), "upstream down");
    }
}
