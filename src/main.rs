//! Service entry point.
//!
//! Wires configuration, the logger with its optional syslog mirror, the
//! built-in view renderer, and a small route surface that exercises the
//! error pipeline end to end.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};

use sitekit::config::AppConfig;
use sitekit::error::{ErrorKind, SiteError, SiteResult};
use sitekit::http::envelope;
use sitekit::http::{BasicRenderer, Site, SiteContext, ViewRenderer};
use sitekit::logging::{FacilitySink, Logger, SyslogSink};
use sitekit::validation::{self, Findings};

#[derive(Parser)]
#[command(name = "sitekit", about = "HTTP site service with typed error responses")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            // The logger is configured from this file, so failures here can
            // only go to stderr.
            eprintln!("sitekit: {err}");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.set_port(port);
    }

    let facility_sink =
        SyslogSink::connect().map(|sink| Box::new(sink) as Box<dyn FacilitySink>);
    let logger = Logger::new(facility_sink);
    logger.set(config.logger_options());

    let panic_logger = logger.clone();
    std::panic::set_hook(Box::new(move |info| {
        panic_logger.alert(format!("Unhandled panic: {info}"));
        std::process::exit(1);
    }));

    let renderer: Arc<dyn ViewRenderer> = Arc::new(BasicRenderer::new());
    let site = Site::new(config, logger.clone(), renderer, routes());

    if let Err(err) = site.serve().await {
        logger.log_error(&err);
        std::process::exit(1);
    }
}

fn routes() -> Router<SiteContext> {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/coordinates", post(check_coordinates))
        .route("/api/premium", get(premium_lookup))
}

/// Landing page, rendered through the configured view renderer.
async fn index(State(ctx): State<SiteContext>) -> SiteResult<Html<String>> {
    let page = ctx
        .renderer
        .render("index", &json!({ "title": "sitekit" }))
        .map_err(|err| {
            SiteError::new(ErrorKind::Internal, "Unable to render the landing page.")
                .with_source(err)
        })?;
    Ok(Html(page))
}

async fn healthz() -> Json<Value> {
    Json(envelope::ok("Service is healthy.", None))
}

/// Accepts a JSON body carrying a coordinate pair and an optional text label.
async fn check_coordinates(body: Bytes) -> SiteResult<Json<Value>> {
    let payload: Value = serde_json::from_slice(&body).map_err(|_| {
        SiteError::new(ErrorKind::InvalidArgument, "The request body must be JSON.")
    })?;

    let checked = payload.clone();
    validation::parameters(move || async move {
        if !validation::plain_object(&checked) {
            return Ok(Findings::from("Requires a JSON object body."));
        }

        let mut findings = BTreeMap::new();
        if !validation::coordinate(&checked) {
            findings.insert(
                "coordinate".to_string(),
                "Requires lat and lon to form a usable coordinate.".to_string(),
            );
        }
        if !validation::optional_field(checked.get("label"), Value::is_string) {
            findings.insert(
                "label".to_string(),
                "Requires label to be text when present.".to_string(),
            );
        }
        Ok::<_, std::convert::Infallible>(Findings::from(findings))
    })
    .await?;

    Ok(Json(envelope::ok("Coordinate accepted.", Some(payload))))
}

/// Premium lookups are stubbed out behind the paywall until billing lands.
async fn premium_lookup() -> SiteError {
    SiteError::new(
        ErrorKind::PaymentRequired,
        "A subscription is required for premium lookups.",
    )
}
