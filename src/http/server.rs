//! Site assembly.
//!
//! # Responsibilities
//! - Wrap caller-supplied routes in the observability and error stack
//! - Serve static assets for unmatched paths, with misses flowing through
//!   the error dispatcher as `NotFound`
//! - Map middleware failures (timeouts included) into the error taxonomy
//! - Bind, log the startup banner, and shut down gracefully on ctrl-c

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::middleware;
use axum::BoxError;
use axum::Router;
use tokio::net::TcpListener;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::CompressionLevel;

use crate::config::AppConfig;
use crate::error::{ErrorKind, SiteError, SiteResult};
use crate::http::observe;
use crate::http::render::ViewRenderer;
use crate::http::respond::{self, Responder};
use crate::logging::Logger;

/// Shared state threaded through the middleware stack and handlers.
#[derive(Clone)]
pub struct SiteContext {
    pub logger: Logger,
    pub responder: Responder,
    pub renderer: Arc<dyn ViewRenderer>,
    pub body_limit: usize,
}

/// The assembled service: caller routes wrapped in compression, tracking,
/// the error boundary, request logging, and the timeout stack.
pub struct Site {
    context: SiteContext,
    router: Router,
    bind_address: String,
}

impl Site {
    pub fn new(
        config: AppConfig,
        logger: Logger,
        renderer: Arc<dyn ViewRenderer>,
        routes: Router<SiteContext>,
    ) -> Site {
        let responder = Responder::new(
            logger.clone(),
            Arc::clone(&renderer),
            config.show_raw_errors(),
        );
        let context = SiteContext {
            logger,
            responder,
            renderer,
            body_limit: config.server.body_limit_bytes,
        };
        let router = build_router(&config, context.clone(), routes);
        Site {
            context,
            router,
            bind_address: config.server.bind_address,
        }
    }

    /// The assembled router. Integration tests drive this directly.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Bind and serve until ctrl-c.
    pub async fn serve(self) -> SiteResult<()> {
        let listener = TcpListener::bind(self.bind_address.as_str())
            .await
            .map_err(|err| {
                SiteError::new(
                    ErrorKind::Internal,
                    format!("Unable to bind {}", self.bind_address),
                )
                .with_source(err)
            })?;
        let addr = listener.local_addr().map_err(SiteError::wrap)?;

        let logger = self.context.logger.clone();
        logger.info(format!("Server started on {addr}"));
        logger.info("-".repeat(51));

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(logger.clone()))
        .await
        .map_err(SiteError::wrap)?;

        logger.info("Server stopped");
        Ok(())
    }
}

/// Stack order, outermost first: compression, completion tracker, error
/// boundary, request logger, then timeout. Everything the inner layers
/// produce flows through the boundary's dispatcher.
fn build_router(config: &AppConfig, context: SiteContext, routes: Router<SiteContext>) -> Router {
    let routes = routes
        .route_layer(middleware::from_fn(observe::expose_matched_path))
        // Buffering extractors default to a 2 MiB cap of their own; the
        // configured limit is the one that governs.
        .layer(DefaultBodyLimit::max(context.body_limit))
        .with_state(context.clone());

    let app = match &config.server.assets_dir {
        Some(dir) => routes.fallback_service(
            ServeDir::new(dir).not_found_service(handle_not_found.into_service()),
        ),
        None => routes.fallback(handle_not_found),
    };

    app.layer(
        ServiceBuilder::new()
            .layer(CompressionLayer::new().quality(CompressionLevel::Best))
            .layer(middleware::from_fn_with_state(context.clone(), observe::track))
            .layer(middleware::from_fn_with_state(
                context.clone(),
                respond::error_boundary,
            ))
            .layer(middleware::from_fn_with_state(context, observe::log_request))
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            ))),
    )
}

/// Unmatched paths become typed 404s so they render like every other error.
async fn handle_not_found() -> SiteError {
    SiteError::new(ErrorKind::NotFound, "The requested resource was not found.")
}

/// Middleware failures enter the taxonomy here: an elapsed timeout becomes
/// the Timeout kind, anything else is normalized.
async fn handle_middleware_error(err: BoxError) -> SiteError {
    if err.is::<tower::timeout::error::Elapsed>() {
        SiteError::new(ErrorKind::Timeout, "The request did not complete in time.")
    } else {
        SiteError::normalize(err)
    }
}

async fn shutdown_signal(logger: Logger) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    logger.info("Shutdown signal received");
}
