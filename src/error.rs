//! Site error taxonomy.
//!
//! # Responsibilities
//! - Define the closed set of failure kinds and their HTTP status / code label bindings
//! - Carry failures as immutable values with an optional causal chain
//! - Render the full causal chain for operational logs
//!
//! # Design Decisions
//! - The kind set is a plain enum; exhaustive matches replace the sealed
//!   runtime tables the service grew out of
//! - Foreign errors enter the taxonomy only through [`SiteError::wrap`] or
//!   [`SiteError::normalize`], so everything past the boundary is typed

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Convenience alias for fallible operations inside the crate.
pub type SiteResult<T> = Result<T, SiteError>;

/// Message shown in place of raw Internal failures, and used when a foreign
/// error is collapsed into the taxonomy.
pub(crate) const OPAQUE_MESSAGE: &str = "An unknown error occurred.";

/// Failure categories recognized across every response representation.
///
/// Each member is bound to exactly one HTTP status and one machine code
/// label; the bindings are the single source of truth for the rendering
/// dispatcher, so JSON, text, and HTML responses can never disagree on the
/// status of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Payment is required before the operation can proceed.
    PaymentRequired,
    /// The caller may not perform the operation.
    NotAuthorized,
    /// The addressed resource does not exist.
    NotFound,
    /// The operation did not complete in time.
    Timeout,
    /// The caller supplied input that failed validation.
    InvalidArgument,
    /// A usable content length was required and missing.
    ContentLength,
    /// The request payload exceeds the accepted size.
    EntityTooLarge,
    /// A downstream dependency failed.
    DependencyFailed,
    /// A required parameter was absent.
    MissingParameter,
    /// Unexpected failure; the catch-all for anything unrecognized.
    Internal,
}

impl ErrorKind {
    /// Every kind, in status-code order.
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::PaymentRequired,
        ErrorKind::NotAuthorized,
        ErrorKind::NotFound,
        ErrorKind::Timeout,
        ErrorKind::InvalidArgument,
        ErrorKind::ContentLength,
        ErrorKind::EntityTooLarge,
        ErrorKind::DependencyFailed,
        ErrorKind::MissingParameter,
        ErrorKind::Internal,
    ];

    /// The HTTP status this kind maps to in every representation.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            ErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::InvalidArgument => StatusCode::CONFLICT,
            ErrorKind::ContentLength => StatusCode::LENGTH_REQUIRED,
            ErrorKind::EntityTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::DependencyFailed => StatusCode::FAILED_DEPENDENCY,
            // 444 has no named constant in the http crate.
            ErrorKind::MissingParameter => {
                StatusCode::from_u16(444).expect("444 is within the valid status range")
            }
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine code label used in the JSON and plain-text envelopes.
    pub fn code_label(self) -> &'static str {
        match self {
            ErrorKind::PaymentRequired => "PaymentRequiredError",
            ErrorKind::NotAuthorized => "NotAuthorizedError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::InvalidArgument => "InvalidArgumentError",
            ErrorKind::ContentLength => "ContentLengthError",
            ErrorKind::EntityTooLarge => "EntityTooLargeError",
            ErrorKind::DependencyFailed => "DependencyFailedError",
            ErrorKind::MissingParameter => "MissingParameterError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Bare kind name, as printed inside `SiteError[...]`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::PaymentRequired => "PaymentRequired",
            ErrorKind::NotAuthorized => "NotAuthorized",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::ContentLength => "ContentLength",
            ErrorKind::EntityTooLarge => "EntityTooLarge",
            ErrorKind::DependencyFailed => "DependencyFailed",
            ErrorKind::MissingParameter => "MissingParameter",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Human title for HTML rendering. 444 has no canonical reason phrase,
    /// so the code label stands in.
    pub fn title(self) -> &'static str {
        self.status().canonical_reason().unwrap_or_else(|| self.code_label())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable error value carrying a kind, a message, optional structured
/// data, and an optional causal predecessor.
///
/// The construction trace is captured before any chaining, so every link in
/// a chain owns the trace of its own construction site. Fields are private;
/// nothing can be attached after the value is in flight.
#[derive(Debug, Error)]
#[error("SiteError[{kind}]: {message}")]
pub struct SiteError {
    message: String,
    kind: ErrorKind,
    data: Option<Value>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
    trace: String,
}

impl SiteError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        SiteError {
            message: message.into(),
            kind,
            data: None,
            source: None,
            trace: capture_trace(),
        }
    }

    /// Wrap a foreign error as the cause of an Internal failure. This is the
    /// normalization applied to anything unrecognized reaching the boundary.
    pub fn wrap(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        SiteError::new(ErrorKind::Internal, OPAQUE_MESSAGE).with_source(source)
    }

    /// Collapse a boxed error into the taxonomy: an already-typed error
    /// passes through unchanged, anything else becomes the cause of an
    /// Internal failure.
    pub fn normalize(err: Box<dyn StdError + Send + Sync>) -> Self {
        match err.downcast::<SiteError>() {
            Ok(site) => *site,
            Err(other) => SiteError::wrap(other),
        }
    }

    /// Attach a structured payload. Part of construction; the value is fixed
    /// once the error is in flight.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach the causal predecessor. The chain stays acyclic because a
    /// predecessor is always constructed first and moved in whole.
    pub fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// The causal predecessor, exactly as supplied at construction.
    pub fn inner(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }

    /// This error's own block: the display line followed by the trace
    /// captured at its construction site.
    fn stack(&self) -> String {
        format!("{}\n{}", self, self.trace)
    }

    /// Render the whole causal chain, outermost first. Each link contributes
    /// one block indented 4 spaces per level of depth; blocks are joined by
    /// a single blank line. Foreign links contribute their display line and
    /// the walk continues through their own `source()` chain.
    pub fn full_stack(&self) -> String {
        let mut blocks = vec![self.stack()];
        let mut depth = 1;
        let mut cursor = self.inner();
        while let Some(err) = cursor {
            let block = match err.downcast_ref::<SiteError>() {
                Some(site) => site.stack(),
                None => err.to_string(),
            };
            blocks.push(indent_block(&block, depth));
            depth += 1;
            cursor = err.source();
        }
        blocks.join("\n\n")
    }
}

fn capture_trace() -> String {
    Backtrace::capture().to_string().trim_end().to_string()
}

fn indent_block(text: &str, depth: usize) -> String {
    let indent = "    ".repeat(depth);
    text.lines()
        .map(|line| format!("{indent}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
