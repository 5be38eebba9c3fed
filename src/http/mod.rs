//! HTTP pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! incoming request
//!     → observe.rs (completion tracker; request id, log, buffered body)
//!     → respond.rs error boundary (carried SiteErrors → one rendered
//!       representation, negotiated via negotiate.rs)
//!     → timeout stack (elapsed → Timeout kind)
//!     → caller routes / static assets / typed 404 fallback
//! ```
//!
//! `server.rs` assembles the stack; `envelope.rs` and `render.rs` hold the
//! wire and view formats the handlers and dispatcher share.

pub mod envelope;
pub mod negotiate;
pub mod observe;
pub mod render;
pub mod respond;
pub mod server;

pub use negotiate::{negotiate, Representation};
pub use render::{BasicRenderer, RenderError, ViewRenderer};
pub use respond::{error_boundary, Responder};
pub use server::{Site, SiteContext};
