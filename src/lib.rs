//! Typed site errors, content-negotiated error rendering, leveled logging,
//! and validation combinators around an axum service.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod validation;

pub use config::AppConfig;
pub use error::{ErrorKind, SiteError, SiteResult};
pub use http::{Site, SiteContext};
pub use logging::Logger;
