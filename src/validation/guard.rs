//! The asynchronous validation guard.
//!
//! Handlers describe what is wrong with a request; the guard turns that into
//! the error taxonomy. Running the supplied closure inside the guard gives
//! one boundary where construction failures and awaited failures land the
//! same way.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error as StdError;
use std::future::Future;

use serde_json::Value;

use crate::error::{ErrorKind, SiteError, SiteResult};

/// What a validation closure found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Findings {
    /// Nothing wrong.
    #[default]
    Clean,
    /// A single free-form complaint.
    Message(String),
    /// Field-keyed complaints; the map keeps rendering deterministic.
    Fields(BTreeMap<String, String>),
}

impl Findings {
    pub fn is_clean(&self) -> bool {
        match self {
            Findings::Clean => true,
            Findings::Message(message) => message.is_empty(),
            Findings::Fields(fields) => fields.is_empty(),
        }
    }
}

impl From<String> for Findings {
    fn from(message: String) -> Self {
        Findings::Message(message)
    }
}

impl From<&str> for Findings {
    fn from(message: &str) -> Self {
        Findings::Message(message.to_string())
    }
}

impl From<BTreeMap<String, String>> for Findings {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Findings::Fields(fields)
    }
}

/// Run a validation function and convert its outcome into the taxonomy.
///
/// - the function fails → `Internal`, with the failure as the cause;
/// - non-empty field findings → `InvalidArgument`, message built by
///   [`errors_to_string`], the fields riding along as error data;
/// - a non-empty message finding → `InvalidArgument` with that message;
/// - clean (or empty) findings → `Ok(())`.
pub async fn parameters<F, Fut, E>(func: F) -> SiteResult<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Findings, E>>,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    let findings = match func().await {
        Ok(findings) => findings,
        Err(err) => {
            return Err(
                SiteError::new(ErrorKind::Internal, "Unable to validate parameters")
                    .with_source(err),
            );
        }
    };

    if findings.is_clean() {
        return Ok(());
    }

    match findings {
        Findings::Message(message) => Err(SiteError::new(ErrorKind::InvalidArgument, message)),
        Findings::Fields(fields) => {
            let message = errors_to_string(&fields);
            let data = Value::Object(
                fields
                    .into_iter()
                    .map(|(field, complaint)| (field, Value::String(complaint)))
                    .collect(),
            );
            Err(SiteError::new(ErrorKind::InvalidArgument, message).with_data(data))
        }
        Findings::Clean => Ok(()),
    }
}

/// Deduplicate complaint messages, sort them lexicographically, and join
/// with newlines. Gives aggregate failures one stable display form.
pub fn errors_to_string(errors: &BTreeMap<String, String>) -> String {
    let unique: BTreeSet<&str> = errors.values().map(String::as_str).collect();
    unique.into_iter().collect::<Vec<_>>().join("\n")
}
