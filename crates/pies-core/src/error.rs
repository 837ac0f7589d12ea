//! Error taxonomy for the PIES record service.
//!
//! Every error surfaced by the core carries enough structure (status code,
//! title, detail) for an HTTP boundary to render a problem response without
//! the core knowing anything about HTTP.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A duplicate transaction id was submitted, or an identifier resolved to
  /// more than one system record.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("not found: {0}")]
  NotFound(String),

  /// Semantic integrity failure, distinct from structural schema validation:
  /// an implausible transaction id, an unknown coding, or an event interval
  /// ending before it starts.
  #[error("validation failure: {0}")]
  Validation(String),

  /// A persistence-layer failure, surfaced either after the retry budget for
  /// transient faults is exhausted or immediately for fatal faults.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// The HTTP-ish status code a problem response for this error carries.
  pub fn status(&self) -> u16 {
    match self {
      Error::Conflict(_) => 409,
      Error::NotFound(_) => 404,
      Error::Validation(_) => 422,
      Error::Store(_) => 500,
    }
  }

  /// Short human-readable summary, stable per error kind.
  pub fn title(&self) -> &'static str {
    match self {
      Error::Conflict(_) => "Conflict",
      Error::NotFound(_) => "Not Found",
      Error::Validation(_) => "Validation Failure",
      Error::Store(_) => "Internal Server Error",
    }
  }

  /// Detail message for the problem response body.
  pub fn detail(&self) -> String {
    match self {
      Error::Conflict(m) | Error::NotFound(m) | Error::Validation(m) => {
        m.clone()
      }
      Error::Store(e) => e.to_string(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
