//! Error type for `pies-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] pies_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sql error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  /// An upsert that neither found nor created a row. Indicates a schema or
  /// logic fault, never a recoverable condition.
  #[error("internal consistency error: upsert into {table} returned no row")]
  UpsertReturnedNothing { table: &'static str },
}

impl Error {
  /// Serialization-failure class: the store was busy or locked. Recovered
  /// by the transaction retry wrapper; every other error is fatal here.
  pub fn is_transient(&self) -> bool {
    fn busy(e: &rusqlite::Error) -> bool {
      matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
          if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
      )
    }
    match self {
      Error::Sqlite(e) => busy(e),
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => busy(e),
      _ => false,
    }
  }

  /// Map to the core taxonomy at the trait boundary: domain errors pass
  /// through, everything else surfaces as a store failure.
  pub fn surface(self) -> pies_core::Error {
    match self {
      Error::Core(e) => e,
      other => pies_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
