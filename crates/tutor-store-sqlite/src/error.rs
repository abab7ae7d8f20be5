//! Error type for `tutor-store-sqlite`.

use thiserror::Error;
use tutor_core::{ErrorKind, error::StoreError};

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tutor_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column holds a value the domain types cannot represent.
  #[error("corrupt row: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl StoreError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Database(e) => constraint_kind(e),
      _ => ErrorKind::Internal,
    }
  }
}

/// Classify SQLite constraint failures that slipped past the pre-checks.
fn constraint_kind(err: &tokio_rusqlite::Error) -> ErrorKind {
  use rusqlite::ffi;

  if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) = err {
    match e.extended_code {
      ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
        return ErrorKind::Conflict;
      }
      ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return ErrorKind::NotFound,
      ffi::SQLITE_CONSTRAINT_CHECK => return ErrorKind::Validation,
      _ => {}
    }
  }
  ErrorKind::Internal
}
