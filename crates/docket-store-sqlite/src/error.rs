//! Error type for `docket-store-sqlite`.

use docket_core::store::AuditFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] docket_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  /// Appending to `audit_logs` failed; the enclosing transaction was rolled
  /// back.
  #[error("audit write failed: {0}")]
  AuditWrite(#[source] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("value out of range for column {0}")]
  OutOfRange(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Marker carried through [`tokio_rusqlite::Error::Other`] so an audit insert
/// failure inside a connection closure surfaces as [`Error::AuditWrite`].
#[derive(Debug, Error)]
#[error("audit insert failed: {0}")]
pub(crate) struct AuditInsert(#[source] pub rusqlite::Error);

impl From<AuditInsert> for tokio_rusqlite::Error {
  fn from(e: AuditInsert) -> Self { tokio_rusqlite::Error::Other(Box::new(e)) }
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(e: tokio_rusqlite::Error) -> Self {
    match e {
      tokio_rusqlite::Error::Other(inner) => match inner.downcast::<AuditInsert>() {
        Ok(audit) => {
          let AuditInsert(source) = *audit;
          Error::AuditWrite(source)
        }
        Err(other) => Error::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Error::Database(other),
    }
  }
}

impl AuditFailure for Error {
  fn is_audit_write(&self) -> bool { matches!(self, Error::AuditWrite(_)) }
}
