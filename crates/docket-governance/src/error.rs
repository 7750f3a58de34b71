//! Error taxonomy for governance operations.

use docket_core::store::AuditFailure;
use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The subject does not exist in the given tenant.
  #[error("subject {0} not found")]
  SubjectNotFound(Uuid),

  /// The consent record does not exist or is not owned by the given subject
  /// and tenant.
  #[error("consent record {0} not found")]
  ConsentNotFound(Uuid),

  #[error("export request {0} not found")]
  ExportNotFound(Uuid),

  /// The request is still readable but its artifact is past `expires_at`.
  #[error("export {0} has expired")]
  ExportExpired(Uuid),

  /// The request never produced an artifact, or it has been purged.
  #[error("export {0} has no artifact available")]
  ExportUnavailable(Uuid),

  #[error("export {0} is still processing")]
  ExportNotReady(Uuid),

  #[error("validation failed: {0}")]
  Validation(String),

  /// Another export, anonymization or deletion holds the subject.
  #[error("a compliance operation is already running for subject {0}")]
  Busy(Uuid),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// Appending to the audit ledger failed; the operation did not happen.
  #[error("audit write failed: {0}")]
  AuditWrite(#[source] BoxError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Classify a store error, keeping audit failures distinct.
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + AuditFailure + Send + Sync + 'static,
  {
    if e.is_audit_write() {
      Error::AuditWrite(Box::new(e))
    } else {
      Error::Store(Box::new(e))
    }
  }

  /// Stable machine-readable reason string.
  pub fn reason(&self) -> &'static str {
    match self {
      Error::SubjectNotFound(_) => "subject_not_found",
      Error::ConsentNotFound(_) => "consent_not_found",
      Error::ExportNotFound(_) => "export_not_found",
      Error::ExportExpired(_) => "export_expired",
      Error::ExportUnavailable(_) => "export_unavailable",
      Error::ExportNotReady(_) => "export_not_ready",
      Error::Validation(_) => "validation_failed",
      Error::Busy(_) => "subject_busy",
      Error::Store(_) => "persistence_failure",
      Error::AuditWrite(_) => "audit_write_failure",
    }
  }

  /// `true` for failures of the system rather than of the request.
  pub fn is_internal(&self) -> bool {
    matches!(self, Error::Store(_) | Error::AuditWrite(_))
  }
}
