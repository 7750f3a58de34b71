//! The cascading deletion engine.
//!
//! Counts, then logs, then deletes, all in one unit of work. The
//! `DATA_DELETED` entry is written while the subject row still exists and
//! survives its removal.

use std::sync::Arc;

use docket_core::{
  audit::{AuditEvent, NewAuditEntry, entity},
  erasure::DeletionReport,
  store::GovernanceStore,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
  Requester,
  audit::AuditLedger,
  error::{Error, Result},
  lock::SubjectLocks,
};

pub struct DeletionEngine<S> {
  store: Arc<S>,
  audit: AuditLedger<S>,
  locks: SubjectLocks,
}

impl<S: GovernanceStore> DeletionEngine<S> {
  pub fn new(store: Arc<S>, audit: AuditLedger<S>, locks: SubjectLocks) -> Self {
    Self { store, audit, locks }
  }

  /// Permanently remove the subject and every dependent row.
  /// `total_deleted` is the sum of the per-table counts taken beforehand,
  /// plus one for the subject row.
  pub async fn delete_user_data(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    requester: &Requester,
  ) -> Result<DeletionReport> {
    let _guard = self.locks.try_acquire(subject_id)?;

    let requester = requester.clone();
    let audit = move |report: &DeletionReport| {
      requester.stamp(
        NewAuditEntry::new(tenant_id, AuditEvent::DataDeleted, entity::USER, Some(subject_id))
          .metadata(json!({
            "deletedRecords": report.deleted_records,
            "cascadeCount": report.total_deleted,
          })),
      )
    };

    let (report, entry) = self
      .store
      .delete_subject(subject_id, tenant_id, audit)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SubjectNotFound(subject_id))?;
    self.audit.forward(&entry);

    tracing::info!(
      %subject_id,
      %tenant_id,
      total_deleted = report.total_deleted,
      "subject deleted"
    );
    Ok(report)
  }
}
