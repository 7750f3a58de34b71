//! The anonymization engine.

use std::sync::Arc;

use chrono::Utc;
use docket_core::{
  audit::{AuditEvent, NewAuditEntry, entity},
  erasure::AnonymizationReport,
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

pub struct AnonymizationEngine<S> {
  store: Arc<S>,
  audit: AuditLedger<S>,
  locks: SubjectLocks,
}

impl<S: GovernanceStore> AnonymizationEngine<S> {
  pub fn new(store: Arc<S>, audit: AuditLedger<S>, locks: SubjectLocks) -> Self {
    Self { store, audit, locks }
  }

  /// Overwrite the subject's identifying data with sentinels, keeping every
  /// row. Safe to repeat; each call appends one `DATA_ANONYMIZED` entry.
  pub async fn anonymize_user(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    requester: &Requester,
  ) -> Result<AnonymizationReport> {
    let _guard = self.locks.try_acquire(subject_id)?;

    let requester = requester.clone();
    let audit = move |report: &AnonymizationReport| {
      requester.stamp(
        NewAuditEntry::new(tenant_id, AuditEvent::DataAnonymized, entity::USER, Some(subject_id))
          .metadata(json!({
            "anonymizedFields": report.anonymized_fields,
            "tablesAffected": report.tables_affected,
            "rowsAffected": report.rows_affected,
          })),
      )
    };

    let (report, entry) = self
      .store
      .anonymize_subject(subject_id, tenant_id, Utc::now(), audit)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SubjectNotFound(subject_id))?;
    self.audit.forward(&entry);

    tracing::info!(
      %subject_id,
      %tenant_id,
      tables = report.tables_affected.len(),
      fields = report.anonymized_fields.len(),
      "subject anonymized"
    );
    Ok(report)
  }
}
