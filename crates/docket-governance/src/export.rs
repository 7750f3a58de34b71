//! The export orchestrator.
//!
//! A request is created in `processing` and moves exactly once to
//! `completed` or `failed`. Completion stores the artifact and appends
//! `DATA_EXPORTED` in one unit of work, so the request's size and item count
//! always match the entry's. A failure is persisted on the request and
//! returned as a normal outcome, except when the ledger itself could not be
//! written.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use docket_core::{
  audit::{AuditEvent, NewAuditEntry, entity},
  export::{ExportArtifact, ExportFormat, ExportRequest, ExportStatus},
  store::GovernanceStore,
};
use serde_json::json;
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::{
  Requester,
  audit::AuditLedger,
  config::GovernanceConfig,
  error::{Error, Result},
  lock::SubjectLocks,
};

/// Stored on a request whose snapshot outgrew `max_export_bytes`.
pub const TOO_LARGE_MESSAGE: &str = "export exceeds maximum artifact size";
/// Stored on a request that failed for an internal reason; details go to the
/// operational log only.
pub const STORE_FAILURE_MESSAGE: &str = "storage failure while assembling export";

pub struct ExportOrchestrator<S> {
  store:       Arc<S>,
  audit:       AuditLedger<S>,
  locks:       SubjectLocks,
  expiry:      Duration,
  audit_limit: usize,
  max_bytes:   u64,
}

impl<S: GovernanceStore> ExportOrchestrator<S> {
  pub fn new(
    store: Arc<S>,
    audit: AuditLedger<S>,
    locks: SubjectLocks,
    config: &GovernanceConfig,
  ) -> Self {
    Self {
      store,
      audit,
      locks,
      expiry: Duration::days(config.export_expiry_days),
      audit_limit: config.export_audit_history_limit,
      max_bytes: config.max_export_bytes,
    }
  }

  /// Create an export request for the subject and run it to a terminal
  /// state. Returns the request as persisted, `completed` or `failed`.
  pub async fn request_export(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    format: &str,
    requester: &Requester,
  ) -> Result<ExportRequest> {
    let format = ExportFormat::parse(format)
      .map_err(|_| Error::Validation(format!("unsupported export format {format:?}")))?;
    let _guard = self.locks.try_acquire(subject_id)?;

    if self
      .store
      .get_subject(subject_id, tenant_id)
      .await
      .map_err(Error::store)?
      .is_none()
    {
      return Err(Error::SubjectNotFound(subject_id));
    }

    // 1. The request row and DATA_EXPORT_REQUESTED.
    let now = Utc::now();
    let request =
      ExportRequest::processing(subject_id, tenant_id, format, now, now + self.expiry);
    let audit = requester.stamp(
      NewAuditEntry::new(tenant_id, AuditEvent::DataExportRequested, entity::USER, Some(subject_id))
        .metadata(json!({
          "requestId": request.request_id,
          "format": format,
          "expiresAt": request.expires_at,
        })),
    );
    let (request, entry) = self
      .store
      .create_export_request(request, audit)
      .await
      .map_err(Error::store)?;
    self.audit.forward(&entry);

    // 2–4. Gather, serialize, complete.
    let failure = match self.assemble(&request).await {
      Ok(artifact) => match self.complete(&request, artifact, requester).await {
        Ok(done) => return Ok(done),
        Err(e) => e,
      },
      Err(e) => e,
    };

    // 5. Persist the failure.
    let message = match &failure {
      Error::Validation(m) => m.clone(),
      _ => STORE_FAILURE_MESSAGE.to_owned(),
    };
    tracing::warn!(
      request_id = %request.request_id,
      %subject_id,
      %tenant_id,
      reason = failure.reason(),
      error = %failure,
      "export failed"
    );
    let failed = self
      .store
      .fail_export(request.request_id, message)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ExportNotFound(request.request_id))?;

    match failure {
      Error::AuditWrite(_) => Err(failure),
      _ => Ok(failed),
    }
  }

  async fn assemble(&self, request: &ExportRequest) -> Result<ExportArtifact> {
    let snapshot = self
      .store
      .collect_subject_data(request.subject_id, request.tenant_id, self.audit_limit)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SubjectNotFound(request.subject_id))?;

    let content =
      serde_json::to_vec_pretty(&snapshot).map_err(|e| Error::Store(Box::new(e)))?;
    let size_bytes = content.len() as u64;
    if size_bytes > self.max_bytes {
      return Err(Error::Validation(TOO_LARGE_MESSAGE.to_owned()));
    }

    Ok(ExportArtifact {
      location: ExportRequest::artifact_location_for(request.request_id, request.format),
      sha256: hex::encode(Sha256::digest(&content)),
      item_count: snapshot.item_count(),
      size_bytes,
      content,
    })
  }

  async fn complete(
    &self,
    request: &ExportRequest,
    artifact: ExportArtifact,
    requester: &Requester,
  ) -> Result<ExportRequest> {
    let audit = requester.stamp(
      NewAuditEntry::new(
        request.tenant_id,
        AuditEvent::DataExported,
        entity::USER,
        Some(request.subject_id),
      )
      .metadata(json!({
        "requestId": request.request_id,
        "dataSize": artifact.size_bytes,
        "itemsCount": artifact.item_count,
        "format": request.format,
        "sha256": artifact.sha256,
      })),
    );

    let (done, entry) = self
      .store
      .complete_export(request.request_id, Utc::now(), artifact, audit)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ExportNotFound(request.request_id))?;
    self.audit.forward(&entry);

    tracing::info!(
      request_id = %done.request_id,
      subject_id = %done.subject_id,
      tenant_id = %done.tenant_id,
      size_bytes = done.size_bytes,
      item_count = done.item_count,
      "export completed"
    );
    Ok(done)
  }

  /// Read a request in `tenant_id`. Expired requests stay readable.
  pub async fn get_export_request(
    &self,
    request_id: Uuid,
    tenant_id: Uuid,
  ) -> Result<ExportRequest> {
    self
      .store
      .get_export_request(request_id)
      .await
      .map_err(Error::store)?
      .filter(|r| r.tenant_id == tenant_id)
      .ok_or(Error::ExportNotFound(request_id))
  }

  /// The artifact of a completed, unexpired request. Every successful
  /// download is recorded as `SENSITIVE_DATA_ACCESSED`.
  pub async fn download_artifact(
    &self,
    request_id: Uuid,
    tenant_id: Uuid,
    now: DateTime<Utc>,
    requester: &Requester,
  ) -> Result<(ExportRequest, Vec<u8>)> {
    let request = self.get_export_request(request_id, tenant_id).await?;
    match request.status {
      ExportStatus::Pending | ExportStatus::Processing => {
        return Err(Error::ExportNotReady(request_id));
      }
      ExportStatus::Failed => return Err(Error::ExportUnavailable(request_id)),
      ExportStatus::Completed => {}
    }
    if request.is_expired_at(now) {
      return Err(Error::ExportExpired(request_id));
    }

    let content = self
      .store
      .get_export_artifact(request_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ExportUnavailable(request_id))?;

    self
      .audit
      .record(requester.stamp(
        NewAuditEntry::new(
          tenant_id,
          AuditEvent::SensitiveDataAccessed,
          entity::EXPORT_REQUEST,
          Some(request_id),
        )
        .metadata(json!({
          "requestId": request_id,
          "subjectId": request.subject_id,
          "dataSize": content.len(),
        })),
      ))
      .await?;

    Ok((request, content))
  }
}
