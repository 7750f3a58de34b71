//! The `GovernanceStore` trait: the persistence contract consumed by the
//! governance engines.
//!
//! The trait is implemented by storage backends (e.g. `docket-store-sqlite`).
//! Multi-step writes (consent changes, export transitions, anonymization,
//! deletion) are single methods so a backend can run each one, together with
//! its audit entry, as one atomic unit. Methods returning `Option` yield
//! `None` when the target row does not exist in the given tenant.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  audit::{ActivityBucket, AuditEntry, AuditQuery, NewAuditEntry},
  consent::ConsentRecord,
  dependent::{DependentCounts, NewDependent},
  erasure::{AnonymizationReport, DeletionReport},
  export::{ExportArtifact, ExportRequest, SubjectSnapshot},
  subject::{ClientProfile, NewClientProfile, NewSubject, Subject},
};

/// Lets callers tell a failed audit write apart from other storage failures.
pub trait AuditFailure {
  /// `true` if the error came from appending an audit entry; the enclosing
  /// unit of work was not applied.
  fn is_audit_write(&self) -> bool;
}

/// Abstraction over a Docket persistence backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait GovernanceStore: Send + Sync {
  type Error: std::error::Error + AuditFailure + Send + Sync + 'static;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Create and persist a new subject.
  fn create_subject(
    &self,
    input: NewSubject,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  /// Retrieve a subject scoped to a tenant.
  fn get_subject(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  /// Create or replace the linked client profile.
  fn set_client_profile(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    input: NewClientProfile,
  ) -> impl Future<Output = Result<Option<ClientProfile>, Self::Error>> + Send + '_;

  fn get_client_profile(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Option<ClientProfile>, Self::Error>> + Send + '_;

  /// Attach a dependent row to a subject and return its id.
  fn add_dependent(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    input: NewDependent,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  /// Count the subject's rows in every registered dependent table.
  fn count_dependents(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<DependentCounts, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Append one entry to the ledger.
  fn append_audit(
    &self,
    entry: NewAuditEntry,
  ) -> impl Future<Output = Result<AuditEntry, Self::Error>> + Send + '_;

  /// Entries matching `query`, most recent first.
  fn query_audit<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + 'a;

  /// Entries matching `query` counted per event type and UTC hour of day.
  /// `limit` and `offset` are ignored.
  fn audit_activity<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<ActivityBucket>, Self::Error>> + Send + 'a;

  // ── Consent ───────────────────────────────────────────────────────────

  /// Persist a new consent record together with its audit entry.
  fn insert_consent(
    &self,
    record: ConsentRecord,
    audit: NewAuditEntry,
  ) -> impl Future<Output = Result<(ConsentRecord, AuditEntry), Self::Error>>
  + Send
  + '_;

  fn get_consent(
    &self,
    consent_id: Uuid,
  ) -> impl Future<Output = Result<Option<ConsentRecord>, Self::Error>> + Send + '_;

  /// Mark a record revoked at `revoked_at` unless it already is, and append
  /// `audit` in the same unit of work. An already-revoked record keeps its
  /// original `revoked_at`.
  fn revoke_consent(
    &self,
    consent_id: Uuid,
    revoked_at: DateTime<Utc>,
    audit: NewAuditEntry,
  ) -> impl Future<Output = Result<Option<(ConsentRecord, AuditEntry)>, Self::Error>>
  + Send
  + '_;

  /// Consent history for a subject, most recent first.
  fn list_consents(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + '_;

  // ── Export ────────────────────────────────────────────────────────────

  /// Persist a `processing` request together with its audit entry.
  fn create_export_request(
    &self,
    request: ExportRequest,
    audit: NewAuditEntry,
  ) -> impl Future<Output = Result<(ExportRequest, AuditEntry), Self::Error>>
  + Send
  + '_;

  /// Gather everything held about a subject: identity plus every registered
  /// dependent table scoped by subject and tenant, and at most `audit_limit`
  /// of the subject's most recent audit entries.
  fn collect_subject_data(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    audit_limit: usize,
  ) -> impl Future<Output = Result<Option<SubjectSnapshot>, Self::Error>> + Send + '_;

  /// Transition a `processing` request to `completed`, store the artifact and
  /// append `audit`, atomically. `None` if no such processing request exists.
  fn complete_export(
    &self,
    request_id: Uuid,
    completed_at: DateTime<Utc>,
    artifact: ExportArtifact,
    audit: NewAuditEntry,
  ) -> impl Future<Output = Result<Option<(ExportRequest, AuditEntry)>, Self::Error>>
  + Send
  + '_;

  /// Transition a `processing` request to `failed` with `message`.
  fn fail_export(
    &self,
    request_id: Uuid,
    message: String,
  ) -> impl Future<Output = Result<Option<ExportRequest>, Self::Error>> + Send + '_;

  fn get_export_request(
    &self,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<ExportRequest>, Self::Error>> + Send + '_;

  /// Artifact bytes of a completed request; `None` if never produced or
  /// purged.
  fn get_export_artifact(
    &self,
    request_id: Uuid,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + '_;

  // ── Erasure ───────────────────────────────────────────────────────────

  /// Overwrite the subject's identifying data with sentinels across the
  /// subject row and every registered dependent table, then append the entry
  /// built by `audit` from the resulting report, as one unit of work.
  fn anonymize_subject<F>(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    at: DateTime<Utc>,
    audit: F,
  ) -> impl Future<
    Output = Result<Option<(AnonymizationReport, AuditEntry)>, Self::Error>,
  > + Send
  + '_
  where
    F: FnOnce(&AnonymizationReport) -> NewAuditEntry + Send + 'static;

  /// Count every dependent row, append the entry built by `audit` from those
  /// counts, then delete the subject row and let the cascade remove the rest,
  /// as one unit of work.
  fn delete_subject<F>(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    audit: F,
  ) -> impl Future<Output = Result<Option<(DeletionReport, AuditEntry)>, Self::Error>>
  + Send
  + '_
  where
    F: FnOnce(&DeletionReport) -> NewAuditEntry + Send + 'static;
}
