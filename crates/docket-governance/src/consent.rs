//! The consent ledger.
//!
//! Every grant creates a new record; a record is revoked at most once, and a
//! repeated revocation succeeds without changing it. Each call appends its
//! own audit entry.

use std::sync::Arc;

use chrono::Utc;
use docket_core::{
  audit::{AuditEvent, NewAuditEntry, entity},
  consent::ConsentRecord,
  store::GovernanceStore,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
  Requester,
  audit::AuditLedger,
  error::{Error, Result},
};

/// Longest accepted purpose string.
pub const MAX_PURPOSE_LEN: usize = 100;

pub struct ConsentLedger<S> {
  store: Arc<S>,
  audit: AuditLedger<S>,
}

impl<S: GovernanceStore> ConsentLedger<S> {
  pub fn new(store: Arc<S>, audit: AuditLedger<S>) -> Self { Self { store, audit } }

  /// Record a new grant of consent for `purpose`.
  pub async fn grant_consent(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    purpose: &str,
    consent_method: Option<&str>,
    requester: &Requester,
  ) -> Result<ConsentRecord> {
    let purpose = purpose.trim();
    if purpose.is_empty() || purpose.len() > MAX_PURPOSE_LEN {
      return Err(Error::Validation(format!(
        "purpose must be between 1 and {MAX_PURPOSE_LEN} characters"
      )));
    }
    if self
      .store
      .get_subject(subject_id, tenant_id)
      .await
      .map_err(Error::store)?
      .is_none()
    {
      return Err(Error::SubjectNotFound(subject_id));
    }

    let mut record = ConsentRecord::grant(subject_id, tenant_id, purpose)
      .with_capture(requester.ip_address.clone(), requester.user_agent.clone());
    if let Some(method) = consent_method.map(str::trim).filter(|m| !m.is_empty()) {
      record = record.with_method(method);
    }

    let audit = requester.stamp(
      NewAuditEntry::new(tenant_id, AuditEvent::ConsentGranted, entity::CONSENT, Some(record.consent_id))
        .metadata(json!({
          "consentId": record.consent_id,
          "purpose": record.purpose,
          "consentMethod": record.consent_method,
        })),
    );

    let (record, entry) =
      self.store.insert_consent(record, audit).await.map_err(Error::store)?;
    self.audit.forward(&entry);

    tracing::info!(
      consent_id = %record.consent_id,
      %subject_id,
      %tenant_id,
      purpose = %record.purpose,
      "consent granted"
    );
    Ok(record)
  }

  /// Revoke a record owned by `subject_id` in `tenant_id`.
  pub async fn revoke_consent(
    &self,
    consent_id: Uuid,
    subject_id: Uuid,
    tenant_id: Uuid,
    requester: &Requester,
  ) -> Result<ConsentRecord> {
    let existing = self
      .store
      .get_consent(consent_id)
      .await
      .map_err(Error::store)?
      .filter(|r| r.belongs_to(subject_id, tenant_id))
      .ok_or(Error::ConsentNotFound(consent_id))?;

    let audit = requester.stamp(
      NewAuditEntry::new(tenant_id, AuditEvent::ConsentRevoked, entity::CONSENT, Some(consent_id))
        .metadata(json!({
          "consentId": consent_id,
          "purpose": existing.purpose,
          "alreadyRevoked": existing.is_revoked(),
        })),
    );

    let (record, entry) = self
      .store
      .revoke_consent(consent_id, Utc::now(), audit)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ConsentNotFound(consent_id))?;
    self.audit.forward(&entry);

    tracing::info!(
      %consent_id,
      %subject_id,
      %tenant_id,
      already_revoked = existing.is_revoked(),
      "consent revoked"
    );
    Ok(record)
  }

  /// The subject's consent history, most recent first.
  pub async fn list_consents(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
  ) -> Result<Vec<ConsentRecord>> {
    self
      .store
      .list_consents(subject_id, tenant_id)
      .await
      .map_err(Error::store)
  }
}
