//! Consent records: per-subject, per-purpose grant/revoke history.
//!
//! Consent is additive history, not a single mutable flag: every grant
//! creates a new record, and a record moves from granted to revoked at most
//! once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consent method stored when the caller does not supply one.
pub const DEFAULT_CONSENT_METHOD: &str = "explicit";

/// A single grant of consent for one purpose.
///
/// `revoked_at` is set if and only if `granted` is `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
  pub consent_id:     Uuid,
  pub subject_id:     Uuid,
  pub tenant_id:      Uuid,
  /// Free-form processing category, e.g. `"data_processing"`, `"marketing"`.
  pub purpose:        String,
  pub granted:        bool,
  pub granted_at:     DateTime<Utc>,
  pub revoked_at:     Option<DateTime<Utc>>,
  pub ip_address:     Option<String>,
  pub user_agent:     Option<String>,
  pub consent_method: String,
}

impl ConsentRecord {
  /// A freshly granted record. `granted_at` is set to now.
  pub fn grant(subject_id: Uuid, tenant_id: Uuid, purpose: impl Into<String>) -> Self {
    Self {
      consent_id:     Uuid::new_v4(),
      subject_id,
      tenant_id,
      purpose:        purpose.into(),
      granted:        true,
      granted_at:     Utc::now(),
      revoked_at:     None,
      ip_address:     None,
      user_agent:     None,
      consent_method: DEFAULT_CONSENT_METHOD.to_owned(),
    }
  }

  pub fn with_capture(
    mut self,
    ip_address: Option<String>,
    user_agent: Option<String>,
  ) -> Self {
    self.ip_address = ip_address;
    self.user_agent = user_agent;
    self
  }

  pub fn with_method(mut self, method: impl Into<String>) -> Self {
    self.consent_method = method.into();
    self
  }

  pub fn is_revoked(&self) -> bool { !self.granted }

  /// Whether the record is owned by `subject_id` within `tenant_id`.
  pub fn belongs_to(&self, subject_id: Uuid, tenant_id: Uuid) -> bool {
    self.subject_id == subject_id && self.tenant_id == tenant_id
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grant_starts_granted_without_revocation() {
    let record = ConsentRecord::grant(Uuid::new_v4(), Uuid::new_v4(), "marketing");
    assert!(record.granted);
    assert!(record.revoked_at.is_none());
    assert_eq!(record.consent_method, DEFAULT_CONSENT_METHOD);
  }

  #[test]
  fn ownership_requires_subject_and_tenant() {
    let subject = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    let record = ConsentRecord::grant(subject, tenant, "marketing");
    assert!(record.belongs_to(subject, tenant));
    assert!(!record.belongs_to(subject, Uuid::new_v4()));
    assert!(!record.belongs_to(Uuid::new_v4(), tenant));
  }
}
