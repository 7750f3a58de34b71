//! Subject: the natural person whose personal data is governed.
//!
//! A subject is a user row scoped to one tenant. It may carry at most one
//! linked [`ClientProfile`] holding the identifying attributes of a client
//! record. Every dependent entity references the subject, never copies it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{Result, erasure::sentinel};

/// The role a subject holds inside its tenant.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubjectRole {
  Admin,
  Lawyer,
  Staff,
  Client,
}

impl SubjectRole {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("role", s) }
}

/// Identity attributes of a governed user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: Uuid,
  pub tenant_id:  Uuid,
  pub email:      String,
  pub name:       String,
  pub phone:      Option<String>,
  pub role:       SubjectRole,
  pub avatar_url: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Subject {
  /// Whether the identity attributes hold the anonymization sentinels.
  ///
  /// The sentinel email is derived from the subject id, so this is an exact
  /// comparison rather than a substring heuristic.
  pub fn is_anonymized(&self) -> bool {
    self.email == sentinel::subject_email(self.subject_id)
      && self.name == sentinel::SUBJECT_NAME
      && self.phone.is_none()
      && self.avatar_url.is_none()
  }
}

/// Input to [`crate::store::GovernanceStore::create_subject`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewSubject {
  pub tenant_id:   Uuid,
  pub email:       String,
  pub name:        String,
  pub phone:       Option<String>,
  pub role:        SubjectRole,
  pub avatar_url:  Option<String>,
  /// Outstanding password-reset token, if one has been issued.
  #[serde(default)]
  pub reset_token: Option<String>,
}

impl NewSubject {
  /// Convenience constructor with all optional fields unset.
  pub fn new(
    tenant_id: Uuid,
    email: impl Into<String>,
    name: impl Into<String>,
    role: SubjectRole,
  ) -> Self {
    Self {
      tenant_id,
      email: email.into(),
      name: name.into(),
      phone: None,
      role,
      avatar_url: None,
      reset_token: None,
    }
  }
}

/// The zero-or-one client record linked to a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
  pub client_id:       Uuid,
  pub subject_id:      Uuid,
  pub tenant_id:       Uuid,
  pub name:            String,
  pub email:           Option<String>,
  pub phone:           Option<String>,
  pub address:         Option<String>,
  pub national_id:     Option<String>,
  pub passport_number: Option<String>,
  pub created_at:      DateTime<Utc>,
}

impl ClientProfile {
  pub fn is_anonymized(&self) -> bool {
    self.name == sentinel::CLIENT_NAME
      && self.email.as_deref() == Some(sentinel::client_email(self.client_id).as_str())
      && self.phone.is_none()
      && self.address.is_none()
      && self.national_id.is_none()
      && self.passport_number.is_none()
  }
}

/// Input to [`crate::store::GovernanceStore::set_client_profile`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClientProfile {
  pub name:            String,
  pub email:           Option<String>,
  pub phone:           Option<String>,
  pub address:         Option<String>,
  pub national_id:     Option<String>,
  pub passport_number: Option<String>,
}
