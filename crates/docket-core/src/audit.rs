//! Audit ledger entries.
//!
//! Entries are append-only facts about governance-relevant actions. They are
//! never updated and never deleted by this core, including when the subject
//! they describe is erased. The entity reference is an opaque identifier, not
//! a live foreign key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::Result;

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// The closed set of audit event types.
///
/// Extend only by adding variants; never change the meaning of an existing
/// one. The string form is stored verbatim in the ledger.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
  ConsentGranted,
  ConsentRevoked,
  DataExportRequested,
  DataExported,
  DataAnonymized,
  DataDeleted,
  LoginFailed,
  SensitiveDataAccessed,
  SecurityActionFailed,
  SuspiciousActivityDetected,
}

impl AuditEvent {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("audit event", s) }

  /// Severity an entry gets unless the caller overrides it.
  pub fn default_severity(self) -> Severity {
    match self {
      Self::SuspiciousActivityDetected => Severity::Critical,
      Self::SecurityActionFailed => Severity::High,
      Self::LoginFailed | Self::DataDeleted | Self::DataAnonymized => {
        Severity::Medium
      }
      Self::ConsentGranted
      | Self::ConsentRevoked
      | Self::DataExportRequested
      | Self::DataExported
      | Self::SensitiveDataAccessed => Severity::Low,
    }
  }

  /// Whether entries of this type concern access to or destruction of
  /// personal data.
  pub fn is_sensitive(self) -> bool {
    matches!(
      self,
      Self::DataExported
        | Self::DataAnonymized
        | Self::DataDeleted
        | Self::SensitiveDataAccessed
    )
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActorType {
  Human,
  System,
}

impl ActorType {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("actor type", s) }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
  AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("severity", s) }
}

/// Entity type names used in the `entity_type` column.
pub mod entity {
  pub const USER: &str = "user";
  pub const CONSENT: &str = "consent_record";
  pub const EXPORT_REQUEST: &str = "data_export_request";
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub entry_id:    Uuid,
  pub tenant_id:   Uuid,
  /// Historical reference; the actor may since have been deleted.
  pub actor_id:    Option<Uuid>,
  pub actor_type:  ActorType,
  pub event:       AuditEvent,
  pub entity_type: String,
  pub entity_id:   Option<Uuid>,
  pub metadata:    serde_json::Value,
  pub severity:    Severity,
  pub sensitive:   bool,
  pub ip_address:  Option<String>,
  pub user_agent:  Option<String>,
  pub created_at:  DateTime<Utc>,
}

/// An entry about to be appended. `entry_id` and `created_at` are assigned at
/// write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditEntry {
  pub tenant_id:   Uuid,
  pub actor_id:    Option<Uuid>,
  pub actor_type:  ActorType,
  pub event:       AuditEvent,
  pub entity_type: String,
  pub entity_id:   Option<Uuid>,
  pub metadata:    serde_json::Value,
  pub severity:    Severity,
  pub sensitive:   bool,
  pub ip_address:  Option<String>,
  pub user_agent:  Option<String>,
}

impl NewAuditEntry {
  /// A system-attributed entry with the event's default severity and
  /// sensitivity and an empty metadata map.
  pub fn new(
    tenant_id: Uuid,
    event: AuditEvent,
    entity_type: impl Into<String>,
    entity_id: Option<Uuid>,
  ) -> Self {
    Self {
      tenant_id,
      actor_id: None,
      actor_type: ActorType::System,
      event,
      entity_type: entity_type.into(),
      entity_id,
      metadata: serde_json::Value::Object(Default::default()),
      severity: event.default_severity(),
      sensitive: event.is_sensitive(),
      ip_address: None,
      user_agent: None,
    }
  }

  /// Attribute the entry to a human actor.
  pub fn by(mut self, actor_id: Uuid) -> Self {
    self.actor_id = Some(actor_id);
    self.actor_type = ActorType::Human;
    self
  }

  pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
    self.metadata = metadata;
    self
  }

  pub fn severity(mut self, severity: Severity) -> Self {
    self.severity = severity;
    self
  }

  pub fn sensitive(mut self, sensitive: bool) -> Self {
    self.sensitive = sensitive;
    self
  }

  pub fn capture(
    mut self,
    ip_address: Option<String>,
    user_agent: Option<String>,
  ) -> Self {
    self.ip_address = ip_address;
    self.user_agent = user_agent;
    self
  }

  /// Materialise the entry with a fresh id.
  pub fn into_entry(self, created_at: DateTime<Utc>) -> AuditEntry {
    AuditEntry {
      entry_id: Uuid::new_v4(),
      tenant_id: self.tenant_id,
      actor_id: self.actor_id,
      actor_type: self.actor_type,
      event: self.event,
      entity_type: self.entity_type,
      entity_id: self.entity_id,
      metadata: self.metadata,
      severity: self.severity,
      sensitive: self.sensitive,
      ip_address: self.ip_address,
      user_agent: self.user_agent,
      created_at,
    }
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::GovernanceStore::query_audit`]. Every filter
/// is optional; results are most recent first.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
  pub tenant_id:      Option<Uuid>,
  pub actor_id:       Option<Uuid>,
  /// Matches entries where the id is either the actor or the entity.
  pub subject_id:     Option<Uuid>,
  pub events:         Vec<AuditEvent>,
  pub entity_type:    Option<String>,
  pub entity_id:      Option<Uuid>,
  pub since:          Option<DateTime<Utc>>,
  pub until:          Option<DateTime<Utc>>,
  pub sensitive_only: bool,
  /// `None` returns every matching entry.
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

/// The number of matching entries sharing one event type and UTC hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityBucket {
  pub event: AuditEvent,
  /// 0–23.
  pub hour:  u32,
  pub count: u64,
}
