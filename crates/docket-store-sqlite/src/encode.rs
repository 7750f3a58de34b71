//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so lexical order equals chronological order. UUIDs are stored as
//! hyphenated lowercase strings. Enum discriminants use their `strum` string
//! forms.

use chrono::{DateTime, SecondsFormat, Utc};
use docket_core::{
  audit::{ActorType, AuditEntry, AuditEvent, Severity},
  consent::ConsentRecord,
  export::{ExportFormat, ExportRequest, ExportStatus},
  subject::{ClientProfile, Subject, SubjectRole},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Integers ─────────────────────────────────────────────────────────────────

pub fn encode_u64(value: u64, column: &'static str) -> Result<i64> {
  i64::try_from(value).map_err(|_| Error::OutOfRange(column))
}

fn decode_opt_u64(value: Option<i64>, column: &'static str) -> Result<Option<u64>> {
  value
    .map(|v| u64::try_from(v).map_err(|_| Error::OutOfRange(column)))
    .transpose()
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const SUBJECT_COLUMNS: &str =
  "user_id, tenant_id, email, name, phone, role, avatar_url, created_at, updated_at";

/// Raw strings read directly from a `users` row.
pub struct RawSubject {
  pub user_id:    String,
  pub tenant_id:  String,
  pub email:      String,
  pub name:       String,
  pub phone:      Option<String>,
  pub role:       String,
  pub avatar_url: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawSubject {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:    row.get(0)?,
      tenant_id:  row.get(1)?,
      email:      row.get(2)?,
      name:       row.get(3)?,
      phone:      row.get(4)?,
      role:       row.get(5)?,
      avatar_url: row.get(6)?,
      created_at: row.get(7)?,
      updated_at: row.get(8)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id: decode_uuid(&self.user_id)?,
      tenant_id:  decode_uuid(&self.tenant_id)?,
      email:      self.email,
      name:       self.name,
      phone:      self.phone,
      role:       SubjectRole::parse(&self.role)?,
      avatar_url: self.avatar_url,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const CLIENT_COLUMNS: &str = "client_id, user_id, tenant_id, name, email, phone, \
                                  address, national_id, passport_number, created_at";

/// Raw strings read directly from a `clients` row.
pub struct RawClientProfile {
  pub client_id:       String,
  pub user_id:         String,
  pub tenant_id:       String,
  pub name:            String,
  pub email:           Option<String>,
  pub phone:           Option<String>,
  pub address:         Option<String>,
  pub national_id:     Option<String>,
  pub passport_number: Option<String>,
  pub created_at:      String,
}

impl RawClientProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      client_id:       row.get(0)?,
      user_id:         row.get(1)?,
      tenant_id:       row.get(2)?,
      name:            row.get(3)?,
      email:           row.get(4)?,
      phone:           row.get(5)?,
      address:         row.get(6)?,
      national_id:     row.get(7)?,
      passport_number: row.get(8)?,
      created_at:      row.get(9)?,
    })
  }

  pub fn into_profile(self) -> Result<ClientProfile> {
    Ok(ClientProfile {
      client_id:       decode_uuid(&self.client_id)?,
      subject_id:      decode_uuid(&self.user_id)?,
      tenant_id:       decode_uuid(&self.tenant_id)?,
      name:            self.name,
      email:           self.email,
      phone:           self.phone,
      address:         self.address,
      national_id:     self.national_id,
      passport_number: self.passport_number,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub const CONSENT_COLUMNS: &str = "consent_id, user_id, tenant_id, purpose, granted, \
                                   granted_at, revoked_at, ip_address, user_agent, \
                                   consent_method";

/// Raw values read directly from a `consent_records` row.
pub struct RawConsent {
  pub consent_id:     String,
  pub user_id:        String,
  pub tenant_id:      String,
  pub purpose:        String,
  pub granted:        bool,
  pub granted_at:     String,
  pub revoked_at:     Option<String>,
  pub ip_address:     Option<String>,
  pub user_agent:     Option<String>,
  pub consent_method: String,
}

impl RawConsent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      consent_id:     row.get(0)?,
      user_id:        row.get(1)?,
      tenant_id:      row.get(2)?,
      purpose:        row.get(3)?,
      granted:        row.get(4)?,
      granted_at:     row.get(5)?,
      revoked_at:     row.get(6)?,
      ip_address:     row.get(7)?,
      user_agent:     row.get(8)?,
      consent_method: row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<ConsentRecord> {
    Ok(ConsentRecord {
      consent_id:     decode_uuid(&self.consent_id)?,
      subject_id:     decode_uuid(&self.user_id)?,
      tenant_id:      decode_uuid(&self.tenant_id)?,
      purpose:        self.purpose,
      granted:        self.granted,
      granted_at:     decode_dt(&self.granted_at)?,
      revoked_at:     decode_opt_dt(self.revoked_at)?,
      ip_address:     self.ip_address,
      user_agent:     self.user_agent,
      consent_method: self.consent_method,
    })
  }
}

pub const EXPORT_COLUMNS: &str = "request_id, user_id, tenant_id, status, format, \
                                  requested_at, completed_at, expires_at, size_bytes, \
                                  item_count, error_message, artifact_location, \
                                  artifact_sha256";

/// Raw values read directly from a `data_export_requests` row (without the
/// artifact blob).
pub struct RawExportRequest {
  pub request_id:        String,
  pub user_id:           String,
  pub tenant_id:         String,
  pub status:            String,
  pub format:            String,
  pub requested_at:      String,
  pub completed_at:      Option<String>,
  pub expires_at:        String,
  pub size_bytes:        Option<i64>,
  pub item_count:        Option<i64>,
  pub error_message:     Option<String>,
  pub artifact_location: Option<String>,
  pub artifact_sha256:   Option<String>,
}

impl RawExportRequest {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      request_id:        row.get(0)?,
      user_id:           row.get(1)?,
      tenant_id:         row.get(2)?,
      status:            row.get(3)?,
      format:            row.get(4)?,
      requested_at:      row.get(5)?,
      completed_at:      row.get(6)?,
      expires_at:        row.get(7)?,
      size_bytes:        row.get(8)?,
      item_count:        row.get(9)?,
      error_message:     row.get(10)?,
      artifact_location: row.get(11)?,
      artifact_sha256:   row.get(12)?,
    })
  }

  pub fn into_request(self) -> Result<ExportRequest> {
    Ok(ExportRequest {
      request_id:        decode_uuid(&self.request_id)?,
      subject_id:        decode_uuid(&self.user_id)?,
      tenant_id:         decode_uuid(&self.tenant_id)?,
      status:            ExportStatus::parse(&self.status)?,
      format:            ExportFormat::parse(&self.format)?,
      requested_at:      decode_dt(&self.requested_at)?,
      completed_at:      decode_opt_dt(self.completed_at)?,
      expires_at:        decode_dt(&self.expires_at)?,
      size_bytes:        decode_opt_u64(self.size_bytes, "size_bytes")?,
      item_count:        decode_opt_u64(self.item_count, "item_count")?,
      error_message:     self.error_message,
      artifact_location: self.artifact_location,
      artifact_sha256:   self.artifact_sha256,
    })
  }
}

pub const AUDIT_COLUMNS: &str = "entry_id, tenant_id, actor_id, actor_type, event_type, \
                                 entity_type, entity_id, metadata, severity, sensitive, \
                                 ip_address, user_agent, created_at";

/// Raw values read directly from an `audit_logs` row.
pub struct RawAuditEntry {
  pub entry_id:    String,
  pub tenant_id:   String,
  pub actor_id:    Option<String>,
  pub actor_type:  String,
  pub event_type:  String,
  pub entity_type: String,
  pub entity_id:   Option<String>,
  pub metadata:    String,
  pub severity:    String,
  pub sensitive:   bool,
  pub ip_address:  Option<String>,
  pub user_agent:  Option<String>,
  pub created_at:  String,
}

impl RawAuditEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:    row.get(0)?,
      tenant_id:   row.get(1)?,
      actor_id:    row.get(2)?,
      actor_type:  row.get(3)?,
      event_type:  row.get(4)?,
      entity_type: row.get(5)?,
      entity_id:   row.get(6)?,
      metadata:    row.get(7)?,
      severity:    row.get(8)?,
      sensitive:   row.get(9)?,
      ip_address:  row.get(10)?,
      user_agent:  row.get(11)?,
      created_at:  row.get(12)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      entry_id:    decode_uuid(&self.entry_id)?,
      tenant_id:   decode_uuid(&self.tenant_id)?,
      actor_id:    decode_opt_uuid(self.actor_id)?,
      actor_type:  ActorType::parse(&self.actor_type)?,
      event:       AuditEvent::parse(&self.event_type)?,
      entity_type: self.entity_type,
      entity_id:   decode_opt_uuid(self.entity_id)?,
      metadata:    serde_json::from_str(&self.metadata)?,
      severity:    Severity::parse(&self.severity)?,
      sensitive:   self.sensitive,
      ip_address:  self.ip_address,
      user_agent:  self.user_agent,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}
