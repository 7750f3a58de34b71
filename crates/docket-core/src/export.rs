//! Data export requests and the snapshot they produce.
//!
//! A request is created in [`ExportStatus::Processing`] and moves to a
//! terminal state exactly once. Completion fields are populated if and only if
//! the request completed; the error message if and only if it failed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{Result, subject::Subject};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportStatus {
  Pending,
  Processing,
  Completed,
  Failed,
}

impl ExportStatus {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("export status", s) }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Failed) }
}

/// Serialisation format of the export artifact.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
  #[default]
  Json,
}

impl ExportFormat {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("export format", s) }

  pub fn extension(self) -> &'static str {
    match self {
      Self::Json => "json",
    }
  }
}

// ─── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
  pub request_id:        Uuid,
  pub subject_id:        Uuid,
  pub tenant_id:         Uuid,
  pub status:            ExportStatus,
  pub format:            ExportFormat,
  pub requested_at:      DateTime<Utc>,
  pub completed_at:      Option<DateTime<Utc>>,
  /// After this instant the artifact is no longer served; the request record
  /// itself stays readable.
  pub expires_at:        DateTime<Utc>,
  pub size_bytes:        Option<u64>,
  pub item_count:        Option<u64>,
  pub error_message:     Option<String>,
  pub artifact_location: Option<String>,
  /// Hex SHA-256 of the artifact bytes.
  pub artifact_sha256:   Option<String>,
}

impl ExportRequest {
  /// A new request in `processing`, expiring at `expires_at`.
  pub fn processing(
    subject_id: Uuid,
    tenant_id: Uuid,
    format: ExportFormat,
    requested_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
  ) -> Self {
    Self {
      request_id: Uuid::new_v4(),
      subject_id,
      tenant_id,
      status: ExportStatus::Processing,
      format,
      requested_at,
      completed_at: None,
      expires_at,
      size_bytes: None,
      item_count: None,
      error_message: None,
      artifact_location: None,
      artifact_sha256: None,
    }
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }

  /// Where the artifact of this request is published once completed.
  pub fn artifact_location_for(request_id: Uuid, format: ExportFormat) -> String {
    format!("exports/{request_id}.{}", format.extension())
  }
}

/// The completed artifact handed to
/// [`crate::store::GovernanceStore::complete_export`].
#[derive(Debug, Clone)]
pub struct ExportArtifact {
  pub location:   String,
  pub content:    Vec<u8>,
  pub size_bytes: u64,
  pub item_count: u64,
  pub sha256:     String,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Name of the snapshot section holding the subject's own audit history.
pub const AUDIT_SECTION: &str = "audit_logs";

/// Everything held about one subject at one instant.
///
/// `sections` maps a dependent table name to the subject's rows in it, plus
/// [`AUDIT_SECTION`] for the bounded slice of audit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSnapshot {
  pub exported_at: DateTime<Utc>,
  pub subject:     Subject,
  pub sections:    BTreeMap<String, Vec<serde_json::Value>>,
}

impl SubjectSnapshot {
  /// Total number of records over every section.
  pub fn item_count(&self) -> u64 {
    self.sections.values().map(|rows| rows.len() as u64).sum()
  }

  pub fn section(&self, name: &str) -> &[serde_json::Value] {
    self.sections.get(name).map(Vec::as_slice).unwrap_or(&[])
  }
}
