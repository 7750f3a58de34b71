//! Right-to-erasure outcomes and the sentinel values anonymization writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed, non-identifying placeholders substituted for destroyed fields.
///
/// The sentinel values themselves are the authoritative anonymization
/// signal. Emails embed the owning row's id, which keeps them unique under
/// per-tenant uniqueness constraints and makes re-anonymization write the
/// exact same value.
pub mod sentinel {
  use uuid::Uuid;

  pub const SUBJECT_NAME: &str = "Anonymized User";
  pub const CLIENT_NAME: &str = "Anonymized Client";
  pub const CONTENT_REMOVED: &str = "[content removed]";
  pub const EMAIL_DOMAIN: &str = "anonymized.invalid";

  pub fn subject_email(subject_id: Uuid) -> String {
    format!("anonymized-{}@{EMAIL_DOMAIN}", subject_id.simple())
  }

  pub fn client_email(client_id: Uuid) -> String {
    format!("anonymized-client-{}@{EMAIL_DOMAIN}", client_id.simple())
  }
}

/// Result of anonymizing one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizationReport {
  /// Field categories overwritten, in the order they were processed.
  pub anonymized_fields: Vec<String>,
  /// Tables in which at least one row was overwritten.
  pub tables_affected:   Vec<String>,
  /// Rows overwritten per table.
  pub rows_affected:     BTreeMap<String, u64>,
  pub timestamp:         DateTime<Utc>,
}

/// Result of cascading deletion of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
  /// Records removed per table, including the subject row itself.
  pub deleted_records: BTreeMap<String, u64>,
  pub total_deleted:   u64,
}

impl DeletionReport {
  /// Build a report from dependent counts plus the subject row.
  pub fn new(
    mut deleted_records: BTreeMap<String, u64>,
    subject_table: &str,
  ) -> Self {
    deleted_records.insert(subject_table.to_owned(), 1);
    let total_deleted = deleted_records.values().sum();
    Self { deleted_records, total_deleted }
  }
}
