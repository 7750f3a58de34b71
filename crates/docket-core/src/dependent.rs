//! Dependent entities: records that reference a subject.
//!
//! The set of dependent tables is enumerated once by the storage backend's
//! registry. This module only carries the inputs used to create dependent
//! rows and the per-table counts the erasure engines report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::Result;

/// Author of a chat message.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
  User,
  Assistant,
}

impl ChatRole {
  pub fn parse(s: &str) -> Result<Self> { crate::parse_variant("chat role", s) }
}

/// A dependent row to attach to a subject. The variant selects the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NewDependent {
  CaseFile {
    title:     String,
    reference: Option<String>,
    status:    String,
  },
  Document {
    case_file_id: Option<Uuid>,
    file_name:    String,
    mime_type:    String,
    size_bytes:   u64,
  },
  Comment {
    case_file_id: Option<Uuid>,
    content:      String,
  },
  ChatSession {
    title: String,
  },
  ChatMessage {
    session_id: Uuid,
    role:       ChatRole,
    content:    String,
  },
  /// A stored third-party credential (calendar sync, e-signature, ...).
  AccessToken {
    provider:      String,
    access_token:  String,
    refresh_token: Option<String>,
    expires_at:    Option<DateTime<Utc>>,
  },
}

impl NewDependent {
  /// The table the row is written to.
  pub fn table(&self) -> &'static str {
    match self {
      Self::CaseFile { .. } => "case_files",
      Self::Document { .. } => "documents",
      Self::Comment { .. } => "comments",
      Self::ChatSession { .. } => "chat_sessions",
      Self::ChatMessage { .. } => "chat_messages",
      Self::AccessToken { .. } => "access_tokens",
    }
  }
}

/// Per-table record counts for one subject, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependentCounts(pub BTreeMap<String, u64>);

impl DependentCounts {
  pub fn insert(&mut self, table: impl Into<String>, count: u64) {
    self.0.insert(table.into(), count);
  }

  pub fn get(&self, table: &str) -> u64 { self.0.get(table).copied().unwrap_or(0) }

  /// Sum over every table.
  pub fn total(&self) -> u64 { self.0.values().sum() }

  pub fn is_empty(&self) -> bool { self.total() == 0 }
}
