//! The dependent-entity registry.
//!
//! Every table holding rows that reference a subject is listed exactly once
//! in [`DEPENDENTS`], together with how to count, export and anonymize the
//! subject's rows in it. Export, anonymization and deletion all iterate this
//! list; a table missing from it is invisible to all three, so a new
//! referencing table is registered here when it is added to the schema.

use docket_core::erasure::sentinel;
use rusqlite::{Connection, OptionalExtension as _, types::Value as SqlValue};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

/// The table holding subjects themselves.
pub const SUBJECT_TABLE: &str = "users";

/// Field categories overwritten on the subject row.
pub(crate) const SUBJECT_FIELDS: &[&str] =
  &["user_email", "user_name", "user_phone", "user_avatar", "user_reset_token"];

/// The subject and tenant a registry operation is confined to, plus the
/// encoded operation timestamp.
pub(crate) struct Scope<'a> {
  pub subject_id: &'a str,
  pub tenant_id:  &'a str,
  pub at:         &'a str,
}

pub(crate) struct DependentTable {
  pub name:              &'static str,
  /// Categories overwritten by `anonymize`; empty when rows are kept as-is.
  pub anonymized_fields: &'static [&'static str],
  pub count:             fn(&Connection, &Scope<'_>) -> rusqlite::Result<u64>,
  pub export:            fn(&Connection, &Scope<'_>) -> rusqlite::Result<Vec<Value>>,
  /// Returns the number of rows overwritten.
  pub anonymize:         fn(&Connection, &Scope<'_>) -> rusqlite::Result<u64>,
}

/// Registered tables, in anonymization order: linked profile, credentials,
/// then authored free text, then rows preserved unchanged.
pub(crate) const DEPENDENTS: &[DependentTable] = &[
  DependentTable {
    name:              "clients",
    anonymized_fields: &[
      "client_name",
      "client_email",
      "client_phone",
      "client_address",
      "client_national_id",
      "client_passport_number",
    ],
    count:             |c, s| count_rows(c, "clients", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT client_id, name, email, phone, address, national_id, passport_number, \
                created_at
         FROM clients WHERE user_id = ?1 AND tenant_id = ?2",
        s,
      )
    },
    anonymize:         anonymize_clients,
  },
  DependentTable {
    name:              "access_tokens",
    anonymized_fields: &["access_token", "refresh_token"],
    count:             |c, s| count_rows(c, "access_tokens", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT token_id, provider, expires_at, revoked_at, created_at
         FROM access_tokens WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY created_at DESC",
        s,
      )
    },
    anonymize:         |c, s| {
      let n = c.execute(
        "UPDATE access_tokens
         SET access_token = NULL, refresh_token = NULL,
             revoked_at = COALESCE(revoked_at, ?3)
         WHERE user_id = ?1 AND tenant_id = ?2",
        rusqlite::params![s.subject_id, s.tenant_id, s.at],
      )?;
      Ok(n as u64)
    },
  },
  DependentTable {
    name:              "comments",
    anonymized_fields: &["comment_content"],
    count:             |c, s| count_rows(c, "comments", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT comment_id, case_file_id, content, created_at
         FROM comments WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY created_at DESC",
        s,
      )
    },
    anonymize:         |c, s| replace_text(c, "comments", "content", "", s),
  },
  DependentTable {
    name:              "chat_sessions",
    anonymized_fields: &["chat_session_title"],
    count:             |c, s| count_rows(c, "chat_sessions", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT session_id, title, created_at
         FROM chat_sessions WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY created_at DESC",
        s,
      )
    },
    anonymize:         |c, s| replace_text(c, "chat_sessions", "title", "", s),
  },
  DependentTable {
    name:              "chat_messages",
    anonymized_fields: &["chat_message_content"],
    count:             |c, s| count_rows(c, "chat_messages", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT message_id, session_id, role, content, created_at
         FROM chat_messages WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY created_at DESC",
        s,
      )
    },
    anonymize:         |c, s| {
      replace_text(c, "chat_messages", "content", "AND role = 'user'", s)
    },
  },
  DependentTable {
    name:              "data_export_requests",
    anonymized_fields: &["export_artifact"],
    count:             |c, s| count_rows(c, "data_export_requests", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT request_id, status, format, requested_at, completed_at, expires_at,
                size_bytes, item_count, error_message
         FROM data_export_requests WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY requested_at DESC",
        s,
      )
    },
    // Stored snapshots hold plaintext personal data.
    anonymize:         |c, s| {
      let n = c.execute(
        "UPDATE data_export_requests SET artifact = NULL
         WHERE user_id = ?1 AND tenant_id = ?2 AND status = 'completed'",
        rusqlite::params![s.subject_id, s.tenant_id],
      )?;
      Ok(n as u64)
    },
  },
  DependentTable {
    name:              "case_files",
    anonymized_fields: &[],
    count:             |c, s| count_rows(c, "case_files", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT case_file_id, title, reference, status, opened_at
         FROM case_files WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY opened_at DESC",
        s,
      )
    },
    anonymize:         preserve,
  },
  DependentTable {
    name:              "documents",
    anonymized_fields: &[],
    count:             |c, s| count_rows(c, "documents", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT document_id, case_file_id, file_name, mime_type, size_bytes, uploaded_at
         FROM documents WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY uploaded_at DESC",
        s,
      )
    },
    anonymize:         preserve,
  },
  DependentTable {
    name:              "consent_records",
    anonymized_fields: &[],
    count:             |c, s| count_rows(c, "consent_records", s),
    export:            |c, s| {
      select_json(
        c,
        "SELECT consent_id, purpose, granted, granted_at, revoked_at, ip_address,
                user_agent, consent_method
         FROM consent_records WHERE user_id = ?1 AND tenant_id = ?2
         ORDER BY granted_at DESC",
        s,
      )
    },
    anonymize:         preserve,
  },
];

/// Names of every registered dependent table, in registry order.
pub fn registered_tables() -> impl Iterator<Item = &'static str> {
  DEPENDENTS.iter().map(|d| d.name)
}

// ─── Shared row operations ───────────────────────────────────────────────────

fn count_rows(conn: &Connection, table: &str, scope: &Scope<'_>) -> rusqlite::Result<u64> {
  let n: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?1 AND tenant_id = ?2"),
    rusqlite::params![scope.subject_id, scope.tenant_id],
    |r| r.get(0),
  )?;
  Ok(n as u64)
}

fn replace_text(
  conn: &Connection,
  table: &str,
  column: &str,
  extra: &str,
  scope: &Scope<'_>,
) -> rusqlite::Result<u64> {
  let n = conn.execute(
    &format!(
      "UPDATE {table} SET {column} = ?3 WHERE user_id = ?1 AND tenant_id = ?2 {extra}"
    ),
    rusqlite::params![scope.subject_id, scope.tenant_id, sentinel::CONTENT_REMOVED],
  )?;
  Ok(n as u64)
}

fn anonymize_clients(conn: &Connection, scope: &Scope<'_>) -> rusqlite::Result<u64> {
  let client_id: Option<String> = conn
    .query_row(
      "SELECT client_id FROM clients WHERE user_id = ?1 AND tenant_id = ?2",
      rusqlite::params![scope.subject_id, scope.tenant_id],
      |r| r.get(0),
    )
    .optional()?;

  let Some(client_id) = client_id else { return Ok(0) };
  let parsed = Uuid::parse_str(&client_id).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
  })?;

  let n = conn.execute(
    "UPDATE clients
     SET name = ?2, email = ?3, phone = NULL, address = NULL,
         national_id = NULL, passport_number = NULL
     WHERE client_id = ?1",
    rusqlite::params![client_id, sentinel::CLIENT_NAME, sentinel::client_email(parsed)],
  )?;
  Ok(n as u64)
}

fn preserve(_: &Connection, _: &Scope<'_>) -> rusqlite::Result<u64> { Ok(0) }

/// Run `sql` with the scope's subject and tenant bound to `?1`/`?2` and map
/// every row to a JSON object keyed by column name. Blob columns are skipped.
fn select_json(
  conn: &Connection,
  sql: &str,
  scope: &Scope<'_>,
) -> rusqlite::Result<Vec<Value>> {
  let mut stmt = conn.prepare(sql)?;
  let columns: Vec<String> =
    stmt.column_names().into_iter().map(str::to_owned).collect();

  stmt
    .query_map(rusqlite::params![scope.subject_id, scope.tenant_id], |row| {
      let mut object = Map::with_capacity(columns.len());
      for (i, name) in columns.iter().enumerate() {
        let value = match row.get::<_, SqlValue>(i)? {
          SqlValue::Null => Value::Null,
          SqlValue::Integer(n) => Value::from(n),
          SqlValue::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
          SqlValue::Text(t) => Value::String(t),
          SqlValue::Blob(_) => continue,
        };
        object.insert(name.clone(), value);
      }
      Ok(Value::Object(object))
    })?
    .collect()
}
