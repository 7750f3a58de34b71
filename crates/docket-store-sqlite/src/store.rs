//! [`SqliteStore`]: the SQLite implementation of [`GovernanceStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, SubsecRound as _, Utc};
use docket_core::{
  audit::{ActivityBucket, AuditEntry, AuditEvent, AuditQuery, NewAuditEntry},
  consent::ConsentRecord,
  dependent::{DependentCounts, NewDependent},
  erasure::{AnonymizationReport, DeletionReport, sentinel},
  export::{AUDIT_SECTION, ExportArtifact, ExportRequest, SubjectSnapshot},
  store::GovernanceStore,
  subject::{ClientProfile, NewClientProfile, NewSubject, Subject},
};
use rusqlite::{Connection, OptionalExtension as _, types::Value as SqlValue};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    AUDIT_COLUMNS, CLIENT_COLUMNS, CONSENT_COLUMNS, EXPORT_COLUMNS, RawAuditEntry,
    RawClientProfile, RawConsent, RawExportRequest, RawSubject, SUBJECT_COLUMNS,
    encode_dt, encode_u64, encode_uuid,
  },
  error::AuditInsert,
  registry::{DEPENDENTS, SUBJECT_FIELDS, SUBJECT_TABLE, Scope},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Docket governance store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Current time at the precision timestamps are stored with, so returned
/// values compare equal to what a later read yields.
fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Connection-level helpers ────────────────────────────────────────────────
//
// These run inside `call` closures, usually on an open transaction.

fn subject_exists(conn: &Connection, subject_id: &str, tenant_id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM users WHERE user_id = ?1 AND tenant_id = ?2",
        rusqlite::params![subject_id, tenant_id],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

fn select_subject(
  conn: &Connection,
  subject_id: &str,
  tenant_id: &str,
) -> rusqlite::Result<Option<RawSubject>> {
  conn
    .query_row(
      &format!("SELECT {SUBJECT_COLUMNS} FROM users WHERE user_id = ?1 AND tenant_id = ?2"),
      rusqlite::params![subject_id, tenant_id],
      RawSubject::from_row,
    )
    .optional()
}

fn select_consent(conn: &Connection, consent_id: &str) -> rusqlite::Result<Option<RawConsent>> {
  conn
    .query_row(
      &format!("SELECT {CONSENT_COLUMNS} FROM consent_records WHERE consent_id = ?1"),
      rusqlite::params![consent_id],
      RawConsent::from_row,
    )
    .optional()
}

fn select_export(
  conn: &Connection,
  request_id: &str,
) -> rusqlite::Result<Option<RawExportRequest>> {
  conn
    .query_row(
      &format!("SELECT {EXPORT_COLUMNS} FROM data_export_requests WHERE request_id = ?1"),
      rusqlite::params![request_id],
      RawExportRequest::from_row,
    )
    .optional()
}

/// Append `entry` to the ledger. Failures are tagged so they surface as
/// [`crate::Error::AuditWrite`].
fn insert_audit(conn: &Connection, entry: &AuditEntry) -> Result<(), tokio_rusqlite::Error> {
  conn
    .execute(
      &format!(
        "INSERT INTO audit_logs ({AUDIT_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
      ),
      rusqlite::params![
        encode_uuid(entry.entry_id),
        encode_uuid(entry.tenant_id),
        entry.actor_id.map(encode_uuid),
        entry.actor_type.as_ref(),
        entry.event.as_ref(),
        entry.entity_type,
        entry.entity_id.map(encode_uuid),
        entry.metadata.to_string(),
        entry.severity.as_ref(),
        entry.sensitive,
        entry.ip_address,
        entry.user_agent,
        encode_dt(entry.created_at),
      ],
    )
    .map_err(AuditInsert)?;
  Ok(())
}

/// A compiled [`AuditQuery`]: a `WHERE` clause with positional parameters.
struct AuditFilter {
  conds:  Vec<String>,
  params: Vec<SqlValue>,
  limit:  i64,
  offset: i64,
}

impl AuditFilter {
  fn new(query: &AuditQuery) -> Self {
    let mut filter = Self {
      conds:  Vec::new(),
      params: Vec::new(),
      // SQLite treats a negative LIMIT as "no limit".
      limit:  query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)),
      offset: query.offset.map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX)),
    };

    if let Some(tenant) = query.tenant_id {
      filter.bind("tenant_id = ?", encode_uuid(tenant));
    }
    if let Some(actor) = query.actor_id {
      filter.bind("actor_id = ?", encode_uuid(actor));
    }
    if let Some(subject) = query.subject_id {
      filter.bind("(actor_id = ? OR entity_id = ?)", encode_uuid(subject));
    }
    if !query.events.is_empty() {
      let placeholders: Vec<String> = query
        .events
        .iter()
        .map(|event| {
          filter.params.push(SqlValue::Text(event.as_ref().to_owned()));
          format!("?{}", filter.params.len())
        })
        .collect();
      filter.conds.push(format!("event_type IN ({})", placeholders.join(", ")));
    }
    if let Some(entity_type) = &query.entity_type {
      filter.bind("entity_type = ?", entity_type.clone());
    }
    if let Some(entity_id) = query.entity_id {
      filter.bind("entity_id = ?", encode_uuid(entity_id));
    }
    if let Some(since) = query.since {
      filter.bind("created_at >= ?", encode_dt(since));
    }
    if let Some(until) = query.until {
      filter.bind("created_at <= ?", encode_dt(until));
    }
    if query.sensitive_only {
      filter.conds.push("sensitive = 1".to_owned());
    }

    filter
  }

  /// Add `cond`, binding every `?` in it to the same new parameter.
  fn bind(&mut self, cond: &str, value: String) {
    self.params.push(SqlValue::Text(value));
    self.conds.push(cond.replace('?', &format!("?{}", self.params.len())));
  }

  fn clause(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }

  fn select(&self, conn: &Connection) -> rusqlite::Result<Vec<RawAuditEntry>> {
    let sql = format!(
      "SELECT {AUDIT_COLUMNS} FROM audit_logs {} ORDER BY seq DESC LIMIT {} OFFSET {}",
      self.clause(),
      self.limit,
      self.offset
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt
      .query_map(rusqlite::params_from_iter(self.params.iter()), RawAuditEntry::from_row)?
      .collect()
  }

  /// `(event_type, hour, count)` groups. The hour is read from the fixed-width
  /// timestamp, so no row is materialised.
  fn activity(&self, conn: &Connection) -> rusqlite::Result<Vec<(String, i64, i64)>> {
    let sql = format!(
      "SELECT event_type, CAST(substr(created_at, 12, 2) AS INTEGER) AS hour, COUNT(*)
       FROM audit_logs {} GROUP BY event_type, hour",
      self.clause()
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt
      .query_map(rusqlite::params_from_iter(self.params.iter()), |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })?
      .collect()
  }
}

// ─── GovernanceStore impl ────────────────────────────────────────────────────

impl GovernanceStore for SqliteStore {
  type Error = crate::Error;

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn create_subject(&self, input: NewSubject) -> Result<Subject> {
    let created_at = now();
    let subject = Subject {
      subject_id: Uuid::new_v4(),
      tenant_id:  input.tenant_id,
      email:      input.email,
      name:       input.name,
      phone:      input.phone,
      role:       input.role,
      avatar_url: input.avatar_url,
      created_at,
      updated_at: created_at,
    };

    let id_str      = encode_uuid(subject.subject_id);
    let tenant_str  = encode_uuid(subject.tenant_id);
    let email       = subject.email.clone();
    let name        = subject.name.clone();
    let phone       = subject.phone.clone();
    let role        = subject.role.as_ref().to_owned();
    let avatar_url  = subject.avatar_url.clone();
    let reset_token = input.reset_token;
    let at_str      = encode_dt(created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (
             user_id, tenant_id, email, name, phone, role, avatar_url,
             reset_token, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
          rusqlite::params![
            id_str, tenant_str, email, name, phone, role, avatar_url, reset_token, at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(subject)
  }

  async fn get_subject(&self, subject_id: Uuid, tenant_id: Uuid) -> Result<Option<Subject>> {
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_subject(conn, &id_str, &tenant_str)?))
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn set_client_profile(
    &self,
    subject_id: Uuid,
    tenant_id:  Uuid,
    input:      NewClientProfile,
  ) -> Result<Option<ClientProfile>> {
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);
    let client_str = encode_uuid(Uuid::new_v4());
    let at_str     = encode_dt(now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !subject_exists(&tx, &id_str, &tenant_str)? {
          return Ok(None);
        }
        tx.execute(
          "DELETE FROM clients WHERE user_id = ?1",
          rusqlite::params![id_str],
        )?;
        tx.execute(
          "INSERT INTO clients (
             client_id, user_id, tenant_id, name, email, phone, address,
             national_id, passport_number, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            client_str,
            id_str,
            tenant_str,
            input.name,
            input.email,
            input.phone,
            input.address,
            input.national_id,
            input.passport_number,
            at_str,
          ],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = ?1"),
          rusqlite::params![client_str],
          RawClientProfile::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawClientProfile::into_profile).transpose()
  }

  async fn get_client_profile(
    &self,
    subject_id: Uuid,
    tenant_id:  Uuid,
  ) -> Result<Option<ClientProfile>> {
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CLIENT_COLUMNS} FROM clients WHERE user_id = ?1 AND tenant_id = ?2"
              ),
              rusqlite::params![id_str, tenant_str],
              RawClientProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawClientProfile::into_profile).transpose()
  }

  async fn add_dependent(
    &self,
    subject_id: Uuid,
    tenant_id:  Uuid,
    input:      NewDependent,
  ) -> Result<Option<Uuid>> {
    let row_id     = Uuid::new_v4();
    let row_str    = encode_uuid(row_id);
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);
    let at_str     = encode_dt(now());

    // Encode fallible columns before entering the connection thread.
    let size_bytes = match &input {
      NewDependent::Document { size_bytes, .. } => Some(encode_u64(*size_bytes, "size_bytes")?),
      _ => None,
    };

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !subject_exists(&tx, &id_str, &tenant_str)? {
          return Ok(false);
        }

        match input {
          NewDependent::CaseFile { title, reference, status } => {
            tx.execute(
              "INSERT INTO case_files (
                 case_file_id, user_id, tenant_id, title, reference, status, opened_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
              rusqlite::params![row_str, id_str, tenant_str, title, reference, status, at_str],
            )?;
          }
          NewDependent::Document { case_file_id, file_name, mime_type, .. } => {
            tx.execute(
              "INSERT INTO documents (
                 document_id, user_id, tenant_id, case_file_id, file_name, mime_type,
                 size_bytes, uploaded_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
              rusqlite::params![
                row_str,
                id_str,
                tenant_str,
                case_file_id.map(encode_uuid),
                file_name,
                mime_type,
                size_bytes,
                at_str,
              ],
            )?;
          }
          NewDependent::Comment { case_file_id, content } => {
            tx.execute(
              "INSERT INTO comments (
                 comment_id, user_id, tenant_id, case_file_id, content, created_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
              rusqlite::params![
                row_str,
                id_str,
                tenant_str,
                case_file_id.map(encode_uuid),
                content,
                at_str,
              ],
            )?;
          }
          NewDependent::ChatSession { title } => {
            tx.execute(
              "INSERT INTO chat_sessions (session_id, user_id, tenant_id, title, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)",
              rusqlite::params![row_str, id_str, tenant_str, title, at_str],
            )?;
          }
          NewDependent::ChatMessage { session_id, role, content } => {
            let session_str = encode_uuid(session_id);
            let owned = tx
              .query_row(
                "SELECT 1 FROM chat_sessions
                 WHERE session_id = ?1 AND user_id = ?2 AND tenant_id = ?3",
                rusqlite::params![session_str, id_str, tenant_str],
                |_| Ok(true),
              )
              .optional()?
              .unwrap_or(false);
            if !owned {
              return Ok(false);
            }
            tx.execute(
              "INSERT INTO chat_messages (
                 message_id, session_id, user_id, tenant_id, role, content, created_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
              rusqlite::params![
                row_str,
                session_str,
                id_str,
                tenant_str,
                role.as_ref(),
                content,
                at_str,
              ],
            )?;
          }
          NewDependent::AccessToken { provider, access_token, refresh_token, expires_at } => {
            tx.execute(
              "INSERT INTO access_tokens (
                 token_id, user_id, tenant_id, provider, access_token, refresh_token,
                 expires_at, created_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
              rusqlite::params![
                row_str,
                id_str,
                tenant_str,
                provider,
                access_token,
                refresh_token,
                expires_at.map(encode_dt),
                at_str,
              ],
            )?;
          }
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(inserted.then_some(row_id))
  }

  async fn count_dependents(&self, subject_id: Uuid, tenant_id: Uuid) -> Result<DependentCounts> {
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);
    let at_str     = encode_dt(now());

    let counts = self
      .conn
      .call(move |conn| {
        let scope = Scope { subject_id: &id_str, tenant_id: &tenant_str, at: &at_str };
        let mut counts = DependentCounts::default();
        for dep in DEPENDENTS {
          counts.insert(dep.name, (dep.count)(conn, &scope)?);
        }
        Ok(counts)
      })
      .await?;

    Ok(counts)
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
    let entry = entry.into_entry(now());
    let stored = entry.clone();

    self
      .conn
      .call(move |conn| insert_audit(conn, &stored))
      .await?;

    Ok(entry)
  }

  async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
    let filter = AuditFilter::new(query);

    let raws = self
      .conn
      .call(move |conn| Ok(filter.select(conn)?))
      .await?;

    raws.into_iter().map(RawAuditEntry::into_entry).collect()
  }

  async fn audit_activity(&self, query: &AuditQuery) -> Result<Vec<ActivityBucket>> {
    let filter = AuditFilter::new(query);

    let groups = self
      .conn
      .call(move |conn| Ok(filter.activity(conn)?))
      .await?;

    groups
      .into_iter()
      .map(|(event, hour, count)| -> Result<ActivityBucket> {
        Ok(ActivityBucket {
          event: AuditEvent::parse(&event)?,
          hour:  u32::try_from(hour).map_err(|_| crate::Error::OutOfRange("created_at"))?,
          count: u64::try_from(count).map_err(|_| crate::Error::OutOfRange("count"))?,
        })
      })
      .collect()
  }

  // ── Consent ───────────────────────────────────────────────────────────────

  async fn insert_consent(
    &self,
    mut record: ConsentRecord,
    audit:      NewAuditEntry,
  ) -> Result<(ConsentRecord, AuditEntry)> {
    let entry = audit.into_entry(now());
    record.granted_at = record.granted_at.trunc_subsecs(6);

    let consent_str = encode_uuid(record.consent_id);
    let user_str    = encode_uuid(record.subject_id);
    let tenant_str  = encode_uuid(record.tenant_id);
    let purpose     = record.purpose.clone();
    let granted     = record.granted;
    let granted_at  = encode_dt(record.granted_at);
    let revoked_at  = record.revoked_at.map(encode_dt);
    let ip_address  = record.ip_address.clone();
    let user_agent  = record.user_agent.clone();
    let method      = record.consent_method.clone();
    let stored      = entry.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          &format!(
            "INSERT INTO consent_records ({CONSENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
          ),
          rusqlite::params![
            consent_str, user_str, tenant_str, purpose, granted, granted_at, revoked_at,
            ip_address, user_agent, method,
          ],
        )?;
        insert_audit(&tx, &stored)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok((record, entry))
  }

  async fn get_consent(&self, consent_id: Uuid) -> Result<Option<ConsentRecord>> {
    let id_str = encode_uuid(consent_id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_consent(conn, &id_str)?))
      .await?;

    raw.map(RawConsent::into_record).transpose()
  }

  async fn revoke_consent(
    &self,
    consent_id: Uuid,
    revoked_at: DateTime<Utc>,
    audit:      NewAuditEntry,
  ) -> Result<Option<(ConsentRecord, AuditEntry)>> {
    let entry  = audit.into_entry(now());
    let id_str = encode_uuid(consent_id);
    let at_str = encode_dt(revoked_at);
    let stored = entry.clone();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if select_consent(&tx, &id_str)?.is_none() {
          return Ok(None);
        }
        // Only the first revocation stamps `revoked_at`.
        tx.execute(
          "UPDATE consent_records SET granted = 0, revoked_at = ?2
           WHERE consent_id = ?1 AND granted = 1",
          rusqlite::params![id_str, at_str],
        )?;
        insert_audit(&tx, &stored)?;
        let raw = select_consent(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    match raw {
      Some(raw) => Ok(Some((raw.into_record()?, entry))),
      None => Ok(None),
    }
  }

  async fn list_consents(&self, subject_id: Uuid, tenant_id: Uuid) -> Result<Vec<ConsentRecord>> {
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);

    let raws: Vec<RawConsent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONSENT_COLUMNS} FROM consent_records
           WHERE user_id = ?1 AND tenant_id = ?2
           ORDER BY granted_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, tenant_str], RawConsent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConsent::into_record).collect()
  }

  // ── Export ────────────────────────────────────────────────────────────────

  async fn create_export_request(
    &self,
    mut request: ExportRequest,
    audit:       NewAuditEntry,
  ) -> Result<(ExportRequest, AuditEntry)> {
    let entry = audit.into_entry(now());
    request.requested_at = request.requested_at.trunc_subsecs(6);
    request.expires_at = request.expires_at.trunc_subsecs(6);

    let request_str  = encode_uuid(request.request_id);
    let user_str     = encode_uuid(request.subject_id);
    let tenant_str   = encode_uuid(request.tenant_id);
    let status       = request.status.as_ref().to_owned();
    let format       = request.format.as_ref().to_owned();
    let requested_at = encode_dt(request.requested_at);
    let expires_at   = encode_dt(request.expires_at);
    let stored       = entry.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO data_export_requests (
             request_id, user_id, tenant_id, status, format, requested_at, expires_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            request_str, user_str, tenant_str, status, format, requested_at, expires_at,
          ],
        )?;
        insert_audit(&tx, &stored)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok((request, entry))
  }

  async fn collect_subject_data(
    &self,
    subject_id:  Uuid,
    tenant_id:   Uuid,
    audit_limit: usize,
  ) -> Result<Option<SubjectSnapshot>> {
    let exported_at = now();
    let id_str      = encode_uuid(subject_id);
    let tenant_str  = encode_uuid(tenant_id);
    let at_str      = encode_dt(exported_at);
    let audit       = AuditFilter::new(&AuditQuery {
      tenant_id: Some(tenant_id),
      subject_id: Some(subject_id),
      limit: Some(audit_limit),
      ..Default::default()
    });

    let gathered = self
      .conn
      .call(move |conn| {
        // One read transaction so every section sees the same state.
        let tx = conn.transaction()?;
        let Some(subject) = select_subject(&tx, &id_str, &tenant_str)? else {
          return Ok(None);
        };
        let scope = Scope { subject_id: &id_str, tenant_id: &tenant_str, at: &at_str };
        let mut sections = BTreeMap::new();
        for dep in DEPENDENTS {
          sections.insert(dep.name.to_owned(), (dep.export)(&tx, &scope)?);
        }
        let history = audit.select(&tx)?;
        tx.commit()?;
        Ok(Some((subject, sections, history)))
      })
      .await?;

    let Some((subject, mut sections, history)) = gathered else {
      return Ok(None);
    };

    let history = history
      .into_iter()
      .map(|raw| -> Result<serde_json::Value> { Ok(serde_json::to_value(raw.into_entry()?)?) })
      .collect::<Result<Vec<_>>>()?;
    sections.insert(AUDIT_SECTION.to_owned(), history);

    Ok(Some(SubjectSnapshot {
      exported_at,
      subject: subject.into_subject()?,
      sections,
    }))
  }

  async fn complete_export(
    &self,
    request_id:   Uuid,
    completed_at: DateTime<Utc>,
    artifact:     ExportArtifact,
    audit:        NewAuditEntry,
  ) -> Result<Option<(ExportRequest, AuditEntry)>> {
    let entry      = audit.into_entry(now());
    let id_str     = encode_uuid(request_id);
    let at_str     = encode_dt(completed_at);
    let size_bytes = encode_u64(artifact.size_bytes, "size_bytes")?;
    let item_count = encode_u64(artifact.item_count, "item_count")?;
    let stored     = entry.clone();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE data_export_requests
           SET status = 'completed', completed_at = ?2, size_bytes = ?3, item_count = ?4,
               artifact_location = ?5, artifact_sha256 = ?6, artifact = ?7
           WHERE request_id = ?1 AND status = 'processing'",
          rusqlite::params![
            id_str,
            at_str,
            size_bytes,
            item_count,
            artifact.location,
            artifact.sha256,
            artifact.content,
          ],
        )?;
        if updated == 0 {
          return Ok(None);
        }
        insert_audit(&tx, &stored)?;
        let raw = select_export(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    match raw {
      Some(raw) => Ok(Some((raw.into_request()?, entry))),
      None => Ok(None),
    }
  }

  async fn fail_export(&self, request_id: Uuid, message: String) -> Result<Option<ExportRequest>> {
    let id_str = encode_uuid(request_id);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE data_export_requests SET status = 'failed', error_message = ?2
           WHERE request_id = ?1 AND status = 'processing'",
          rusqlite::params![id_str, message],
        )?;
        if updated == 0 {
          return Ok(None);
        }
        let raw = select_export(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawExportRequest::into_request).transpose()
  }

  async fn get_export_request(&self, request_id: Uuid) -> Result<Option<ExportRequest>> {
    let id_str = encode_uuid(request_id);

    let raw = self
      .conn
      .call(move |conn| Ok(select_export(conn, &id_str)?))
      .await?;

    raw.map(RawExportRequest::into_request).transpose()
  }

  async fn get_export_artifact(&self, request_id: Uuid) -> Result<Option<Vec<u8>>> {
    let id_str = encode_uuid(request_id);

    let artifact = self
      .conn
      .call(move |conn| {
        let blob: Option<Option<Vec<u8>>> = conn
          .query_row(
            "SELECT artifact FROM data_export_requests WHERE request_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        Ok(blob.flatten())
      })
      .await?;

    Ok(artifact)
  }

  // ── Erasure ───────────────────────────────────────────────────────────────

  async fn anonymize_subject<F>(
    &self,
    subject_id: Uuid,
    tenant_id:  Uuid,
    at:         DateTime<Utc>,
    audit:      F,
  ) -> Result<Option<(AnonymizationReport, AuditEntry)>>
  where
    F: FnOnce(&AnonymizationReport) -> NewAuditEntry + Send + 'static,
  {
    let at         = at.trunc_subsecs(6);
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);
    let at_str     = encode_dt(at);
    let email      = sentinel::subject_email(subject_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // 1. Identity attributes of the subject row.
        let updated = tx.execute(
          "UPDATE users
           SET email = ?3, name = ?4, phone = NULL, avatar_url = NULL,
               reset_token = NULL, reset_token_expires_at = NULL, updated_at = ?5
           WHERE user_id = ?1 AND tenant_id = ?2",
          rusqlite::params![id_str, tenant_str, email, sentinel::SUBJECT_NAME, at_str],
        )?;
        if updated == 0 {
          return Ok(None);
        }

        let mut anonymized_fields: Vec<String> =
          SUBJECT_FIELDS.iter().map(|f| (*f).to_owned()).collect();
        let mut tables_affected = vec![SUBJECT_TABLE.to_owned()];
        let mut rows_affected = BTreeMap::from([(SUBJECT_TABLE.to_owned(), 1)]);

        // 2–4. Profile, credentials, authored content, in registry order.
        let scope = Scope { subject_id: &id_str, tenant_id: &tenant_str, at: &at_str };
        for dep in DEPENDENTS {
          let rows = (dep.anonymize)(&tx, &scope)?;
          if rows == 0 || dep.anonymized_fields.is_empty() {
            continue;
          }
          anonymized_fields.extend(dep.anonymized_fields.iter().map(|f| (*f).to_owned()));
          tables_affected.push(dep.name.to_owned());
          rows_affected.insert(dep.name.to_owned(), rows);
        }

        let report = AnonymizationReport {
          anonymized_fields,
          tables_affected,
          rows_affected,
          timestamp: at,
        };

        // 5. Exactly one ledger entry, committed with the overwrite.
        let entry = audit(&report).into_entry(now());
        insert_audit(&tx, &entry)?;
        tx.commit()?;
        Ok(Some((report, entry)))
      })
      .await?;

    Ok(outcome)
  }

  async fn delete_subject<F>(
    &self,
    subject_id: Uuid,
    tenant_id:  Uuid,
    audit:      F,
  ) -> Result<Option<(DeletionReport, AuditEntry)>>
  where
    F: FnOnce(&DeletionReport) -> NewAuditEntry + Send + 'static,
  {
    let id_str     = encode_uuid(subject_id);
    let tenant_str = encode_uuid(tenant_id);
    let at_str     = encode_dt(now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !subject_exists(&tx, &id_str, &tenant_str)? {
          return Ok(None);
        }

        // 1. Count everything before anything is removed.
        let scope = Scope { subject_id: &id_str, tenant_id: &tenant_str, at: &at_str };
        let mut counts = BTreeMap::new();
        for dep in DEPENDENTS {
          counts.insert(dep.name.to_owned(), (dep.count)(&tx, &scope)?);
        }
        let report = DeletionReport::new(counts, SUBJECT_TABLE);

        // 2. The ledger entry is written while the subject still exists.
        let entry = audit(&report).into_entry(now());
        insert_audit(&tx, &entry)?;

        // 3. Foreign-key cascades remove every dependent row.
        tx.execute(
          "DELETE FROM users WHERE user_id = ?1 AND tenant_id = ?2",
          rusqlite::params![id_str, tenant_str],
        )?;
        tx.commit()?;
        Ok(Some((report, entry)))
      })
      .await?;

    Ok(outcome)
  }
}
