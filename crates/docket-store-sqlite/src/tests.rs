//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Timelike as _, Utc};
use docket_core::{
  audit::{ActivityBucket, AuditEvent, AuditQuery, NewAuditEntry, entity},
  consent::ConsentRecord,
  dependent::{ChatRole, NewDependent},
  erasure::sentinel,
  export::{AUDIT_SECTION, ExportArtifact, ExportFormat, ExportRequest, ExportStatus},
  store::{AuditFailure, GovernanceStore},
  subject::{NewClientProfile, NewSubject, Subject, SubjectRole},
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn subject(s: &SqliteStore, tenant: Uuid, email: &str) -> Subject {
  let mut input = NewSubject::new(tenant, email, "Ada Lovelace", SubjectRole::Client);
  input.phone = Some("+44 20 7946 0000".into());
  input.avatar_url = Some("https://cdn.example.com/ada.png".into());
  input.reset_token = Some("reset-123".into());
  s.create_subject(input).await.unwrap()
}

/// One row in every dependent table.
async fn populate(s: &SqliteStore, sub: &Subject) {
  let (id, tenant) = (sub.subject_id, sub.tenant_id);

  s.set_client_profile(id, tenant, NewClientProfile {
    name: "Ada Lovelace".into(),
    email: Some("ada@example.com".into()),
    phone: Some("+44 20 7946 0000".into()),
    address: Some("12 St James's Square".into()),
    national_id: Some("AB123456C".into()),
    passport_number: Some("P1234567".into()),
  })
  .await
  .unwrap()
  .unwrap();

  let case = s
    .add_dependent(id, tenant, NewDependent::CaseFile {
      title:     "Estate of Lord Byron".into(),
      reference: Some("C-1".into()),
      status:    "open".into(),
    })
    .await
    .unwrap()
    .unwrap();
  s.add_dependent(id, tenant, NewDependent::Document {
    case_file_id: Some(case),
    file_name:    "will.pdf".into(),
    mime_type:    "application/pdf".into(),
    size_bytes:   2048,
  })
  .await
  .unwrap()
  .unwrap();
  s.add_dependent(id, tenant, NewDependent::Comment {
    case_file_id: Some(case),
    content:      "Call me on my mobile".into(),
  })
  .await
  .unwrap()
  .unwrap();
  let session = s
    .add_dependent(id, tenant, NewDependent::ChatSession { title: "My divorce".into() })
    .await
    .unwrap()
    .unwrap();
  s.add_dependent(id, tenant, NewDependent::ChatMessage {
    session_id: session,
    role:       ChatRole::User,
    content:    "My address is 12 St James's Square".into(),
  })
  .await
  .unwrap()
  .unwrap();
  s.add_dependent(id, tenant, NewDependent::ChatMessage {
    session_id: session,
    role:       ChatRole::Assistant,
    content:    "Noted.".into(),
  })
  .await
  .unwrap()
  .unwrap();
  s.add_dependent(id, tenant, NewDependent::AccessToken {
    provider:      "calendar".into(),
    access_token:  "at-secret".into(),
    refresh_token: Some("rt-secret".into()),
    expires_at:    Some(Utc::now() + Duration::hours(1)),
  })
  .await
  .unwrap()
  .unwrap();
  let consent = ConsentRecord::grant(id, tenant, "data_processing");
  let audit = NewAuditEntry::new(tenant, AuditEvent::ConsentGranted, entity::CONSENT, Some(consent.consent_id))
    .by(id);
  s.insert_consent(consent, audit).await.unwrap();
}

fn consent_audit(record: &ConsentRecord, event: AuditEvent) -> NewAuditEntry {
  NewAuditEntry::new(record.tenant_id, event, entity::CONSENT, Some(record.consent_id))
    .by(record.subject_id)
    .metadata(json!({ "consentId": record.consent_id, "purpose": record.purpose }))
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_subject() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;

  let fetched = s.get_subject(sub.subject_id, tenant).await.unwrap().unwrap();
  assert_eq!(fetched.email, "ada@example.com");
  assert_eq!(fetched.role, SubjectRole::Client);
  assert!(!fetched.is_anonymized());
}

#[tokio::test]
async fn subject_is_invisible_from_other_tenant() {
  let s = store().await;
  let sub = subject(&s, Uuid::new_v4(), "ada@example.com").await;

  let other = Uuid::new_v4();
  assert!(s.get_subject(sub.subject_id, other).await.unwrap().is_none());
  assert!(
    s.add_dependent(sub.subject_id, other, NewDependent::ChatSession { title: "x".into() })
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn chat_message_requires_own_session() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let ada = subject(&s, tenant, "ada@example.com").await;
  let bob = subject(&s, tenant, "bob@example.com").await;

  let session = s
    .add_dependent(bob.subject_id, tenant, NewDependent::ChatSession { title: "x".into() })
    .await
    .unwrap()
    .unwrap();
  let message = s
    .add_dependent(ada.subject_id, tenant, NewDependent::ChatMessage {
      session_id: session,
      role:       ChatRole::User,
      content:    "hello".into(),
    })
    .await
    .unwrap();
  assert!(message.is_none());
}

#[tokio::test]
async fn count_dependents_covers_every_table() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  populate(&s, &sub).await;

  let counts = s.count_dependents(sub.subject_id, tenant).await.unwrap();
  assert_eq!(counts.get("clients"), 1);
  assert_eq!(counts.get("case_files"), 1);
  assert_eq!(counts.get("documents"), 1);
  assert_eq!(counts.get("comments"), 1);
  assert_eq!(counts.get("chat_sessions"), 1);
  assert_eq!(counts.get("chat_messages"), 2);
  assert_eq!(counts.get("access_tokens"), 1);
  assert_eq!(counts.get("consent_records"), 1);
  assert_eq!(counts.get("data_export_requests"), 0);
  assert_eq!(counts.total(), 9);
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_query_is_most_recent_first_and_filtered() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let actor = Uuid::new_v4();

  for event in [AuditEvent::LoginFailed, AuditEvent::DataExported, AuditEvent::LoginFailed] {
    s.append_audit(NewAuditEntry::new(tenant, event, entity::USER, Some(actor)).by(actor))
      .await
      .unwrap();
  }
  s.append_audit(NewAuditEntry::new(Uuid::new_v4(), AuditEvent::LoginFailed, entity::USER, None))
    .await
    .unwrap();

  let all = s
    .query_audit(&AuditQuery { tenant_id: Some(tenant), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(all.len(), 3);
  assert_eq!(all[0].event, AuditEvent::LoginFailed);
  assert_eq!(all[1].event, AuditEvent::DataExported);

  let failed = s
    .query_audit(&AuditQuery {
      tenant_id: Some(tenant),
      events: vec![AuditEvent::LoginFailed],
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(failed.len(), 2);

  let sensitive = s
    .query_audit(&AuditQuery {
      tenant_id: Some(tenant),
      sensitive_only: true,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(sensitive.len(), 1);
  assert_eq!(sensitive[0].event, AuditEvent::DataExported);

  let paged = s
    .query_audit(&AuditQuery {
      tenant_id: Some(tenant),
      limit: Some(1),
      offset: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(paged.len(), 1);
  assert_eq!(paged[0].entry_id, all[1].entry_id);
}

#[tokio::test]
async fn audit_subject_filter_matches_actor_or_entity() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let subject_id = Uuid::new_v4();

  s.append_audit(
    NewAuditEntry::new(tenant, AuditEvent::SensitiveDataAccessed, entity::USER, None)
      .by(subject_id),
  )
  .await
  .unwrap();
  s.append_audit(NewAuditEntry::new(tenant, AuditEvent::DataDeleted, entity::USER, Some(subject_id)))
    .await
    .unwrap();
  s.append_audit(NewAuditEntry::new(tenant, AuditEvent::DataDeleted, entity::USER, Some(Uuid::new_v4())))
    .await
    .unwrap();

  let history = s
    .query_audit(&AuditQuery { subject_id: Some(subject_id), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn audit_activity_groups_by_event_and_hour() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let subject_id = Uuid::new_v4();

  let mut last = None;
  for event in [AuditEvent::LoginFailed, AuditEvent::LoginFailed, AuditEvent::DataExportRequested] {
    last = Some(
      s.append_audit(NewAuditEntry::new(tenant, event, entity::USER, Some(subject_id)))
        .await
        .unwrap(),
    );
  }
  s.append_audit(NewAuditEntry::new(tenant, AuditEvent::LoginFailed, entity::USER, Some(Uuid::new_v4())))
    .await
    .unwrap();

  let mut buckets = s
    .audit_activity(&AuditQuery {
      tenant_id: Some(tenant),
      subject_id: Some(subject_id),
      ..Default::default()
    })
    .await
    .unwrap();
  buckets.sort_by_key(|b| (b.event.as_ref().to_owned(), b.hour));

  let total: u64 = buckets.iter().map(|b| b.count).sum();
  assert_eq!(total, 3);
  let hour = last.unwrap().created_at.hour();
  if buckets.iter().all(|b| b.hour == hour) {
    assert_eq!(buckets, vec![
      ActivityBucket { event: AuditEvent::DataExportRequested, hour, count: 1 },
      ActivityBucket { event: AuditEvent::LoginFailed, hour, count: 2 },
    ]);
  }
  assert!(buckets.iter().all(|b| b.hour < 24));
}

#[tokio::test]
async fn audit_rows_cannot_be_updated_or_deleted() {
  let s = store().await;
  let entry = s
    .append_audit(NewAuditEntry::new(Uuid::new_v4(), AuditEvent::LoginFailed, entity::USER, None))
    .await
    .unwrap();
  let id = entry.entry_id.to_string();

  let update = s
    .conn
    .call({
      let id = id.clone();
      move |c| {
        Ok(c.execute(
          "UPDATE audit_logs SET event_type = 'DATA_EXPORTED' WHERE entry_id = ?1",
          rusqlite::params![id],
        )?)
      }
    })
    .await;
  assert!(update.is_err());

  let delete = s
    .conn
    .call(move |c| {
      Ok(c.execute("DELETE FROM audit_logs WHERE entry_id = ?1", rusqlite::params![id])?)
    })
    .await;
  assert!(delete.is_err());

  let kept = s.query_audit(&AuditQuery::default()).await.unwrap();
  assert_eq!(kept.len(), 1);
  assert_eq!(kept[0].event, AuditEvent::LoginFailed);
}

#[tokio::test]
async fn audit_metadata_and_capture_roundtrip() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let entry = s
    .append_audit(
      NewAuditEntry::new(tenant, AuditEvent::DataExported, entity::USER, None)
        .metadata(json!({ "itemsCount": 7 }))
        .capture(Some("203.0.113.9".into()), Some("curl/8".into())),
    )
    .await
    .unwrap();

  let stored = s.query_audit(&AuditQuery::default()).await.unwrap();
  assert_eq!(stored, vec![entry]);
  assert_eq!(stored[0].metadata["itemsCount"], 7);
}

// ─── Consent ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn consent_insert_writes_audit_in_same_unit() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;

  let record = ConsentRecord::grant(sub.subject_id, tenant, "marketing");
  let audit = consent_audit(&record, AuditEvent::ConsentGranted);
  let (stored, entry) = s.insert_consent(record.clone(), audit).await.unwrap();

  assert_eq!(stored.consent_id, record.consent_id);
  assert_eq!(entry.entity_id, Some(record.consent_id));
  assert_eq!(
    s.get_consent(record.consent_id).await.unwrap().unwrap().purpose,
    "marketing"
  );
}

#[tokio::test]
async fn revoke_keeps_first_revocation_time() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;

  let record = ConsentRecord::grant(sub.subject_id, tenant, "marketing");
  s.insert_consent(record.clone(), consent_audit(&record, AuditEvent::ConsentGranted))
    .await
    .unwrap();

  let first_at = Utc::now();
  let (first, _) = s
    .revoke_consent(record.consent_id, first_at, consent_audit(&record, AuditEvent::ConsentRevoked))
    .await
    .unwrap()
    .unwrap();
  assert!(!first.granted);
  let first_revoked = first.revoked_at.unwrap();

  let (second, _) = s
    .revoke_consent(
      record.consent_id,
      first_at + Duration::minutes(5),
      consent_audit(&record, AuditEvent::ConsentRevoked),
    )
    .await
    .unwrap()
    .unwrap();
  assert_eq!(second.revoked_at, Some(first_revoked));

  let revocations = s
    .query_audit(&AuditQuery {
      events: vec![AuditEvent::ConsentRevoked],
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(revocations.len(), 2);
}

#[tokio::test]
async fn revoke_missing_consent_returns_none() {
  let s = store().await;
  let record = ConsentRecord::grant(Uuid::new_v4(), Uuid::new_v4(), "marketing");
  let result = s
    .revoke_consent(record.consent_id, Utc::now(), consent_audit(&record, AuditEvent::ConsentRevoked))
    .await
    .unwrap();
  assert!(result.is_none());
  assert!(s.query_audit(&AuditQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_consents_most_recent_first() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;

  let mut older = ConsentRecord::grant(sub.subject_id, tenant, "analytics");
  older.granted_at = Utc::now() - Duration::days(2);
  let newer = ConsentRecord::grant(sub.subject_id, tenant, "marketing");
  for record in [older.clone(), newer.clone()] {
    let audit = consent_audit(&record, AuditEvent::ConsentGranted);
    s.insert_consent(record, audit).await.unwrap();
  }

  let listed = s.list_consents(sub.subject_id, tenant).await.unwrap();
  let purposes: Vec<_> = listed.iter().map(|r| r.purpose.as_str()).collect();
  assert_eq!(purposes, ["marketing", "analytics"]);
  assert!(s.list_consents(sub.subject_id, Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_audit_write_rolls_back_consent() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;

  s.conn
    .call(|c| {
      c.execute_batch("DROP TABLE audit_logs")?;
      Ok(())
    })
    .await
    .unwrap();

  let record = ConsentRecord::grant(sub.subject_id, tenant, "marketing");
  let err = s
    .insert_consent(record.clone(), consent_audit(&record, AuditEvent::ConsentGranted))
    .await
    .unwrap_err();

  assert!(err.is_audit_write());
  assert!(s.get_consent(record.consent_id).await.unwrap().is_none());
}

// ─── Export ──────────────────────────────────────────────────────────────────

fn artifact(request: &ExportRequest, content: &[u8], items: u64) -> ExportArtifact {
  ExportArtifact {
    location:   ExportRequest::artifact_location_for(request.request_id, request.format),
    content:    content.to_vec(),
    size_bytes: content.len() as u64,
    item_count: items,
    sha256:     "00".repeat(32),
  }
}

async fn processing(s: &SqliteStore, sub: &Subject) -> ExportRequest {
  let now = Utc::now();
  let request = ExportRequest::processing(
    sub.subject_id,
    sub.tenant_id,
    ExportFormat::Json,
    now,
    now + Duration::days(7),
  );
  let audit = NewAuditEntry::new(
    sub.tenant_id,
    AuditEvent::DataExportRequested,
    entity::USER,
    Some(sub.subject_id),
  )
  .by(sub.subject_id);
  s.create_export_request(request, audit).await.unwrap().0
}

#[tokio::test]
async fn export_completes_once() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  let request = processing(&s, &sub).await;
  assert_eq!(request.status, ExportStatus::Processing);

  let done_audit =
    NewAuditEntry::new(tenant, AuditEvent::DataExported, entity::USER, Some(sub.subject_id));
  let (done, _) = s
    .complete_export(request.request_id, Utc::now(), artifact(&request, b"{}", 3), done_audit.clone())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(done.status, ExportStatus::Completed);
  assert_eq!(done.item_count, Some(3));
  assert_eq!(done.size_bytes, Some(2));
  assert_eq!(
    done.artifact_location.as_deref(),
    Some(format!("exports/{}.json", request.request_id).as_str())
  );
  assert_eq!(
    s.get_export_artifact(request.request_id).await.unwrap().as_deref(),
    Some(&b"{}"[..])
  );

  // Terminal: neither a second completion nor a failure applies.
  assert!(
    s.complete_export(request.request_id, Utc::now(), artifact(&request, b"{}", 3), done_audit)
      .await
      .unwrap()
      .is_none()
  );
  assert!(s.fail_export(request.request_id, "late".into()).await.unwrap().is_none());

  let exported = s
    .query_audit(&AuditQuery { events: vec![AuditEvent::DataExported], ..Default::default() })
    .await
    .unwrap();
  assert_eq!(exported.len(), 1);
}

#[tokio::test]
async fn export_failure_records_message() {
  let s = store().await;
  let sub = subject(&s, Uuid::new_v4(), "ada@example.com").await;
  let request = processing(&s, &sub).await;

  let failed = s
    .fail_export(request.request_id, "export exceeds maximum artifact size".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(failed.status, ExportStatus::Failed);
  assert_eq!(failed.error_message.as_deref(), Some("export exceeds maximum artifact size"));
  assert!(failed.completed_at.is_none());
  assert!(s.get_export_artifact(request.request_id).await.unwrap().is_none());
}

#[tokio::test]
async fn snapshot_contains_every_section_and_bounded_history() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  populate(&s, &sub).await;
  for _ in 0..5 {
    s.append_audit(
      NewAuditEntry::new(tenant, AuditEvent::SensitiveDataAccessed, entity::USER, None)
        .by(sub.subject_id),
    )
    .await
    .unwrap();
  }

  let snapshot = s.collect_subject_data(sub.subject_id, tenant, 3).await.unwrap().unwrap();
  assert_eq!(snapshot.subject.subject_id, sub.subject_id);
  for table in crate::registered_tables() {
    assert!(snapshot.sections.contains_key(table), "missing section {table}");
  }
  assert_eq!(snapshot.section("chat_messages").len(), 2);
  assert_eq!(snapshot.section(AUDIT_SECTION).len(), 3);
  assert_eq!(snapshot.section("clients")[0]["national_id"], "AB123456C");

  assert!(
    s.collect_subject_data(sub.subject_id, Uuid::new_v4(), 3)
      .await
      .unwrap()
      .is_none()
  );
}

// ─── Anonymization ───────────────────────────────────────────────────────────

fn anonymized_audit(
  tenant: Uuid,
  subject_id: Uuid,
) -> impl FnOnce(&docket_core::erasure::AnonymizationReport) -> NewAuditEntry + Send + 'static {
  move |report| {
    NewAuditEntry::new(tenant, AuditEvent::DataAnonymized, entity::USER, Some(subject_id))
      .metadata(json!({
        "anonymizedFields": report.anonymized_fields,
        "tablesAffected": report.tables_affected,
      }))
  }
}

#[tokio::test]
async fn anonymize_overwrites_and_keeps_rows() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  populate(&s, &sub).await;
  let before = s.count_dependents(sub.subject_id, tenant).await.unwrap();

  let (report, entry) = s
    .anonymize_subject(sub.subject_id, tenant, Utc::now(), anonymized_audit(tenant, sub.subject_id))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(report.tables_affected[0], "users");
  assert!(report.tables_affected.iter().any(|t| t == "clients"));
  assert!(report.tables_affected.iter().all(|t| t != "case_files"));
  assert!(report.anonymized_fields.iter().any(|f| f == "client_national_id"));
  assert_eq!(entry.event, AuditEvent::DataAnonymized);

  let user = s.get_subject(sub.subject_id, tenant).await.unwrap().unwrap();
  assert!(user.is_anonymized());
  assert_eq!(user.name, sentinel::SUBJECT_NAME);
  let profile = s.get_client_profile(sub.subject_id, tenant).await.unwrap().unwrap();
  assert!(profile.is_anonymized());

  let snapshot = s.collect_subject_data(sub.subject_id, tenant, 10).await.unwrap().unwrap();
  assert_eq!(snapshot.section("comments")[0]["content"], sentinel::CONTENT_REMOVED);
  let messages = snapshot.section("chat_messages");
  let assistant = messages.iter().find(|m| m["role"] == "assistant").unwrap();
  assert_eq!(assistant["content"], "Noted.");
  let from_user = messages.iter().find(|m| m["role"] == "user").unwrap();
  assert_eq!(from_user["content"], sentinel::CONTENT_REMOVED);
  assert!(!snapshot.section("access_tokens")[0]["revoked_at"].is_null());

  let after = s.count_dependents(sub.subject_id, tenant).await.unwrap();
  assert_eq!(before, after);
}

#[tokio::test]
async fn anonymize_twice_is_stable() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  populate(&s, &sub).await;

  let (first, _) = s
    .anonymize_subject(sub.subject_id, tenant, Utc::now(), anonymized_audit(tenant, sub.subject_id))
    .await
    .unwrap()
    .unwrap();
  let user_once = s.get_subject(sub.subject_id, tenant).await.unwrap().unwrap();

  let (second, _) = s
    .anonymize_subject(sub.subject_id, tenant, Utc::now(), anonymized_audit(tenant, sub.subject_id))
    .await
    .unwrap()
    .unwrap();
  let user_twice = s.get_subject(sub.subject_id, tenant).await.unwrap().unwrap();

  assert_eq!(first.anonymized_fields, second.anonymized_fields);
  assert_eq!(first.tables_affected, second.tables_affected);
  assert_eq!(user_once.email, user_twice.email);
  assert_eq!(user_once.name, user_twice.name);

  let entries = s
    .query_audit(&AuditQuery { events: vec![AuditEvent::DataAnonymized], ..Default::default() })
    .await
    .unwrap();
  assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn anonymize_unknown_subject_writes_nothing() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let missing = Uuid::new_v4();
  let result = s
    .anonymize_subject(missing, tenant, Utc::now(), anonymized_audit(tenant, missing))
    .await
    .unwrap();
  assert!(result.is_none());
  assert!(s.query_audit(&AuditQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn anonymize_purges_completed_export_artifact() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  let request = processing(&s, &sub).await;
  let audit = NewAuditEntry::new(tenant, AuditEvent::DataExported, entity::USER, Some(sub.subject_id));
  s.complete_export(request.request_id, Utc::now(), artifact(&request, b"{\"pii\":1}", 1), audit)
    .await
    .unwrap()
    .unwrap();

  s.anonymize_subject(sub.subject_id, tenant, Utc::now(), anonymized_audit(tenant, sub.subject_id))
    .await
    .unwrap()
    .unwrap();

  assert!(s.get_export_artifact(request.request_id).await.unwrap().is_none());
  let kept = s.get_export_request(request.request_id).await.unwrap().unwrap();
  assert_eq!(kept.status, ExportStatus::Completed);
}

// ─── Deletion ────────────────────────────────────────────────────────────────

fn deleted_audit(
  tenant: Uuid,
  subject_id: Uuid,
) -> impl FnOnce(&docket_core::erasure::DeletionReport) -> NewAuditEntry + Send + 'static {
  move |report| {
    NewAuditEntry::new(tenant, AuditEvent::DataDeleted, entity::USER, Some(subject_id))
      .metadata(json!({
        "deletedRecords": report.deleted_records,
        "cascadeCount": report.total_deleted,
      }))
  }
}

#[tokio::test]
async fn delete_cascades_and_audit_survives() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  populate(&s, &sub).await;
  let before = s.count_dependents(sub.subject_id, tenant).await.unwrap();

  let (report, entry) = s
    .delete_subject(sub.subject_id, tenant, deleted_audit(tenant, sub.subject_id))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(report.total_deleted, before.total() + 1);
  assert_eq!(report.deleted_records["users"], 1);
  assert_eq!(report.deleted_records["chat_messages"], 2);

  assert!(s.get_subject(sub.subject_id, tenant).await.unwrap().is_none());
  assert!(s.count_dependents(sub.subject_id, tenant).await.unwrap().is_empty());

  let history = s
    .query_audit(&AuditQuery { subject_id: Some(sub.subject_id), ..Default::default() })
    .await
    .unwrap();
  assert!(history.iter().any(|e| e.entry_id == entry.entry_id));
  assert!(history.iter().any(|e| e.event == AuditEvent::ConsentGranted));
  assert_eq!(entry.metadata["cascadeCount"], report.total_deleted);
}

#[tokio::test]
async fn delete_leaves_other_subjects_alone() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let ada = subject(&s, tenant, "ada@example.com").await;
  let bob = subject(&s, tenant, "bob@example.com").await;
  populate(&s, &ada).await;
  populate(&s, &bob).await;

  s.delete_subject(ada.subject_id, tenant, deleted_audit(tenant, ada.subject_id))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(s.count_dependents(bob.subject_id, tenant).await.unwrap().total(), 9);
}

#[tokio::test]
async fn delete_from_wrong_tenant_is_none() {
  let s = store().await;
  let sub = subject(&s, Uuid::new_v4(), "ada@example.com").await;
  let other = Uuid::new_v4();

  let result = s
    .delete_subject(sub.subject_id, other, deleted_audit(other, sub.subject_id))
    .await
    .unwrap();
  assert!(result.is_none());
  assert!(s.get_subject(sub.subject_id, sub.tenant_id).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_audit_write_aborts_deletion() {
  let s = store().await;
  let tenant = Uuid::new_v4();
  let sub = subject(&s, tenant, "ada@example.com").await;
  populate(&s, &sub).await;

  s.conn
    .call(|c| {
      c.execute_batch("DROP TABLE audit_logs")?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s
    .delete_subject(sub.subject_id, tenant, deleted_audit(tenant, sub.subject_id))
    .await
    .unwrap_err();
  assert!(err.is_audit_write());
  assert!(s.get_subject(sub.subject_id, tenant).await.unwrap().is_some());
  assert_eq!(s.count_dependents(sub.subject_id, tenant).await.unwrap().total(), 9);
}
