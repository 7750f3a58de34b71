//! Router tests over an in-memory `SqliteStore`.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use docket_core::{
  dependent::NewDependent,
  store::GovernanceStore,
  subject::{NewSubject, SubjectRole},
};
use docket_governance::{DetectorConfig, Governance, GovernanceConfig};
use docket_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::api_router;

struct App {
  store:  Arc<SqliteStore>,
  gov:    Arc<Governance<SqliteStore>>,
  tenant: Uuid,
}

async fn app() -> App {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let config = GovernanceConfig {
    detector: DetectorConfig { off_hours_threshold: u64::MAX, ..DetectorConfig::default() },
    ..GovernanceConfig::default()
  };
  let gov = Arc::new(Governance::new(Arc::clone(&store), config));
  App { store, gov, tenant: Uuid::new_v4() }
}

impl App {
  async fn subject(&self) -> Uuid {
    self
      .store
      .create_subject(NewSubject::new(self.tenant, "ada@example.com", "Ada", SubjectRole::Client))
      .await
      .unwrap()
      .subject_id
  }

  async fn oneshot_raw(
    &self,
    method:  &str,
    uri:     &str,
    headers: Vec<(header::HeaderName, &str)>,
    body:    Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = match body {
      Some(v) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    api_router(Arc::clone(&self.gov)).oneshot(req).await.unwrap()
  }

  async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> Response {
    self.oneshot_raw(method, uri, vec![], body).await
  }
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ── Consents ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn grant_list_revoke() {
  let app = app().await;
  let s = app.subject().await;

  let resp = app
    .oneshot_raw(
      "POST",
      "/consents",
      vec![
        (header::USER_AGENT, "browser/1.0"),
        (header::HeaderName::from_static("x-forwarded-for"), "203.0.113.9, 10.0.0.1"),
      ],
      Some(json!({
        "subject_id": s, "tenant_id": app.tenant, "requested_by": s, "purpose": "marketing"
      })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let granted = json_body(resp).await;
  assert_eq!(granted["granted"], true);
  assert_eq!(granted["ip_address"], "203.0.113.9");
  assert_eq!(granted["user_agent"], "browser/1.0");
  let consent_id = granted["consent_id"].as_str().unwrap().to_owned();

  let resp = app
    .send(
      "POST",
      &format!("/consents/{consent_id}/revoke"),
      Some(json!({ "subject_id": s, "tenant_id": app.tenant, "requested_by": s })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["granted"], false);

  let resp = app
    .send("GET", &format!("/consents?subject_id={s}&tenant_id={}", app.tenant), None)
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let listed = json_body(resp).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
  assert!(!listed[0]["revoked_at"].is_null());
}

#[tokio::test]
async fn revoking_anothers_consent_is_404() {
  let app = app().await;
  let s = app.subject().await;

  let resp = app
    .send(
      "POST",
      "/consents",
      Some(json!({
        "subject_id": s, "tenant_id": app.tenant, "requested_by": s, "purpose": "analytics"
      })),
    )
    .await;
  let consent_id = json_body(resp).await["consent_id"].as_str().unwrap().to_owned();

  let resp = app
    .send(
      "POST",
      &format!("/consents/{consent_id}/revoke"),
      Some(json!({
        "subject_id": Uuid::new_v4(), "tenant_id": app.tenant, "requested_by": s
      })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert_eq!(json_body(resp).await["error"], "consent_not_found");
}

#[tokio::test]
async fn blank_purpose_is_422() {
  let app = app().await;
  let s = app.subject().await;

  let resp = app
    .send(
      "POST",
      "/consents",
      Some(json!({
        "subject_id": s, "tenant_id": app.tenant, "requested_by": s, "purpose": "  "
      })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(json_body(resp).await["error"], "validation_failed");
}

#[tokio::test]
async fn consent_requests_must_name_the_requester() {
  let app = app().await;
  let s = app.subject().await;

  let resp = app
    .send(
      "POST",
      "/consents",
      Some(json!({ "subject_id": s, "tenant_id": app.tenant, "purpose": "marketing" })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

  let resp = app
    .send("GET", &format!("/consents?subject_id={s}&tenant_id={}", app.tenant), None)
    .await;
  assert_eq!(json_body(resp).await, json!([]));
}

// ── Exports ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_then_download_artifact() {
  let app = app().await;
  let s = app.subject().await;
  app
    .store
    .add_dependent(s, app.tenant, NewDependent::Comment { case_file_id: None, content: "hi".into() })
    .await
    .unwrap();

  let resp = app
    .send(
      "POST",
      "/exports",
      Some(json!({ "subject_id": s, "tenant_id": app.tenant, "requested_by": s })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let request = json_body(resp).await;
  assert_eq!(request["status"], "completed");
  assert_eq!(request["format"], "json");
  let id = request["request_id"].as_str().unwrap().to_owned();
  let sha = request["artifact_sha256"].as_str().unwrap().to_owned();

  let resp = app.send("GET", &format!("/exports/{id}?tenant_id={}", app.tenant), None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["request_id"], id.as_str());

  let resp = app
    .send("GET", &format!("/exports/{id}/artifact?tenant_id={}&requested_by={s}", app.tenant), None)
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
  assert_eq!(resp.headers()[header::ETAG].to_str().unwrap(), format!("\"{sha}\""));
  assert!(
    resp.headers()[header::CONTENT_DISPOSITION]
      .to_str()
      .unwrap()
      .contains(&format!("{id}.json"))
  );
  let snapshot = json_body(resp).await;
  assert_eq!(snapshot["subject"]["subject_id"], s.to_string());
}

#[tokio::test]
async fn export_in_another_tenant_is_404() {
  let app = app().await;
  let s = app.subject().await;

  let resp = app
    .send(
      "POST",
      "/exports",
      Some(json!({ "subject_id": s, "tenant_id": app.tenant, "requested_by": s })),
    )
    .await;
  let id = json_body(resp).await["request_id"].as_str().unwrap().to_owned();

  let resp = app
    .send("GET", &format!("/exports/{id}?tenant_id={}", Uuid::new_v4()), None)
    .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_export_format_is_422() {
  let app = app().await;
  let s = app.subject().await;

  let resp = app
    .send(
      "POST",
      "/exports",
      Some(json!({
        "subject_id": s, "tenant_id": app.tenant, "requested_by": s, "format": "xml"
      })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// ── Erasure ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymize_then_delete() {
  let app = app().await;
  let s = app.subject().await;
  let body = json!({ "subject_id": s, "tenant_id": app.tenant, "requested_by": s });

  let resp = app.send("POST", "/anonymizations", Some(body.clone())).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let report = json_body(resp).await;
  assert_eq!(report["tables_affected"][0], "users");

  let resp = app.send("POST", "/deletions", Some(body.clone())).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["total_deleted"], 1);

  let resp = app.send("POST", "/deletions", Some(body)).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert_eq!(json_body(resp).await["error"], "subject_not_found");
}

#[tokio::test]
async fn erasure_while_subject_is_held_is_409() {
  let app = app().await;
  let s = app.subject().await;
  let _guard = app.gov.locks().try_acquire(s).unwrap();

  let resp = app
    .send(
      "POST",
      "/deletions",
      Some(json!({ "subject_id": s, "tenant_id": app.tenant, "requested_by": s })),
    )
    .await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  assert_eq!(json_body(resp).await["error"], "subject_busy");
}

// ── Audit ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_and_filter_audit_entries() {
  let app = app().await;
  let s = app.subject().await;

  for event in ["LOGIN_FAILED", "SENSITIVE_DATA_ACCESSED"] {
    let resp = app
      .send(
        "POST",
        "/audit",
        Some(json!({
          "tenant_id": app.tenant,
          "actor_id": s,
          "event": event,
          "entity_type": "user",
          "entity_id": s,
          "metadata": { "source": "login-form" },
        })),
      )
      .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
  }

  let resp = app
    .send(
      "GET",
      &format!("/audit?tenant_id={}&events=LOGIN_FAILED", app.tenant),
      None,
    )
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let entries = json_body(resp).await;
  assert_eq!(entries.as_array().unwrap().len(), 1);
  assert_eq!(entries[0]["event"], "LOGIN_FAILED");
  assert_eq!(entries[0]["actor_type"], "human");
  assert_eq!(entries[0]["metadata"]["source"], "login-form");

  let resp = app
    .send("GET", &format!("/audit?tenant_id={}&sensitive_only=true", app.tenant), None)
    .await;
  let entries = json_body(resp).await;
  assert_eq!(entries.as_array().unwrap().len(), 1);
  assert_eq!(entries[0]["event"], "SENSITIVE_DATA_ACCESSED");

  let resp = app
    .send("GET", &format!("/audit?tenant_id={}&limit=1&offset=1", app.tenant), None)
    .await;
  let entries = json_body(resp).await;
  assert_eq!(entries.as_array().unwrap().len(), 1);
  assert_eq!(entries[0]["event"], "LOGIN_FAILED");
}

#[tokio::test]
async fn unknown_event_filter_is_400() {
  let app = app().await;
  let resp = app.send("GET", "/audit?events=LOGIN_FAILED,NOT_AN_EVENT", None).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(json_body(resp).await["error"], "bad_request");
}

#[tokio::test]
async fn failed_logins_are_flagged() {
  let app = app().await;
  let s = app.subject().await;
  let uri = format!("/audit/suspicious-activity?subject_id={s}&tenant_id={}", app.tenant);

  let verdict = json_body(app.send("GET", &uri, None).await).await;
  assert_eq!(verdict["suspicious"], false);
  assert!(verdict["alert_entry_id"].is_null());

  for _ in 0..5 {
    app
      .send(
        "POST",
        "/audit",
        Some(json!({
          "tenant_id": app.tenant,
          "actor_id": s,
          "event": "LOGIN_FAILED",
          "entity_type": "user",
          "entity_id": s,
        })),
      )
      .await;
  }

  let resp = app.send("GET", &uri, None).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let verdict = json_body(resp).await;
  assert_eq!(verdict["suspicious"], true);
  assert_eq!(verdict["window_hours"], 24);
  assert_eq!(verdict["flags"], json!(["excessive_failed_logins"]));
  assert!(verdict["alert_entry_id"].is_string());
}

#[tokio::test]
async fn zero_hour_window_is_422() {
  let app = app().await;
  let s = app.subject().await;
  let resp = app
    .send(
      "GET",
      &format!(
        "/audit/suspicious-activity?subject_id={s}&tenant_id={}&window_hours=0",
        app.tenant
      ),
      None,
    )
    .await;
  assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
