//! Handlers for `/audit` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/audit` | Filtered, paginated; most recent first |
//! | `POST` | `/audit` | Append an entry from an integrating service; 201 |
//! | `GET`  | `/audit/suspicious-activity` | `?subject_id=&tenant_id=&window_hours=` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use docket_core::{
  audit::{AuditEntry, AuditEvent, AuditQuery, NewAuditEntry, Severity},
  store::GovernanceStore,
};
use docket_governance::{Governance, SuspicionVerdict};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, requester};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub tenant_id:      Option<Uuid>,
  pub actor_id:       Option<Uuid>,
  pub subject_id:     Option<Uuid>,
  /// Comma-separated event names, e.g. `LOGIN_FAILED,DATA_EXPORTED`.
  pub events:         Option<String>,
  pub entity_type:    Option<String>,
  pub entity_id:      Option<Uuid>,
  pub since:          Option<DateTime<Utc>>,
  pub until:          Option<DateTime<Utc>>,
  #[serde(default)]
  pub sensitive_only: bool,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

impl ListParams {
  fn into_query(self) -> Result<AuditQuery, ApiError> {
    let events = match self.events.as_deref() {
      None => Vec::new(),
      Some(raw) => raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| AuditEvent::parse(s).map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect::<Result<_, _>>()?,
    };

    Ok(AuditQuery {
      tenant_id: self.tenant_id,
      actor_id: self.actor_id,
      subject_id: self.subject_id,
      events,
      entity_type: self.entity_type,
      entity_id: self.entity_id,
      since: self.since,
      until: self.until,
      sensitive_only: self.sensitive_only,
      limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)),
      offset: self.offset,
    })
  }
}

/// `GET /audit`
pub async fn list<S>(
  State(gov): State<Arc<Governance<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: GovernanceStore,
{
  let query = params.into_query()?;
  let entries = gov.audit.query(&query).await?;
  Ok(Json(entries))
}

// ─── Record ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordBody {
  pub tenant_id:   Uuid,
  /// Absent for system-attributed entries.
  pub actor_id:    Option<Uuid>,
  pub event:       AuditEvent,
  pub entity_type: String,
  pub entity_id:   Option<Uuid>,
  pub metadata:    Option<serde_json::Value>,
  /// Overrides the event's default severity.
  pub severity:    Option<Severity>,
}

/// `POST /audit`
pub async fn record<S>(
  State(gov): State<Arc<Governance<S>>>,
  headers: HeaderMap,
  Json(body): Json<RecordBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GovernanceStore,
{
  let mut entry =
    NewAuditEntry::new(body.tenant_id, body.event, body.entity_type, body.entity_id);
  if let Some(actor_id) = body.actor_id {
    let who = requester(actor_id, &headers);
    entry = entry.by(actor_id).capture(who.ip_address, who.user_agent);
  }
  if let Some(metadata) = body.metadata {
    entry = entry.metadata(metadata);
  }
  if let Some(severity) = body.severity {
    entry = entry.severity(severity);
  }

  let stored = gov.audit.record(entry).await?;
  Ok((StatusCode::CREATED, Json(stored)))
}

// ─── Suspicious activity ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SuspicionParams {
  pub subject_id:   Uuid,
  pub tenant_id:    Uuid,
  pub window_hours: Option<u32>,
}

/// `GET /audit/suspicious-activity?subject_id=<id>&tenant_id=<id>`
pub async fn suspicious_activity<S>(
  State(gov): State<Arc<Governance<S>>>,
  Query(params): Query<SuspicionParams>,
) -> Result<Json<SuspicionVerdict>, ApiError>
where
  S: GovernanceStore,
{
  let verdict = gov
    .audit
    .detect_suspicious_activity(
      params.subject_id,
      params.tenant_id,
      params.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS),
    )
    .await?;
  Ok(Json(verdict))
}
