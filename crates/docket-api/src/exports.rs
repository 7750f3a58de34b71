//! Handlers for `/exports` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/exports` | Runs to `completed` or `failed`; 201 either way |
//! | `GET`  | `/exports/:id` | `?tenant_id=`; readable after expiry |
//! | `GET`  | `/exports/:id/artifact` | `?tenant_id=&requested_by=`; 410 once expired |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::Utc;
use docket_core::{export::ExportRequest, store::GovernanceStore};
use docket_governance::Governance;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, requester};

// ─── Create ───────────────────────────────────────────────────────────────────

fn default_format() -> String { "json".to_owned() }

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub subject_id:   Uuid,
  pub tenant_id:    Uuid,
  pub requested_by: Uuid,
  #[serde(default = "default_format")]
  pub format:       String,
}

/// `POST /exports`
pub async fn create<S>(
  State(gov): State<Arc<Governance<S>>>,
  headers: HeaderMap,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GovernanceStore,
{
  let who = requester(body.requested_by, &headers);
  let request = gov
    .exports
    .request_export(body.subject_id, body.tenant_id, &body.format, &who)
    .await?;
  Ok((StatusCode::CREATED, Json(request)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TenantParams {
  pub tenant_id: Uuid,
}

/// `GET /exports/:id?tenant_id=<id>`
pub async fn get_one<S>(
  State(gov): State<Arc<Governance<S>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<TenantParams>,
) -> Result<Json<ExportRequest>, ApiError>
where
  S: GovernanceStore,
{
  let request = gov.exports.get_export_request(id, params.tenant_id).await?;
  Ok(Json(request))
}

// ─── Artifact ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ArtifactParams {
  pub tenant_id:    Uuid,
  pub requested_by: Uuid,
}

/// `GET /exports/:id/artifact?tenant_id=<id>&requested_by=<id>`
///
/// Serves the snapshot as a JSON attachment with its SHA-256 as the `ETag`.
pub async fn artifact<S>(
  State(gov): State<Arc<Governance<S>>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ArtifactParams>,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: GovernanceStore,
{
  let who = requester(params.requested_by, &headers);
  let (request, content) = gov
    .exports
    .download_artifact(id, params.tenant_id, Utc::now(), &who)
    .await?;

  let mut response = (StatusCode::OK, content).into_response();
  let h = response.headers_mut();
  h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
  if let Ok(v) = HeaderValue::from_str(&format!("attachment; filename=\"{id}.json\"")) {
    h.insert(header::CONTENT_DISPOSITION, v);
  }
  if let Some(v) = request
    .artifact_sha256
    .and_then(|sha| HeaderValue::from_str(&format!("\"{sha}\"")).ok())
  {
    h.insert(header::ETAG, v);
  }
  Ok(response)
}
