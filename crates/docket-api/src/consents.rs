//! Handlers for `/consents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/consents` | `?subject_id=&tenant_id=`, most recent first |
//! | `POST` | `/consents` | Body: [`GrantBody`]; 201 |
//! | `POST` | `/consents/:id/revoke` | Body: [`RevokeBody`]; 404 unless owned |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use docket_core::{consent::ConsentRecord, store::GovernanceStore};
use docket_governance::Governance;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, requester};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub subject_id: Uuid,
  pub tenant_id:  Uuid,
}

/// `GET /consents?subject_id=<id>&tenant_id=<id>`
pub async fn list<S>(
  State(gov): State<Arc<Governance<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ConsentRecord>>, ApiError>
where
  S: GovernanceStore,
{
  let records = gov
    .consents
    .list_consents(params.subject_id, params.tenant_id)
    .await?;
  Ok(Json(records))
}

// ─── Grant ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GrantBody {
  pub subject_id:     Uuid,
  pub tenant_id:      Uuid,
  pub purpose:        String,
  /// The subject itself when granting for themselves.
  pub requested_by:   Uuid,
  pub consent_method: Option<String>,
}

/// `POST /consents`
pub async fn grant<S>(
  State(gov): State<Arc<Governance<S>>>,
  headers: HeaderMap,
  Json(body): Json<GrantBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GovernanceStore,
{
  let who = requester(body.requested_by, &headers);
  let record = gov
    .consents
    .grant_consent(
      body.subject_id,
      body.tenant_id,
      &body.purpose,
      body.consent_method.as_deref(),
      &who,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Revoke ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
  pub subject_id:   Uuid,
  pub tenant_id:    Uuid,
  pub requested_by: Uuid,
}

/// `POST /consents/:id/revoke`
pub async fn revoke<S>(
  State(gov): State<Arc<Governance<S>>>,
  Path(consent_id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<RevokeBody>,
) -> Result<Json<ConsentRecord>, ApiError>
where
  S: GovernanceStore,
{
  let who = requester(body.requested_by, &headers);
  let record = gov
    .consents
    .revoke_consent(consent_id, body.subject_id, body.tenant_id, &who)
    .await?;
  Ok(Json(record))
}
