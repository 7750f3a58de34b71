//! Handlers for the right-to-erasure endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/anonymizations` | Overwrite with sentinels; rows are kept |
//! | `POST` | `/deletions` | Cascading delete; ledger entries survive |
//!
//! Both take [`ErasureBody`] and answer 409 while another export or erasure
//! holds the subject.

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::HeaderMap,
};
use docket_core::{
  erasure::{AnonymizationReport, DeletionReport},
  store::GovernanceStore,
};
use docket_governance::Governance;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, requester};

#[derive(Debug, Deserialize)]
pub struct ErasureBody {
  pub subject_id:   Uuid,
  pub tenant_id:    Uuid,
  pub requested_by: Uuid,
}

/// `POST /anonymizations`
pub async fn anonymize<S>(
  State(gov): State<Arc<Governance<S>>>,
  headers: HeaderMap,
  Json(body): Json<ErasureBody>,
) -> Result<Json<AnonymizationReport>, ApiError>
where
  S: GovernanceStore,
{
  let who = requester(body.requested_by, &headers);
  let report = gov
    .anonymizer
    .anonymize_user(body.subject_id, body.tenant_id, &who)
    .await?;
  Ok(Json(report))
}

/// `POST /deletions`
pub async fn delete<S>(
  State(gov): State<Arc<Governance<S>>>,
  headers: HeaderMap,
  Json(body): Json<ErasureBody>,
) -> Result<Json<DeletionReport>, ApiError>
where
  S: GovernanceStore,
{
  let who = requester(body.requested_by, &headers);
  let report = gov
    .deleter
    .delete_user_data(body.subject_id, body.tenant_id, &who)
    .await?;
  Ok(Json(report))
}
