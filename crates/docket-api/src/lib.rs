//! JSON REST API for the Docket governance core.
//!
//! Exposes an axum [`Router`] backed by a [`Governance`] over any
//! [`GovernanceStore`]. Authentication, TLS and transport concerns are the
//! caller's responsibility; the caller identity arrives as `requested_by`.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", docket_api::api_router(governance.clone()))
//! ```

pub mod audit;
pub mod consents;
pub mod erasure;
pub mod error;
pub mod exports;

use std::sync::Arc;

use axum::{
  Router,
  http::{HeaderMap, header},
  routing::{get, post},
};
use docket_core::store::GovernanceStore;
use docket_governance::{Governance, Requester};
use uuid::Uuid;

pub use error::ApiError;

/// Build a fully-materialised API router for `governance`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(governance: Arc<Governance<S>>) -> Router<()>
where
  S: GovernanceStore + 'static,
{
  Router::new()
    // Consent
    .route("/consents", get(consents::list::<S>).post(consents::grant::<S>))
    .route("/consents/{id}/revoke", post(consents::revoke::<S>))
    // Export
    .route("/exports", post(exports::create::<S>))
    .route("/exports/{id}", get(exports::get_one::<S>))
    .route("/exports/{id}/artifact", get(exports::artifact::<S>))
    // Erasure
    .route("/anonymizations", post(erasure::anonymize::<S>))
    .route("/deletions", post(erasure::delete::<S>))
    // Audit
    .route("/audit", get(audit::list::<S>).post(audit::record::<S>))
    .route("/audit/suspicious-activity", get(audit::suspicious_activity::<S>))
    .with_state(governance)
}

/// The requester for `actor_id`, with capture metadata from the request
/// headers. The client address is the first `X-Forwarded-For` hop.
pub(crate) fn requester(actor_id: Uuid, headers: &HeaderMap) -> Requester {
  let ip_address = headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned);
  let user_agent = headers
    .get(header::USER_AGENT)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned);
  Requester::new(actor_id).with_capture(ip_address, user_agent)
}

#[cfg(test)]
mod tests;
