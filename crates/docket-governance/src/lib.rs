//! The Docket personal-data governance components.
//!
//! [`Governance`] wires the five components over one shared
//! [`GovernanceStore`]:
//!
//! - [`AuditLedger`]: append-only ledger, alert forwarding, detection
//! - [`ConsentLedger`]: grant, revoke and list consent records
//! - [`ExportOrchestrator`]: subject data export with a request lifecycle
//! - [`AnonymizationEngine`]: sentinel overwrite keeping every row
//! - [`DeletionEngine`]: counted, audited cascading erasure
//!
//! Export, anonymization and deletion share one set of per-subject locks, so
//! at most one of them runs for a given subject at a time.

pub mod anonymize;
pub mod audit;
pub mod config;
pub mod consent;
pub mod delete;
pub mod error;
pub mod export;
mod lock;

use std::sync::Arc;

use docket_core::{audit::NewAuditEntry, store::GovernanceStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use anonymize::AnonymizationEngine;
pub use audit::{AlertSink, AuditLedger, SuspicionVerdict, TracingAlertSink};
pub use config::{DetectorConfig, GovernanceConfig};
pub use consent::ConsentLedger;
pub use delete::DeletionEngine;
pub use error::{Error, Result};
pub use export::ExportOrchestrator;
pub use lock::{SubjectGuard, SubjectLocks};

/// Who is asking, and from where. Stamped onto every audit entry the request
/// produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
  pub actor_id:   Uuid,
  #[serde(default)]
  pub ip_address: Option<String>,
  #[serde(default)]
  pub user_agent: Option<String>,
}

impl Requester {
  pub fn new(actor_id: Uuid) -> Self {
    Self { actor_id, ip_address: None, user_agent: None }
  }

  pub fn with_capture(
    mut self,
    ip_address: Option<String>,
    user_agent: Option<String>,
  ) -> Self {
    self.ip_address = ip_address;
    self.user_agent = user_agent;
    self
  }

  pub(crate) fn stamp(&self, entry: NewAuditEntry) -> NewAuditEntry {
    entry
      .by(self.actor_id)
      .capture(self.ip_address.clone(), self.user_agent.clone())
  }
}

/// All governance components over one store.
pub struct Governance<S> {
  pub audit:      AuditLedger<S>,
  pub consents:   ConsentLedger<S>,
  pub exports:    ExportOrchestrator<S>,
  pub anonymizer: AnonymizationEngine<S>,
  pub deleter:    DeletionEngine<S>,
  locks:          SubjectLocks,
}

impl<S: GovernanceStore> Governance<S> {
  /// Components alerting through [`TracingAlertSink`].
  pub fn new(store: Arc<S>, config: GovernanceConfig) -> Self {
    Self::with_alert_sink(store, config, Arc::new(TracingAlertSink))
  }

  pub fn with_alert_sink(
    store: Arc<S>,
    config: GovernanceConfig,
    sink: Arc<dyn AlertSink>,
  ) -> Self {
    let locks = SubjectLocks::default();
    let audit = AuditLedger::new(
      Arc::clone(&store),
      sink,
      config.alert_min_severity,
      config.detector.clone(),
    );

    Self {
      consents: ConsentLedger::new(Arc::clone(&store), audit.clone()),
      exports: ExportOrchestrator::new(
        Arc::clone(&store),
        audit.clone(),
        locks.clone(),
        &config,
      ),
      anonymizer: AnonymizationEngine::new(
        Arc::clone(&store),
        audit.clone(),
        locks.clone(),
      ),
      deleter: DeletionEngine::new(store, audit.clone(), locks.clone()),
      audit,
      locks,
    }
  }

  /// The lock set shared by export, anonymization and deletion.
  pub fn locks(&self) -> &SubjectLocks { &self.locks }
}
