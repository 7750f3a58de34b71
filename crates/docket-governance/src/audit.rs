//! The audit ledger: recording, querying, alert forwarding and
//! suspicious-activity detection.
//!
//! A failed ledger write is a failed request. A failed alert is not: alerting
//! is fire-and-forget and is only logged when delivery fails.

use std::sync::Arc;

use chrono::{Duration, Utc};
use docket_core::{
  audit::{
    ActivityBucket, AuditEntry, AuditEvent, AuditQuery, NewAuditEntry, Severity, entity,
  },
  store::GovernanceStore,
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  config::DetectorConfig,
  error::{Error, Result},
};

/// Longest look-back window the detector accepts (90 days).
pub const MAX_WINDOW_HOURS: u32 = 24 * 90;

// ─── Alerting ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("alert delivery failed: {0}")]
pub struct AlertError(pub String);

/// External channel for high-severity ledger entries.
pub trait AlertSink: Send + Sync {
  fn raise_security_alert(
    &self,
    severity: Severity,
    message: &str,
    context: &Value,
  ) -> Result<(), AlertError>;
}

/// Delivers alerts as `tracing` events under the `security_alert` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
  fn raise_security_alert(
    &self,
    severity: Severity,
    message: &str,
    context: &Value,
  ) -> Result<(), AlertError> {
    match severity {
      Severity::Critical => tracing::error!(
        target: "security_alert",
        severity = severity.as_ref(),
        %context,
        "{message}"
      ),
      _ => tracing::warn!(
        target: "security_alert",
        severity = severity.as_ref(),
        %context,
        "{message}"
      ),
    }
    Ok(())
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

pub struct AuditLedger<S> {
  store:              Arc<S>,
  sink:               Arc<dyn AlertSink>,
  alert_min_severity: Severity,
  detector:           DetectorConfig,
}

impl<S> Clone for AuditLedger<S> {
  fn clone(&self) -> Self {
    Self {
      store:              Arc::clone(&self.store),
      sink:               Arc::clone(&self.sink),
      alert_min_severity: self.alert_min_severity,
      detector:           self.detector.clone(),
    }
  }
}

impl<S: GovernanceStore> AuditLedger<S> {
  pub fn new(
    store: Arc<S>,
    sink: Arc<dyn AlertSink>,
    alert_min_severity: Severity,
    detector: DetectorConfig,
  ) -> Self {
    Self { store, sink, alert_min_severity, detector }
  }

  /// Append one entry. Store failures propagate as [`Error::AuditWrite`].
  pub async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
    if entry.entity_type.trim().is_empty() {
      return Err(Error::Validation("entity type must not be empty".into()));
    }
    let entry = self
      .store
      .append_audit(entry)
      .await
      .map_err(|e| Error::AuditWrite(Box::new(e)))?;
    self.forward(&entry);
    Ok(entry)
  }

  /// Entries matching `query`, most recent first.
  pub async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
    self.store.query_audit(query).await.map_err(Error::store)
  }

  /// Hand an already committed entry to the alert sink if it is severe
  /// enough. Delivery failures are logged and otherwise ignored.
  pub(crate) fn forward(&self, entry: &AuditEntry) {
    if entry.severity < self.alert_min_severity {
      return;
    }
    let context = json!({
      "entryId": entry.entry_id,
      "tenantId": entry.tenant_id,
      "event": entry.event,
      "actorId": entry.actor_id,
      "entityType": entry.entity_type,
      "entityId": entry.entity_id,
      "metadata": entry.metadata,
    });
    let message = format!("{} recorded", entry.event.as_ref());
    if let Err(e) = self.sink.raise_security_alert(entry.severity, &message, &context) {
      tracing::warn!(entry_id = %entry.entry_id, error = %e, "security alert not delivered");
    }
  }

  /// Scan the subject's entries from the last `window_hours` against the
  /// detector thresholds. If any threshold is reached a
  /// `SUSPICIOUS_ACTIVITY_DETECTED` entry is appended (and alerted).
  pub async fn detect_suspicious_activity(
    &self,
    subject_id: Uuid,
    tenant_id: Uuid,
    window_hours: u32,
  ) -> Result<SuspicionVerdict> {
    if window_hours == 0 || window_hours > MAX_WINDOW_HOURS {
      return Err(Error::Validation(format!(
        "window_hours must be between 1 and {MAX_WINDOW_HOURS}"
      )));
    }

    let buckets = self
      .store
      .audit_activity(&AuditQuery {
        tenant_id: Some(tenant_id),
        subject_id: Some(subject_id),
        since: Some(Utc::now() - Duration::hours(i64::from(window_hours))),
        ..Default::default()
      })
      .await
      .map_err(Error::store)?;

    let counts = ActivityCounts::tally(&buckets, &self.detector);
    let flags = counts.flags(&self.detector);

    let mut verdict = SuspicionVerdict {
      subject_id,
      tenant_id,
      window_hours,
      suspicious: !flags.is_empty(),
      flags,
      counts,
      alert_entry_id: None,
    };

    if verdict.suspicious {
      let entry = self
        .record(
          NewAuditEntry::new(
            tenant_id,
            AuditEvent::SuspiciousActivityDetected,
            entity::USER,
            Some(subject_id),
          )
          .metadata(json!({
            "windowHours": window_hours,
            "flags": verdict.flags,
            "counts": verdict.counts,
          })),
        )
        .await?;
      tracing::warn!(
        %subject_id,
        %tenant_id,
        flags = verdict.flags.len(),
        "suspicious activity detected"
      );
      verdict.alert_entry_id = Some(entry.entry_id);
    }

    Ok(verdict)
  }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionFlag {
  ExcessiveFailedLogins,
  ExcessiveExports,
  OffHoursActivity,
  ExcessiveSensitiveReads,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounts {
  pub failed_logins:   u64,
  pub exports:         u64,
  pub off_hours:       u64,
  pub sensitive_reads: u64,
}

impl ActivityCounts {
  /// Earlier detector verdicts are not themselves counted as activity.
  fn tally(buckets: &[ActivityBucket], detector: &DetectorConfig) -> Self {
    let mut counts = Self::default();
    for bucket in buckets {
      match bucket.event {
        AuditEvent::SuspiciousActivityDetected => continue,
        AuditEvent::LoginFailed => counts.failed_logins += bucket.count,
        AuditEvent::DataExportRequested => counts.exports += bucket.count,
        AuditEvent::SensitiveDataAccessed => counts.sensitive_reads += bucket.count,
        _ => {}
      }
      if detector.is_off_hours(bucket.hour) {
        counts.off_hours += bucket.count;
      }
    }
    counts
  }

  fn flags(&self, detector: &DetectorConfig) -> Vec<SuspicionFlag> {
    [
      (self.failed_logins >= detector.failed_login_threshold, SuspicionFlag::ExcessiveFailedLogins),
      (self.exports >= detector.export_threshold, SuspicionFlag::ExcessiveExports),
      (self.off_hours >= detector.off_hours_threshold, SuspicionFlag::OffHoursActivity),
      (
        self.sensitive_reads >= detector.sensitive_read_threshold,
        SuspicionFlag::ExcessiveSensitiveReads,
      ),
    ]
    .into_iter()
    .filter_map(|(hit, flag)| hit.then_some(flag))
    .collect()
  }
}

/// Result of [`AuditLedger::detect_suspicious_activity`].
#[derive(Debug, Clone, Serialize)]
pub struct SuspicionVerdict {
  pub subject_id:     Uuid,
  pub tenant_id:      Uuid,
  pub window_hours:   u32,
  pub suspicious:     bool,
  pub flags:          Vec<SuspicionFlag>,
  pub counts:         ActivityCounts,
  /// The `SUSPICIOUS_ACTIVITY_DETECTED` entry appended, if any.
  pub alert_entry_id: Option<Uuid>,
}
