//! Tunables for the governance components.
//!
//! Every field has a serde default, so an empty `[governance]` table (or none
//! at all) yields [`GovernanceConfig::default`].

use docket_core::audit::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
  /// Days until a completed export's artifact stops being served.
  pub export_expiry_days:         i64,
  /// Most recent audit entries included in an export snapshot.
  pub export_audit_history_limit: usize,
  /// Serialized snapshots larger than this fail the export.
  pub max_export_bytes:           u64,
  /// Entries at or above this severity are forwarded to the alert sink.
  pub alert_min_severity:         Severity,
  pub detector:                   DetectorConfig,
}

impl Default for GovernanceConfig {
  fn default() -> Self {
    Self {
      export_expiry_days:         7,
      export_audit_history_limit: 1000,
      max_export_bytes:           64 * 1024 * 1024,
      alert_min_severity:         Severity::High,
      detector:                   DetectorConfig::default(),
    }
  }
}

/// Thresholds for suspicious-activity detection. A count reaching its
/// threshold raises the corresponding flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub failed_login_threshold:   u64,
  pub export_threshold:         u64,
  pub off_hours_threshold:      u64,
  pub sensitive_read_threshold: u64,
  /// First UTC hour of normal activity, inclusive.
  pub normal_hours_start:       u32,
  /// UTC hour normal activity ends, exclusive.
  pub normal_hours_end:         u32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      failed_login_threshold:   5,
      export_threshold:         20,
      off_hours_threshold:      10,
      sensitive_read_threshold: 100,
      normal_hours_start:       6,
      normal_hours_end:         22,
    }
  }
}

impl DetectorConfig {
  /// Whether `hour` (0–23, UTC) falls outside the normal window. A window
  /// with `start > end` wraps past midnight.
  pub fn is_off_hours(&self, hour: u32) -> bool {
    let (start, end) = (self.normal_hours_start, self.normal_hours_end);
    let inside = if start <= end {
      (start..end).contains(&hour)
    } else {
      hour >= start || hour < end
    };
    !inside
  }
}
