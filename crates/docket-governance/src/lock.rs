//! Per-subject exclusivity for export, anonymization and deletion.
//!
//! Acquisition never waits: a second request for a subject that is already
//! held fails with [`Error::Busy`].

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, PoisonError},
};

use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct SubjectLocks {
  held: Arc<Mutex<HashSet<Uuid>>>,
}

impl SubjectLocks {
  pub fn try_acquire(&self, subject_id: Uuid) -> Result<SubjectGuard> {
    let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
    if !held.insert(subject_id) {
      tracing::warn!(%subject_id, "compliance operation rejected, subject busy");
      return Err(Error::Busy(subject_id));
    }
    Ok(SubjectGuard { held: Arc::clone(&self.held), subject_id })
  }

  pub fn is_held(&self, subject_id: Uuid) -> bool {
    self
      .held
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(&subject_id)
  }
}

/// Releases the subject when dropped.
pub struct SubjectGuard {
  held:       Arc<Mutex<HashSet<Uuid>>>,
  subject_id: Uuid,
}

impl Drop for SubjectGuard {
  fn drop(&mut self) {
    self
      .held
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.subject_id);
  }
}
