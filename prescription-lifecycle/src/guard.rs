//! Single-writer guard per patient.
//!
//! Every prescription/subscription pair belongs to one patient, so all
//! read-modify-write cycles on lifecycle state take the patient's lock.
//! Different patients proceed in parallel. Callers must release the guard
//! before talking to an external service.
//!
//! A patient's entry is removed once the last holder or waiter lets go, so
//! the map only tracks patients with work in flight.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PatientLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

/// Held lock for one patient; releasing it prunes the idle entry.
pub struct PatientGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    patient_id: Uuid,
    locks: &'a DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Drop for PatientGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the mutex, so only the map's copy is left
        // when nobody else wants this patient.
        self.locks
            .remove_if(&self.patient_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl PatientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, patient_id: Uuid) -> PatientGuard<'_> {
        let mutex = self.locks.entry(patient_id).or_default().clone();
        PatientGuard {
            guard: Some(mutex.lock_owned().await),
            patient_id,
            locks: &self.locks,
        }
    }

    /// Patients currently holding or waiting for their lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
