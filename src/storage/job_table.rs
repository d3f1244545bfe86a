use crate::core::JobId;
use std::collections::HashMap;

/// Slot ↔ external job correlation.
///
/// Keyed by slot so entries survive renames; shifted together with the name
/// index whenever a slot is removed.
#[derive(Debug, Default, Clone)]
pub struct JobTable {
    by_slot: HashMap<usize, JobId>,
    by_job: HashMap<JobId, usize>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `job` to `slot`, dropping whatever either side was bound to before.
    pub fn assign(&mut self, slot: usize, job: JobId) {
        if let Some(previous_job) = self.by_slot.remove(&slot) {
            self.by_job.remove(&previous_job);
        }
        if let Some(previous_slot) = self.by_job.remove(&job) {
            self.by_slot.remove(&previous_slot);
        }
        self.by_slot.insert(slot, job);
        self.by_job.insert(job, slot);
    }

    pub fn job_at(&self, slot: usize) -> Option<JobId> {
        self.by_slot.get(&slot).copied()
    }

    pub fn slot_of(&self, job: JobId) -> Option<usize> {
        self.by_job.get(&job).copied()
    }

    /// Unbinds `job`, returning the slot it was bound to.
    pub fn release(&mut self, job: JobId) -> Option<usize> {
        let slot = self.by_job.remove(&job)?;
        self.by_slot.remove(&slot);
        Some(slot)
    }

    /// Drops the entry of a removed slot and moves every later entry down by one.
    pub fn remove_slot(&mut self, removed: usize) {
        if let Some(job) = self.by_slot.remove(&removed) {
            self.by_job.remove(&job);
        }

        self.by_slot = self
            .by_slot
            .drain()
            .map(|(slot, job)| if slot > removed { (slot - 1, job) } else { (slot, job) })
            .collect();
        for slot in self.by_job.values_mut() {
            if *slot > removed {
                *slot -= 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, JobId)> + '_ {
        self.by_slot.iter().map(|(slot, job)| (*slot, *job))
    }

    pub fn clear(&mut self) {
        self.by_slot.clear();
        self.by_job.clear();
    }
}
