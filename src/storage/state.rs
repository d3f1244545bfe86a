//! The in-memory side of a record store: backing sequence, both indices, the
//! selection cursor and the job table, mutated together as one unit.
//!
//! Nothing here locks or performs I/O. `RecordManager` wraps a `StoreState`
//! in a single `RwLock` and turns the returned records into persistence jobs.

use super::{CursorShift, JobTable, NameIndex, RecencyIndex, SelectionCursor};
use crate::core::naming::{self, storage_key};
use crate::core::{JobId, Record, RecordPayload, Result, StoreError, Timestamp};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::warn;

#[derive(Debug, Clone)]
struct Entry<P> {
    record: Record<P>,
    key: String,
    /// Payload as last confirmed on disk; `None` until the first successful save.
    persisted: Option<P>,
}

/// Result of a bulk hydration.
#[derive(Debug, Clone)]
pub struct Hydration<P> {
    pub loaded: usize,
    /// Names of superseded duplicates whose artifacts should be removed.
    pub stale: Vec<String>,
    /// Default record synthesized because nothing usable was loaded.
    pub seeded: Option<Record<P>>,
}

#[derive(Debug, Clone)]
pub struct Renamed<P> {
    pub record: Record<P>,
    pub previous_name: String,
}

impl<P> Renamed<P> {
    pub fn name_changed(&self) -> bool {
        self.record.name != self.previous_name
    }
}

#[derive(Debug, Clone)]
pub struct Deleted<P> {
    pub removed: Record<P>,
    pub seeded: Option<Record<P>>,
}

#[derive(Debug, Clone)]
pub struct StoreState<P> {
    entries: Vec<Entry<P>>,
    names: NameIndex,
    recency: RecencyIndex,
    cursor: SelectionCursor,
    jobs: JobTable,
    next_id: u64,
    revision: u64,
}

impl<P: RecordPayload> Default for StoreState<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RecordPayload> StoreState<P> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: NameIndex::new(),
            recency: RecencyIndex::new(),
            cursor: SelectionCursor::new(),
            jobs: JobTable::new(),
            next_id: 1,
            revision: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Stamps the mutation currently in progress.
    pub fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    // ------------------------------------------------------------------
    // Hydration
    // ------------------------------------------------------------------

    /// Replaces the whole state with `records`, rebuilding every index.
    ///
    /// Duplicates (same id, same name or same storage key) keep the newest
    /// copy. The selection and job bindings survive by name where possible.
    pub fn hydrate(&mut self, records: Vec<Record<P>>, now: Timestamp) -> Hydration<P> {
        let previous_current = self.current_name().map(str::to_string);
        let previous_jobs: Vec<(String, JobId)> = self
            .jobs
            .iter()
            .filter_map(|(slot, job)| self.entries.get(slot).map(|e| (e.record.name.clone(), job)))
            .collect();

        let max_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        let (valid, invalid): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|record| naming::is_valid_name(&record.name));
        for record in &invalid {
            warn!("skipping {} record with invalid name '{}'", P::KIND, record.name);
        }

        let (kept, mut dropped) = keep_newest(valid, |r| r.id);
        let (kept, more) = keep_newest(kept, |r| r.name.clone());
        dropped.extend(more);
        let (kept, more) = keep_newest(kept, |r| storage_key(&r.name));
        dropped.extend(more);

        let live_keys: HashSet<String> = kept.iter().map(|r| storage_key(&r.name)).collect();
        let mut stale: Vec<String> = Vec::new();
        for record in &dropped {
            warn!(
                "dropping duplicate {} record '{}' (id {})",
                P::KIND,
                record.name,
                record.id
            );
            if !live_keys.contains(&storage_key(&record.name)) && !stale.contains(&record.name) {
                stale.push(record.name.clone());
            }
        }

        self.entries.clear();
        self.names.clear();
        self.recency.clear();
        self.cursor.clear();
        self.jobs.clear();

        let loaded = kept.len();
        self.next_id = self.next_id.max(max_id + 1);

        for (slot, mut record) in kept.into_iter().enumerate() {
            record.slot = slot;
            self.names.insert(record.name.clone(), slot);
            self.recency.insert(record.last_modified, &record.name);
            self.entries.push(Entry {
                key: storage_key(&record.name),
                persisted: Some(record.payload.clone()),
                record,
            });
        }

        for (name, job) in previous_jobs {
            if let Some(slot) = self.names.get(&name) {
                self.jobs.assign(slot, job);
            }
        }

        let seeded = self.ensure_seeded(now);
        if seeded.is_none() {
            match previous_current.and_then(|name| self.names.get(&name)) {
                Some(slot) => self.cursor.select(slot),
                None => {
                    self.select_most_recent();
                }
            }
        }

        Hydration {
            loaded,
            stale,
            seeded,
        }
    }

    /// Synthesizes and selects the default record when the store is empty.
    pub fn ensure_seeded(&mut self, now: Timestamp) -> Option<Record<P>> {
        if !self.entries.is_empty() {
            return None;
        }
        let slot = self.insert(P::DEFAULT_NAME.to_string(), P::seed(), now);
        self.cursor.select(slot);
        Some(self.entries[slot].record.clone())
    }

    // ------------------------------------------------------------------
    // Structural mutations
    // ------------------------------------------------------------------

    fn insert(&mut self, name: String, payload: P, now: Timestamp) -> usize {
        let slot = self.entries.len();
        let id = self.next_id;
        self.next_id += 1;

        self.names.insert(name.clone(), slot);
        self.recency.insert(now, &name);
        let mut record = Record::new(id, name, now, payload);
        record.slot = slot;
        self.entries.push(Entry {
            key: storage_key(&record.name),
            persisted: None,
            record,
        });
        slot
    }

    /// True when `name` (or its storage key) belongs to a live record other than `except`.
    pub fn is_taken(&self, name: &str, except: Option<usize>) -> bool {
        if let Some(slot) = self.names.get(name) {
            return Some(slot) != except;
        }
        let key = storage_key(name);
        self.entries
            .iter()
            .any(|entry| Some(entry.record.slot) != except && entry.key == key)
    }

    /// Adds a record under a unique name derived from `hint` and selects it.
    pub fn create(&mut self, hint: &str, payload: P, now: Timestamp) -> Record<P> {
        let base = naming::clean_hint(hint, P::DEFAULT_NAME);
        let mut name = base.clone();
        let mut n = 1;
        while self.is_taken(&name, None) {
            name = naming::with_suffix(&base, n);
            n += 1;
        }

        let slot = self.insert(name, payload, now);
        self.cursor.select(slot);
        self.entries[slot].record.clone()
    }

    /// Adds a record under exactly `name`, without touching the selection.
    pub fn insert_named(&mut self, name: &str, payload: P, now: Timestamp) -> Result<Record<P>> {
        if !naming::is_valid_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if self.is_taken(name, None) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }
        let slot = self.insert(name.to_string(), payload, now);
        Ok(self.entries[slot].record.clone())
    }

    pub fn rename(&mut self, old: &str, new: &str, now: Timestamp) -> Result<Renamed<P>> {
        let slot = self
            .names
            .get(old)
            .ok_or_else(|| StoreError::NotFound(old.to_string()))?;
        if !naming::is_valid_name(new) {
            return Err(StoreError::InvalidName(new.to_string()));
        }
        if new != old && self.is_taken(new, Some(slot)) {
            return Err(StoreError::DuplicateName(new.to_string()));
        }

        let entry = &mut self.entries[slot];
        self.recency.remove(entry.record.last_modified, old);
        if new != old {
            self.names.rename(old, new);
            entry.record.name = new.to_string();
            entry.key = storage_key(new);
        }
        entry.record.last_modified = now;
        self.recency.insert(now, new);

        Ok(Renamed {
            record: entry.record.clone(),
            previous_name: old.to_string(),
        })
    }

    /// Applies `f` to the payload of `name` and refreshes its timestamp.
    pub fn modify<F>(&mut self, name: &str, now: Timestamp, f: F) -> Result<Record<P>>
    where
        F: FnOnce(&mut P),
    {
        let slot = self
            .names
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        f(&mut self.entries[slot].record.payload);
        self.restamp(slot, now);
        Ok(self.entries[slot].record.clone())
    }

    pub fn update_payload(&mut self, name: &str, payload: P, now: Timestamp) -> Result<Record<P>> {
        self.modify(name, now, |current| *current = payload)
    }

    pub fn touch(&mut self, name: &str, now: Timestamp) -> Result<Record<P>> {
        self.modify(name, now, |_| {})
    }

    fn restamp(&mut self, slot: usize, now: Timestamp) {
        let record = &mut self.entries[slot].record;
        self.recency.remove(record.last_modified, &record.name);
        record.last_modified = now;
        self.recency.insert(now, &record.name);
    }

    /// Removes `name`, renumbering every later slot in all indices.
    pub fn delete(&mut self, name: &str, now: Timestamp) -> Result<Deleted<P>> {
        let slot = self
            .names
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let removed = self.entries.remove(slot).record;
        self.names.remove(name);
        self.recency.remove(removed.last_modified, name);

        for entry in &mut self.entries[slot..] {
            entry.record.slot -= 1;
        }
        self.names.shift_after(slot);
        self.jobs.remove_slot(slot);

        let shift = self.cursor.on_slot_removed(slot);
        let seeded = self.ensure_seeded(now);
        if seeded.is_none() && shift == CursorShift::Orphaned {
            self.select_most_recent();
        }

        Ok(Deleted { removed, seeded })
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn select(&mut self, name: &str) -> Result<()> {
        let slot = self
            .names
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        self.cursor.select(slot);
        Ok(())
    }

    /// Moves the cursor to the head of the recency order.
    pub fn select_most_recent(&mut self) -> Option<String> {
        let name = self.recency.first()?.name.clone();
        let slot = self.names.get(&name)?;
        self.cursor.select(slot);
        Some(name)
    }

    pub fn most_recent(&self) -> Option<&str> {
        self.recency.first().map(|key| key.name.as_str())
    }

    pub fn current_slot(&self) -> Option<usize> {
        self.cursor.slot()
    }

    pub fn current(&self) -> Option<&Record<P>> {
        self.cursor
            .slot()
            .and_then(|slot| self.entries.get(slot))
            .map(|entry| &entry.record)
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current().map(|record| record.name.as_str())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        let Some(entry) = self.cursor.slot().and_then(|slot| self.entries.get(slot)) else {
            return false;
        };
        entry.persisted.as_ref() != Some(&entry.record.payload)
    }

    /// Restores the current payload to its persisted snapshot.
    pub fn revert_current(&mut self) -> Option<Record<P>> {
        let entry = self.cursor.slot().and_then(|slot| self.entries.get_mut(slot))?;
        let persisted = entry.persisted.clone()?;
        entry.record.payload = persisted;
        Some(entry.record.clone())
    }

    /// Records that `payload` reached disk for the record with `id`.
    pub fn mark_persisted(&mut self, id: u64, payload: P) -> bool {
        match self.entries.iter_mut().find(|entry| entry.record.id == id) {
            Some(entry) => {
                entry.persisted = Some(payload);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&Record<P>> {
        self.names
            .get(name)
            .and_then(|slot| self.entries.get(slot))
            .map(|entry| &entry.record)
    }

    pub fn get_by_id(&self, id: u64) -> Option<&Record<P>> {
        self.entries
            .iter()
            .map(|entry| &entry.record)
            .find(|record| record.id == id)
    }

    pub fn record_at(&self, slot: usize) -> Option<&Record<P>> {
        self.entries.get(slot).map(|entry| &entry.record)
    }

    pub fn ordered(&self) -> Vec<Record<P>> {
        self.recency
            .iter()
            .filter_map(|key| self.get(&key.name))
            .cloned()
            .collect()
    }

    pub fn sorted_position(&self, name: &str) -> Option<usize> {
        self.recency.position(name)
    }

    pub fn find_at(&self, at: Timestamp) -> Option<&Record<P>> {
        self.recency.find_at(at).and_then(|key| self.get(&key.name))
    }

    // ------------------------------------------------------------------
    // Job correlation
    // ------------------------------------------------------------------

    pub fn assign_current_job(&mut self, job: JobId) -> bool {
        match self.cursor.slot() {
            Some(slot) => {
                self.jobs.assign(slot, job);
                true
            }
            None => false,
        }
    }

    pub fn release_job(&mut self, job: JobId) -> bool {
        self.jobs.release(job).is_some()
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.cursor.slot().and_then(|slot| self.jobs.job_at(slot))
    }

    pub fn job_for(&self, name: &str) -> Option<JobId> {
        self.names.get(name).and_then(|slot| self.jobs.job_at(slot))
    }

    pub fn job_at(&self, slot: usize) -> Option<JobId> {
        self.jobs.job_at(slot)
    }

    pub fn name_for_job(&self, job: JobId) -> Option<&str> {
        self.jobs
            .slot_of(job)
            .and_then(|slot| self.entries.get(slot))
            .map(|entry| entry.record.name.as_str())
    }

    // ------------------------------------------------------------------
    // Consistency
    // ------------------------------------------------------------------

    /// Checks every structural invariant, describing the first violation found.
    pub fn verify(&self) -> std::result::Result<(), String> {
        let n = self.entries.len();
        if self.names.len() != n {
            return Err(format!("name index has {} entries for {} records", self.names.len(), n));
        }
        if self.recency.len() != n {
            return Err(format!("recency index has {} entries for {} records", self.recency.len(), n));
        }
        for (position, entry) in self.entries.iter().enumerate() {
            let record = &entry.record;
            if record.slot != position {
                return Err(format!("record '{}' at {} claims slot {}", record.name, position, record.slot));
            }
            if self.names.get(&record.name) != Some(position) {
                return Err(format!("name index does not resolve '{}' to {}", record.name, position));
            }
            if !self.recency.contains(record.last_modified, &record.name) {
                return Err(format!(
                    "recency index lacks ({}, '{}')",
                    record.last_modified, record.name
                ));
            }
            if entry.key != storage_key(&record.name) {
                return Err(format!("stale storage key for '{}'", record.name));
            }
        }
        let keys: HashSet<&str> = self.entries.iter().map(|e| e.key.as_str()).collect();
        if keys.len() != n {
            return Err("two live records share a storage key".to_string());
        }
        for (slot, job) in self.jobs.iter() {
            if slot >= n {
                return Err(format!("{} bound to dead slot {}", job, slot));
            }
        }
        match self.cursor.slot() {
            Some(slot) if slot >= n => Err(format!("cursor points at dead slot {}", slot)),
            None if n > 0 => Err("cursor is empty while records exist".to_string()),
            _ => Ok(()),
        }
    }
}

/// Deduplicates by `key`, keeping the copy with the greatest `last_modified`
/// (first seen wins ties). Survivors keep the position of their key's first occurrence.
fn keep_newest<P, K, F>(records: Vec<Record<P>>, key: F) -> (Vec<Record<P>>, Vec<Record<P>>)
where
    K: Eq + Hash,
    F: Fn(&Record<P>) -> K,
{
    let mut kept: Vec<Record<P>> = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();
    let mut seen: HashMap<K, usize> = HashMap::new();

    for record in records {
        let k = key(&record);
        match seen.get(&k) {
            Some(&pos) if record.last_modified > kept[pos].last_modified => {
                dropped.push(std::mem::replace(&mut kept[pos], record));
            }
            Some(_) => dropped.push(record),
            None => {
                seen.insert(k, kept.len());
                kept.push(record);
            }
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Note(String);

    impl RecordPayload for Note {
        const KIND: &'static str = "note";
        const FILE_EXTENSION: &'static str = "note";
        const DEFAULT_NAME: &'static str = "Untitled";

        fn blank() -> Self {
            Note::default()
        }

        fn seed() -> Self {
            Note("seed".to_string())
        }
    }

    fn ordered_names(state: &StoreState<Note>) -> Vec<String> {
        state.ordered().into_iter().map(|r| r.name).collect()
    }

    #[test]
    fn test_create_generates_unique_names() {
        let mut state = StoreState::<Note>::new();
        assert_eq!(state.create("X", Note::blank(), 1).name, "X");
        assert_eq!(state.create("X", Note::blank(), 2).name, "X (1)");
        assert_eq!(state.create("X", Note::blank(), 3).name, "X (2)");
        // "x", "x (1)" and "x (2)" share storage keys with the records above.
        assert_eq!(state.create("x", Note::blank(), 4).name, "x (3)");
        assert_eq!(state.len(), 4);
        assert_eq!(state.current_name(), Some("x (3)"));
        state.verify().unwrap();
    }

    #[test]
    fn test_create_cleans_bad_hints() {
        let mut state = StoreState::<Note>::new();
        assert_eq!(state.create("a/b", Note::blank(), 1).name, "ab");
        assert_eq!(state.create("///", Note::blank(), 1).name, "Untitled");
        state.verify().unwrap();
    }

    #[test]
    fn test_tie_break_and_duplicate_rename() {
        let mut state = StoreState::<Note>::new();
        state.create("Chat A", Note::blank(), 100);
        state.create("Chat B", Note::blank(), 100);
        assert_eq!(ordered_names(&state), vec!["Chat A", "Chat B"]);

        let err = state.rename("Chat A", "Chat B", 150).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
        assert_eq!(ordered_names(&state), vec!["Chat A", "Chat B"]);
        assert_eq!(state.get("Chat A").unwrap().last_modified, 100);
        state.verify().unwrap();
    }

    #[test]
    fn test_rename_rejects_key_collision_and_invalid_names() {
        let mut state = StoreState::<Note>::new();
        state.create("Chat A", Note::blank(), 1);
        state.create("Other", Note::blank(), 1);

        assert!(matches!(
            state.rename("Other", "chat a", 2),
            Err(StoreError::DuplicateName(_))
        ));
        assert!(matches!(
            state.rename("Other", "bad|name", 2),
            Err(StoreError::InvalidName(_))
        ));
        assert!(matches!(
            state.rename("missing", "x", 2),
            Err(StoreError::NotFound(_))
        ));

        // Changing only the case keeps the same storage key and is allowed.
        let renamed = state.rename("Chat A", "chat a", 3).unwrap();
        assert!(renamed.name_changed());
        state.verify().unwrap();
    }

    #[test]
    fn test_rename_to_self_only_touches() {
        let mut state = StoreState::<Note>::new();
        state.create("A", Note::blank(), 10);
        state.create("B", Note::blank(), 20);

        let renamed = state.rename("A", "A", 30).unwrap();
        assert!(!renamed.name_changed());
        assert_eq!(renamed.record.last_modified, 30);
        assert_eq!(state.len(), 2);
        assert_eq!(ordered_names(&state), vec!["A", "B"]);
        state.verify().unwrap();
    }

    #[test]
    fn test_delete_renumbers_slots_and_jobs() {
        let mut state = StoreState::<Note>::new();
        state.create("Chat A", Note::blank(), 100);
        state.create("Chat B", Note::blank(), 100);
        assert!(state.assign_current_job(JobId(9)));
        assert_eq!(state.job_at(1), Some(JobId(9)));

        state.delete("Chat A", 101).unwrap();

        assert_eq!(ordered_names(&state), vec!["Chat B"]);
        assert_eq!(state.get("Chat B").unwrap().slot, 0);
        assert_eq!(state.job_at(0), Some(JobId(9)));
        assert_eq!(state.name_for_job(JobId(9)), Some("Chat B"));
        assert_eq!(state.current_name(), Some("Chat B"));
        state.verify().unwrap();
    }

    #[test]
    fn test_delete_selected_falls_back_to_most_recent() {
        let mut state = StoreState::<Note>::new();
        state.create("old", Note::blank(), 10);
        state.create("b", Note::blank(), 50);
        state.create("a", Note::blank(), 50);
        state.create("gone", Note::blank(), 5);
        state.select("gone").unwrap();

        state.delete("gone", 60).unwrap();
        assert_eq!(state.current_name(), Some("a"));
        state.verify().unwrap();
    }

    #[test]
    fn test_delete_unselected_keeps_selection() {
        let mut state = StoreState::<Note>::new();
        state.create("a", Note::blank(), 1);
        state.create("b", Note::blank(), 2);
        state.create("c", Note::blank(), 3);
        state.select("c").unwrap();

        state.delete("a", 4).unwrap();
        assert_eq!(state.current_name(), Some("c"));
        assert_eq!(state.current_slot(), Some(1));
        state.verify().unwrap();
    }

    #[test]
    fn test_deleting_last_record_seeds_default() {
        let mut state = StoreState::<Note>::new();
        state.create("only", Note::blank(), 1);

        let deleted = state.delete("only", 2).unwrap();
        let seeded = deleted.seeded.expect("default record");
        assert_eq!(seeded.name, "Untitled");
        assert_eq!(seeded.payload, Note("seed".to_string()));
        assert_eq!(state.len(), 1);
        assert_eq!(state.current_name(), Some("Untitled"));
        state.verify().unwrap();
    }

    #[test]
    fn test_unsaved_changes_compare_by_value() {
        let mut state = StoreState::<Note>::new();
        let record = state.create("n", Note("v1".into()), 1);
        assert!(state.has_unsaved_changes());

        state.mark_persisted(record.id, Note("v1".into()));
        assert!(!state.has_unsaved_changes());

        state.update_payload("n", Note("v2".into()), 2).unwrap();
        assert!(state.has_unsaved_changes());

        state.update_payload("n", Note("v1".into()), 3).unwrap();
        assert!(!state.has_unsaved_changes());

        state.update_payload("n", Note("v3".into()), 4).unwrap();
        let reverted = state.revert_current().unwrap();
        assert_eq!(reverted.payload, Note("v1".into()));
        assert!(!state.has_unsaved_changes());
    }

    #[test]
    fn test_hydrate_deduplicates_and_reports_stale() {
        let mut state = StoreState::<Note>::new();
        let records = vec![
            Record::new(1, "Old Name", 10, Note("before".into())),
            Record::new(1, "New Name", 20, Note("after".into())),
            Record::new(2, "Other", 15, Note::blank()),
            Record::new(3, "bad/name", 30, Note::blank()),
        ];

        let hydration = state.hydrate(records, 99);
        assert_eq!(hydration.loaded, 2);
        assert_eq!(hydration.stale, vec!["Old Name".to_string()]);
        assert!(hydration.seeded.is_none());
        assert_eq!(ordered_names(&state), vec!["New Name", "Other"]);
        assert_eq!(state.current_name(), Some("New Name"));
        assert!(!state.has_unsaved_changes());

        let next = state.create("fresh", Note::blank(), 100);
        assert_eq!(next.id, 4);
        state.verify().unwrap();
    }

    #[test]
    fn test_hydrate_empty_seeds_default() {
        let mut state = StoreState::<Note>::new();
        let hydration = state.hydrate(Vec::new(), 7);
        assert_eq!(hydration.loaded, 0);
        assert_eq!(hydration.seeded.unwrap().last_modified, 7);
        assert_eq!(state.current_name(), Some("Untitled"));
        state.verify().unwrap();
    }

    #[test]
    fn test_rehydrate_keeps_selection_and_jobs() {
        let mut state = StoreState::<Note>::new();
        state.hydrate(
            vec![
                Record::new(1, "a", 10, Note::blank()),
                Record::new(2, "b", 20, Note::blank()),
            ],
            0,
        );
        state.select("a").unwrap();
        state.assign_current_job(JobId(4));

        state.hydrate(
            vec![
                Record::new(2, "b", 20, Note::blank()),
                Record::new(1, "a", 10, Note::blank()),
            ],
            0,
        );
        assert_eq!(state.current_name(), Some("a"));
        assert_eq!(state.current_slot(), Some(1));
        assert_eq!(state.current_job(), Some(JobId(4)));
        state.verify().unwrap();
    }

    #[test]
    fn test_find_at_and_sorted_position() {
        let mut state = StoreState::<Note>::new();
        state.create("a", Note::blank(), 10);
        state.create("b", Note::blank(), 20);

        assert_eq!(state.find_at(10).unwrap().name, "a");
        assert!(state.find_at(15).is_none());
        assert_eq!(state.sorted_position("a"), Some(1));
        assert_eq!(state.sorted_position("b"), Some(0));
    }

    #[test]
    fn test_random_operation_sequence_keeps_invariants() {
        let mut state = StoreState::<Note>::new();
        state.hydrate(Vec::new(), 0);
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for step in 0..500i64 {
            let names: Vec<String> = state.ordered().into_iter().map(|r| r.name).collect();
            let pick = names[(next() as usize) % names.len()].clone();
            let now = step / 3;
            match next() % 5 {
                0 | 1 => {
                    state.create(&format!("n{}", next() % 7), Note::blank(), now);
                }
                2 => {
                    let _ = state.rename(&pick, &format!("n{}", next() % 7), now);
                }
                3 => {
                    state.delete(&pick, now).unwrap();
                }
                _ => {
                    state.select(&pick).unwrap();
                    state.assign_current_job(JobId(step));
                }
            }
            state.verify().unwrap_or_else(|err| panic!("step {}: {}", step, err));
        }
    }
}
