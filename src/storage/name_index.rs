use std::collections::HashMap;

/// Unique record name → current slot in the backing sequence.
#[derive(Debug, Default, Clone)]
pub struct NameIndex {
    slots: HashMap<String, usize>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Returns the slot previously registered under `name`, if any.
    pub fn insert(&mut self, name: impl Into<String>, slot: usize) -> Option<usize> {
        self.slots.insert(name.into(), slot)
    }

    pub fn remove(&mut self, name: &str) -> Option<usize> {
        self.slots.remove(name)
    }

    /// Moves the entry for `old` to `new`, keeping its slot.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self.slots.remove(old) {
            Some(slot) => {
                self.slots.insert(new.to_string(), slot);
                true
            }
            None => false,
        }
    }

    /// Closes the gap left by a removed slot.
    pub fn shift_after(&mut self, removed: usize) {
        for slot in self.slots.values_mut() {
            if *slot > removed {
                *slot -= 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), *slot))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
