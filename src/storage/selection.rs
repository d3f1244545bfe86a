/// The single "currently active" record, tracked by slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SelectionCursor {
    slot: Option<usize>,
}

/// Effect of a slot removal on the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShift {
    Unchanged,
    Shifted,
    /// The selected record itself was removed; a new target must be chosen.
    Orphaned,
}

impl SelectionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn select(&mut self, slot: usize) {
        self.slot = Some(slot);
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn on_slot_removed(&mut self, removed: usize) -> CursorShift {
        match self.slot {
            Some(slot) if slot == removed => {
                self.slot = None;
                CursorShift::Orphaned
            }
            Some(slot) if slot > removed => {
                self.slot = Some(slot - 1);
                CursorShift::Shifted
            }
            _ => CursorShift::Unchanged,
        }
    }
}
