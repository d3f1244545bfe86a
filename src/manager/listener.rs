use std::sync::Mutex;

/// Observer of selection changes, typically the presentation layer resetting
/// per-record transient state (open menus, scroll position, edit toggles).
///
/// Called after the store lock is released, whenever the selected record
/// changes and on every successful `switch_to`. Notifications arrive one at a
/// time in mutation order; one overtaken by a newer selection is dropped.
/// Implementations may read the store but must not mutate it.
pub trait SelectionListener: Send + Sync {
    fn selection_changed(&self, kind: &'static str, current: Option<&str>);
}

/// Listener that remembers every notification it receives.
#[derive(Debug, Default)]
pub struct SelectionLog {
    events: Mutex<Vec<(&'static str, Option<String>)>>,
}

impl SelectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(&'static str, Option<String>)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn take(&self) -> Vec<(&'static str, Option<String>)> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl SelectionListener for SelectionLog {
    fn selection_changed(&self, kind: &'static str, current: Option<&str>) {
        let event = (kind, current.map(str::to_string));
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
