//! Hand-off table for values that cannot cross the wire format.
//!
//! Some kernel payloads (DOM nodes, message ports) have no JSON
//! representation at all. The bus parks the live reference and hands out
//! a small integer id, so an envelope carries only the handle and the
//! rendering layer, living in the same process, resolves it back to the
//! original object.
//!
//! Entries are a pure hand-off, never long-lived storage: created on
//! [`BypassBus::push`], destroyed on [`BypassBus::pop`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;

/// A live in-memory reference parked on the bus.
pub type BypassValue = std::sync::Arc<dyn Any + Send + Sync>;

/// Non-serializable value exchanger.
#[derive(Default)]
pub struct BypassBus {
    slots: Mutex<HashMap<u64, BypassValue>>,
}

impl BypassBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a value and get back the id to later pop it with.
    ///
    /// The smallest id not currently in use is assigned, so freed ids get
    /// reused. The table only ever holds a handful of in-flight displays,
    /// hence the linear scan.
    pub fn push(&self, value: BypassValue) -> u64 {
        let mut slots = self.slots.lock().expect("bypass table lock poisoned");
        let mut id = 0;
        while slots.contains_key(&id) {
            id += 1;
        }
        slots.insert(id, value);
        id
    }

    /// Remove and return the value parked under `id`.
    ///
    /// An absent id yields `None`; callers are expected not to race on
    /// the same handle.
    pub fn pop(&self, id: u64) -> Option<BypassValue> {
        self.slots
            .lock()
            .expect("bypass table lock poisoned")
            .remove(&id)
    }
}
