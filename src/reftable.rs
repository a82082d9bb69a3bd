//! Name-to-slot tables for globals, per-body locals and classes.

use std::rc::Rc;

use indexmap::IndexMap;

/// Largest number of slots a table may hand out (slot indices are `u16`).
pub const MAX_REF_SLOTS: usize = u16::MAX as usize;

/// Maps identifier text to a dense slot index.
///
/// Slots are assigned sequentially from 0 and never reused, so a name keeps
/// its slot for the lifetime of the table.
#[derive(Debug, Clone, Default)]
pub struct RefTable {
    slots: IndexMap<Rc<str>, u16, ahash::RandomState>,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `name`, assigning the next free one if it has none.
    /// Returns `None` once the table is full.
    pub fn slot(&mut self, name: &str) -> Option<u16> {
        if let Some(&slot) = self.slots.get(name) {
            return Some(slot);
        }
        if self.slots.len() >= MAX_REF_SLOTS {
            return None;
        }
        let slot = self.slots.len() as u16;
        self.slots.insert(Rc::from(name), slot);
        Some(slot)
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.slots.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// The name that owns `slot`.
    pub fn name(&self, slot: u16) -> Option<&str> {
        self.slots.get_index(slot as usize).map(|(name, _)| name.as_ref())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(|k| k.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_sequential_and_stable() {
        let mut table = RefTable::new();
        assert_eq!(table.slot("a"), Some(0));
        assert_eq!(table.slot("b"), Some(1));
        assert_eq!(table.slot("a"), Some(0));
        assert_eq!(table.len(), 2);
        assert_eq!(table.name(1), Some("b"));
        assert_eq!(table.get("c"), None);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut table = RefTable::new();
        for i in 0..MAX_REF_SLOTS {
            assert!(table.slot(&format!("n{}", i)).is_some());
        }
        assert_eq!(table.slot("one_more"), None);
        assert_eq!(table.slot("n0"), Some(0));
    }
}
