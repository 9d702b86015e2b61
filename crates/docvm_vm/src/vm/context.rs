//! Slot accessors supplied by the caller of the VM.
//!
//! A compiled program reads its inputs through numbered slots: the current
//! document, the outputs of earlier stages, runtime environment values such as
//! a collator or a timezone database. The VM never owns slot storage; it reads
//! views through [`SlotAccess`] and moves values out with
//! [`SlotAccess::take`].

use docvm_foundation::Value;

use crate::opcode::SlotId;

// =============================================================================
// SlotAccess Trait
// =============================================================================

/// Provides slot values to a running program.
pub trait SlotAccess {
    /// A view of the value in `slot`, or `None` for an unknown slot.
    fn get(&self, slot: SlotId) -> Option<&Value>;

    /// Moves the value out of `slot`, leaving Nothing behind.
    fn take(&mut self, slot: SlotId) -> Option<Value>;

    /// A view of the runtime environment value in `slot`.
    ///
    /// Unknown environment slots read as Nothing.
    fn env(&self, slot: SlotId) -> Option<&Value> {
        let _ = slot;
        None
    }
}

// =============================================================================
// NoSlots
// =============================================================================

/// Slot access for programs that read no slots.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSlots;

impl SlotAccess for NoSlots {
    fn get(&self, _slot: SlotId) -> Option<&Value> {
        None
    }

    fn take(&mut self, _slot: SlotId) -> Option<Value> {
        None
    }
}

// =============================================================================
// SlotTable
// =============================================================================

/// Vector-backed slots and environment.
///
/// Slot ids are indices, assigned in the order values are added.
#[derive(Clone, Debug, Default)]
pub struct SlotTable {
    slots: Vec<Value>,
    env: Vec<Value>,
}

impl SlotTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn id(index: usize) -> SlotId {
        SlotId::try_from(index).unwrap_or_else(|_| panic!("slot table overflow"))
    }

    /// Adds a slot holding `value` and returns its id.
    pub fn push(&mut self, value: Value) -> SlotId {
        self.slots.push(value);
        Self::id(self.slots.len() - 1)
    }

    /// Adds an environment slot holding `value` and returns its id.
    pub fn push_env(&mut self, value: Value) -> SlotId {
        self.env.push(value);
        Self::id(self.env.len() - 1)
    }

    /// Replaces the value of `slot`. Returns false for an unknown slot.
    pub fn set(&mut self, slot: SlotId, value: Value) -> bool {
        match self.slots.get_mut(slot as usize) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    /// Number of slots, environment excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the table has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<Vec<Value>> for SlotTable {
    fn from(slots: Vec<Value>) -> Self {
        Self {
            slots,
            env: Vec::new(),
        }
    }
}

impl SlotAccess for SlotTable {
    fn get(&self, slot: SlotId) -> Option<&Value> {
        self.slots.get(slot as usize)
    }

    fn take(&mut self, slot: SlotId) -> Option<Value> {
        self.slots.get_mut(slot as usize).map(std::mem::take)
    }

    fn env(&self, slot: SlotId) -> Option<&Value> {
        self.env.get(slot as usize)
    }
}
