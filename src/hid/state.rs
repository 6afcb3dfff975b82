//! Held-key state backing the keyboard report

use serde::{Deserialize, Serialize};

use super::types::REPORT_KEY_SLOTS;

/// How many keys a press may report at once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyTracking {
    /// Every press replaces the report with just that key (slot 0)
    #[default]
    Single,
    /// Presses accumulate up to six keys (chording)
    Chord,
}

/// Which keys a release clears
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePolicy {
    /// Any key-up releases everything, whatever key it names
    #[default]
    All,
    /// A key-up releases only the key it names
    One,
}

/// Fixed-capacity ordered set of held usage codes
///
/// Slots are packed from the front; unused slots hold 0 and no code appears
/// twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    slots: [u8; REPORT_KEY_SLOTS],
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a single held key in slot 0
    pub fn set_single(&mut self, code: u8) {
        self.clear_all();
        self.slots[0] = code;
    }

    /// Release every key
    pub fn clear_all(&mut self) {
        self.slots = [0; REPORT_KEY_SLOTS];
    }

    /// Current slots, in press order
    pub fn snapshot(&self) -> [u8; REPORT_KEY_SLOTS] {
        self.slots
    }

    /// Add a key to the first free slot
    ///
    /// Returns `false` if all slots are taken. Adding a key that is already
    /// held succeeds without changing the state.
    pub fn insert(&mut self, code: u8) -> bool {
        if code == 0 {
            return false;
        }
        if self.contains(code) {
            return true;
        }
        match self.slots.iter_mut().find(|slot| **slot == 0) {
            Some(slot) => {
                *slot = code;
                true
            }
            None => false,
        }
    }

    /// Remove a key, shifting later keys forward
    ///
    /// Returns `false` if the key was not held.
    pub fn remove(&mut self, code: u8) -> bool {
        let Some(pos) = self.slots.iter().position(|&slot| slot == code && slot != 0) else {
            return false;
        };
        self.slots.copy_within(pos + 1.., pos);
        self.slots[REPORT_KEY_SLOTS - 1] = 0;
        true
    }

    pub fn contains(&self, code: u8) -> bool {
        code != 0 && self.slots.contains(&code)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|&&slot| slot != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0] == 0
    }
}
