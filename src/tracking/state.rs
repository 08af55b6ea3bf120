// ============================================================================
// Entry State
// ============================================================================
//
// The per-entry state machine value and the packed per-property flags.
//
// State transitions:
//
//   Detached ──> Unchanged | Added | Modified | Deleted
//   any      ──> Detached
//
// Flags are stored in one bitset, one run of `property_count` bits per flag,
// so flag `f` of property `p` lives at bit `f * property_count + p`.
//
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global state manager ID counter
static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a state manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateManagerId(pub u64);

impl StateManagerId {
    pub fn new() -> Self {
        StateManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for StateManagerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StateManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EntityState {
    /// Not tracked. Both the initial and the terminal state.
    #[default]
    Detached,
    Unchanged,
    Deleted,
    Modified,
    Added,
}

impl EntityState {
    /// Whether an entry in this state is part of the next save.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }

    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::Detached)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detached => "Detached",
            Self::Unchanged => "Unchanged",
            Self::Deleted => "Deleted",
            Self::Modified => "Modified",
            Self::Added => "Added",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFlag {
    Modified = 0,
    /// Holds a placeholder awaiting a store-generated value.
    Temporary = 1,
    /// Foreign key severed to null while the entry was persisted.
    ConceptualNull = 2,
}

const FLAG_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateData {
    property_count: usize,
    bits: Vec<u64>,
}

impl StateData {
    pub fn new(property_count: usize) -> Self {
        let total = property_count * FLAG_COUNT;
        Self {
            property_count,
            bits: vec![0; total.div_ceil(64)],
        }
    }

    fn position(&self, property: usize, flag: PropertyFlag) -> (usize, u64) {
        let bit = flag as usize * self.property_count + property;
        (bit / 64, 1u64 << (bit % 64))
    }

    pub fn is_flagged(&self, property: usize, flag: PropertyFlag) -> bool {
        if property >= self.property_count {
            return false;
        }
        let (word, mask) = self.position(property, flag);
        self.bits[word] & mask != 0
    }

    pub fn flag(&mut self, property: usize, flag: PropertyFlag, on: bool) {
        if property >= self.property_count {
            return;
        }
        let (word, mask) = self.position(property, flag);
        if on {
            self.bits[word] |= mask;
        } else {
            self.bits[word] &= !mask;
        }
    }

    pub fn flag_all(&mut self, flag: PropertyFlag, on: bool) {
        for property in 0..self.property_count {
            self.flag(property, flag, on);
        }
    }

    pub fn any_flagged(&self, flag: PropertyFlag) -> bool {
        (0..self.property_count).any(|p| self.is_flagged(p, flag))
    }

    pub fn flagged(&self, flag: PropertyFlag) -> Vec<usize> {
        (0..self.property_count)
            .filter(|p| self.is_flagged(*p, flag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent() {
        let mut data = StateData::new(30);
        data.flag(3, PropertyFlag::Modified, true);
        data.flag(3, PropertyFlag::Temporary, true);
        data.flag(29, PropertyFlag::ConceptualNull, true);

        assert!(data.is_flagged(3, PropertyFlag::Modified));
        assert!(!data.is_flagged(4, PropertyFlag::Modified));
        assert!(data.is_flagged(29, PropertyFlag::ConceptualNull));
        assert!(!data.is_flagged(29, PropertyFlag::Temporary));

        data.flag(3, PropertyFlag::Modified, false);
        assert!(!data.any_flagged(PropertyFlag::Modified));
        assert_eq!(data.flagged(PropertyFlag::Temporary), vec![3]);
    }

    #[test]
    fn test_flag_all_spans_words() {
        let mut data = StateData::new(100);
        data.flag_all(PropertyFlag::Modified, true);
        assert_eq!(data.flagged(PropertyFlag::Modified).len(), 100);
        assert!(!data.any_flagged(PropertyFlag::Temporary));
        data.flag_all(PropertyFlag::Modified, false);
        assert!(!data.any_flagged(PropertyFlag::Modified));
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut data = StateData::new(2);
        data.flag(5, PropertyFlag::Modified, true);
        assert!(!data.is_flagged(5, PropertyFlag::Modified));
        assert!(!data.any_flagged(PropertyFlag::Modified));
    }

    #[test]
    fn test_state_predicates() {
        assert!(EntityState::Added.is_pending());
        assert!(!EntityState::Unchanged.is_pending());
        assert!(!EntityState::Detached.is_tracked());
        assert_eq!(EntityState::Modified.to_string(), "Modified");
    }
}
