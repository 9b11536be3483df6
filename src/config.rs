use super::{HeapError, HEADER_SIZE, HEAP_SIZE};
use crate::block::MAX_UNITS;

/// How the free list picks a block for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// Lowest-address block that is large enough.
    #[default]
    FirstFit,
    /// Smallest block that is large enough, lowest address on ties.
    BestFit,
}

/// Construction parameters for a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    pub capacity: usize,
    pub policy: PlacementPolicy,
}

impl HeapConfig {
    pub const fn new() -> Self {
        Self {
            capacity: HEAP_SIZE,
            policy: PlacementPolicy::FirstFit,
        }
    }

    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub const fn with_policy(mut self, policy: PlacementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), HeapError> {
        let capacity = self.capacity;
        if capacity == 0 || capacity % HEADER_SIZE != 0 || capacity / HEADER_SIZE > MAX_UNITS {
            return Err(HeapError::InvalidCapacity { capacity });
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
