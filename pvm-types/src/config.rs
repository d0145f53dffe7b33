//! Heap configuration for a finalized memory

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::index::MemoryIndex;

/// Heap bounds handed to `MemoryBuilder::finalize`
///
/// The program break starts at `sbrk_start` and may grow up to `heap_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeapConfig {
    pub sbrk_start: MemoryIndex,
    pub heap_end: MemoryIndex,
}

impl HeapConfig {
    /// Empty heap at the top of the address space
    pub const NONE: Self = Self {
        sbrk_start: MemoryIndex::MAX,
        heap_end: MemoryIndex::MAX,
    };

    /// Create a heap configuration with validation
    pub const fn new(sbrk_start: u64, heap_end: u64) -> Result<Self, ConfigError> {
        let start = match MemoryIndex::new(sbrk_start) {
            Ok(index) => index,
            Err(e) => return Err(ConfigError::InvalidBound(e)),
        };
        let end = match MemoryIndex::new(heap_end) {
            Ok(index) => index,
            Err(e) => return Err(ConfigError::InvalidBound(e)),
        };
        if start.get() > end.get() {
            return Err(ConfigError::HeapStartAboveEnd {
                start: start.get(),
                end: end.get(),
            });
        }
        Ok(Self {
            sbrk_start: start,
            heap_end: end,
        })
    }

    /// Bytes the heap may grow by
    #[inline]
    pub const fn capacity(&self) -> u32 {
        self.heap_end.get() - self.sbrk_start.get()
    }
}

impl fmt::Display for HeapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap [{}, {})", self.sbrk_start, self.heap_end)
    }
}
