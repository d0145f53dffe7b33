//! # Error Types for the PVM memory model
//!
//! Configuration errors (`BuildError`, `ConfigError`) abort memory setup.
//! Access errors (`PageFault`) and heap exhaustion (`SbrkError`) are returned
//! as values to the interpreter, which turns them into machine traps.

use thiserror::Error;

use crate::index::PageNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Incorrect memory index: {0}")]
    IncorrectMemoryIndex(i128),

    #[error("Incorrect page number: {0}")]
    IncorrectPageNumber(i128),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Heap start {start:#x} is above heap end {end:#x}")]
    HeapStartAboveEnd { start: u32, end: u32 },

    #[error("Invalid heap bound: {0}")]
    InvalidBound(#[from] IndexError),
}

/// Malformed static memory layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Chunk [{start:#x}, {end:#x}) overlaps an existing chunk")]
    ChunkOverlap { start: u32, end: u64 },

    #[error("Chunk data too long: {len} bytes for a {span} byte span")]
    ChunkTooLong { len: usize, span: u64 },

    #[error("{page} is already assigned")]
    PageOverride { page: PageNumber },

    #[error("Sbrk index {sbrk_index:#x} is not above declared {page}")]
    IncorrectSbrkIndex { sbrk_index: u32, page: PageNumber },

    #[error("Invalid range [{start:#x}, {end:#x})")]
    InvalidRange { start: u64, end: u64 },

    #[error("Range [{start:#x}, {end:#x}) is not page aligned")]
    UnalignedPages { start: u64, end: u64 },

    #[error("Invalid index: {0}")]
    Index(#[from] IndexError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Access to an unmapped or unauthorised address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("Page fault at {address:#010x}")]
pub struct PageFault {
    pub address: u32,
}

impl PageFault {
    #[inline]
    pub const fn at(address: u32) -> Self {
        Self { address }
    }

    /// Page holding the faulting byte
    pub const fn page(&self) -> PageNumber {
        crate::MemoryIndex::from_u32(self.address).page_number()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SbrkError {
    #[error("Out of memory: heap top {requested:#x} exceeds limit {limit:#x}")]
    OutOfMemory { requested: u64, limit: u32 },
}
