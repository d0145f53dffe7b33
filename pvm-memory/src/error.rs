//! Memory error types

use pvm_types::{BuildError, IndexError, PageFault, SbrkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Layout error: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Fault(#[from] PageFault),

    #[error(transparent)]
    Sbrk(#[from] SbrkError),

    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),
}

impl MemoryError {
    /// Setup errors abort before execution; faults and heap exhaustion are
    /// traps of the running program
    pub fn is_fatal(&self) -> bool {
        matches!(self, MemoryError::Build(_) | MemoryError::Fixture(_))
    }

    /// Faulting address, if this is a page fault
    pub fn fault_address(&self) -> Option<u32> {
        match self {
            MemoryError::Fault(fault) => Some(fault.address),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid layout: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid address: {0}")]
    Index(#[from] IndexError),

    #[error("Chunk at {address:#x} is outside every declared region")]
    UnmappedChunk { address: u64 },

    #[error("Memory mismatch at {address:#010x}: expected {expected:#04x}, found {actual:#04x}")]
    Mismatch { address: u32, expected: u8, actual: u8 },
}
