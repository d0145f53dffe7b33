//! # PVM Memory Types
//!
//! Address-space constants, validated indexes, and error types shared by the
//! PVM memory subsystem and the interpreter that drives it.
//!
//! ## Address space
//!
//! - 32-bit byte-addressed space (`MEMORY_SIZE` is the largest valid index)
//! - Pages of `PAGE_SIZE` bytes (2^14), the unit of access permissions
//! - `PAGE_COUNT` pages in total

pub mod config;
pub mod error;
pub mod index;

pub use config::HeapConfig;
pub use error::{BuildError, ConfigError, IndexError, PageFault, SbrkError};
pub use index::{MemoryIndex, PageNumber};

/// log2 of the page size
pub const PAGE_SHIFT: u32 = 14;

/// Page size in bytes (Z_P)
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Mask selecting the offset of an address within its page
pub const PAGE_MASK: u32 = PAGE_SIZE - 1;

/// Largest valid memory index (2^32 - 1)
pub const MEMORY_SIZE: u32 = u32::MAX;

/// Number of pages in the address space
pub const PAGE_COUNT: u32 = ((MEMORY_SIZE as u64 + 1) >> PAGE_SHIFT) as u32;

// Page arithmetic uses shifts and masks in place of division and modulo.
const _: () = assert!(PAGE_SIZE.is_power_of_two());
const _: () = assert!(PAGE_COUNT as u64 * PAGE_SIZE as u64 == MEMORY_SIZE as u64 + 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_constants() {
        assert_eq!(PAGE_SIZE, 16384);
        assert_eq!(PAGE_MASK, 0x3FFF);
        assert_eq!(PAGE_COUNT, 1 << 18);
    }

    #[test]
    fn test_shift_matches_division() {
        let addr = 0x1234_5678u32;
        assert_eq!(addr >> PAGE_SHIFT, addr / PAGE_SIZE);
        assert_eq!(addr & PAGE_MASK, addr % PAGE_SIZE);
    }
}
