//! # PVM Memory
//!
//! Paged virtual memory for the JAM PVM interpreter.
//!
//! The 32-bit address space is split into pages of `PAGE_SIZE` bytes. Each
//! mapped page is readable, writeable, or (for layouts that are not page
//! aligned) a virtual page of readable/writeable chunks. Unmapped pages fault
//! on every access.
//!
//! ## Features
//!
//! - **Builder**: declare regions, then finalize with heap bounds
//! - **Loads/stores**: split across page boundaries, all-or-nothing on fault
//! - **Heap**: `sbrk` with lazily backed pages and a hard limit
//! - **Introspection**: dirty pages and zero-padded page snapshots
//! - **Fixtures**: load and verify JAM PVM test-vector memory
//!
//! ## Example
//!
//! ```rust
//! use pvm_memory::{Memory, MemoryAccess};
//! use pvm_types::PAGE_SIZE;
//!
//! let p = PAGE_SIZE as u64;
//! let mut builder = Memory::builder();
//! builder.set_writeable_pages(0, 2 * p, &[]).unwrap();
//! let mut memory = builder.finalize(2 * p, 4 * p).unwrap();
//!
//! memory.write_u32(PAGE_SIZE - 2, 0xCAFE_BABE).unwrap();
//! assert_eq!(memory.read_u32(PAGE_SIZE - 2).unwrap(), 0xCAFE_BABE);
//! assert_eq!(memory.sbrk(16).unwrap(), 2 * PAGE_SIZE);
//! ```

pub mod access;
pub mod builder;
pub mod error;
pub mod fixture;
pub mod memory;
pub mod page;
pub mod virtual_page;

pub use access::MemoryAccess;
pub use builder::MemoryBuilder;
pub use error::{FixtureError, MemoryError, Result};
pub use fixture::{compare_memory, load_memory, MemoryChunk, MemoryFixture, PageMapEntry};
pub use memory::Memory;
pub use page::{AccessType, MemoryPage, PageAccess, ReadablePage, WriteablePage};
pub use virtual_page::{Chunk, VirtualPage};

pub use pvm_types::{
    BuildError, HeapConfig, MemoryIndex, PageFault, PageNumber, SbrkError, MEMORY_SIZE, PAGE_SIZE,
};
