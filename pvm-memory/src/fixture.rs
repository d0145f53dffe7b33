//! Conformance fixtures
//!
//! JAM PVM test vectors describe memory with three lists:
//!
//! - `initial-page-map`: accessible regions (`address`, `length`, `is-writable`)
//! - `initial-memory`: initial contents (`address`, `contents`)
//! - `expected-memory`: contents after execution
//!
//! [`load_memory`] turns the first two into a [`Memory`]; [`compare_memory`]
//! checks a memory against the third, byte for byte, with zero padding.

use std::collections::BTreeMap;

use pvm_types::{HeapConfig, MemoryIndex, PageNumber, PAGE_SIZE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::builder::MemoryBuilder;
use crate::error::FixtureError;
use crate::memory::Memory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PageMapEntry {
    pub address: u64,
    pub length: u64,
    pub is_writable: bool,
}

impl PageMapEntry {
    fn end(&self) -> u64 {
        self.address.saturating_add(self.length)
    }

    fn is_page_aligned(&self) -> bool {
        self.address % PAGE_SIZE as u64 == 0 && self.length % PAGE_SIZE as u64 == 0
    }

    /// Bytes of `chunk` inside this entry, as (offset in entry, range in chunk)
    fn intersect(&self, chunk: &MemoryChunk) -> Option<(usize, std::ops::Range<usize>)> {
        let lo = self.address.max(chunk.address);
        let hi = self.end().min(chunk.end());
        if lo >= hi {
            return None;
        }
        let from = (lo - chunk.address) as usize;
        let to = (hi - chunk.address) as usize;
        Some(((lo - self.address) as usize, from..to))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryChunk {
    pub address: u64,
    pub contents: Vec<u8>,
}

impl MemoryChunk {
    fn end(&self) -> u64 {
        self.address.saturating_add(self.contents.len() as u64)
    }
}

/// Memory sections of a test vector; other vector fields are ignored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemoryFixture {
    #[serde(default)]
    pub initial_page_map: Vec<PageMapEntry>,
    #[serde(default)]
    pub initial_memory: Vec<MemoryChunk>,
    #[serde(default)]
    pub expected_memory: Vec<MemoryChunk>,
}

impl MemoryFixture {
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the initial memory with the given heap
    pub fn load(&self, heap: HeapConfig) -> Result<Memory, FixtureError> {
        load_memory(&self.initial_page_map, &self.initial_memory, heap)
    }

    /// Compare `memory` against `expected-memory`
    pub fn verify(&self, memory: &Memory) -> Result<(), FixtureError> {
        compare_memory(memory, &self.expected_memory)
    }
}

/// Build a memory from a page map and its initial contents
///
/// Page-aligned entries become whole pages; other entries become sub-page
/// chunks.
pub fn load_memory(
    page_map: &[PageMapEntry],
    chunks: &[MemoryChunk],
    heap: HeapConfig,
) -> Result<Memory, FixtureError> {
    for chunk in chunks {
        let covered: usize = page_map
            .iter()
            .filter_map(|entry| entry.intersect(chunk))
            .map(|(_, range)| range.len())
            .sum();
        if covered < chunk.contents.len() {
            return Err(FixtureError::UnmappedChunk {
                address: chunk.address,
            });
        }
    }

    let mut builder = MemoryBuilder::with_capacity(page_map.len());
    for entry in page_map {
        let data = entry_contents(entry, chunks);
        let (start, end) = (entry.address, entry.end());
        match (entry.is_page_aligned(), entry.is_writable) {
            (true, true) => builder.set_writeable_pages(start, end, &data)?,
            (true, false) => builder.set_readable_pages(start, end, &data)?,
            (false, true) => builder.set_writeable(start, end, &data)?,
            (false, false) => builder.set_readable(start, end, &data)?,
        };
    }
    debug!(
        entries = page_map.len(),
        chunks = chunks.len(),
        "loaded fixture memory"
    );
    Ok(builder.finalize_with(heap)?)
}

/// Initial bytes of `entry`, trimmed after the last byte any chunk sets
fn entry_contents(entry: &PageMapEntry, chunks: &[MemoryChunk]) -> Vec<u8> {
    let mut data = Vec::new();
    for chunk in chunks {
        if let Some((offset, range)) = entry.intersect(chunk) {
            let end = offset + range.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset..end].copy_from_slice(&chunk.contents[range]);
        }
    }
    data
}

/// Check `memory` against expected chunks
///
/// Every page named by `expected` must match its zero-padded expected image,
/// and every dirty page not named must be all zero.
pub fn compare_memory(memory: &Memory, expected: &[MemoryChunk]) -> Result<(), FixtureError> {
    let mut images: BTreeMap<PageNumber, Vec<u8>> = BTreeMap::new();
    for chunk in expected {
        for (i, byte) in chunk.contents.iter().enumerate() {
            let index = MemoryIndex::new(chunk.address + i as u64)?;
            let image = images
                .entry(index.page_number())
                .or_insert_with(|| vec![0; PAGE_SIZE as usize]);
            image[index.page_offset() as usize] = *byte;
        }
    }

    for (page, image) in &images {
        compare_page(memory, *page, image)?;
    }

    let zero = vec![0; PAGE_SIZE as usize];
    for page in memory.get_dirty_pages() {
        if !images.contains_key(page) {
            compare_page(memory, *page, &zero)?;
        }
    }
    Ok(())
}

fn compare_page(memory: &Memory, page: PageNumber, expected: &[u8]) -> Result<(), FixtureError> {
    let actual = memory.get_memory_page(page);
    let mismatch = expected
        .iter()
        .zip(actual.iter())
        .position(|(e, a)| e != a);
    match mismatch {
        Some(offset) => Err(FixtureError::Mismatch {
            address: page.start().get() + offset as u32,
            expected: expected[offset],
            actual: actual[offset],
        }),
        None => Ok(()),
    }
}
