//! One-shot memory layout builder
//!
//! Declared regions are split per page: a page fully covered by a region
//! becomes a full [`ReadablePage`] or [`WriteablePage`], a partially covered
//! page becomes (or extends) a [`VirtualPage`]. Every declaration is checked
//! against the pages already assigned before any page is touched, so a failed
//! call leaves the builder as it was.

use std::collections::HashMap;

use pvm_types::{
    BuildError, HeapConfig, IndexError, MemoryIndex, PageNumber, MEMORY_SIZE, PAGE_SHIFT, PAGE_SIZE,
};
use tracing::debug;

use crate::memory::Memory;
use crate::page::{AccessType, MemoryPage, PageAccess, ReadablePage, WriteablePage};
use crate::virtual_page::VirtualPage;

/// Exclusive end of the address space
const ADDRESS_SPACE_END: u64 = MEMORY_SIZE as u64 + 1;

/// Part of a declared region that falls inside one page
#[derive(Debug)]
struct Segment<'a> {
    page: PageNumber,
    /// Offsets within the page
    from: u32,
    to: u32,
    data: &'a [u8],
}

impl Segment<'_> {
    #[inline]
    fn is_full(&self) -> bool {
        self.from == 0 && self.to == PAGE_SIZE
    }

    fn overlap(&self) -> BuildError {
        BuildError::ChunkOverlap {
            start: self.page.start().get() + self.from,
            end: self.page.start().get() as u64 + self.to as u64,
        }
    }
}

/// Accumulates a static memory layout and finalizes it into a [`Memory`]
#[derive(Debug, Default)]
pub struct MemoryBuilder {
    pages: HashMap<PageNumber, MemoryPage>,
}

impl MemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder expecting about `pages` pages
    pub fn with_capacity(pages: usize) -> Self {
        Self {
            pages: HashMap::with_capacity(pages),
        }
    }

    /// Number of pages declared so far
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Declare `[start, end)` read-only, initialised with `data`
    pub fn set_readable(
        &mut self,
        start: u64,
        end: u64,
        data: &[u8],
    ) -> Result<&mut Self, BuildError> {
        self.declare(start, end, data, AccessType::Readable)?;
        Ok(self)
    }

    /// Declare `[start, end)` read-write, initialised with `data`
    pub fn set_writeable(
        &mut self,
        start: u64,
        end: u64,
        data: &[u8],
    ) -> Result<&mut Self, BuildError> {
        self.declare(start, end, data, AccessType::Writeable)?;
        Ok(self)
    }

    /// Declare whole read-only pages; `start` and `end` must be page aligned
    pub fn set_readable_pages(
        &mut self,
        start: u64,
        end: u64,
        data: &[u8],
    ) -> Result<&mut Self, BuildError> {
        self.declare_pages(start, end, data, AccessType::Readable)?;
        Ok(self)
    }

    /// Declare whole read-write pages; `start` and `end` must be page aligned
    pub fn set_writeable_pages(
        &mut self,
        start: u64,
        end: u64,
        data: &[u8],
    ) -> Result<&mut Self, BuildError> {
        self.declare_pages(start, end, data, AccessType::Writeable)?;
        Ok(self)
    }

    /// Move the declared pages into a new [`Memory`] with the given heap
    ///
    /// The builder is left empty.
    pub fn finalize(&mut self, sbrk_start: u64, heap_end: u64) -> Result<Memory, BuildError> {
        let config = HeapConfig::new(sbrk_start, heap_end)?;
        self.finalize_with(config)
    }

    /// Like [`finalize`](Self::finalize) with an already validated heap
    ///
    /// Declared pages must end at or below the heap start. When the heap is
    /// not empty, the page holding the heap start may only be a virtual page
    /// whose chunks all end at or below it; the heap takes the rest of that
    /// page.
    pub fn finalize_with(&mut self, config: HeapConfig) -> Result<Memory, BuildError> {
        let heap_page = config.sbrk_start.page_number();
        let heap_offset = config.sbrk_start.page_offset();
        let overlaps_heap = |number: PageNumber, page: &MemoryPage| {
            if page.start() >= config.sbrk_start {
                return true;
            }
            number == heap_page
                && config.capacity() > 0
                && !page
                    .as_virtual()
                    .is_some_and(|page| page.is_free_from(heap_offset))
        };
        let conflict = self
            .pages
            .iter()
            .filter(|(number, page)| overlaps_heap(**number, *page))
            .map(|(number, _)| *number)
            .min();
        if let Some(page) = conflict {
            return Err(BuildError::IncorrectSbrkIndex {
                sbrk_index: config.sbrk_start.get(),
                page,
            });
        }

        let pages = std::mem::take(&mut self.pages);
        debug!(pages = pages.len(), %config, "finalized memory layout");
        Ok(Memory::new(pages, config))
    }

    fn declare(
        &mut self,
        start: u64,
        end: u64,
        data: &[u8],
        access: AccessType,
    ) -> Result<(), BuildError> {
        let segments = split_region(start, end, data)?;

        for segment in &segments {
            match (self.pages.get(&segment.page), segment.is_full()) {
                (None, _) => {}
                (Some(_), true) => return Err(BuildError::PageOverride { page: segment.page }),
                (Some(MemoryPage::Virtual(page)), false) => {
                    page.check_free(segment.from, segment.to)?
                }
                (Some(_), false) => return Err(segment.overlap()),
            }
        }

        debug!(start, end, len = data.len(), ?access, "declared region");
        for segment in segments {
            if segment.is_full() {
                let page = full_page(segment.page, segment.data, access)?;
                self.pages.insert(segment.page, page);
                continue;
            }
            let page = self
                .pages
                .entry(segment.page)
                .or_insert_with(|| VirtualPage::new(segment.page).into());
            match page.as_virtual_mut() {
                Some(page) => page.set(segment.from, segment.to, segment.data, access)?,
                None => return Err(segment.overlap()),
            }
        }
        Ok(())
    }

    fn declare_pages(
        &mut self,
        start: u64,
        end: u64,
        data: &[u8],
        access: AccessType,
    ) -> Result<(), BuildError> {
        if start % PAGE_SIZE as u64 != 0 || end % PAGE_SIZE as u64 != 0 {
            return Err(BuildError::UnalignedPages { start, end });
        }
        let segments = split_region(start, end, data)?;

        if let Some(taken) = segments.iter().find(|s| self.pages.contains_key(&s.page)) {
            return Err(BuildError::PageOverride { page: taken.page });
        }

        debug!(start, end, len = data.len(), ?access, "declared pages");
        for segment in segments {
            let page = full_page(segment.page, segment.data, access)?;
            self.pages.insert(segment.page, page);
        }
        Ok(())
    }
}

fn full_page(
    number: PageNumber,
    data: &[u8],
    access: AccessType,
) -> Result<MemoryPage, BuildError> {
    Ok(match access {
        AccessType::Readable => ReadablePage::new(number, data.to_vec())?.into(),
        AccessType::Writeable => WriteablePage::new(number, data.to_vec())?.into(),
    })
}

/// Validate `[start, end)` and split it into per-page segments
fn split_region(start: u64, end: u64, data: &[u8]) -> Result<Vec<Segment<'_>>, BuildError> {
    MemoryIndex::new(start)?;
    if end > ADDRESS_SPACE_END {
        return Err(IndexError::IncorrectMemoryIndex(end as i128).into());
    }
    if start > end {
        return Err(BuildError::InvalidRange { start, end });
    }
    if data.len() as u64 > end - start {
        return Err(BuildError::ChunkTooLong {
            len: data.len(),
            span: end - start,
        });
    }
    if start == end {
        return Ok(Vec::new());
    }

    let first = start >> PAGE_SHIFT;
    let last = (end - 1) >> PAGE_SHIFT;
    let mut segments = Vec::with_capacity((last - first + 1) as usize);
    for n in first..=last {
        let page = PageNumber::new(n)?;
        let page_start = page.start().get() as u64;
        let seg_start = start.max(page_start);
        let seg_end = end.min(page.end());

        let lo = ((seg_start - start) as usize).min(data.len());
        let hi = ((seg_end - start) as usize).min(data.len());
        segments.push(Segment {
            page,
            from: (seg_start - page_start) as u32,
            to: (seg_end - page_start) as u32,
            data: &data[lo..hi],
        });
    }
    Ok(segments)
}
