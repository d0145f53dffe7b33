//! Paged memory
//!
//! [`Memory`] owns a sparse map from page number to [`MemoryPage`]. Accesses
//! are split at page boundaries and every touched page must allow the access;
//! a fault anywhere aborts the whole operation, so no partial store is ever
//! observable.
//!
//! Heap growth follows the classic `sbrk` contract: the call returns the
//! previous break, and pages are materialised lazily as the break moves past
//! the backed part of the heap.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use pvm_types::{
    HeapConfig, MemoryIndex, PageFault, PageNumber, SbrkError, MEMORY_SIZE, PAGE_SIZE,
};
use tracing::{debug, trace};

use crate::builder::MemoryBuilder;
use crate::page::{MemoryPage, PageAccess, WriteablePage};

/// Slice of an access that falls inside one page
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    page: PageNumber,
    offset: u32,
    /// Range within the caller's buffer
    range: Range<usize>,
}

impl Span {
    #[inline]
    fn address(&self) -> u32 {
        self.page.start().get() + self.offset
    }
}

/// Iterator over the per-page spans of `[address, address + len)`
#[derive(Debug, Clone)]
struct PageSpans {
    base: u64,
    next: u64,
    end: u64,
}

impl PageSpans {
    /// Fails at `address` if the access would run past the address space
    fn new(address: u32, len: usize) -> Result<Self, PageFault> {
        let base = address as u64;
        let end = base + len as u64;
        if end > MEMORY_SIZE as u64 + 1 {
            return Err(PageFault::at(address));
        }
        Ok(Self {
            base,
            next: base,
            end,
        })
    }
}

impl Iterator for PageSpans {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.next >= self.end {
            return None;
        }
        let index = MemoryIndex::from_u32(self.next as u32);
        let offset = index.page_offset();
        let take = ((PAGE_SIZE - offset) as u64).min(self.end - self.next);
        let from = (self.next - self.base) as usize;
        self.next += take;
        Some(Span {
            page: index.page_number(),
            offset,
            range: from..from + take as usize,
        })
    }
}

/// PVM memory for one program execution
#[derive(Debug, Clone)]
pub struct Memory {
    pages: HashMap<PageNumber, MemoryPage>,
    dirty: BTreeSet<PageNumber>,
    /// Current program break
    sbrk_index: MemoryIndex,
    /// End of the heap backed by pages
    virtual_sbrk_index: MemoryIndex,
    /// Hard limit for the program break
    end_heap_index: MemoryIndex,
}

impl Memory {
    pub fn builder() -> MemoryBuilder {
        MemoryBuilder::new()
    }

    pub(crate) fn new(pages: HashMap<PageNumber, MemoryPage>, heap: HeapConfig) -> Self {
        Self {
            pages,
            dirty: BTreeSet::new(),
            sbrk_index: heap.sbrk_start,
            virtual_sbrk_index: heap.sbrk_start,
            end_heap_index: heap.heap_end,
        }
    }

    fn page(&self, span: &Span) -> Result<&MemoryPage, PageFault> {
        self.pages
            .get(&span.page)
            .ok_or_else(|| PageFault::at(span.address()))
    }

    /// Fill `buf` with the bytes at `address`
    ///
    /// On fault `buf` is zeroed.
    pub fn load_into(&self, buf: &mut [u8], address: u32) -> Result<(), PageFault> {
        let result = PageSpans::new(address, buf.len()).and_then(|spans| {
            for span in spans {
                self.page(&span)?
                    .load_into(&mut buf[span.range.clone()], span.offset)?;
            }
            Ok(())
        });
        if let Err(fault) = result {
            trace!(address, len = buf.len(), fault = fault.address, "load faulted");
            buf.fill(0);
        }
        result
    }

    /// Write `data` at `address`, marking every touched page dirty
    ///
    /// All touched pages are checked first; nothing is written on fault.
    pub fn store_from(&mut self, address: u32, data: &[u8]) -> Result<(), PageFault> {
        let spans = PageSpans::new(address, data.len())?;
        let checked = spans.clone().try_for_each(|span| {
            self.page(&span)?
                .check_store(span.offset, span.range.len())
        });
        if let Err(fault) = checked {
            trace!(address, len = data.len(), fault = fault.address, "store faulted");
            return Err(fault);
        }

        for span in spans {
            let page = self
                .pages
                .get_mut(&span.page)
                .ok_or_else(|| PageFault::at(span.address()))?;
            page.store_from(span.offset, &data[span.range.clone()])?;
            self.dirty.insert(span.page);
        }
        Ok(())
    }

    /// True if `len` bytes at `address` can be loaded
    pub fn is_readable(&self, address: u32, len: usize) -> bool {
        PageSpans::new(address, len).is_ok_and(|mut spans| {
            spans.all(|span| {
                self.page(&span)
                    .and_then(|page| page.check_load(span.offset, span.range.len()))
                    .is_ok()
            })
        })
    }

    /// True if `len` bytes at `address` can be stored
    pub fn is_writeable(&self, address: u32, len: usize) -> bool {
        PageSpans::new(address, len).is_ok_and(|mut spans| {
            spans.all(|span| {
                self.page(&span)
                    .and_then(|page| page.check_store(span.offset, span.range.len()))
                    .is_ok()
            })
        })
    }

    /// Grow the heap by `size` bytes and return the previous break
    ///
    /// Fails without changing the break if the new break would pass the heap
    /// limit.
    pub fn sbrk(&mut self, size: u32) -> Result<u32, SbrkError> {
        let previous = self.sbrk_index;
        let requested = previous.get() as u64 + size as u64;
        if requested > self.end_heap_index.get() as u64 {
            debug!(size, requested, limit = self.end_heap_index.get(), "sbrk out of memory");
            return Err(SbrkError::OutOfMemory {
                requested,
                limit: self.end_heap_index.get(),
            });
        }

        if requested > self.virtual_sbrk_index.get() as u64 {
            self.back_heap(requested);
        }
        // requested <= end_heap_index, so it fits in a u32
        self.sbrk_index = MemoryIndex::from_u32(requested as u32);
        Ok(previous.get())
    }

    /// Materialise zeroed writeable memory for the heap up to `top`
    ///
    /// A declared virtual page holding the current backing point keeps its
    /// chunks and gains a writeable tail.
    fn back_heap(&mut self, top: u64) {
        let first = self.virtual_sbrk_index.page_number();
        let last = MemoryIndex::from_u32((top - 1) as u32).page_number();

        let tail = self.virtual_sbrk_index.page_offset();
        if tail > 0 {
            let declared = self.pages.get_mut(&first).and_then(MemoryPage::as_virtual_mut);
            if let Some(page) = declared {
                if !page.extend_writeable(tail) {
                    trace!(page = first.get(), tail, "heap tail already declared");
                }
            }
        }

        let mut created = 0usize;
        let numbers = std::iter::successors(Some(first), |number| number.next());
        for number in numbers.take_while(|number| *number <= last) {
            self.pages.entry(number).or_insert_with(|| {
                created += 1;
                WriteablePage::empty(number).into()
            });
        }

        self.virtual_sbrk_index = MemoryIndex::new(last.end()).unwrap_or(MemoryIndex::MAX);
        debug!(
            first = first.get(),
            last = last.get(),
            created,
            "heap pages backed"
        );
    }

    /// Current program break
    pub fn sbrk_index(&self) -> u32 {
        self.sbrk_index.get()
    }

    /// Limit of the program break
    pub fn heap_end(&self) -> u32 {
        self.end_heap_index.get()
    }

    /// Pages written since construction
    pub fn get_dirty_pages(&self) -> &BTreeSet<PageNumber> {
        &self.dirty
    }

    /// `PAGE_SIZE` image of a page, zero padded; all zero for unmapped pages
    pub fn get_memory_page(&self, page: PageNumber) -> Vec<u8> {
        match self.pages.get(&page) {
            Some(mapped) => mapped.snapshot(),
            None => vec![0; PAGE_SIZE as usize],
        }
    }

    pub fn get_page(&self, page: PageNumber) -> Option<&MemoryPage> {
        self.pages.get(&page)
    }

    /// Number of mapped pages
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Mapped page numbers in ascending order
    pub fn mapped_pages(&self) -> Vec<PageNumber> {
        let mut numbers: Vec<PageNumber> = self.pages.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: u32 = PAGE_SIZE;

    fn spans(address: u32, len: usize) -> Vec<Span> {
        PageSpans::new(address, len).unwrap().collect()
    }

    fn writeable_memory(pages: u64) -> Memory {
        let mut builder = MemoryBuilder::new();
        builder
            .set_writeable_pages(0, pages * P as u64, &[])
            .unwrap();
        builder
            .finalize(pages * P as u64, pages * P as u64)
            .unwrap()
    }

    #[test]
    fn test_spans_within_page() {
        let s = spans(10, 4);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].offset, 10);
        assert_eq!(s[0].range, 0..4);
    }

    #[test]
    fn test_spans_across_boundary() {
        let s = spans(P - 1, 3);
        assert_eq!(s.len(), 2);
        assert_eq!((s[0].page.get(), s[0].offset, s[0].range.clone()), (0, P - 1, 0..1));
        assert_eq!((s[1].page.get(), s[1].offset, s[1].range.clone()), (1, 0, 1..3));
        assert_eq!(s[1].address(), P);
    }

    #[test]
    fn test_spans_empty() {
        assert!(spans(123, 0).is_empty());
    }

    #[test]
    fn test_spans_past_address_space() {
        assert_eq!(
            PageSpans::new(u32::MAX, 2).unwrap_err(),
            PageFault::at(u32::MAX)
        );
        assert_eq!(spans(u32::MAX, 1).len(), 1);
    }

    #[test]
    fn test_load_unmapped_faults() {
        let memory = writeable_memory(1);
        let mut buf = [0xEE; 2];
        assert_eq!(memory.load_into(&mut buf, P - 1), Err(PageFault::at(P)));
        assert_eq!(buf, [0, 0]);
    }

    #[test]
    fn test_store_marks_dirty() {
        let mut memory = writeable_memory(3);
        memory.store_from(2 * P - 1, &[1, 2]).unwrap();
        let dirty: Vec<u32> = memory.get_dirty_pages().iter().map(|p| p.get()).collect();
        assert_eq!(dirty, vec![1, 2]);
    }

    #[test]
    fn test_empty_store_is_noop() {
        let mut memory = writeable_memory(1);
        memory.store_from(5, &[]).unwrap();
        assert!(memory.get_dirty_pages().is_empty());
    }

    #[test]
    fn test_failed_store_not_dirty() {
        let mut memory = writeable_memory(1);
        assert!(memory.store_from(P - 1, &[1, 2]).is_err());
        assert!(memory.get_dirty_pages().is_empty());
        assert_eq!(memory.get_memory_page(PageNumber::new(0).unwrap()), vec![0; P as usize]);
    }

    #[test]
    fn test_access_checks() {
        let mut builder = MemoryBuilder::new();
        builder.set_readable_pages(0, P as u64, &[]).unwrap();
        builder.set_writeable_pages(P as u64, 2 * P as u64, &[]).unwrap();
        let memory = builder.finalize(2 * P as u64, 2 * P as u64).unwrap();

        assert!(memory.is_readable(0, 2 * P as usize));
        assert!(!memory.is_readable(P, P as usize + 1));
        assert!(memory.is_writeable(P, 4));
        assert!(!memory.is_writeable(P - 1, 2));
    }

    #[test]
    fn test_sbrk_backs_pages_lazily() {
        let mut memory = MemoryBuilder::new().finalize(0, 4 * P as u64).unwrap();
        assert_eq!(memory.page_count(), 0);

        assert_eq!(memory.sbrk(10), Ok(0));
        assert_eq!(memory.page_count(), 1);
        assert_eq!(memory.virtual_sbrk_index.get(), P);

        // Still inside the backed page
        assert_eq!(memory.sbrk(P - 10), Ok(10));
        assert_eq!(memory.page_count(), 1);

        assert_eq!(memory.sbrk(P + 1), Ok(P));
        assert_eq!(memory.page_count(), 3);
        assert_eq!(memory.virtual_sbrk_index.get(), 3 * P);
    }

    #[test]
    fn test_sbrk_inside_declared_page() {
        let mut builder = MemoryBuilder::new();
        builder.set_readable(0, 100, &[7; 100]).unwrap();
        let mut memory = builder.finalize(100, 2 * P as u64).unwrap();

        let ptr = memory.sbrk(64).unwrap();
        assert_eq!(ptr, 100);
        memory.store_from(ptr, &[1]).unwrap();

        let mut buf = [0; 3];
        memory.load_into(&mut buf, 99).unwrap();
        assert_eq!(buf, [7, 1, 0]);
        assert_eq!(memory.store_from(99, &[1]), Err(PageFault::at(99)));

        // The rest of the declared page and the next one are heap
        memory.sbrk(P).unwrap();
        assert!(memory.is_writeable(100, 2 * P as usize - 100));
        assert!(memory.get_page(PageNumber::new(0).unwrap()).unwrap().is_virtual());
        assert_eq!(memory.page_count(), 2);
    }

    #[test]
    fn test_sbrk_zero() {
        let mut memory = MemoryBuilder::new().finalize(64, 64).unwrap();
        assert_eq!(memory.sbrk(0), Ok(64));
        assert_eq!(memory.page_count(), 0);
    }

    #[test]
    fn test_sbrk_to_end_of_address_space() {
        let start = (MEMORY_SIZE - P + 1) as u64;
        let mut memory = MemoryBuilder::new()
            .finalize(start, MEMORY_SIZE as u64)
            .unwrap();
        assert_eq!(memory.sbrk(P - 1), Ok(start as u32));
        assert_eq!(memory.virtual_sbrk_index, MemoryIndex::MAX);
        assert!(memory.sbrk(1).is_err());
    }
}
