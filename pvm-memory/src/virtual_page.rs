//! Pages assembled from sub-page chunks
//!
//! Test fixtures and some loader layouts declare regions that do not start or
//! end on a page boundary. Such a page keeps an ordered list of declared
//! chunks; bytes outside every chunk are unmapped.
//!
//! Reads that run past the last chunk of the page zero-fill, matching the
//! reference behaviour for the declared end of an accessible region. Gaps
//! between two chunks fault.

use pvm_types::{BuildError, MemoryIndex, PageFault, PageNumber, PAGE_SIZE};

use crate::page::{copy_padded, in_page, AccessType, PageAccess};

/// Declared `[start, end)` span within a virtual page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    start: u32,
    end: u32,
    data: Vec<u8>,
    access: AccessType,
}

impl Chunk {
    /// Offset of the first byte within the page
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Offset one past the last byte within the page
    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn access(&self) -> AccessType {
        self.access
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    fn contains(&self, offset: usize) -> bool {
        self.start as usize <= offset && offset < self.end as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPage {
    start: MemoryIndex,
    /// Sorted by start, pairwise disjoint
    chunks: Vec<Chunk>,
}

impl VirtualPage {
    pub fn new(page: PageNumber) -> Self {
        Self {
            start: page.start(),
            chunks: Vec::new(),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Declare `[start, end)` (page offsets) with initial `data`
    ///
    /// A writeable span whose data is shorter than the span is stored as the
    /// populated chunk followed by a zeroed writeable chunk. On error the
    /// chunk list is left unchanged.
    pub fn set(
        &mut self,
        start: u32,
        end: u32,
        data: &[u8],
        access: AccessType,
    ) -> Result<(), BuildError> {
        if start > end || end > PAGE_SIZE {
            return Err(BuildError::InvalidRange {
                start: self.start.get() as u64 + start as u64,
                end: self.start.get() as u64 + end as u64,
            });
        }
        let span = (end - start) as usize;
        if data.len() > span {
            return Err(BuildError::ChunkTooLong {
                len: data.len(),
                span: span as u64,
            });
        }
        if span == 0 {
            return Ok(());
        }
        self.check_free(start, end)?;

        match access {
            AccessType::Readable => self.insert(Chunk {
                start,
                end,
                data: data.to_vec(),
                access,
            }),
            AccessType::Writeable => {
                let split = start + data.len() as u32;
                if split > start {
                    self.insert(Chunk {
                        start,
                        end: split,
                        data: data.to_vec(),
                        access,
                    });
                }
                if split < end {
                    self.insert(Chunk {
                        start: split,
                        end,
                        data: vec![0; (end - split) as usize],
                        access,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fail with `ChunkOverlap` if `[start, end)` intersects a declared chunk
    pub fn check_free(&self, start: u32, end: u32) -> Result<(), BuildError> {
        let idx = self.chunks.partition_point(|c| c.end <= start);
        match self.chunks.get(idx) {
            Some(chunk) if chunk.start < end => Err(BuildError::ChunkOverlap {
                start: self.address_of(start as usize),
                end: self.start.get() as u64 + end as u64,
            }),
            _ => Ok(()),
        }
    }

    /// True if no chunk reaches past `offset`
    pub fn is_free_from(&self, offset: u32) -> bool {
        self.chunks.last().map_or(true, |chunk| chunk.end <= offset)
    }

    /// Cover `[offset, PAGE_SIZE)` with a zeroed writeable chunk
    ///
    /// Returns false and leaves the page unchanged if a chunk reaches past
    /// `offset`.
    pub fn extend_writeable(&mut self, offset: u32) -> bool {
        if offset >= PAGE_SIZE || !self.is_free_from(offset) {
            return false;
        }
        self.chunks.push(Chunk {
            start: offset,
            end: PAGE_SIZE,
            data: Vec::new(),
            access: AccessType::Writeable,
        });
        true
    }

    fn insert(&mut self, chunk: Chunk) {
        let idx = self.chunks.partition_point(|c| c.start < chunk.start);
        self.chunks.insert(idx, chunk);
    }

    /// Index of the chunk covering `offset`
    fn chunk_at(&self, offset: usize) -> Option<usize> {
        let idx = self.chunks.partition_point(|c| (c.end as usize) <= offset);
        match self.chunks.get(idx) {
            Some(chunk) if chunk.contains(offset) => Some(idx),
            _ => None,
        }
    }

    /// Walk `[offset, offset + len)` across consecutive chunks, calling
    /// `visit(chunk index, position, bytes)` for each covered piece
    ///
    /// Returns the position where coverage ended (past the last chunk), or a
    /// fault at the first byte that is not covered while a later chunk exists.
    fn walk(
        &self,
        offset: u32,
        len: usize,
        mut visit: impl FnMut(usize, usize, usize) -> Result<(), PageFault>,
    ) -> Result<usize, PageFault> {
        let end = in_page(self, offset, len)?;
        let mut pos = offset as usize;
        if pos == end {
            return Ok(pos);
        }
        let mut idx = self
            .chunk_at(pos)
            .ok_or_else(|| PageFault::at(self.address_of(pos)))?;

        while pos < end {
            match self.chunks.get(idx) {
                Some(chunk) if chunk.contains(pos) => {
                    let take = (chunk.end as usize).min(end) - pos;
                    visit(idx, pos, take)?;
                    pos += take;
                    idx += 1;
                }
                Some(_) => return Err(PageFault::at(self.address_of(pos))),
                None => break,
            }
        }
        Ok(pos)
    }
}

impl PageAccess for VirtualPage {
    #[inline]
    fn start(&self) -> MemoryIndex {
        self.start
    }

    fn check_load(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        self.walk(offset, len, |_, _, _| Ok(())).map(|_| ())
    }

    fn load_into(&self, buf: &mut [u8], offset: u32) -> Result<(), PageFault> {
        let base = offset as usize;
        let covered = self.walk(offset, buf.len(), |idx, pos, take| {
            let chunk = &self.chunks[idx];
            let from = pos - chunk.start as usize;
            copy_padded(&chunk.data, from, &mut buf[pos - base..pos - base + take]);
            Ok(())
        })?;
        buf[covered - base..].fill(0);
        Ok(())
    }

    fn check_store(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        let covered = self.walk(offset, len, |idx, pos, _| {
            if self.chunks[idx].access.is_writeable() {
                Ok(())
            } else {
                Err(PageFault::at(self.address_of(pos)))
            }
        })?;
        if covered < offset as usize + len {
            return Err(PageFault::at(self.address_of(covered)));
        }
        Ok(())
    }

    fn store_from(&mut self, offset: u32, data: &[u8]) -> Result<(), PageFault> {
        self.check_store(offset, data.len())?;

        let mut pos = offset as usize;
        let mut written = 0;
        while written < data.len() {
            let idx = self
                .chunk_at(pos)
                .ok_or_else(|| PageFault::at(self.address_of(pos)))?;
            let chunk = &mut self.chunks[idx];
            let from = pos - chunk.start as usize;
            let take = (chunk.end as usize - pos).min(data.len() - written);
            if chunk.data.len() < from + take {
                chunk.data.resize(from + take, 0);
            }
            chunk.data[from..from + take].copy_from_slice(&data[written..written + take]);
            pos += take;
            written += take;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut image = vec![0; PAGE_SIZE as usize];
        for chunk in &self.chunks {
            let start = chunk.start as usize;
            image[start..start + chunk.data.len()].copy_from_slice(&chunk.data);
        }
        image
    }
}
