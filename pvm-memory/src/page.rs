//! Memory pages
//!
//! Every mapped page is one of three kinds:
//!
//! - [`ReadablePage`]: immutable contents, stores always fault
//! - [`WriteablePage`]: contents grown lazily up to `PAGE_SIZE`
//! - [`VirtualPage`]: sub-page chunks for layouts that are not page aligned
//!
//! Offsets passed to [`PageAccess`] are relative to the page start. Bytes past
//! the backing data of a readable or writeable page read as zero.

use pvm_types::{BuildError, MemoryIndex, PageFault, PageNumber, PAGE_SIZE};

use crate::virtual_page::VirtualPage;

/// Permission attached to a declared region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Readable,
    Writeable,
}

impl AccessType {
    #[inline]
    pub fn is_writeable(self) -> bool {
        self == AccessType::Writeable
    }
}

/// Load/store capability shared by all page kinds
pub trait PageAccess {
    /// First byte of the page
    fn start(&self) -> MemoryIndex;

    /// One past the last byte of the page
    fn end(&self) -> u64 {
        self.start().get() as u64 + PAGE_SIZE as u64
    }

    /// Check that `len` bytes at `offset` can be read
    fn check_load(&self, offset: u32, len: usize) -> Result<(), PageFault>;

    /// Fill `buf` with the bytes at `offset`
    fn load_into(&self, buf: &mut [u8], offset: u32) -> Result<(), PageFault>;

    /// Check that `len` bytes at `offset` can be written, without writing
    fn check_store(&self, offset: u32, len: usize) -> Result<(), PageFault>;

    /// Write `data` at `offset`; nothing is written on fault
    fn store_from(&mut self, offset: u32, data: &[u8]) -> Result<(), PageFault>;

    /// Full `PAGE_SIZE` image of the page, zero padded
    fn snapshot(&self) -> Vec<u8>;

    /// Absolute address of `offset`
    #[inline]
    fn address_of(&self, offset: usize) -> u32 {
        self.start().get().saturating_add(offset as u32)
    }
}

/// End offset of `len` bytes at `offset`, or a fault at the page end if the
/// request leaves the page
#[inline]
pub(crate) fn in_page<P: PageAccess + ?Sized>(
    page: &P,
    offset: u32,
    len: usize,
) -> Result<usize, PageFault> {
    let end = offset as usize + len;
    if end > PAGE_SIZE as usize {
        return Err(PageFault::at(page.address_of(PAGE_SIZE as usize)));
    }
    Ok(end)
}

/// Copy `src[from..]` into `dst`, zero filling whatever `src` does not cover
#[inline]
pub(crate) fn copy_padded(src: &[u8], from: usize, dst: &mut [u8]) {
    let available = src.len().saturating_sub(from).min(dst.len());
    if available > 0 {
        dst[..available].copy_from_slice(&src[from..from + available]);
    }
    dst[available..].fill(0);
}

fn check_page_data(data: &[u8]) -> Result<(), BuildError> {
    if data.len() > PAGE_SIZE as usize {
        return Err(BuildError::ChunkTooLong {
            len: data.len(),
            span: PAGE_SIZE as u64,
        });
    }
    Ok(())
}

/// Read-only page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadablePage {
    start: MemoryIndex,
    data: Box<[u8]>,
}

impl ReadablePage {
    pub fn new(page: PageNumber, data: Vec<u8>) -> Result<Self, BuildError> {
        check_page_data(&data)?;
        Ok(Self {
            start: page.start(),
            data: data.into_boxed_slice(),
        })
    }

    /// Backing bytes (may be shorter than a page)
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl PageAccess for ReadablePage {
    #[inline]
    fn start(&self) -> MemoryIndex {
        self.start
    }

    fn check_load(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        in_page(self, offset, len).map(|_| ())
    }

    fn load_into(&self, buf: &mut [u8], offset: u32) -> Result<(), PageFault> {
        in_page(self, offset, buf.len())?;
        copy_padded(&self.data, offset as usize, buf);
        Ok(())
    }

    fn check_store(&self, offset: u32, _len: usize) -> Result<(), PageFault> {
        Err(PageFault::at(self.address_of(offset as usize)))
    }

    fn store_from(&mut self, offset: u32, data: &[u8]) -> Result<(), PageFault> {
        self.check_store(offset, data.len())
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut image = vec![0; PAGE_SIZE as usize];
        image[..self.data.len()].copy_from_slice(&self.data);
        image
    }
}

/// Read-write page, backing storage grown on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteablePage {
    start: MemoryIndex,
    data: Vec<u8>,
}

impl WriteablePage {
    pub fn new(page: PageNumber, data: Vec<u8>) -> Result<Self, BuildError> {
        check_page_data(&data)?;
        Ok(Self {
            start: page.start(),
            data,
        })
    }

    /// Zeroed page with no backing storage yet
    pub fn empty(page: PageNumber) -> Self {
        Self {
            start: page.start(),
            data: Vec::new(),
        }
    }

    /// Bytes currently backed
    pub fn backed_len(&self) -> usize {
        self.data.len()
    }

    fn grow(&mut self, len: usize) -> Result<(), PageFault> {
        if len > PAGE_SIZE as usize {
            return Err(PageFault::at(self.address_of(PAGE_SIZE as usize)));
        }
        if len > self.data.len() {
            self.data.resize(len, 0);
        }
        Ok(())
    }
}

impl PageAccess for WriteablePage {
    #[inline]
    fn start(&self) -> MemoryIndex {
        self.start
    }

    fn check_load(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        in_page(self, offset, len).map(|_| ())
    }

    fn load_into(&self, buf: &mut [u8], offset: u32) -> Result<(), PageFault> {
        in_page(self, offset, buf.len())?;
        copy_padded(&self.data, offset as usize, buf);
        Ok(())
    }

    fn check_store(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        in_page(self, offset, len).map(|_| ())
    }

    fn store_from(&mut self, offset: u32, data: &[u8]) -> Result<(), PageFault> {
        let end = in_page(self, offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.grow(end)?;
        self.data[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut image = vec![0; PAGE_SIZE as usize];
        image[..self.data.len()].copy_from_slice(&self.data);
        image
    }
}

/// A mapped page of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryPage {
    Readable(ReadablePage),
    Writeable(WriteablePage),
    Virtual(VirtualPage),
}

impl MemoryPage {
    pub fn is_virtual(&self) -> bool {
        matches!(self, MemoryPage::Virtual(_))
    }

    /// Access of a full page; `None` for virtual pages, whose chunks differ
    pub fn access(&self) -> Option<AccessType> {
        match self {
            MemoryPage::Readable(_) => Some(AccessType::Readable),
            MemoryPage::Writeable(_) => Some(AccessType::Writeable),
            MemoryPage::Virtual(_) => None,
        }
    }

    pub fn as_virtual(&self) -> Option<&VirtualPage> {
        match self {
            MemoryPage::Virtual(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_virtual_mut(&mut self) -> Option<&mut VirtualPage> {
        match self {
            MemoryPage::Virtual(page) => Some(page),
            _ => None,
        }
    }

    #[inline]
    fn inner(&self) -> &dyn PageAccess {
        match self {
            MemoryPage::Readable(page) => page,
            MemoryPage::Writeable(page) => page,
            MemoryPage::Virtual(page) => page,
        }
    }
}

impl PageAccess for MemoryPage {
    #[inline]
    fn start(&self) -> MemoryIndex {
        self.inner().start()
    }

    fn check_load(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        self.inner().check_load(offset, len)
    }

    #[inline]
    fn load_into(&self, buf: &mut [u8], offset: u32) -> Result<(), PageFault> {
        match self {
            MemoryPage::Readable(page) => page.load_into(buf, offset),
            MemoryPage::Writeable(page) => page.load_into(buf, offset),
            MemoryPage::Virtual(page) => page.load_into(buf, offset),
        }
    }

    fn check_store(&self, offset: u32, len: usize) -> Result<(), PageFault> {
        self.inner().check_store(offset, len)
    }

    #[inline]
    fn store_from(&mut self, offset: u32, data: &[u8]) -> Result<(), PageFault> {
        match self {
            MemoryPage::Readable(page) => page.store_from(offset, data),
            MemoryPage::Writeable(page) => page.store_from(offset, data),
            MemoryPage::Virtual(page) => page.store_from(offset, data),
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        self.inner().snapshot()
    }
}

impl From<ReadablePage> for MemoryPage {
    fn from(page: ReadablePage) -> Self {
        MemoryPage::Readable(page)
    }
}

impl From<WriteablePage> for MemoryPage {
    fn from(page: WriteablePage) -> Self {
        MemoryPage::Writeable(page)
    }
}

impl From<VirtualPage> for MemoryPage {
    fn from(page: VirtualPage) -> Self {
        MemoryPage::Virtual(page)
    }
}
