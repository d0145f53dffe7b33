//! Validated memory indexes and page numbers
//!
//! Raw integers entering the memory subsystem are converted here, so code
//! below this boundary can rely on every address and page id being in range.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::{MEMORY_SIZE, PAGE_COUNT, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};

/// Byte offset into the emulated address space (`0..=MEMORY_SIZE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct MemoryIndex(u32);

impl MemoryIndex {
    /// Lowest address
    pub const ZERO: Self = Self(0);

    /// Highest address
    pub const MAX: Self = Self(MEMORY_SIZE);

    /// Validate a raw index
    pub const fn new(value: u64) -> Result<Self, IndexError> {
        if value > MEMORY_SIZE as u64 {
            return Err(IndexError::IncorrectMemoryIndex(value as i128));
        }
        Ok(Self(value as u32))
    }

    /// Every `u32` is a valid index
    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Page holding this byte
    #[inline]
    pub const fn page_number(self) -> PageNumber {
        PageNumber(self.0 >> PAGE_SHIFT)
    }

    /// Offset of this byte within its page
    #[inline]
    pub const fn page_offset(self) -> u32 {
        self.0 & PAGE_MASK
    }

    /// True if the index sits on a page boundary
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl From<u32> for MemoryIndex {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<MemoryIndex> for u32 {
    fn from(index: MemoryIndex) -> Self {
        index.0
    }
}

impl From<MemoryIndex> for u64 {
    fn from(index: MemoryIndex) -> Self {
        index.0 as u64
    }
}

impl TryFrom<u64> for MemoryIndex {
    type Error = IndexError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for MemoryIndex {
    type Error = IndexError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(IndexError::IncorrectMemoryIndex(value as i128));
        }
        Self::new(value as u64)
    }
}

impl TryFrom<usize> for MemoryIndex {
    type Error = IndexError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value as u64)
    }
}

impl fmt::Display for MemoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Page id; the whole page `[n * PAGE_SIZE, (n + 1) * PAGE_SIZE)` lies inside
/// the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PageNumber(u32);

impl PageNumber {
    /// Last page of the address space
    pub const LAST: Self = Self(PAGE_COUNT - 1);

    /// Validate a raw page number
    pub const fn new(value: u64) -> Result<Self, IndexError> {
        if value >= PAGE_COUNT as u64 {
            return Err(IndexError::IncorrectPageNumber(value as i128));
        }
        Ok(Self(value as u32))
    }

    /// Page containing `index`
    #[inline]
    pub const fn containing(index: MemoryIndex) -> Self {
        index.page_number()
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// First byte of the page
    #[inline]
    pub const fn start(self) -> MemoryIndex {
        MemoryIndex(self.0 << PAGE_SHIFT)
    }

    /// One past the last byte of the page (may be 2^32 for the last page)
    #[inline]
    pub const fn end(self) -> u64 {
        ((self.0 as u64) << PAGE_SHIFT) + PAGE_SIZE as u64
    }

    /// Following page, if any
    pub const fn next(self) -> Option<Self> {
        if self.0 + 1 < PAGE_COUNT {
            Some(Self(self.0 + 1))
        } else {
            None
        }
    }
}

impl From<PageNumber> for u32 {
    fn from(page: PageNumber) -> Self {
        page.0
    }
}

impl From<PageNumber> for u64 {
    fn from(page: PageNumber) -> Self {
        page.0 as u64
    }
}

impl TryFrom<u64> for PageNumber {
    type Error = IndexError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<u32> for PageNumber {
    type Error = IndexError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value as u64)
    }
}

impl TryFrom<i64> for PageNumber {
    type Error = IndexError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(IndexError::IncorrectPageNumber(value as i128));
        }
        Self::new(value as u64)
    }
}

impl TryFrom<usize> for PageNumber {
    type Error = IndexError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value as u64)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_index_bounds() {
        assert!(MemoryIndex::new(0).is_ok());
        assert!(MemoryIndex::new(MEMORY_SIZE as u64).is_ok());
        assert_eq!(
            MemoryIndex::new(MEMORY_SIZE as u64 + 1),
            Err(IndexError::IncorrectMemoryIndex(1 << 32))
        );
        assert!(MemoryIndex::try_from(-1i64).is_err());
    }

    #[test]
    fn test_page_number_bounds() {
        assert!(PageNumber::new(0).is_ok());
        assert_eq!(PageNumber::new(PAGE_COUNT as u64 - 1), Ok(PageNumber::LAST));
        assert!(PageNumber::new(PAGE_COUNT as u64).is_err());
        assert!(PageNumber::try_from(-3i64).is_err());
    }

    #[test]
    fn test_page_arithmetic() {
        let index = MemoryIndex::from_u32(3 * PAGE_SIZE + 17);
        assert_eq!(index.page_number().get(), 3);
        assert_eq!(index.page_offset(), 17);
        assert!(!index.is_page_aligned());

        let page = index.page_number();
        assert_eq!(page.start().get(), 3 * PAGE_SIZE);
        assert_eq!(page.end(), 4 * PAGE_SIZE as u64);
        assert_eq!(page.next().map(PageNumber::get), Some(4));
    }

    #[test]
    fn test_last_page_end() {
        assert_eq!(PageNumber::LAST.end(), 1u64 << 32);
        assert_eq!(PageNumber::LAST.next(), None);
        assert_eq!(MemoryIndex::MAX.page_number(), PageNumber::LAST);
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryIndex::from_u32(0x4000).to_string(), "0x00004000");
        assert_eq!(PageNumber::LAST.to_string(), "page 262143");
    }
}
