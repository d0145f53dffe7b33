//! Stress tests for the PVM memory workspace
//!
//! Large layouts, long heap growth sequences, and accesses at the top of the
//! address space.

use pvm_memory::{
    Memory, MemoryAccess, MemoryBuilder, PageFault, PageNumber, MEMORY_SIZE, PAGE_SIZE,
};

const P: u64 = PAGE_SIZE as u64;

#[test]
fn test_many_full_pages() -> pvm_memory::Result<()> {
    let pages = 1024u64;
    let mut builder = MemoryBuilder::with_capacity(pages as usize);
    builder.set_writeable_pages(0, pages * P, &[])?;
    let mut memory = builder.finalize(pages * P, pages * P)?;

    for n in 0..pages {
        let address = (n * P + n % 64) as u32;
        memory.write_u32(address, n as u32)?;
    }
    for n in 0..pages {
        let address = (n * P + n % 64) as u32;
        assert_eq!(memory.read_u32(address)?, n as u32);
    }
    assert_eq!(memory.get_dirty_pages().len(), pages as usize);
    Ok(())
}

#[test]
fn test_many_small_regions() -> pvm_memory::Result<()> {
    // 256 disjoint 16-byte regions spread over 4 pages
    let mut builder = Memory::builder();
    for i in 0..256u64 {
        let start = i * 64;
        builder.set_writeable(start, start + 16, &[i as u8; 4])?;
    }
    let mut memory = builder.finalize(4 * P, 4 * P)?;
    assert_eq!(memory.page_count(), 1);

    for i in 0..256u32 {
        let start = i * 64;
        assert_eq!(memory.read_u32(start)?, u32::from_le_bytes([i as u8; 4]));
        memory.write_u64(start + 8, u64::MAX)?;
        assert_eq!(memory.store_from(start + 16, &[1]), Err(PageFault::at(start + 16)));
    }
    Ok(())
}

#[test]
fn test_long_sbrk_sequence() -> pvm_memory::Result<()> {
    let heap_start = 16 * P;
    let heap_end = heap_start + 256 * P;
    let mut memory = MemoryBuilder::new().finalize(heap_start, heap_end)?;

    let mut expected = heap_start as u32;
    let mut step = 1u32;
    while let Ok(previous) = memory.sbrk(step) {
        assert_eq!(previous, expected);
        expected += step;
        step = step * 3 % 40_000 + 1;
    }

    assert_eq!(memory.sbrk_index(), expected);
    assert!(memory.page_count() <= 256);
    assert!(memory.is_writeable(heap_start as u32, (expected as u64 - heap_start) as usize));
    Ok(())
}

#[test]
fn test_top_of_address_space() -> pvm_memory::Result<()> {
    let top = MEMORY_SIZE as u64 + 1;
    let mut builder = MemoryBuilder::new();
    builder.set_writeable_pages(top - 2 * P, top, &[])?;
    let mut memory = builder.finalize(top - 1, top - 1)?;

    memory.write_u16(MEMORY_SIZE - 1, 0xBEEF)?;
    assert_eq!(memory.read_u16(MEMORY_SIZE - 1)?, 0xBEEF);
    assert_eq!(memory.read_u8(MEMORY_SIZE)?, 0xBE);

    // Running off the end faults at the requested address
    assert_eq!(memory.write_u32(MEMORY_SIZE - 1, 0), Err(PageFault::at(MEMORY_SIZE - 1)));
    assert_eq!(memory.read_u16(MEMORY_SIZE - 1)?, 0xBEEF);

    assert!(memory.get_dirty_pages().contains(&PageNumber::LAST));
    Ok(())
}

#[test]
fn test_cross_page_copy() -> pvm_memory::Result<()> {
    let mut builder = MemoryBuilder::new();
    builder.set_writeable_pages(0, 8 * P, &[])?;
    let mut memory = builder.finalize(8 * P, 8 * P)?;

    let data: Vec<u8> = (0..3 * PAGE_SIZE as usize).map(|i| (i % 251) as u8).collect();
    memory.store_from(PAGE_SIZE / 2, &data)?;

    let mut copy = vec![0; data.len()];
    memory.load_into(&mut copy, PAGE_SIZE / 2)?;
    assert_eq!(copy, data);
    assert_eq!(memory.get_dirty_pages().len(), 4);
    Ok(())
}
