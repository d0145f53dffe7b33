//! Conformance tests against JAM PVM test-vector memory sections
//!
//! The interpreter is not part of this workspace, so each test performs the
//! memory effect of the vector's program by hand and then checks the result
//! against `expected-memory`.

use pvm_memory::{FixtureError, HeapConfig, MemoryAccess, MemoryFixture, PageFault};

const STORE_U16: &str = include_str!("fixtures/store_u16.json");
const LOAD_READONLY: &str = include_str!("fixtures/load_readonly.json");
const ALIGNED_LAYOUT: &str = include_str!("fixtures/aligned_layout.json");

#[test]
fn test_store_u16_vector() -> anyhow::Result<()> {
    let fixture = MemoryFixture::from_json(STORE_U16)?;
    let mut memory = fixture.load(HeapConfig::NONE)?;

    // Sub-page entry: backed by a virtual page
    assert!(memory.get_page(pvm_memory::PageNumber::new(8)?).is_some_and(|p| p.is_virtual()));

    memory.write_u16(0x20000, 0x5678)?;
    fixture.verify(&memory)?;
    Ok(())
}

#[test]
fn test_store_u16_vector_wrong_value() -> anyhow::Result<()> {
    let fixture = MemoryFixture::from_json(STORE_U16)?;
    let mut memory = fixture.load(HeapConfig::NONE)?;

    memory.write_u16(0x20000, 0x5679)?;
    let err = fixture.verify(&memory).unwrap_err();
    assert!(matches!(
        err,
        FixtureError::Mismatch {
            address: 0x20000,
            expected: 0x78,
            actual: 0x79
        }
    ));
    Ok(())
}

#[test]
fn test_store_past_declared_region_faults() -> anyhow::Result<()> {
    let fixture = MemoryFixture::from_json(STORE_U16)?;
    let mut memory = fixture.load(HeapConfig::NONE)?;

    // The page map declares 4096 bytes; the rest of the page is unmapped
    assert_eq!(
        memory.write_u16(0x20000 + 4095, 0xFFFF),
        Err(PageFault::at(0x20000 + 4096))
    );
    assert!(memory.get_dirty_pages().is_empty());
    Ok(())
}

#[test]
fn test_load_readonly_vector() -> anyhow::Result<()> {
    let fixture = MemoryFixture::from_json(LOAD_READONLY)?;
    let mut memory = fixture.load(HeapConfig::NONE)?;

    assert_eq!(memory.read_u32(0x20000)?, 0x7856_3412);
    assert_eq!(memory.write_u8(0x20000, 0), Err(PageFault::at(0x20000)));
    fixture.verify(&memory)?;
    Ok(())
}

#[test]
fn test_aligned_layout_vector() -> anyhow::Result<()> {
    let fixture = MemoryFixture::from_json(ALIGNED_LAYOUT)?;
    let mut memory = fixture.load(HeapConfig::new(0x20000, 0x30000)?)?;

    assert_eq!(memory.mapped_pages().len(), 3);
    assert!(memory.mapped_pages().iter().all(|n| {
        memory
            .get_page(*n)
            .is_some_and(|page| !page.is_virtual())
    }));

    memory.store_from(98302, &[1, 2, 3, 4])?;
    let dirty: Vec<u32> = memory.get_dirty_pages().iter().map(|p| p.get()).collect();
    assert_eq!(dirty, vec![5, 6]);
    fixture.verify(&memory)?;

    assert_eq!(memory.sbrk(16)?, 0x20000);
    fixture.verify(&memory)?;
    Ok(())
}

#[test]
fn test_stray_write_detected() -> anyhow::Result<()> {
    let fixture = MemoryFixture::from_json(ALIGNED_LAYOUT)?;
    let mut memory = fixture.load(HeapConfig::NONE)?;

    memory.store_from(98302, &[1, 2, 3, 4])?;
    memory.store_from(0x18000 + 10, &[0xEE])?;
    let err = fixture.verify(&memory).unwrap_err();
    assert!(matches!(
        err,
        FixtureError::Mismatch {
            address: 0x1800A,
            expected: 0,
            actual: 0xEE
        }
    ));
    Ok(())
}

#[test]
fn test_malformed_fixture() {
    let err = MemoryFixture::from_json("{ \"initial-page-map\": 5 }").unwrap_err();
    assert!(matches!(err, FixtureError::Json(_)));
}
