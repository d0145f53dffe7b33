//! Typed little-endian accessors used by load/store instructions

use pvm_types::PageFault;

use crate::memory::Memory;

/// Byte-level access an interpreter needs from its memory
pub trait MemoryAccess {
    fn load_into(&self, buf: &mut [u8], address: u32) -> Result<(), PageFault>;

    fn store_from(&mut self, address: u32, data: &[u8]) -> Result<(), PageFault>;

    fn read_u8(&self, address: u32) -> Result<u8, PageFault> {
        let mut buf = [0u8; 1];
        self.load_into(&mut buf, address)?;
        Ok(buf[0])
    }

    fn read_u16(&self, address: u32) -> Result<u16, PageFault> {
        let mut buf = [0u8; 2];
        self.load_into(&mut buf, address)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&self, address: u32) -> Result<u32, PageFault> {
        let mut buf = [0u8; 4];
        self.load_into(&mut buf, address)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&self, address: u32) -> Result<u64, PageFault> {
        let mut buf = [0u8; 8];
        self.load_into(&mut buf, address)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u8(&mut self, address: u32, value: u8) -> Result<(), PageFault> {
        self.store_from(address, &[value])
    }

    fn write_u16(&mut self, address: u32, value: u16) -> Result<(), PageFault> {
        self.store_from(address, &value.to_le_bytes())
    }

    fn write_u32(&mut self, address: u32, value: u32) -> Result<(), PageFault> {
        self.store_from(address, &value.to_le_bytes())
    }

    fn write_u64(&mut self, address: u32, value: u64) -> Result<(), PageFault> {
        self.store_from(address, &value.to_le_bytes())
    }
}

impl MemoryAccess for Memory {
    #[inline]
    fn load_into(&self, buf: &mut [u8], address: u32) -> Result<(), PageFault> {
        Memory::load_into(self, buf, address)
    }

    #[inline]
    fn store_from(&mut self, address: u32, data: &[u8]) -> Result<(), PageFault> {
        Memory::store_from(self, address, data)
    }
}
