use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A contiguous region of the target's address space as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
    /// Committed and readable without faulting
    pub readable: bool,
}

impl MemoryRegion {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// Width of a pointer in the target process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerWidth {
    Four,
    #[default]
    Eight,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

impl FromStr for PointerWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "4" | "32" => Ok(Self::Four),
            "8" | "64" => Ok(Self::Eight),
            other => Err(Error::InvalidScanEntry(format!(
                "Unsupported pointer width '{}'",
                other
            ))),
        }
    }
}

/// Read-only access to a target process's memory
pub trait ReadMemory {
    /// Read exactly `size` bytes at `address`
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Describe the region containing `address`, `None` past the end of user space
    fn query_region(&self, address: u64) -> Result<Option<MemoryRegion>>;

    fn read_i32(&self, address: u64) -> Result<i32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        Ok(u64::from_le_bytes(buf))
    }

    /// Dereference a pointer of the given width
    fn read_pointer(&self, address: u64, width: PointerWidth) -> Result<u64> {
        match width {
            PointerWidth::Four => Ok(self.read_i32(address)? as u32 as u64),
            PointerWidth::Eight => self.read_u64(address),
        }
    }
}
