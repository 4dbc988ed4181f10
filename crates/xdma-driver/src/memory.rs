//! Device memory pools and handles
//!
//! Each registered region is owned by one [`MemoryManager`] that hands out
//! disjoint [`Memory`] blocks front to back. Allocation is monotonic: blocks
//! live as long as the device and are never returned to the pool.

use crate::error::{Result, XdmaError};
use std::fmt;

/// Memory class a region belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryType {
    /// Off-chip DDR
    Ddr,
    /// On-chip block RAM
    Bram,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ddr => write!(f, "DDR"),
            Self::Bram => write!(f, "BRAM"),
        }
    }
}

/// Region declaration, usable as a constant table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Memory class
    pub kind: MemoryType,
    /// First device address
    pub base_addr: u64,
    /// Length in bytes
    pub size: u64,
}

impl MemoryRegion {
    /// Declare a region
    pub const fn new(kind: MemoryType, base_addr: u64, size: u64) -> Self {
        Self {
            kind,
            base_addr,
            size,
        }
    }
}

/// A block of device memory handed out by a [`MemoryManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory {
    base_addr: u64,
    size: u64,
}

impl Memory {
    pub(crate) const fn new(base_addr: u64, size: u64) -> Self {
        Self { base_addr, size }
    }

    /// First device address of the block
    pub const fn base_addr(&self) -> u64 {
        self.base_addr
    }

    /// Length in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// One past the last device address
    pub const fn end(&self) -> u64 {
        self.base_addr.saturating_add(self.size)
    }

    /// Whether the two blocks share at least one byte
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base_addr < other.end() && other.base_addr < self.end()
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Memory {{ base: {:#x}, size: {:#x} }}",
            self.base_addr, self.size
        )
    }
}

/// Transfer length for handle- and buffer-based operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferSize {
    /// The whole memory block (or the whole buffer for streams)
    #[default]
    Whole,
    /// Exactly this many bytes
    Bytes(u64),
}

impl TransferSize {
    /// Byte count, with `Whole` meaning `full`
    pub const fn resolve(self, full: u64) -> u64 {
        match self {
            Self::Whole => full,
            Self::Bytes(n) => n,
        }
    }
}

impl From<u64> for TransferSize {
    fn from(bytes: u64) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<usize> for TransferSize {
    fn from(bytes: usize) -> Self {
        Self::Bytes(bytes as u64)
    }
}

/// Bump allocator over one region
#[derive(Debug, Clone)]
pub struct MemoryManager {
    base_addr: u64,
    size: u64,
    end: u64,
    next: u64,
}

impl MemoryManager {
    /// Manage `[base_addr, base_addr + size)`
    ///
    /// # Errors
    ///
    /// Returns `InvalidRegion` if the region wraps past `u64::MAX`.
    pub fn new(base_addr: u64, size: u64) -> Result<Self> {
        let end = base_addr
            .checked_add(size)
            .ok_or(XdmaError::InvalidRegion { base_addr, size })?;
        Ok(Self {
            base_addr,
            size,
            end,
            next: base_addr,
        })
    }

    /// Carve the next `size` bytes off the region
    ///
    /// # Errors
    ///
    /// Returns `ZeroSizedAllocation` for `size == 0` and `ExceedsMemory`
    /// when fewer than `size` bytes are left.
    pub fn allocate(&mut self, size: u64) -> Result<Memory> {
        if size == 0 {
            return Err(XdmaError::ZeroSizedAllocation);
        }
        let available = self.available_space();
        if size > available {
            return Err(XdmaError::ExceedsMemory {
                op: format!("allocate in region {:#x}", self.base_addr),
                requested: size,
                available,
            });
        }

        // next + size <= end, which was checked at construction
        let mem = Memory::new(self.next, size);
        self.next += size;
        Ok(mem)
    }

    /// Bytes not handed out yet
    pub const fn available_space(&self) -> u64 {
        self.end - self.next
    }

    /// First address of the region
    pub const fn base_addr(&self) -> u64 {
        self.base_addr
    }

    /// Region length in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Snapshot for diagnostics
    pub const fn stats(&self) -> PoolStats {
        PoolStats {
            base: self.base_addr,
            size: self.size,
            available: self.available_space(),
        }
    }
}

/// Usage of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// First address of the region
    pub base: u64,
    /// Region length in bytes
    pub size: u64,
    /// Bytes still free
    pub available: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocation() {
        let mut mm = MemoryManager::new(0x1000, 0x100).unwrap();
        let a = mm.allocate(0x40).unwrap();
        let b = mm.allocate(0x40).unwrap();

        assert_eq!(a.base_addr(), 0x1000);
        assert_eq!(b.base_addr(), 0x1040);
        assert!(!a.overlaps(&b));
        assert_eq!(mm.available_space(), 0x80);
    }

    #[test]
    fn exact_fit_then_exhausted() {
        let mut mm = MemoryManager::new(0, 0x100).unwrap();
        mm.allocate(0x100).unwrap();
        assert_eq!(mm.available_space(), 0);
        assert!(matches!(
            mm.allocate(1),
            Err(XdmaError::ExceedsMemory { requested: 1, available: 0, .. })
        ));
    }

    #[test]
    fn failed_allocation_changes_nothing() {
        let mut mm = MemoryManager::new(0, 0x100).unwrap();
        mm.allocate(0x80).unwrap();
        assert!(mm.allocate(0x81).is_err());
        assert_eq!(mm.available_space(), 0x80);
        assert_eq!(mm.allocate(0x80).unwrap().base_addr(), 0x80);
    }

    #[test]
    fn zero_size_rejected() {
        let mut mm = MemoryManager::new(0, 0x100).unwrap();
        assert!(matches!(mm.allocate(0), Err(XdmaError::ZeroSizedAllocation)));
    }

    #[test]
    fn region_at_top_of_address_space() {
        let mut mm = MemoryManager::new(u64::MAX - 0xFFF, 0x1000).unwrap();
        assert_eq!(mm.available_space(), 0x1000);
        let m = mm.allocate(0x1000).unwrap();
        assert_eq!(m.end(), u64::MAX);
        assert_eq!(mm.available_space(), 0);

        assert!(matches!(
            MemoryManager::new(u64::MAX - 0xFFF, 0x2000),
            Err(XdmaError::InvalidRegion { size: 0x2000, .. })
        ));
    }

    #[test]
    fn memory_display_and_overlap() {
        let a = Memory::new(0x1000, 0x1000);
        assert_eq!(a.to_string(), "Memory { base: 0x1000, size: 0x1000 }");
        assert!(a.overlaps(&Memory::new(0x1FFF, 1)));
        assert!(!a.overlaps(&Memory::new(0x2000, 1)));
        assert_eq!(a.end(), 0x2000);
    }

    #[test]
    fn transfer_size_resolves() {
        assert_eq!(TransferSize::Whole.resolve(64), 64);
        assert_eq!(TransferSize::from(16u64).resolve(64), 16);
    }
}
