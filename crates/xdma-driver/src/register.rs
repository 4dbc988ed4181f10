//! Register access for accelerator control blocks
//!
//! A [`RegisterControl`] owns a [`DeviceLink`] and a control offset: the base
//! address of an IP core's AXI-Lite register block. Registers created through
//! it keep a cached value and can be pulled from or pushed to the device one
//! at a time or all at once.
//!
//! ```text
//! RegisterControl (ctrl_offset = 0x1000)
//!   ├─ Register<u32> @ +0x00   ctrl
//!   ├─ Register<u32> @ +0x04   status
//!   └─ Register<u64> @ +0x10   address
//! ```

use crate::backend::Direction;
use crate::error::{Result, XdmaError};
use crate::managed::{DeviceLink, ManagedDevice};
use crate::scalar::{Scalar, Width};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// DMA direction of an AXI DMA engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaChannel {
    /// Memory-mapped to stream (device memory → IP core)
    Mm2s,
    /// Stream to memory-mapped (IP core → device memory)
    S2mm,
}

impl std::fmt::Display for DmaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mm2s => write!(f, "MM2S"),
            Self::S2mm => write!(f, "S2MM"),
        }
    }
}

/// Transport behind [`Register::update`]
pub trait RegisterHook: Send + Sync {
    /// Read `width` bytes at register offset `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the device is gone or the transfer fails.
    fn read_bits(&self, offset: u64, width: Width) -> Result<u64>;

    /// Write the low `width` bytes of `bits` at register offset `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the device is gone or the transfer fails.
    fn write_bits(&self, offset: u64, width: Width, bits: u64) -> Result<()>;
}

#[derive(Debug)]
struct RegisterCell {
    offset: u64,
    width: Width,
    bits: AtomicU64,
}

/// One register of a control block with a host-side cached value
pub struct Register<T: Scalar> {
    cell: Arc<RegisterCell>,
    hook: Arc<dyn RegisterHook>,
    _ty: PhantomData<T>,
}

impl<T: Scalar> Register<T> {
    /// Cached value
    pub fn value(&self) -> T {
        T::from_bits(self.cell.bits.load(Ordering::Acquire))
    }

    /// Replace the cached value; the device is untouched until `update(Write)`
    pub fn set(&self, value: T) {
        self.cell.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Offset inside the control block
    pub fn offset(&self) -> u64 {
        self.cell.offset
    }

    /// `Read` pulls the device value into the cache, `Write` pushes the cache
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` once the device is gone, or the transfer error.
    pub fn update(&self, dir: Direction) -> Result<()> {
        match dir {
            Direction::Read => {
                let bits = self.hook.read_bits(self.cell.offset, T::WIDTH)?;
                self.cell.bits.store(bits, Ordering::Release);
            }
            Direction::Write => {
                self.hook
                    .write_bits(self.cell.offset, T::WIDTH, self.cell.bits.load(Ordering::Acquire))?;
            }
        }
        Ok(())
    }
}

impl<T: Scalar> std::fmt::Debug for Register<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Register")
            .field("offset", &format_args!("{:#x}", self.cell.offset))
            .field("value", &self.value())
            .finish()
    }
}

/// Link plus control offset, shared with every register of a block
#[derive(Debug)]
struct ControlBlock {
    link: DeviceLink,
    ctrl_offset: u64,
}

impl ControlBlock {
    /// Absolute address of `offset`, rejecting sums past `u64::MAX`
    fn address(&self, offset: u64, width: Width) -> Result<u64> {
        self.ctrl_offset
            .checked_add(offset)
            .ok_or(XdmaError::AddressOutOfRange {
                addr: offset,
                len: width.bytes() as u64,
                start: 0,
                end: u64::MAX - self.ctrl_offset,
            })
    }
}

impl RegisterHook for ControlBlock {
    fn read_bits(&self, offset: u64, width: Width) -> Result<u64> {
        let addr = self.address(offset, width)?;
        let bits = self.link.device()?.read_width(addr, width)?;
        tracing::trace!("reg read {width} @ {addr:#x} = {bits:#x}");
        Ok(bits)
    }

    fn write_bits(&self, offset: u64, width: Width, bits: u64) -> Result<()> {
        let addr = self.address(offset, width)?;
        tracing::trace!("reg write {width} @ {addr:#x} = {bits:#x}");
        self.link.device()?.write_width(addr, width, bits)
    }
}

/// Register block of one IP core
#[derive(Debug)]
pub struct RegisterControl {
    block: Arc<ControlBlock>,
    registers: Vec<Weak<RegisterCell>>,
}

impl RegisterControl {
    /// Attach to `device` with the block at `ctrl_offset`
    pub fn new(device: &impl ManagedDevice, ctrl_offset: u64) -> Self {
        Self::with_link(device.link(), ctrl_offset)
    }

    /// Use an existing link
    pub fn with_link(link: DeviceLink, ctrl_offset: u64) -> Self {
        tracing::debug!("xdma{}: register block at {ctrl_offset:#x}", link.dev_num());
        Self {
            block: Arc::new(ControlBlock { link, ctrl_offset }),
            registers: Vec::new(),
        }
    }

    /// Create a register at `offset` and add it to the managed list
    pub fn register<T: Scalar>(&mut self, offset: u64) -> Register<T> {
        let cell = Arc::new(RegisterCell {
            offset,
            width: T::WIDTH,
            bits: AtomicU64::new(0),
        });
        self.registers.retain(|r| r.strong_count() > 0);
        self.registers.push(Arc::downgrade(&cell));

        Register {
            cell,
            hook: Arc::clone(&self.block) as Arc<dyn RegisterHook>,
            _ty: PhantomData,
        }
    }

    /// Update one register
    ///
    /// # Errors
    ///
    /// See [`Register::update`].
    pub fn update_register<T: Scalar>(&self, reg: &Register<T>, dir: Direction) -> Result<()> {
        reg.update(dir)
    }

    /// Refresh every live register from the device, in creation order
    ///
    /// # Errors
    ///
    /// Stops at the first failing read.
    pub fn update_all_registers(&self) -> Result<()> {
        for cell in self.registers.iter().filter_map(Weak::upgrade) {
            let bits = self.block.read_bits(cell.offset, cell.width)?;
            cell.bits.store(bits, Ordering::Release);
        }
        Ok(())
    }

    /// Read a register that is not managed
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` once the device is gone, or the transfer error.
    pub fn read_register<T: Scalar>(&self, offset: u64) -> Result<T> {
        Ok(T::from_bits(self.block.read_bits(offset, T::WIDTH)?))
    }

    /// Write a register; with `validate` read it back and compare
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when the read-back differs, `InvalidState`
    /// once the device is gone, or the transfer error.
    pub fn write_register<T: Scalar>(&self, offset: u64, value: T, validate: bool) -> Result<()> {
        self.block.write_bits(offset, T::WIDTH, value.to_bits())?;
        if validate {
            let expected = value.to_bits();
            let actual = self.block.read_bits(offset, T::WIDTH)?;
            if actual != expected {
                return Err(XdmaError::ValidationFailed {
                    offset: self.block.address(offset, T::WIDTH)?,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Base address of the block
    pub fn ctrl_offset(&self) -> u64 {
        self.block.ctrl_offset
    }

    /// Device number of the underlying device
    pub fn dev_num(&self) -> u32 {
        self.block.link.dev_num()
    }

    /// Whether the device is still alive
    pub fn is_valid(&self) -> bool {
        self.block.link.is_valid()
    }

    /// Number of live managed registers
    pub fn register_count(&self) -> usize {
        self.registers.iter().filter(|r| r.strong_count() > 0).count()
    }
}
