//! PIO backend
//!
//! Programmed I/O through the mmapped AXI-Lite user BAR
//! (`/dev/xdma{N}_user`). Meant for control registers: every access is a
//! single volatile load or store of 1, 2, 4 or 8 bytes.

use super::mmap::MmapWindow;
use crate::backend::{Backend, BackendType, Direction};
use crate::config::{PioConfig, XdmaConfig};
use crate::error::{Result, XdmaError};
use crate::scalar::Width;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use xdma_chip::nodes;
use xdma_chip::transport::{TransportInfo, MAX_PIO_ACCESS_SIZE};

/// Mapped user BAR
#[derive(Debug)]
pub struct PioBackend {
    dev_num: u32,
    name: String,
    offset: u64,
    size: u64,
    window: Mutex<MmapWindow>,
}

impl PioBackend {
    /// Map `pio.size` bytes of `/dev/xdma{dev_num}_user` at `pio.offset`
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened or mapped.
    pub fn new(dev_num: u32, pio: PioConfig) -> Result<Self> {
        Self::with_path(dev_num, Path::new(&nodes::user(dev_num)), pio)
    }

    /// Map an explicit node
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened or mapped.
    pub fn with_path(dev_num: u32, path: &Path, pio: PioConfig) -> Result<Self> {
        let window = MmapWindow::new(path, pio.size, pio.offset)?;
        Ok(Self {
            dev_num,
            name: path.display().to_string(),
            offset: pio.offset,
            size: pio.size,
            window: Mutex::new(window),
        })
    }

    /// Addressable range `[offset, offset + size)`
    pub const fn range(&self) -> (u64, u64) {
        (self.offset, self.offset + self.size)
    }

    /// Validate width and range, returning the window-relative offset
    fn locate(&self, addr: u64, len: usize) -> Result<(u64, Width)> {
        if len > MAX_PIO_ACCESS_SIZE {
            return Err(XdmaError::UnsupportedWidth { width: len });
        }
        let width = Width::from_bytes(len)?;

        let end = self.offset + self.size;
        if addr < self.offset || addr.checked_add(len as u64).map_or(true, |e| e > end) {
            return Err(XdmaError::AddressOutOfRange {
                addr,
                len: len as u64,
                start: self.offset,
                end,
            });
        }

        Ok((addr - self.offset, width))
    }
}

impl Backend for PioBackend {
    fn open(config: &XdmaConfig) -> Result<Self> {
        Self::new(config.device_num, config.pio)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let (offset, width) = self.locate(addr, buf.len())?;
        let value = self
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(offset, width)?;
        tracing::trace!("{}: read {width} @ {addr:#x} = {value:#x}", self.name);
        buf.copy_from_slice(&width.encode(value)[..width.bytes()]);
        Ok(())
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        let (offset, width) = self.locate(addr, data.len())?;
        let mut raw = [0u8; 8];
        raw[..data.len()].copy_from_slice(data);
        let value = width.decode(&raw);
        tracing::trace!("{}: write {width} @ {addr:#x} = {value:#x}", self.name);
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(offset, width, value)
    }

    fn dev_num(&self) -> u32 {
        self.dev_num
    }

    fn name(&self, _dir: Direction) -> String {
        self.name.clone()
    }

    fn info(&self) -> TransportInfo {
        TransportInfo::default()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Pio
    }
}
