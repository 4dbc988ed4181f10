//! Standalone PIO device
//!
//! Control-only designs expose their registers through the user BAR and do
//! not need DMA nodes at all. [`XdmaPio`] wraps a [`PioBackend`] on its own
//! and offers the same dependent protocol as [`Xdma`](crate::Xdma), so
//! register controllers can sit on either.

use crate::backend::Backend;
use crate::backends::PioBackend;
use crate::config::{PioConfig, XdmaConfig};
use crate::error::Result;
use crate::managed::{Dependents, DeviceAccess, DeviceLink, ManagedDevice};
use crate::scalar::Scalar;
use std::path::Path;
use std::sync::Arc;

impl DeviceAccess for PioBackend {
    fn dev_num(&self) -> u32 {
        Backend::dev_num(self)
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.read(addr, buf)
    }

    fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.write(addr, data)
    }
}

/// Mapped user BAR with dependents
pub struct XdmaPio {
    backend: Arc<PioBackend>,
    dependents: Dependents,
}

impl XdmaPio {
    /// Map the user BAR of `dev_num`
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened or mapped.
    pub fn new(dev_num: u32, pio: PioConfig) -> Result<Self> {
        Ok(Self::from_backend(PioBackend::new(dev_num, pio)?))
    }

    /// Map the window described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened or mapped.
    pub fn from_config(config: &XdmaConfig) -> Result<Self> {
        Self::new(config.device_num, config.pio)
    }

    /// Map an explicit node
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened or mapped.
    pub fn with_path(dev_num: u32, path: &Path, pio: PioConfig) -> Result<Self> {
        Ok(Self::from_backend(PioBackend::with_path(dev_num, path, pio)?))
    }

    fn from_backend(backend: PioBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            dependents: Dependents::new(Arc::clone(&backend) as Arc<dyn DeviceAccess>),
            backend,
        }
    }

    /// XDMA device number
    pub fn dev_num(&self) -> u32 {
        Backend::dev_num(&*self.backend)
    }

    /// Addressable range `[offset, offset + size)`
    pub fn range(&self) -> (u64, u64) {
        self.backend.range()
    }

    /// Typed read
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn read<T: Scalar>(&self, addr: u64) -> Result<T> {
        (&*self.backend as &dyn Backend).read_scalar(addr)
    }

    /// Typed write
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn write<T: Scalar>(&self, addr: u64, value: T) -> Result<()> {
        (&*self.backend as &dyn Backend).write_scalar(addr, value)
    }

    /// 8-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn read8(&self, addr: u64) -> Result<u8> {
        self.read(addr)
    }

    /// 16-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn read16(&self, addr: u64) -> Result<u16> {
        self.read(addr)
    }

    /// 32-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn read32(&self, addr: u64) -> Result<u32> {
        self.read(addr)
    }

    /// 64-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn read64(&self, addr: u64) -> Result<u64> {
        self.read(addr)
    }

    /// 8-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn write8(&self, addr: u64, value: u8) -> Result<()> {
        self.write(addr, value)
    }

    /// 16-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn write16(&self, addr: u64, value: u16) -> Result<()> {
        self.write(addr, value)
    }

    /// 32-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn write32(&self, addr: u64, value: u32) -> Result<()> {
        self.write(addr, value)
    }

    /// 64-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the address is outside the window.
    pub fn write64(&self, addr: u64, value: u64) -> Result<()> {
        self.write(addr, value)
    }
}

impl ManagedDevice for XdmaPio {
    fn link(&self) -> DeviceLink {
        self.dependents.link()
    }

    fn dependent_count(&self) -> usize {
        self.dependents.count()
    }
}

impl std::fmt::Debug for XdmaPio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdmaPio")
            .field("backend", &self.backend)
            .field("dependents", &self.dependents.count())
            .finish()
    }
}

impl Drop for XdmaPio {
    fn drop(&mut self) {
        self.dependents.invalidate_all();
        tracing::info!("xdma{}: PIO window closed", self.dev_num());
    }
}
