//! PetaLinux backend
//!
//! On Zynq targets running PetaLinux the programmable logic sits in the
//! physical address space, so the whole transport is a single `/dev/mem`
//! node opened with `O_SYNC` and addressed by physical address.

use crate::backend::{Backend, BackendType, Direction};
use crate::config::XdmaConfig;
use crate::error::Result;
use crate::io::{Access, IoHandle};
use rustix::fs::OFlags;
use std::path::Path;
use xdma_chip::nodes::PETALINUX_MEM;
use xdma_chip::transport::TransportInfo;

/// Physical memory backend for PetaLinux
#[derive(Debug)]
pub struct PetaLinuxBackend {
    dev_num: u32,
    mem: IoHandle,
}

impl PetaLinuxBackend {
    /// Open `/dev/mem`
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened (usually missing privileges).
    pub fn new(dev_num: u32) -> Result<Self> {
        Self::with_path(dev_num, Path::new(PETALINUX_MEM))
    }

    /// Open an explicit memory node
    ///
    /// # Errors
    ///
    /// Returns error if the node cannot be opened.
    pub fn with_path(dev_num: u32, path: &Path) -> Result<Self> {
        let mem = IoHandle::open(path, Access::ReadWrite, OFlags::SYNC)?;
        tracing::info!("PetaLinux backend ready on {}", mem.name());
        Ok(Self { dev_num, mem })
    }
}

impl Backend for PetaLinuxBackend {
    fn open(config: &XdmaConfig) -> Result<Self> {
        Self::new(config.device_num)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.mem.read_exact_at(addr, buf)
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.mem.write_all_at(addr, data)
    }

    fn dev_num(&self) -> u32 {
        self.dev_num
    }

    fn name(&self, _dir: Direction) -> String {
        self.mem.name()
    }

    // No XDMA control window on this platform
    fn info(&self) -> TransportInfo {
        TransportInfo::default()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::PetaLinux
    }
}
