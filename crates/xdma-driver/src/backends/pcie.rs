//! PCIe backend
//!
//! Talks to the XDMA driver's per-channel character devices. The H2C node
//! takes writes, the C2H node serves reads, and the file offset of each
//! positioned transfer is the AXI address on the card.

use crate::backend::{Backend, BackendType, Direction};
use crate::config::XdmaConfig;
use crate::error::Result;
use crate::io::{Access, IoHandle};
use rustix::fs::OFlags;
use std::path::Path;
use xdma_chip::nodes;
use xdma_chip::regs::{control_addr, identifier_addr};
use xdma_chip::transport::TransportInfo;

/// XDMA PCIe DMA backend
#[derive(Debug)]
pub struct PcieBackend {
    dev_num: u32,
    channel: u32,
    h2c: IoHandle,
    c2h: IoHandle,
    info: TransportInfo,
}

impl PcieBackend {
    /// Open `/dev/xdma{dev_num}_{h2c,c2h}_{channel}` and the control node
    ///
    /// # Errors
    ///
    /// Returns error if a node cannot be opened or the control words cannot be read.
    pub fn new(dev_num: u32, channel: u32) -> Result<Self> {
        Self::with_paths(
            dev_num,
            channel,
            Path::new(&nodes::h2c(dev_num, channel)),
            Path::new(&nodes::c2h(dev_num, channel)),
            Path::new(&nodes::control(dev_num)),
        )
    }

    /// Open explicit node paths
    ///
    /// Used for renamed nodes (udev rules) and for tests that stand in
    /// regular files for the character devices.
    ///
    /// # Errors
    ///
    /// Returns error if a node cannot be opened or the control words cannot be read.
    pub fn with_paths(
        dev_num: u32,
        channel: u32,
        h2c: &Path,
        c2h: &Path,
        control: &Path,
    ) -> Result<Self> {
        tracing::info!("Initializing PCIe backend for xdma{dev_num} channel {channel}");

        let h2c = IoHandle::open(h2c, Access::WriteOnly, OFlags::NONBLOCK)?;
        let c2h = IoHandle::open(c2h, Access::ReadOnly, OFlags::NONBLOCK)?;
        let info = read_transport_info(control, channel)?;

        tracing::info!(
            "PCIe backend ready: {} / {} (streaming: {}, polling: {})",
            h2c.name(),
            c2h.name(),
            info.streaming,
            info.polling
        );

        Ok(Self {
            dev_num,
            channel,
            h2c,
            c2h,
            info,
        })
    }

    /// DMA channel this backend is bound to
    pub const fn channel(&self) -> u32 {
        self.channel
    }
}

/// Read the identifier and control words of `channel` from the control window
fn read_transport_info(control: &Path, channel: u32) -> Result<TransportInfo> {
    let node = IoHandle::open(control, Access::ReadOnly, OFlags::empty())?;

    let mut identifier = [0u8; 4];
    let mut ctrl = [0u8; 4];
    node.read_exact_at(identifier_addr(channel), &mut identifier)?;
    node.read_exact_at(control_addr(channel), &mut ctrl)?;

    let info = TransportInfo::from_words(u32::from_ne_bytes(identifier), u32::from_ne_bytes(ctrl));
    tracing::debug!("{}: channel {channel}\n{info}", node.name());
    Ok(info)
}

impl Backend for PcieBackend {
    fn open(config: &XdmaConfig) -> Result<Self> {
        Self::new(config.device_num, config.channel)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.c2h.read_exact_at(addr, buf)
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.h2c.write_all_at(addr, data)
    }

    fn dev_num(&self) -> u32 {
        self.dev_num
    }

    fn name(&self, dir: Direction) -> String {
        match dir {
            Direction::Read => self.c2h.name(),
            Direction::Write => self.h2c.name(),
        }
    }

    fn info(&self) -> TransportInfo {
        self.info
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Pcie
    }
}
