//! Host-side access layer for XDMA-attached FPGA accelerators.
//!
//! The crate moves data between host buffers and card memory, drives IP-core
//! register blocks and runs AXI-Stream transfers. The same API works over
//! the XDMA PCIe driver, over `/dev/mem` on PetaLinux, over a mapped user
//! BAR and over an in-process loopback device.
//!
//! # Backend hierarchy
//!
//! ```text
//! Production host:
//!   PcieBackend       /dev/xdma{N}_h2c_{C}, /dev/xdma{N}_c2h_{C} (pread/pwrite)
//!
//! Zynq / PetaLinux:
//!   PetaLinuxBackend  /dev/mem, O_SYNC
//!
//! Control registers only:
//!   PioBackend        /dev/xdma{N}_user, mmap + volatile access
//!
//! CI / demos:
//!   LoopbackBackend   memory array or stream FIFO
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use xdma_driver::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let xdma = Xdma::from_config(&XdmaConfig::from_env()?)?;
//! xdma.add_memory_region(MemoryType::Ddr, 0x0, 0x1000_0000)?;
//!
//! let input = xdma.alloc_ddr_elements::<u32>(1024, None)?;
//! let data: Vec<u32> = (0..1024).collect();
//! xdma.write_memory(&input, &data, TransferSize::Whole)?;
//!
//! let mut ctrl = RegisterControl::new(&xdma, 0x4000_0000);
//! let start: Register<u32> = ctrl.register(0x0);
//! start.set(1);
//! start.update(Direction::Write)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Lifetime
//!
//! Register controllers hold a [`DeviceLink`], not the device. Dropping the
//! [`Xdma`] invalidates every link first; later register calls return
//! [`XdmaError::InvalidState`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
pub mod config;
mod device;
mod error;
mod io;
mod managed;
mod memory;
mod pio;
mod register;
mod scalar;
mod stream;

/// Transport constants (re-exported from xdma-chip).
pub mod transport {
    pub use xdma_chip::regs::{control_addr, identifier_addr, XDMA_CTRL_BASE, XDMA_CTRL_SIZE};
    pub use xdma_chip::transport::{
        chunk_count, is_stream_aligned, TransportInfo, MAX_PIO_ACCESS_SIZE, XDMA_ALIGNMENT,
        XDMA_AXI_DATA_WIDTH, XDMA_STREAM_OFFSET,
    };
}

pub use backend::{open_backend, Backend, BackendSelection, BackendType, Direction};
pub use backends::{LoopbackBackend, PcieBackend, PetaLinuxBackend, PioBackend};
pub use config::{PioConfig, XdmaConfig};
pub use device::Xdma;
pub use error::{Result, XdmaError};
pub use managed::{DeviceAccess, DeviceLink, ManagedDevice};
pub use memory::{Memory, MemoryManager, MemoryRegion, MemoryType, PoolStats, TransferSize};
pub use pio::XdmaPio;
pub use register::{DmaChannel, Register, RegisterControl, RegisterHook};
pub use scalar::{Scalar, Width};
pub use stream::StreamStats;
pub use xdma_chip::transport::TransportInfo;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Direction, DmaChannel, ManagedDevice, Memory, MemoryType, Register, RegisterControl,
        Result, TransferSize, Xdma, XdmaConfig, XdmaError, XdmaPio,
    };
}
