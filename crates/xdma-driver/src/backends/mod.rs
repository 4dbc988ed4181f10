//! XDMA backend implementations
//!
//! Four backends available:
//! - **PCIe**: `/dev/xdma{N}_h2c_{C}` / `_c2h_{C}` DMA nodes (production host)
//! - **PetaLinux**: `/dev/mem` physical window (Zynq targets)
//! - **PIO**: mmapped `/dev/xdma{N}_user` BAR (control registers)
//! - **Loopback**: in-process endpoint (CI, demos)

pub mod loopback;
pub mod mmap;
pub mod pcie;
pub mod petalinux;
pub mod pio;

pub use loopback::LoopbackBackend;
pub use pcie::PcieBackend;
pub use petalinux::PetaLinuxBackend;
pub use pio::PioBackend;
