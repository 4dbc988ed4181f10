//! Character-device naming.
//!
//! ```text
//! PCIe       /dev/xdma{N}_h2c_{C}   host → card (writes)
//!            /dev/xdma{N}_c2h_{C}   card → host (reads)
//!            /dev/xdma{N}_control   control window (channel descriptors)
//! PIO        /dev/xdma{N}_user      AXI-Lite user BAR, mmap'ed
//! PetaLinux  /dev/mem               physical address space, O_SYNC
//! ```

/// Host-to-card DMA node for device `dev` channel `channel`.
#[must_use]
pub fn h2c(dev: u32, channel: u32) -> String {
    format!("/dev/xdma{dev}_h2c_{channel}")
}

/// Card-to-host DMA node for device `dev` channel `channel`.
#[must_use]
pub fn c2h(dev: u32, channel: u32) -> String {
    format!("/dev/xdma{dev}_c2h_{channel}")
}

/// Control window node for device `dev`.
#[must_use]
pub fn control(dev: u32) -> String {
    format!("/dev/xdma{dev}_control")
}

/// AXI-Lite user window node for device `dev`.
#[must_use]
pub fn user(dev: u32) -> String {
    format!("/dev/xdma{dev}_user")
}

/// Physical memory node used on PetaLinux targets.
pub const PETALINUX_MEM: &str = "/dev/mem";
