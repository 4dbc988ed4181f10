//! Transport model for Xilinx XDMA and Zynq PS DMA endpoints.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the transport: alignment rules, the streaming port, the
//! control window that describes each channel, and device-node naming.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`transport`] | AXI data width, chunk alignment, stream port offset |
//! | [`regs`] | Control window layout and identifier/control bit fields |
//! | [`nodes`] | Character-device naming for PCIe, PetaLinux and PIO |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod nodes;
pub mod regs;
pub mod transport;
