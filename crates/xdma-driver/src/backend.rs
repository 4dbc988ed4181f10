//! Backend abstraction for XDMA transports
//!
//! A backend moves raw bytes between a host buffer and a device address.
//! Everything above it (memory pools, streaming, registers) is written
//! against [`Backend`] only, so the same code drives PCIe DMA nodes, the
//! PetaLinux `/dev/mem` window, an mmapped PIO window or the in-process
//! loopback device.

use crate::config::XdmaConfig;
use crate::error::{Result, XdmaError};
use crate::scalar::Scalar;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use xdma_chip::transport::TransportInfo;

/// Transfer direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host (C2H)
    Read,
    /// Host to device (H2C)
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "Read"),
            Self::Write => write!(f, "Write"),
        }
    }
}

/// Byte transport to one XDMA endpoint
///
/// Implementations are shared between the owning device and its stream
/// workers, so every method takes `&self` and implementations synchronise
/// internally where the underlying node needs it.
pub trait Backend: Debug + Send + Sync {
    /// Open the backend described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if a device node cannot be opened or mapped.
    fn open(config: &XdmaConfig) -> Result<Self>
    where
        Self: Sized;

    /// Fill `buf` from device address `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails or the address is not reachable.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` to device address `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails or the address is not reachable.
    fn write(&self, addr: u64, data: &[u8]) -> Result<()>;

    /// XDMA device number this backend talks to
    fn dev_num(&self) -> u32;

    /// Name of the node used for `dir`, for diagnostics
    fn name(&self, dir: Direction) -> String;

    /// Transport descriptor read when the backend was opened
    fn info(&self) -> TransportInfo;

    /// Backend type for debugging
    fn backend_type(&self) -> BackendType;
}

impl dyn Backend + '_ {
    /// Read one fixed-width value
    ///
    /// # Errors
    ///
    /// Returns error if the underlying transfer fails.
    pub fn read_scalar<T: Scalar>(&self, addr: u64) -> Result<T> {
        let mut value = T::default();
        self.read(addr, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Write one fixed-width value
    ///
    /// # Errors
    ///
    /// Returns error if the underlying transfer fails.
    pub fn write_scalar<T: Scalar>(&self, addr: u64, value: T) -> Result<()> {
        self.write(addr, bytemuck::bytes_of(&value))
    }
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn open(_config: &XdmaConfig) -> Result<Self>
    where
        Self: Sized,
    {
        Err(XdmaError::invalid_state(
            "shared backends are wrapped after opening the inner backend",
        ))
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn dev_num(&self) -> u32 {
        (**self).dev_num()
    }

    fn name(&self, dir: Direction) -> String {
        (**self).name(dir)
    }

    fn info(&self) -> TransportInfo {
        (**self).info()
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// XDMA PCIe driver nodes (`/dev/xdma{N}_h2c_{C}` / `_c2h_{C}`)
    Pcie,

    /// Physical memory window on PetaLinux (`/dev/mem`)
    PetaLinux,

    /// Memory-mapped user BAR (`/dev/xdma{N}_user`)
    Pio,

    /// In-process loopback device, no hardware required
    Loopback,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pcie => write!(f, "PCIe"),
            Self::PetaLinux => write!(f, "PetaLinux"),
            Self::Pio => write!(f, "PIO"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// PCIe if its nodes exist, PetaLinux otherwise
    #[default]
    Auto,

    /// Force the PCIe DMA nodes
    Pcie,

    /// Force the `/dev/mem` window
    PetaLinux,

    /// Force the mmapped user BAR
    Pio,

    /// Force the loopback device (CI, demos)
    Loopback,
}

impl FromStr for BackendSelection {
    type Err = XdmaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "pcie" => Ok(Self::Pcie),
            "petalinux" | "mem" => Ok(Self::PetaLinux),
            "pio" | "user" => Ok(Self::Pio),
            "loopback" | "sw" => Ok(Self::Loopback),
            _ => Err(XdmaError::InvalidConfig {
                key: "backend",
                value: s.to_string(),
            }),
        }
    }
}

/// Open a backend according to `selection`
///
/// # Errors
///
/// Returns error if no suitable backend can be opened for the configured device.
pub fn open_backend(selection: BackendSelection, config: &XdmaConfig) -> Result<Box<dyn Backend>> {
    use crate::backends::loopback::LoopbackBackend;
    use crate::backends::pcie::PcieBackend;
    use crate::backends::petalinux::PetaLinuxBackend;
    use crate::backends::pio::PioBackend;

    match selection {
        BackendSelection::Auto => match PcieBackend::open(config) {
            Ok(backend) => {
                tracing::info!("Using PCIe backend for xdma{}", config.device_num);
                Ok(Box::new(backend))
            }
            Err(e) => {
                tracing::warn!("PCIe backend unavailable ({e}), falling back to PetaLinux");
                PetaLinuxBackend::open(config).map(|b| Box::new(b) as Box<dyn Backend>)
            }
        },

        BackendSelection::Pcie => PcieBackend::open(config).map(|b| Box::new(b) as Box<dyn Backend>),

        BackendSelection::PetaLinux => {
            PetaLinuxBackend::open(config).map(|b| Box::new(b) as Box<dyn Backend>)
        }

        BackendSelection::Pio => PioBackend::open(config).map(|b| Box::new(b) as Box<dyn Backend>),

        BackendSelection::Loopback => {
            LoopbackBackend::open(config).map(|b| Box::new(b) as Box<dyn Backend>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parses_case_insensitive() {
        assert_eq!("PCIe".parse::<BackendSelection>().unwrap(), BackendSelection::Pcie);
        assert_eq!("pio".parse::<BackendSelection>().unwrap(), BackendSelection::Pio);
        assert_eq!(
            "Loopback".parse::<BackendSelection>().unwrap(),
            BackendSelection::Loopback
        );
        assert!("fpga".parse::<BackendSelection>().is_err());
    }

    #[test]
    fn backend_type_display() {
        assert_eq!(BackendType::Pcie.to_string(), "PCIe");
        assert_eq!(BackendType::PetaLinux.to_string(), "PetaLinux");
    }
}
