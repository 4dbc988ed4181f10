//! Runtime configuration
//!
//! Defaults target device 0, channel 0 with backend auto-selection. Every
//! field can be overridden from the environment:
//!
//! | Variable          | Field              | Format                         |
//! |-------------------|--------------------|--------------------------------|
//! | `XDMA_DEVICE`     | `device_num`       | decimal or `0x` hex            |
//! | `XDMA_CHANNEL`    | `channel`          | decimal or `0x` hex            |
//! | `XDMA_BACKEND`    | `backend`          | `auto\|pcie\|petalinux\|pio\|loopback` |
//! | `XDMA_PIO_SIZE`   | `pio.size`         | decimal or `0x` hex            |
//! | `XDMA_PIO_OFFSET` | `pio.offset`       | decimal or `0x` hex            |

use crate::backend::BackendSelection;
use crate::error::{Result, XdmaError};

/// Default size of the PIO window (64 KiB AXI-Lite user BAR)
pub const DEFAULT_PIO_SIZE: u64 = 0x1_0000;

/// Default size of the loopback device memory (16 MiB)
pub const DEFAULT_LOOPBACK_SIZE: u64 = 16 * 1024 * 1024;

/// Mapped PIO window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PioConfig {
    /// Window length in bytes
    pub size: u64,
    /// Offset of the window inside the user BAR (page aligned)
    pub offset: u64,
}

impl Default for PioConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_PIO_SIZE,
            offset: 0,
        }
    }
}

/// Device and backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XdmaConfig {
    /// XDMA device number (`/dev/xdma{N}_*`)
    pub device_num: u32,
    /// DMA channel (`_h2c_{C}` / `_c2h_{C}`)
    pub channel: u32,
    /// Backend selection strategy
    pub backend: BackendSelection,
    /// PIO window
    pub pio: PioConfig,
    /// Loopback device memory size
    pub loopback_size: u64,
    /// Run the loopback device as an AXI-Stream endpoint
    pub loopback_streaming: bool,
}

impl Default for XdmaConfig {
    fn default() -> Self {
        Self {
            device_num: 0,
            channel: 0,
            backend: BackendSelection::Auto,
            pio: PioConfig::default(),
            loopback_size: DEFAULT_LOOPBACK_SIZE,
            loopback_streaming: false,
        }
    }
}

impl XdmaConfig {
    /// Defaults overridden by `XDMA_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`XdmaConfig::from_env`] with a custom variable source
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a value cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("XDMA_DEVICE") {
            config.device_num = parse_u32("XDMA_DEVICE", &v)?;
        }
        if let Some(v) = lookup("XDMA_CHANNEL") {
            config.channel = parse_u32("XDMA_CHANNEL", &v)?;
        }
        if let Some(v) = lookup("XDMA_BACKEND") {
            config.backend = v.parse().map_err(|_| XdmaError::InvalidConfig {
                key: "XDMA_BACKEND",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("XDMA_PIO_SIZE") {
            config.pio.size = parse_u64("XDMA_PIO_SIZE", &v)?;
        }
        if let Some(v) = lookup("XDMA_PIO_OFFSET") {
            config.pio.offset = parse_u64("XDMA_PIO_OFFSET", &v)?;
        }

        tracing::debug!("Configuration: {config:?}");
        Ok(config)
    }

    /// Set the device number
    #[must_use]
    pub const fn with_device(mut self, device_num: u32) -> Self {
        self.device_num = device_num;
        self
    }

    /// Set the DMA channel
    #[must_use]
    pub const fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    /// Set the backend selection
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendSelection) -> Self {
        self.backend = backend;
        self
    }

    /// Set the PIO window
    #[must_use]
    pub const fn with_pio(mut self, size: u64, offset: u64) -> Self {
        self.pio = PioConfig { size, offset };
        self
    }

    /// Set the loopback device size and stream mode
    #[must_use]
    pub const fn with_loopback(mut self, size: u64, streaming: bool) -> Self {
        self.loopback_size = size;
        self.loopback_streaming = streaming;
        self
    }
}

/// Parse a decimal or `0x`-prefixed hex number
pub fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => value.replace('_', "").parse().ok(),
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64> {
    parse_number(value).ok_or_else(|| XdmaError::InvalidConfig {
        key,
        value: value.to_string(),
    })
}

fn parse_u32(key: &'static str, value: &str) -> Result<u32> {
    parse_u64(key, value)?
        .try_into()
        .map_err(|_| XdmaError::InvalidConfig {
            key,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = XdmaConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, XdmaConfig::default());
        assert_eq!(config.backend, BackendSelection::Auto);
    }

    #[test]
    fn env_overrides_accept_hex() {
        let config = XdmaConfig::from_lookup(lookup(&[
            ("XDMA_DEVICE", "1"),
            ("XDMA_CHANNEL", "0x2"),
            ("XDMA_BACKEND", "pio"),
            ("XDMA_PIO_SIZE", "0x2000"),
            ("XDMA_PIO_OFFSET", "4096"),
        ]))
        .unwrap();

        assert_eq!(config.device_num, 1);
        assert_eq!(config.channel, 2);
        assert_eq!(config.backend, BackendSelection::Pio);
        assert_eq!(config.pio, PioConfig { size: 0x2000, offset: 0x1000 });
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = XdmaConfig::from_lookup(lookup(&[("XDMA_PIO_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, XdmaError::InvalidConfig { key: "XDMA_PIO_SIZE", .. }));

        let err = XdmaConfig::from_lookup(lookup(&[("XDMA_DEVICE", "0x1_0000_0000")])).unwrap_err();
        assert!(matches!(err, XdmaError::InvalidConfig { key: "XDMA_DEVICE", .. }));
    }

    #[test]
    fn builder_chains() {
        let config = XdmaConfig::default()
            .with_device(3)
            .with_channel(1)
            .with_backend(BackendSelection::Loopback)
            .with_loopback(0x1000, true);
        assert_eq!(config.device_num, 3);
        assert_eq!(config.channel, 1);
        assert_eq!(config.loopback_size, 0x1000);
        assert!(config.loopback_streaming);
    }

    #[test]
    fn parse_number_formats() {
        assert_eq!(parse_number("0x10"), Some(16));
        assert_eq!(parse_number("16"), Some(16));
        assert_eq!(parse_number("0x1000_0000"), Some(0x1000_0000));
        assert_eq!(parse_number("zz"), None);
    }
}
