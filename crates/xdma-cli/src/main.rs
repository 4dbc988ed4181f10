//! `xdma`: command-line access to XDMA devices.
//!
//! ```text
//! USAGE:
//!   xdma info                        Backend, node names and channel info
//!   xdma peek <addr> [--width N]     Read one value
//!   xdma poke <addr> <value>         Write one value
//!   xdma stream-test [--words N]     Loop an iota pattern through the stream port
//! ```
//!
//! Device, channel and backend default to the `XDMA_*` environment
//! variables and can be overridden per invocation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xdma_driver::config::parse_number;
use xdma_driver::{
    BackendSelection, Direction, TransferSize, Width, Xdma, XdmaConfig, XdmaPio,
};

#[derive(Parser)]
#[command(name = "xdma", about = "XDMA device access CLI", version)]
struct Cli {
    /// Device number (overrides XDMA_DEVICE).
    #[arg(long, short)]
    device: Option<u32>,
    /// DMA channel (overrides XDMA_CHANNEL).
    #[arg(long, short)]
    channel: Option<u32>,
    /// auto, pcie, petalinux, pio or loopback (overrides XDMA_BACKEND).
    #[arg(long, short)]
    backend: Option<String>,
    /// Run the loopback backend as a stream FIFO.
    #[arg(long)]
    loopback_stream: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print backend and channel information.
    Info,
    /// Read one value.
    Peek {
        /// Address (decimal or 0x-prefixed hex).
        addr: String,
        /// Access width in bytes: 1, 2, 4 or 8.
        #[arg(long, short, default_value_t = 4)]
        width: usize,
        /// Go through the mapped user BAR instead of the DMA backend.
        #[arg(long)]
        pio: bool,
    },
    /// Write one value.
    Poke {
        /// Address (decimal or 0x-prefixed hex).
        addr: String,
        /// Value (decimal or 0x-prefixed hex).
        value: String,
        /// Access width in bytes: 1, 2, 4 or 8.
        #[arg(long, short, default_value_t = 4)]
        width: usize,
        /// Go through the mapped user BAR instead of the DMA backend.
        #[arg(long)]
        pio: bool,
    },
    /// Stream an iota pattern out and read it back.
    StreamTest {
        /// Number of 32-bit words.
        #[arg(long, default_value_t = 4096)]
        words: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Cmd::Info => cmd_info(&config)?,
        Cmd::Peek { addr, width, pio } => cmd_peek(&config, &addr, width, pio)?,
        Cmd::Poke {
            addr,
            value,
            width,
            pio,
        } => cmd_poke(&config, &addr, &value, width, pio)?,
        Cmd::StreamTest { words } => cmd_stream_test(&config, words)?,
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<XdmaConfig> {
    let mut config = XdmaConfig::from_env()?;
    if let Some(device) = cli.device {
        config = config.with_device(device);
    }
    if let Some(channel) = cli.channel {
        config = config.with_channel(channel);
    }
    if let Some(backend) = &cli.backend {
        config = config.with_backend(backend.parse::<BackendSelection>()?);
    }
    if cli.loopback_stream {
        let size = config.loopback_size;
        config = config.with_loopback(size, true);
    }
    Ok(config)
}

fn number(label: &str, text: &str) -> Result<u64> {
    parse_number(text).with_context(|| format!("invalid {label}: {text}"))
}

fn cmd_info(config: &XdmaConfig) -> Result<()> {
    let xdma = Xdma::from_config(config)?;

    println!("Device       : xdma{}", xdma.dev_num());
    println!("Backend      : {}", xdma.backend_type());
    println!("Read node    : {}", xdma.backend_name(Direction::Read));
    println!("Write node   : {}", xdma.backend_name(Direction::Write));
    for line in xdma.transport_info().to_string().lines() {
        println!("  {line}");
    }
    Ok(())
}

fn cmd_peek(config: &XdmaConfig, addr: &str, width: usize, pio: bool) -> Result<()> {
    let addr = number("address", addr)?;
    let width = Width::from_bytes(width)?;

    let value = if pio {
        let dev = XdmaPio::from_config(config)?;
        match width {
            Width::W8 => u64::from(dev.read8(addr)?),
            Width::W16 => u64::from(dev.read16(addr)?),
            Width::W32 => u64::from(dev.read32(addr)?),
            Width::W64 => dev.read64(addr)?,
        }
    } else {
        let dev = Xdma::from_config(config)?;
        match width {
            Width::W8 => u64::from(dev.read8(addr)?),
            Width::W16 => u64::from(dev.read16(addr)?),
            Width::W32 => u64::from(dev.read32(addr)?),
            Width::W64 => dev.read64(addr)?,
        }
    };

    println!("{addr:#010x}: {value:#x}");
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn cmd_poke(config: &XdmaConfig, addr: &str, value: &str, width: usize, pio: bool) -> Result<()> {
    let addr = number("address", addr)?;
    let value = number("value", value)?;
    let width = Width::from_bytes(width)?;

    if width != Width::W64 && value >> (width.bytes() * 8) != 0 {
        bail!("value {value:#x} does not fit in {width}");
    }

    if pio {
        let dev = XdmaPio::from_config(config)?;
        match width {
            Width::W8 => dev.write8(addr, value as u8)?,
            Width::W16 => dev.write16(addr, value as u16)?,
            Width::W32 => dev.write32(addr, value as u32)?,
            Width::W64 => dev.write64(addr, value)?,
        }
    } else {
        let dev = Xdma::from_config(config)?;
        match width {
            Width::W8 => dev.write8(addr, value as u8)?,
            Width::W16 => dev.write16(addr, value as u16)?,
            Width::W32 => dev.write32(addr, value as u32)?,
            Width::W64 => dev.write64(addr, value)?,
        }
    }

    println!("{addr:#010x} <- {value:#x}");
    Ok(())
}

fn cmd_stream_test(config: &XdmaConfig, words: u32) -> Result<()> {
    let xdma = Xdma::from_config(config)?;
    if !xdma.transport_info().streaming {
        bail!(
            "xdma{} ({}) is not an AXI-Stream endpoint",
            xdma.dev_num(),
            xdma.backend_type()
        );
    }

    let data: Vec<u32> = (0..words).collect();
    let bytes = words_to_bytes(&data);

    xdma.start_read_stream(vec![0; bytes.len()], TransferSize::Whole)?;
    xdma.start_write_stream(bytes.clone(), TransferSize::Whole)?;
    let back = xdma
        .wait_for_streams()?
        .context("read stream returned no buffer")?;

    println!("Write stream : {:.3} ms", xdma.write_stream_runtime());
    println!("Read stream  : {:.3} ms", xdma.read_stream_runtime());

    match back.iter().zip(&bytes).position(|(a, b)| a != b) {
        None => println!("Data         : {} bytes OK", bytes.len()),
        Some(i) => bail!("data mismatch at byte {i}"),
    }
    Ok(())
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_stream_flag_keeps_size() {
        let cli = Cli::parse_from(["xdma", "--backend", "loopback", "--loopback-stream", "info"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.backend, BackendSelection::Loopback);
        assert!(config.loopback_streaming);
        assert_eq!(config.loopback_size, XdmaConfig::default().loopback_size);
    }

    #[test]
    fn bad_backend_name_is_an_error() {
        let cli = Cli::parse_from(["xdma", "--backend", "usb", "info"]);
        assert!(build_config(&cli).is_err());
    }
}
