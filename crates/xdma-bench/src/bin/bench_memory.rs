//! Memory-mapped transfer benchmark.
//!
//! Allocates one block from a DDR region and times repeated whole-block
//! writes and reads through the typed memory API.
//!
//! Usage:
//!   cargo run --bin bench_memory
//!   cargo run --bin bench_memory -- --size-kb 1024 --iterations 100 --base 0x80000000

use anyhow::{bail, Context, Result};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use xdma_driver::config::parse_number;
use xdma_driver::{BackendSelection, MemoryType, TransferSize, Xdma, XdmaConfig};

const DEFAULT_TRANSFER_KB: usize = 256;
const DEFAULT_ITERATIONS: usize = 50;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let transfer_kb = parse_arg(&args, "--size-kb", DEFAULT_TRANSFER_KB);
    let iterations = parse_arg(&args, "--iterations", DEFAULT_ITERATIONS).max(1);
    let base = args
        .windows(2)
        .find(|w| w[0] == "--base")
        .map(|w| parse_number(&w[1]).context("invalid --base"))
        .transpose()?
        .unwrap_or(0);
    let transfer_bytes = transfer_kb * 1024;

    let mut config = XdmaConfig::from_env()?;
    if args.iter().any(|a| a == "--loopback") {
        config = config
            .with_backend(BackendSelection::Loopback)
            .with_loopback(base + transfer_bytes as u64, false);
    }
    let xdma = Xdma::from_config(&config)?;
    xdma.add_memory_region(MemoryType::Ddr, base, transfer_bytes as u64)?;
    let mem = xdma.alloc_ddr(transfer_bytes as u64, None)?;

    println!("Memory-mapped transfer benchmark");
    println!("================================");
    println!("Backend       : {}", xdma.backend_type());
    println!("Block         : {mem}");
    println!("Iterations    : {iterations}");
    println!();

    let payload: Vec<u8> = (0..transfer_bytes).map(|i| (i % 251) as u8).collect();
    let mut readback = vec![0u8; transfer_bytes];

    let t0 = Instant::now();
    for _ in 0..iterations {
        xdma.write_memory(&mem, &payload, TransferSize::Whole)?;
    }
    let write_elapsed = t0.elapsed();

    let t0 = Instant::now();
    for _ in 0..iterations {
        xdma.read_memory(&mem, &mut readback, TransferSize::Whole)?;
    }
    let read_elapsed = t0.elapsed();

    if readback != payload {
        bail!("read-back mismatch in {mem}");
    }

    #[allow(clippy::cast_precision_loss)]
    let total = (iterations * transfer_bytes) as f64;
    println!("Results");
    println!("-------");
    print_throughput("Write", write_elapsed, total);
    print_throughput("Read ", read_elapsed, total);

    Ok(())
}

fn print_throughput(label: &str, elapsed: Duration, bytes: f64) {
    let secs = elapsed.as_secs_f64();
    let mb_s = bytes / 1e6 / secs;
    println!("  {label}: {mb_s:.1} MB/s  ({:.3} ms total)", secs * 1e3);
}

fn parse_arg(args: &[String], flag: &str, default: usize) -> usize {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
