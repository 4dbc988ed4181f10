// SPDX-License-Identifier: AGPL-3.0-only

//! AXI-Stream loop benchmark.
//!
//! Sends an iota pattern of 32-bit words through the H2C stream while the
//! C2H stream collects the result, then reports per-direction runtime and
//! throughput and checks every word.
//!
//! Designs that transform the stream (e.g. an "add constant" IP core) are
//! checked with `--add N`: word `i` must come back as `i + N`.
//!
//! Usage:
//!   cargo run --bin bench_stream
//!   cargo run --bin bench_stream -- --words 65536 --iterations 20 --add 10
//!   cargo run --bin bench_stream -- --loopback

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;
use xdma_driver::{BackendSelection, StreamStats, TransferSize, Xdma, XdmaConfig};

const DEFAULT_WORDS: usize = 16 * 1024;
const DEFAULT_ITERATIONS: usize = 10;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let words = parse_arg(&args, "--words", DEFAULT_WORDS);
    let iterations = parse_arg(&args, "--iterations", DEFAULT_ITERATIONS).max(1);
    let add = u32::try_from(parse_arg(&args, "--add", 0)).context("--add out of range")?;

    let mut config = XdmaConfig::from_env()?;
    if args.iter().any(|a| a == "--loopback") {
        let size = config.loopback_size;
        config = config
            .with_backend(BackendSelection::Loopback)
            .with_loopback(size, true);
    }
    let xdma = Xdma::from_config(&config)?;

    println!("AXI-Stream loop benchmark");
    println!("=========================");
    println!("Backend    : {}", xdma.backend_type());
    println!("Words      : {words} ({} bytes)", words * 4);
    println!("Iterations : {iterations}");
    println!();

    let data: Vec<u32> = (0..u32::try_from(words)?).collect();
    let payload: Vec<u8> = bytemuck::cast_slice(&data).to_vec();

    let mut reads = Vec::with_capacity(iterations);
    let mut writes = Vec::with_capacity(iterations);
    for i in 0..iterations {
        xdma.start_read_stream(vec![0; payload.len()], TransferSize::Whole)?;
        xdma.start_write_stream(payload.clone(), TransferSize::Whole)?;
        let back = xdma
            .wait_for_streams()?
            .context("read stream returned no buffer")?;

        verify(&back, add).with_context(|| format!("iteration {i}"))?;
        reads.extend(xdma.read_stream_stats());
        writes.extend(xdma.write_stream_stats());
    }

    println!("Results");
    println!("-------");
    print_stats("H2C (write)", &writes);
    print_stats("C2H (read) ", &reads);
    println!();
    println!("All {iterations} iteration(s) verified");

    Ok(())
}

fn verify(back: &[u8], add: u32) -> Result<()> {
    if back.len() % 4 != 0 {
        bail!("read buffer holds {} bytes, not whole words", back.len());
    }
    // Vec<u8> carries no word alignment, so decode instead of casting
    for (i, word) in back.chunks_exact(4).enumerate() {
        let got = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
        let expected = u32::try_from(i)?.wrapping_add(add);
        if got != expected {
            bail!("word {i}: expected {expected:#x}, got {got:#x}");
        }
    }
    Ok(())
}

fn print_stats(label: &str, runs: &[StreamStats]) {
    if runs.is_empty() {
        return;
    }
    let best = runs.iter().map(StreamStats::runtime_ms).fold(f64::INFINITY, f64::min);
    #[allow(clippy::cast_precision_loss)]
    let mean = runs.iter().map(StreamStats::runtime_ms).sum::<f64>() / runs.len() as f64;
    let peak = runs
        .iter()
        .map(StreamStats::throughput_mbps)
        .fold(0.0, f64::max);
    println!("  {label}: best {best:.3} ms  mean {mean:.3} ms  peak {peak:.1} MB/s");
}

fn parse_arg(args: &[String], flag: &str, default: usize) -> usize {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(words: impl Iterator<Item = u32>) -> Vec<u8> {
        words.flat_map(u32::to_ne_bytes).collect()
    }

    #[test]
    fn verify_accepts_offset_pattern() {
        let back = encode((0..64).map(|i| i + 10));
        verify(&back, 10).unwrap();
        assert!(verify(&back, 0).is_err());
    }

    #[test]
    fn verify_handles_unaligned_buffers() {
        // shift by one byte so the words are never 4-byte aligned
        let mut raw = vec![0u8];
        raw.extend(encode(0..32));
        verify(&raw[1..], 0).unwrap();
        assert!(verify(&raw[..7], 0).is_err());
    }
}
