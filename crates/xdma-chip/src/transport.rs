//! Transfer granularity of the XDMA AXI side.
//!
//! ```text
//! AXI data width   512 bit = 64 B    every stream length must be a multiple
//! Chunk size       4096 B            one positioned read/write per chunk
//! Stream port      0x0               all stream chunks target this offset
//! ```

pub use crate::regs::TransportInfo;

/// AXI data width of the XDMA core in bytes (512 bit).
///
/// Stream transfers must be an exact multiple of this.
pub const XDMA_AXI_DATA_WIDTH: u64 = 64;

/// Chunk granularity for streaming transfers and host buffer alignment.
pub const XDMA_ALIGNMENT: u64 = 4096;

/// Offset that every stream chunk is issued against.
///
/// In AXI-Stream mode the endpoint ignores the address, the value only has to
/// be stable.
pub const XDMA_STREAM_OFFSET: u64 = 0x0;

/// Widest single programmed-I/O access in bytes.
pub const MAX_PIO_ACCESS_SIZE: usize = 8;

/// Number of chunks a stream of `len` bytes is split into.
#[must_use]
pub const fn chunk_count(len: u64) -> u64 {
    len.div_ceil(XDMA_ALIGNMENT)
}

/// Whether `len` satisfies the AXI data width constraint.
#[must_use]
pub const fn is_stream_aligned(len: u64) -> bool {
    len % XDMA_AXI_DATA_WIDTH == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_rounds_up() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(64), 1);
        assert_eq!(chunk_count(4096), 1);
        assert_eq!(chunk_count(4096 + 64), 2);
    }

    #[test]
    fn alignment_is_axi_width() {
        assert!(is_stream_aligned(0));
        assert!(is_stream_aligned(128));
        assert!(!is_stream_aligned(100));
        assert_eq!(XDMA_ALIGNMENT % XDMA_AXI_DATA_WIDTH, 0);
    }
}
