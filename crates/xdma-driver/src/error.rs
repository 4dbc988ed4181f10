//! Error types for XDMA access

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::Direction;
use crate::memory::MemoryType;

/// Result type alias for XDMA operations
pub type Result<T> = std::result::Result<T, XdmaError>;

/// Errors that can occur while talking to an XDMA device
#[derive(Debug, Error)]
pub enum XdmaError {
    /// The device handle behind a dependent object is gone
    #[error("XDMA instance is not valid or has been destroyed: {reason}")]
    InvalidState {
        /// What was attempted
        reason: String,
    },

    /// No pool of the requested type has enough room left
    #[error("No {kind} memory region found with enough space left to allocate {requested} byte")]
    AllocationExhausted {
        /// Memory class that was searched
        kind: MemoryType,
        /// Requested size in bytes
        requested: u64,
    },

    /// An explicit pool index does not exist
    #[error("Specified {kind} memory region {index} does not exist (have {count})")]
    PoolIndexOutOfRange {
        /// Memory class
        kind: MemoryType,
        /// Requested pool index
        index: usize,
        /// Number of registered pools of that class
        count: usize,
    },

    /// Element count times element size does not fit in 64 bits
    #[error("{count} elements of {element} byte exceed the 64-bit address space")]
    SizeOverflow {
        /// Requested element count
        count: u64,
        /// Size of one element in bytes
        element: usize,
    },

    /// Region end wraps past the top of the address space
    #[error("Memory region at {base_addr:#x} (+{size:#x} byte) wraps past the end of the address space")]
    InvalidRegion {
        /// Region start
        base_addr: u64,
        /// Region length in bytes
        size: u64,
    },

    /// Handles must cover at least one byte
    #[error("Cannot allocate a zero-sized memory block")]
    ZeroSizedAllocation,

    /// Transfer size is larger than the memory handle
    #[error("{op}: specified size ({requested:#x}) exceeds size of the given memory ({available:#x})")]
    ExceedsMemory {
        /// Operation name (usually the backend node)
        op: String,
        /// Requested size in bytes
        requested: u64,
        /// Size of the memory handle in bytes
        available: u64,
    },

    /// Host buffer cannot hold the requested transfer
    #[error("{op}: byte size of buffer provided ({buffer}) is smaller than the desired size ({requested})")]
    BufferTooSmall {
        /// Operation name
        op: &'static str,
        /// Buffer capacity in bytes
        buffer: u64,
        /// Requested transfer size in bytes
        requested: u64,
    },

    /// A device node could not be opened
    #[error("Unable to open device {path}: {source}")]
    DeviceOpen {
        /// Node that was opened
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// mmap of a register window failed
    #[error("Failed to map {path} into userspace: {source}")]
    Mmap {
        /// Node that was mapped
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Access outside the addressable window
    #[error("Address {addr:#x} (+{len} byte) exceeds address range ({start:#x}-{end:#x})")]
    AddressOutOfRange {
        /// Requested address
        addr: u64,
        /// Access length in bytes
        len: u64,
        /// First valid address
        start: u64,
        /// One past the last valid address
        end: u64,
    },

    /// Access width other than 1, 2, 4 or 8 bytes
    #[error("Access width of {width} byte is not supported (allowed: 1, 2, 4, 8)")]
    UnsupportedWidth {
        /// Requested width in bytes
        width: usize,
    },

    /// Register window accesses must be naturally aligned
    #[error("Unaligned {width} byte access at {addr:#x}")]
    UnalignedAccess {
        /// Requested address
        addr: u64,
        /// Access width in bytes
        width: usize,
    },

    /// A positioned read or write failed
    #[error("{op} at {addr:#x} failed: {reason}")]
    Transfer {
        /// Node or operation name
        op: String,
        /// Device address of the failing chunk
        addr: u64,
        /// Reason for failure
        reason: String,
    },

    /// Stream length does not match the AXI data width
    #[error("Size ({size}) is not a multiple of the XDMA AXI data width ({alignment})")]
    Misaligned {
        /// Requested size in bytes
        size: u64,
        /// Required granularity in bytes
        alignment: u64,
    },

    /// Only one stream per direction may be in flight
    #[error("{direction} stream is already running")]
    StreamInFlight {
        /// Direction that is busy
        direction: Direction,
    },

    /// The channel was not built for AXI-Stream
    #[error("The XDMA endpoint is not in streaming mode")]
    NotStreaming,

    /// A stream worker died without reporting a result
    #[error("{direction} stream failed: {reason}")]
    StreamFailed {
        /// Direction of the failed stream
        direction: Direction,
        /// Reason for failure
        reason: String,
    },

    /// Read-back after a validated register write differs
    #[error("Register write validation failed at {offset:#x}. Expected: {expected:#x}, Read: {actual:#x}")]
    ValidationFailed {
        /// Absolute register address
        offset: u64,
        /// Value that was written
        expected: u64,
        /// Value that was read back
        actual: u64,
    },

    /// A configuration value could not be parsed
    #[error("Invalid configuration {key}={value}")]
    InvalidConfig {
        /// Configuration key
        key: &'static str,
        /// Offending value
        value: String,
    },

    /// I/O error outside a specific transfer
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl XdmaError {
    /// Create an invalid state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Create a transfer error
    pub fn transfer(op: impl Into<String>, addr: u64, reason: impl Into<String>) -> Self {
        Self::Transfer {
            op: op.into(),
            addr,
            reason: reason.into(),
        }
    }

    /// Create a device open error
    pub fn device_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DeviceOpen {
            path: path.into(),
            source,
        }
    }
}
