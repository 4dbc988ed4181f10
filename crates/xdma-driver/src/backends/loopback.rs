// SPDX-License-Identifier: AGPL-3.0-only

//! Loopback backend
//!
//! An in-process stand-in for an XDMA endpoint. In memory-mapped mode it is
//! a flat byte array addressed like card memory. In streaming mode it behaves
//! like the loopback example design: bytes written to the H2C side come back
//! out of the C2H side in order, and a read blocks until enough data has
//! been written.
//!
//! Every backend call is counted, so tests can prove that a rejected request
//! never reached the transport.

use crate::backend::{Backend, BackendType, Direction};
use crate::config::XdmaConfig;
use crate::error::{Result, XdmaError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use xdma_chip::transport::TransportInfo;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct StreamFifo {
    queue: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

/// In-memory XDMA endpoint
#[derive(Debug)]
pub struct LoopbackBackend {
    dev_num: u32,
    memory: Mutex<Vec<u8>>,
    stream: Option<StreamFifo>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl LoopbackBackend {
    /// Memory-mapped endpoint with `size` zeroed bytes
    pub fn new(size: usize) -> Self {
        tracing::info!("Loopback backend: {size:#x} bytes");
        Self {
            dev_num: 0,
            memory: Mutex::new(vec![0; size]),
            stream: None,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// AXI-Stream endpoint: writes feed a FIFO that reads drain
    pub fn streaming() -> Self {
        tracing::info!("Loopback backend: streaming");
        Self {
            dev_num: 0,
            memory: Mutex::new(Vec::new()),
            stream: Some(StreamFifo::default()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Report a different device number
    #[must_use]
    pub fn with_dev_num(mut self, dev_num: u32) -> Self {
        self.dev_num = dev_num;
        self
    }

    /// Number of `read` calls seen so far
    pub fn read_calls(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `write` calls seen so far
    pub fn write_calls(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total backend calls
    pub fn calls(&self) -> u64 {
        self.read_calls() + self.write_calls()
    }

    /// Bytes written to the stream but not read back yet
    pub fn pending_stream_bytes(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| lock(&s.queue).len())
    }

    fn range(addr: u64, len: usize, size: usize) -> Result<std::ops::Range<usize>> {
        let out_of_range = || XdmaError::AddressOutOfRange {
            addr,
            len: len as u64,
            start: 0,
            end: size as u64,
        };
        let start = usize::try_from(addr).map_err(|_| out_of_range())?;
        match start.checked_add(len) {
            Some(end) if end <= size => Ok(start..end),
            _ => Err(out_of_range()),
        }
    }
}

impl Backend for LoopbackBackend {
    fn open(config: &XdmaConfig) -> Result<Self> {
        let backend = if config.loopback_streaming {
            Self::streaming()
        } else {
            let size = usize::try_from(config.loopback_size).map_err(|_| {
                XdmaError::InvalidConfig {
                    key: "loopback_size",
                    value: config.loopback_size.to_string(),
                }
            })?;
            Self::new(size)
        };
        Ok(backend.with_dev_num(config.device_num))
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        if let Some(stream) = &self.stream {
            let len = buf.len();
            let mut queue = lock(&stream.queue);
            while queue.len() < len {
                queue = stream
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            for (dst, src) in buf.iter_mut().zip(queue.drain(..len)) {
                *dst = src;
            }
            tracing::trace!("loopback: streamed out {len} bytes");
            return Ok(());
        }

        let memory = lock(&self.memory);
        let range = Self::range(addr, buf.len(), memory.len())?;
        buf.copy_from_slice(&memory[range]);
        Ok(())
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(stream) = &self.stream {
            lock(&stream.queue).extend(data);
            stream.ready.notify_all();
            tracing::trace!("loopback: streamed in {} bytes", data.len());
            return Ok(());
        }

        let mut memory = lock(&self.memory);
        let range = Self::range(addr, data.len(), memory.len())?;
        memory[range].copy_from_slice(data);
        Ok(())
    }

    fn dev_num(&self) -> u32 {
        self.dev_num
    }

    fn name(&self, dir: Direction) -> String {
        match dir {
            Direction::Read => format!("loopback{}_c2h", self.dev_num),
            Direction::Write => format!("loopback{}_h2c", self.dev_num),
        }
    }

    fn info(&self) -> TransportInfo {
        if self.stream.is_some() {
            TransportInfo::streaming()
        } else {
            TransportInfo::default()
        }
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Loopback
    }
}
