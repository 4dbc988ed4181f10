//! AXI-Stream transfers
//!
//! A stream moves a whole host buffer through the stream port in
//! `XDMA_ALIGNMENT`-sized chunks on a worker thread. There is one lane per
//! direction; starting a lane returns at once and the matching `wait_*`
//! joins the worker, hands back the buffer and records the timing.
//!
//! ```text
//! start_read_stream(buf)  ──spawn──▶ [c2h worker] read chunk, read chunk, ...
//! start_write_stream(buf) ──spawn──▶ [h2c worker] write chunk, write chunk, ...
//! wait_for_streams()      ◀──join──  buffer + StreamStats
//! ```

use crate::backend::Direction;
use crate::device::{Xdma, XdmaCore};
use crate::error::{Result, XdmaError};
use crate::memory::TransferSize;
use std::any::Any;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use xdma_chip::transport::{
    chunk_count, is_stream_aligned, XDMA_ALIGNMENT, XDMA_AXI_DATA_WIDTH, XDMA_STREAM_OFFSET,
};

/// Timing of one completed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Bytes moved
    pub bytes: u64,
    /// Backend calls issued
    pub chunks: u64,
    /// Time from the first chunk to the last
    pub elapsed: Duration,
}

impl StreamStats {
    /// Elapsed time in milliseconds
    pub fn runtime_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }

    /// Throughput in MB/s (10^6 bytes), 0 for an instant transfer
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs / 1e6
        } else {
            0.0
        }
    }
}

type Worker<T> = JoinHandle<Result<(T, StreamStats)>>;

#[derive(Debug)]
struct LaneState<T> {
    worker: Option<Worker<T>>,
    joining: bool,
    last: Option<StreamStats>,
}

/// One direction of the streaming engine
#[derive(Debug)]
struct Lane<T> {
    direction: Direction,
    state: Mutex<LaneState<T>>,
    joined: Condvar,
}

impl<T: Send + 'static> Lane<T> {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: Mutex::new(LaneState {
                worker: None,
                joining: false,
                last: None,
            }),
            joined: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LaneState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_idle(&self) -> Result<()> {
        let state = self.lock();
        if state.worker.is_some() || state.joining {
            return Err(XdmaError::StreamInFlight {
                direction: self.direction,
            });
        }
        Ok(())
    }

    fn start<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<(T, StreamStats)> + Send + 'static,
    {
        let mut state = self.lock();
        if state.worker.is_some() || state.joining {
            return Err(XdmaError::StreamInFlight {
                direction: self.direction,
            });
        }

        let name = match self.direction {
            Direction::Read => "xdma-c2h-stream",
            Direction::Write => "xdma-h2c-stream",
        };
        state.worker = Some(std::thread::Builder::new().name(name.into()).spawn(job)?);
        Ok(())
    }

    /// Join the worker, if any
    ///
    /// A caller arriving while another thread is joining blocks until that
    /// join has finished and returns `Ok(None)`.
    fn wait(&self) -> Result<Option<T>> {
        let handle = {
            let mut state = self.lock();
            while state.joining {
                state = self
                    .joined
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match state.worker.take() {
                Some(handle) => {
                    state.joining = true;
                    handle
                }
                None => return Ok(None),
            }
        };

        let outcome = handle.join();

        let mut state = self.lock();
        let result = match outcome {
            Ok(Ok((value, stats))) => {
                state.last = Some(stats);
                Ok(Some(value))
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => Err(XdmaError::StreamFailed {
                direction: self.direction,
                reason: panic_message(panic.as_ref()),
            }),
        };
        state.joining = false;
        drop(state);
        self.joined.notify_all();
        result
    }

    fn last(&self) -> Option<StreamStats> {
        self.lock().last
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Pending and completed streams of one device
#[derive(Debug)]
pub(crate) struct StreamEngine {
    read: Lane<Vec<u8>>,
    write: Lane<()>,
}

impl Default for StreamEngine {
    fn default() -> Self {
        Self {
            read: Lane::new(Direction::Read),
            write: Lane::new(Direction::Write),
        }
    }
}

impl StreamEngine {
    /// Join outstanding workers, logging failures
    pub(crate) fn join_all(&self) {
        if let Err(e) = self.read.wait() {
            tracing::warn!("read stream failed during shutdown: {e}");
        }
        if let Err(e) = self.write.wait() {
            tracing::warn!("write stream failed during shutdown: {e}");
        }
    }
}

fn stream_in(core: &XdmaCore, mut buffer: Vec<u8>, len: usize) -> Result<(Vec<u8>, StreamStats)> {
    let mut chunks = 0;
    let start = Instant::now();
    for chunk in buffer[..len].chunks_mut(XDMA_ALIGNMENT as usize) {
        core.backend.read(XDMA_STREAM_OFFSET, chunk)?;
        chunks += 1;
    }
    let stats = StreamStats {
        bytes: len as u64,
        chunks,
        elapsed: start.elapsed(),
    };

    tracing::debug!(
        "c2h stream: {len} bytes in {chunks} chunks, {:.3} ms",
        stats.runtime_ms()
    );
    Ok((buffer, stats))
}

fn stream_out(core: &XdmaCore, data: &[u8]) -> Result<((), StreamStats)> {
    let mut chunks = 0;
    let start = Instant::now();
    for chunk in data.chunks(XDMA_ALIGNMENT as usize) {
        core.backend.write(XDMA_STREAM_OFFSET, chunk)?;
        chunks += 1;
    }
    let stats = StreamStats {
        bytes: data.len() as u64,
        chunks,
        elapsed: start.elapsed(),
    };

    tracing::debug!(
        "h2c stream: {} bytes in {chunks} chunks, {:.3} ms",
        data.len(),
        stats.runtime_ms()
    );
    Ok(((), stats))
}

impl Xdma {
    /// Common stream preconditions, in the order they are reported
    fn check_stream<T: Send + 'static>(
        &self,
        lane: &Lane<T>,
        op: &'static str,
        buffer: usize,
        len: TransferSize,
    ) -> Result<usize> {
        if !self.core.info.streaming {
            return Err(XdmaError::NotStreaming);
        }
        lane.ensure_idle()?;

        let requested = len.resolve(buffer as u64);
        let len = usize::try_from(requested)
            .ok()
            .filter(|&l| l <= buffer)
            .ok_or(XdmaError::BufferTooSmall {
                op,
                buffer: buffer as u64,
                requested,
            })?;

        if !is_stream_aligned(requested) {
            return Err(XdmaError::Misaligned {
                size: requested,
                alignment: XDMA_AXI_DATA_WIDTH,
            });
        }

        tracing::debug!(
            "{op}: {len} bytes, {} chunk(s) of up to {XDMA_ALIGNMENT}",
            chunk_count(requested)
        );
        Ok(len)
    }

    /// Start filling the first `len` bytes (default: all) of `buffer` from
    /// the stream; returns immediately
    ///
    /// # Errors
    ///
    /// Returns `NotStreaming`, `StreamInFlight`, `BufferTooSmall` or
    /// `Misaligned` without issuing any transfer.
    pub fn start_read_stream(&self, buffer: Vec<u8>, len: TransferSize) -> Result<()> {
        let len = self.check_stream(&self.streams.read, "start_read_stream", buffer.len(), len)?;
        let core = Arc::clone(&self.core);
        self.streams
            .read
            .start(move || stream_in(&core, buffer, len))
    }

    /// Start sending the first `len` bytes (default: all) of `data`;
    /// returns immediately
    ///
    /// # Errors
    ///
    /// Returns `NotStreaming`, `StreamInFlight`, `BufferTooSmall` or
    /// `Misaligned` without issuing any transfer.
    pub fn start_write_stream(&self, data: impl Into<Vec<u8>>, len: TransferSize) -> Result<()> {
        let mut data = data.into();
        let len = self.check_stream(&self.streams.write, "start_write_stream", data.len(), len)?;
        data.truncate(len);
        let core = Arc::clone(&self.core);
        self.streams.write.start(move || stream_out(&core, &data))
    }

    /// Wait for the read stream and return its buffer
    ///
    /// Returns `Ok(None)` when no read stream was started.
    ///
    /// # Errors
    ///
    /// Returns the worker's transfer error, or `StreamFailed` if it panicked.
    pub fn wait_for_read_stream(&self) -> Result<Option<Vec<u8>>> {
        self.streams.read.wait()
    }

    /// Wait for the write stream
    ///
    /// # Errors
    ///
    /// Returns the worker's transfer error, or `StreamFailed` if it panicked.
    pub fn wait_for_write_stream(&self) -> Result<()> {
        self.streams.write.wait().map(|_| ())
    }

    /// Wait for both directions; both are joined even if the first fails
    ///
    /// # Errors
    ///
    /// Returns the read stream's error first, then the write stream's.
    pub fn wait_for_streams(&self) -> Result<Option<Vec<u8>>> {
        let read = self.wait_for_read_stream();
        let write = self.wait_for_write_stream();
        let buffer = read?;
        write?;
        Ok(buffer)
    }

    /// Milliseconds taken by the last completed read stream
    pub fn read_stream_runtime(&self) -> f64 {
        self.streams.read.last().map_or(0.0, |s| s.runtime_ms())
    }

    /// Milliseconds taken by the last completed write stream
    pub fn write_stream_runtime(&self) -> f64 {
        self.streams.write.last().map_or(0.0, |s| s.runtime_ms())
    }

    /// Statistics of the last completed read stream
    pub fn read_stream_stats(&self) -> Option<StreamStats> {
        self.streams.read.last()
    }

    /// Statistics of the last completed write stream
    pub fn write_stream_stats(&self) -> Option<StreamStats> {
        self.streams.write.last()
    }
}
