//! Streaming engine tests against the loopback stream FIFO

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use xdma_driver::{
    Backend, BackendType, Direction, LoopbackBackend, Result, TransferSize, TransportInfo, Xdma,
    XdmaConfig, XdmaError,
};

fn stream_device() -> (Arc<LoopbackBackend>, Xdma) {
    let lb = Arc::new(LoopbackBackend::streaming());
    let xdma = Xdma::new(Arc::clone(&lb));
    (lb, xdma)
}

fn iota(words: u32) -> Vec<u8> {
    let data: Vec<u32> = (0..words).collect();
    bytemuck::cast_slice(&data).to_vec()
}

#[test]
fn round_trip_through_fifo() {
    let (lb, xdma) = stream_device();
    let data = iota(4096);

    xdma.start_read_stream(vec![0; data.len()], TransferSize::Whole)
        .unwrap();
    xdma.start_write_stream(data.clone(), TransferSize::Whole)
        .unwrap();
    let back = xdma.wait_for_streams().unwrap().unwrap();

    assert_eq!(back, data);
    // 16 KiB in 4 KiB chunks each way
    assert_eq!(lb.read_calls(), 4);
    assert_eq!(lb.write_calls(), 4);

    let read = xdma.read_stream_stats().unwrap();
    assert_eq!(read.bytes, 16384);
    assert_eq!(read.chunks, 4);
    assert!(xdma.read_stream_runtime() >= 0.0);
    assert_eq!(xdma.write_stream_stats().unwrap().chunks, 4);
}

#[test]
fn last_chunk_may_be_short() {
    let (lb, xdma) = stream_device();
    let len = 4096 + 128;

    xdma.start_write_stream(vec![3u8; len], TransferSize::Whole)
        .unwrap();
    xdma.wait_for_write_stream().unwrap();
    assert_eq!(lb.write_calls(), 2);
    assert_eq!(lb.pending_stream_bytes(), len);
}

#[test]
fn second_read_stream_is_rejected_while_in_flight() {
    let (_lb, xdma) = stream_device();

    // blocks in the FIFO until the write stream delivers
    xdma.start_read_stream(vec![0; 4096], TransferSize::Whole)
        .unwrap();
    let err = xdma
        .start_read_stream(vec![0; 4096], TransferSize::Whole)
        .unwrap_err();
    assert!(matches!(
        err,
        XdmaError::StreamInFlight {
            direction: Direction::Read
        }
    ));

    // the other direction is independent
    xdma.start_write_stream(vec![1u8; 4096], TransferSize::Whole)
        .unwrap();
    let back = xdma.wait_for_streams().unwrap().unwrap();
    assert!(back.iter().all(|&b| b == 1));

    // idle again
    xdma.start_write_stream(vec![2u8; 64], TransferSize::Whole)
        .unwrap();
    xdma.start_read_stream(vec![0; 64], TransferSize::Whole)
        .unwrap();
    assert_eq!(xdma.wait_for_read_stream().unwrap().unwrap(), vec![2u8; 64]);
    xdma.wait_for_write_stream().unwrap();
}

#[test]
fn misaligned_stream_issues_no_chunk() {
    let (lb, xdma) = stream_device();

    let err = xdma
        .start_write_stream(vec![0u8; 100], TransferSize::Whole)
        .unwrap_err();
    assert!(matches!(
        err,
        XdmaError::Misaligned {
            size: 100,
            alignment: 64
        }
    ));

    let err = xdma
        .start_read_stream(vec![0u8; 4096], TransferSize::Bytes(4000))
        .unwrap_err();
    assert!(matches!(err, XdmaError::Misaligned { size: 4000, .. }));

    assert_eq!(lb.calls(), 0);
    // nothing was started, so waiting is a no-op
    assert!(xdma.wait_for_streams().unwrap().is_none());
}

#[test]
fn stream_length_larger_than_buffer() {
    let (lb, xdma) = stream_device();
    let err = xdma
        .start_read_stream(vec![0u8; 64], TransferSize::Bytes(128))
        .unwrap_err();
    assert!(matches!(
        err,
        XdmaError::BufferTooSmall {
            buffer: 64,
            requested: 128,
            ..
        }
    ));
    assert_eq!(lb.calls(), 0);
}

#[test]
fn memory_mapped_endpoint_refuses_streams() {
    let xdma = Xdma::new(LoopbackBackend::new(0x1000));
    assert!(!xdma.transport_info().streaming);
    assert!(matches!(
        xdma.start_read_stream(vec![0; 64], TransferSize::Whole),
        Err(XdmaError::NotStreaming)
    ));
    assert!(matches!(
        xdma.start_write_stream(vec![0; 64], TransferSize::Whole),
        Err(XdmaError::NotStreaming)
    ));
}

#[test]
fn runtime_is_zero_before_first_stream() {
    let (_lb, xdma) = stream_device();
    assert_eq!(xdma.read_stream_runtime(), 0.0);
    assert_eq!(xdma.write_stream_runtime(), 0.0);
}

#[test]
fn drop_joins_pending_writer() {
    let (lb, xdma) = stream_device();
    xdma.start_write_stream(vec![9u8; 8192], TransferSize::Whole)
        .unwrap();
    drop(xdma);
    assert_eq!(lb.pending_stream_bytes(), 8192);
}

/// Stream FIFO whose next `fail_reads` / `fail_writes` chunks error out
#[derive(Debug)]
struct FlakyLink {
    fifo: LoopbackBackend,
    fail_reads: AtomicU32,
    fail_writes: AtomicU32,
}

impl FlakyLink {
    fn new(fail_reads: u32, fail_writes: u32) -> Self {
        Self {
            fifo: LoopbackBackend::streaming(),
            fail_reads: AtomicU32::new(fail_reads),
            fail_writes: AtomicU32::new(fail_writes),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Backend for FlakyLink {
    fn open(_config: &XdmaConfig) -> Result<Self> {
        Ok(Self::new(0, 0))
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        if Self::take_failure(&self.fail_reads) {
            return Err(XdmaError::transfer("c2h", addr, "link down"));
        }
        self.fifo.read(addr, buf)
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        if Self::take_failure(&self.fail_writes) {
            return Err(XdmaError::transfer("h2c", addr, "link down"));
        }
        self.fifo.write(addr, data)
    }

    fn dev_num(&self) -> u32 {
        0
    }

    fn name(&self, dir: Direction) -> String {
        self.fifo.name(dir)
    }

    fn info(&self) -> TransportInfo {
        TransportInfo::streaming()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Loopback
    }
}

#[test]
fn worker_transfer_error_reaches_waiter() {
    let xdma = Xdma::new(FlakyLink::new(1, 1));

    xdma.start_read_stream(vec![0; 4096], TransferSize::Whole)
        .unwrap();
    let err = xdma.wait_for_read_stream().unwrap_err();
    assert!(matches!(
        &err,
        XdmaError::Transfer { op, addr: 0, reason } if op == "c2h" && reason == "link down"
    ));
    assert!(xdma.read_stream_stats().is_none());

    xdma.start_write_stream(vec![5u8; 4096], TransferSize::Whole)
        .unwrap();
    assert!(matches!(
        xdma.wait_for_write_stream(),
        Err(XdmaError::Transfer { .. })
    ));

    // both lanes are idle again and the next transfer goes through
    xdma.start_write_stream(vec![6u8; 4096], TransferSize::Whole)
        .unwrap();
    xdma.start_read_stream(vec![0; 4096], TransferSize::Whole)
        .unwrap();
    let back = xdma.wait_for_streams().unwrap().unwrap();
    assert!(back.iter().all(|&b| b == 6));
    assert_eq!(xdma.read_stream_stats().unwrap().bytes, 4096);
}

#[test]
fn failed_read_does_not_hide_write_result() {
    let xdma = Xdma::new(FlakyLink::new(1, 0));

    xdma.start_read_stream(vec![0; 64], TransferSize::Whole)
        .unwrap();
    xdma.start_write_stream(vec![1u8; 64], TransferSize::Whole)
        .unwrap();
    // read error wins, but the write lane was still joined
    assert!(matches!(
        xdma.wait_for_streams(),
        Err(XdmaError::Transfer { .. })
    ));
    assert!(xdma.write_stream_stats().is_some());
    xdma.start_write_stream(vec![2u8; 64], TransferSize::Whole)
        .unwrap();
    xdma.wait_for_write_stream().unwrap();
}
