//! XDMA device façade
//!
//! [`Xdma`] binds one backend, the memory pools registered on it and the
//! streaming state. Dependents (register controllers, accelerator drivers)
//! attach through [`ManagedDevice::link`] and are invalidated when the
//! device is dropped.

use crate::backend::{open_backend, Backend, BackendType, Direction};
use crate::config::XdmaConfig;
use crate::error::{Result, XdmaError};
use crate::managed::{Dependents, DeviceAccess, DeviceLink, ManagedDevice};
use crate::memory::{Memory, MemoryManager, MemoryRegion, MemoryType, PoolStats, TransferSize};
use crate::scalar::Scalar;
use crate::stream::StreamEngine;
use bytemuck::Pod;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use xdma_chip::transport::TransportInfo;

/// State shared between the façade, its stream workers and its dependents
#[derive(Debug)]
pub(crate) struct XdmaCore {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) info: TransportInfo,
    pools: Mutex<BTreeMap<MemoryType, Vec<MemoryManager>>>,
}

impl XdmaCore {
    fn pools(&self) -> MutexGuard<'_, BTreeMap<MemoryType, Vec<MemoryManager>>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceAccess for XdmaCore {
    fn dev_num(&self) -> u32 {
        self.backend.dev_num()
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.backend.read(addr, buf)
    }

    fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.backend.write(addr, data)
    }
}

/// Host-side handle to one XDMA endpoint
pub struct Xdma {
    pub(crate) core: Arc<XdmaCore>,
    pub(crate) streams: StreamEngine,
    dependents: Dependents,
}

impl Xdma {
    /// Bind a device to an opened backend
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_backend(Box::new(backend))
    }

    /// Bind a device to a boxed backend
    pub fn from_backend(backend: Box<dyn Backend>) -> Self {
        let info = backend.info();
        tracing::info!(
            "xdma{}: {} backend ({} / {})",
            backend.dev_num(),
            backend.backend_type(),
            backend.name(Direction::Read),
            backend.name(Direction::Write)
        );

        let core = Arc::new(XdmaCore {
            backend,
            info,
            pools: Mutex::new(BTreeMap::new()),
        });

        Self {
            dependents: Dependents::new(Arc::clone(&core) as Arc<dyn DeviceAccess>),
            streams: StreamEngine::default(),
            core,
        }
    }

    /// Open backend `B` from `config`
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be opened.
    pub fn create<B: Backend + 'static>(config: &XdmaConfig) -> Result<Self> {
        Ok(Self::new(B::open(config)?))
    }

    /// Open the backend selected by `config.backend`
    ///
    /// # Errors
    ///
    /// Returns error if no suitable backend can be opened.
    pub fn from_config(config: &XdmaConfig) -> Result<Self> {
        Ok(Self::from_backend(open_backend(config.backend, config)?))
    }

    /// XDMA device number
    pub fn dev_num(&self) -> u32 {
        self.core.backend.dev_num()
    }

    /// Node name used for `dir`
    pub fn backend_name(&self, dir: Direction) -> String {
        self.core.backend.name(dir)
    }

    /// Backend type
    pub fn backend_type(&self) -> BackendType {
        self.core.backend.backend_type()
    }

    /// Channel descriptor read when the backend was opened
    pub fn transport_info(&self) -> TransportInfo {
        self.core.info
    }

    // ---- memory pools -------------------------------------------------

    /// Register `[base_addr, base_addr + size)` as a pool of class `kind`
    ///
    /// # Errors
    ///
    /// Returns `InvalidRegion` if the region wraps past `u64::MAX`.
    pub fn add_memory_region(&self, kind: MemoryType, base_addr: u64, size: u64) -> Result<()> {
        let manager = MemoryManager::new(base_addr, size)?;
        let mut pools = self.core.pools();
        let list = pools.entry(kind).or_default();
        list.push(manager);
        tracing::info!(
            "xdma{}: {kind} region {} at {base_addr:#x} ({size:#x} bytes)",
            self.dev_num(),
            list.len() - 1
        );
        Ok(())
    }

    /// Register a declared region
    ///
    /// # Errors
    ///
    /// See [`Xdma::add_memory_region`].
    pub fn add_memory_region_from(&self, region: MemoryRegion) -> Result<()> {
        self.add_memory_region(region.kind, region.base_addr, region.size)
    }

    /// Allocate `size` bytes of class `kind`
    ///
    /// Without `pool` the regions of that class are tried in registration
    /// order and the first one with enough room wins.
    ///
    /// # Errors
    ///
    /// Returns `ZeroSizedAllocation`, `PoolIndexOutOfRange` for a bad
    /// explicit index, or `AllocationExhausted` if no region has room.
    pub fn alloc_memory(&self, kind: MemoryType, size: u64, pool: Option<usize>) -> Result<Memory> {
        if size == 0 {
            return Err(XdmaError::ZeroSizedAllocation);
        }

        let mut pools = self.core.pools();
        let list = pools.entry(kind).or_default();
        let exhausted = || XdmaError::AllocationExhausted {
            kind,
            requested: size,
        };

        let manager = match pool {
            Some(index) => {
                let count = list.len();
                let manager = list
                    .get_mut(index)
                    .ok_or(XdmaError::PoolIndexOutOfRange { kind, index, count })?;
                if manager.available_space() < size {
                    return Err(exhausted());
                }
                manager
            }
            None => list
                .iter_mut()
                .find(|m| m.available_space() >= size)
                .ok_or_else(exhausted)?,
        };

        let mem = manager.allocate(size)?;
        tracing::debug!("xdma{}: allocated {kind} {mem}", self.core.backend.dev_num());
        Ok(mem)
    }

    /// Allocate room for `count` elements of `T`
    ///
    /// # Errors
    ///
    /// See [`Xdma::alloc_memory`].
    pub fn alloc_elements<T: Pod>(
        &self,
        kind: MemoryType,
        count: u64,
        pool: Option<usize>,
    ) -> Result<Memory> {
        let element = std::mem::size_of::<T>();
        let size = count
            .checked_mul(element as u64)
            .ok_or(XdmaError::SizeOverflow { count, element })?;
        self.alloc_memory(kind, size, pool)
    }

    /// Allocate DDR
    ///
    /// # Errors
    ///
    /// See [`Xdma::alloc_memory`].
    pub fn alloc_ddr(&self, size: u64, pool: Option<usize>) -> Result<Memory> {
        self.alloc_memory(MemoryType::Ddr, size, pool)
    }

    /// Allocate BRAM
    ///
    /// # Errors
    ///
    /// See [`Xdma::alloc_memory`].
    pub fn alloc_bram(&self, size: u64, pool: Option<usize>) -> Result<Memory> {
        self.alloc_memory(MemoryType::Bram, size, pool)
    }

    /// Allocate DDR for `count` elements of `T`
    ///
    /// # Errors
    ///
    /// See [`Xdma::alloc_memory`].
    pub fn alloc_ddr_elements<T: Pod>(&self, count: u64, pool: Option<usize>) -> Result<Memory> {
        self.alloc_elements::<T>(MemoryType::Ddr, count, pool)
    }

    /// Allocate BRAM for `count` elements of `T`
    ///
    /// # Errors
    ///
    /// See [`Xdma::alloc_memory`].
    pub fn alloc_bram_elements<T: Pod>(&self, count: u64, pool: Option<usize>) -> Result<Memory> {
        self.alloc_elements::<T>(MemoryType::Bram, count, pool)
    }

    /// Usage of every pool of class `kind`, in registration order
    pub fn memory_stats(&self, kind: MemoryType) -> Vec<PoolStats> {
        self.core
            .pools()
            .get(&kind)
            .map(|list| list.iter().map(MemoryManager::stats).collect())
            .unwrap_or_default()
    }

    // ---- by address ---------------------------------------------------

    /// Fill `buf` from `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        self.core.backend.read(addr, buf)
    }

    /// Write `data` to `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn write(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.core.backend.write(addr, data)
    }

    /// Read `size` bytes (default: the whole buffer) into `buf`
    ///
    /// # Errors
    ///
    /// Returns `BufferTooSmall` before touching the backend if `buf` cannot
    /// hold `size` bytes, otherwise any backend error.
    pub fn read_slice<T: Pod>(&self, addr: u64, buf: &mut [T], size: TransferSize) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf);
        let len = checked_len("read_slice", bytes.len(), size.resolve(bytes.len() as u64))?;
        self.core.backend.read(addr, &mut bytes[..len])
    }

    /// Write `size` bytes (default: the whole buffer) from `data`
    ///
    /// # Errors
    ///
    /// Returns `BufferTooSmall` before touching the backend if `data` holds
    /// fewer than `size` bytes, otherwise any backend error.
    pub fn write_slice<T: Pod>(&self, addr: u64, data: &[T], size: TransferSize) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = checked_len("write_slice", bytes.len(), size.resolve(bytes.len() as u64))?;
        self.core.backend.write(addr, &bytes[..len])
    }

    /// Read `size_in_bytes` into a new vector, rounding the element count up
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read_vec<T: Pod>(&self, addr: u64, size_in_bytes: usize) -> Result<Vec<T>> {
        let elem = std::mem::size_of::<T>().max(1);
        let mut out = vec![T::zeroed(); size_in_bytes.div_ceil(elem)];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut out);
        self.core.backend.read(addr, &mut bytes[..size_in_bytes])?;
        Ok(out)
    }

    /// Read one fixed-width value
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read_scalar<T: Scalar>(&self, addr: u64) -> Result<T> {
        self.core.backend.read_scalar(addr)
    }

    /// Write one fixed-width value
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn write_scalar<T: Scalar>(&self, addr: u64, value: T) -> Result<()> {
        self.core.backend.write_scalar(addr, value)
    }

    /// 8-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read8(&self, addr: u64) -> Result<u8> {
        self.read_scalar(addr)
    }

    /// 16-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read16(&self, addr: u64) -> Result<u16> {
        self.read_scalar(addr)
    }

    /// 32-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read32(&self, addr: u64) -> Result<u32> {
        self.read_scalar(addr)
    }

    /// 64-bit read
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn read64(&self, addr: u64) -> Result<u64> {
        self.read_scalar(addr)
    }

    /// 8-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn write8(&self, addr: u64, value: u8) -> Result<()> {
        self.write_scalar(addr, value)
    }

    /// 16-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn write16(&self, addr: u64, value: u16) -> Result<()> {
        self.write_scalar(addr, value)
    }

    /// 32-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn write32(&self, addr: u64, value: u32) -> Result<()> {
        self.write_scalar(addr, value)
    }

    /// 64-bit write
    ///
    /// # Errors
    ///
    /// Returns error if the backend transfer fails.
    pub fn write64(&self, addr: u64, value: u64) -> Result<()> {
        self.write_scalar(addr, value)
    }

    // ---- by handle ----------------------------------------------------

    /// Check a handle transfer and return its byte count
    fn memory_transfer(
        &self,
        dir: Direction,
        op: &'static str,
        mem: &Memory,
        buffer: usize,
        size: TransferSize,
    ) -> Result<usize> {
        let requested = size.resolve(mem.size());
        if requested > mem.size() {
            return Err(XdmaError::ExceedsMemory {
                op: self.backend_name(dir),
                requested,
                available: mem.size(),
            });
        }
        checked_len(op, buffer, requested)
    }

    /// Read `size` bytes (default: the whole block) of `mem` into `buf`
    ///
    /// # Errors
    ///
    /// Returns `ExceedsMemory` or `BufferTooSmall` before touching the
    /// backend, otherwise any backend error.
    pub fn read_memory<T: Pod>(&self, mem: &Memory, buf: &mut [T], size: TransferSize) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf);
        let len = self.memory_transfer(Direction::Read, "read_memory", mem, bytes.len(), size)?;
        self.core.backend.read(mem.base_addr(), &mut bytes[..len])
    }

    /// Write `size` bytes (default: the whole block) of `data` into `mem`
    ///
    /// # Errors
    ///
    /// Returns `ExceedsMemory` or `BufferTooSmall` before touching the
    /// backend, otherwise any backend error.
    pub fn write_memory<T: Pod>(&self, mem: &Memory, data: &[T], size: TransferSize) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = self.memory_transfer(Direction::Write, "write_memory", mem, bytes.len(), size)?;
        self.core.backend.write(mem.base_addr(), &bytes[..len])
    }

    /// Read one value from the start of `mem`
    ///
    /// # Errors
    ///
    /// Returns `ExceedsMemory` if `T` is wider than the block.
    pub fn read_memory_scalar<T: Scalar>(&self, mem: &Memory) -> Result<T> {
        let mut value = T::default();
        self.read_memory(mem, std::slice::from_mut(&mut value), TransferSize::from(T::WIDTH.bytes()))?;
        Ok(value)
    }

    /// Write one value to the start of `mem`
    ///
    /// # Errors
    ///
    /// Returns `ExceedsMemory` if `T` is wider than the block.
    pub fn write_memory_scalar<T: Scalar>(&self, mem: &Memory, value: T) -> Result<()> {
        self.write_memory(mem, std::slice::from_ref(&value), TransferSize::from(T::WIDTH.bytes()))
    }
}

/// Transfer length after checking it against the host buffer
fn checked_len(op: &'static str, buffer: usize, requested: u64) -> Result<usize> {
    match usize::try_from(requested) {
        Ok(len) if len <= buffer => Ok(len),
        _ => Err(XdmaError::BufferTooSmall {
            op,
            buffer: buffer as u64,
            requested,
        }),
    }
}

impl ManagedDevice for Xdma {
    fn link(&self) -> DeviceLink {
        self.dependents.link()
    }

    fn dependent_count(&self) -> usize {
        self.dependents.count()
    }
}

impl std::fmt::Debug for Xdma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Xdma")
            .field("dev_num", &self.dev_num())
            .field("backend", &self.backend_type())
            .field("info", &self.core.info)
            .field("dependents", &self.dependents.count())
            .finish_non_exhaustive()
    }
}

impl Drop for Xdma {
    fn drop(&mut self) {
        self.dependents.invalidate_all();
        self.streams.join_all();
        tracing::info!("xdma{}: closed", self.dev_num());
    }
}
