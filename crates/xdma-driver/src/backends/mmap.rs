//! Memory-mapped register window
//!
//! Unsafe code is limited to the mapping itself and the volatile accesses.
//! Every access is bounds- and alignment-checked before it touches the
//! mapping, so the safe API cannot reach outside the window.

use crate::error::{Result, XdmaError};
use crate::scalar::Width;
use rustix::fs::OFlags;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// `size` bytes of a device node mapped at `offset`
#[derive(Debug)]
pub struct MmapWindow {
    ptr: NonNull<u8>,
    size: usize,
    offset: u64,
    path: PathBuf,
    _file: File,
}

impl MmapWindow {
    /// Open `path` read/write, non-blocking, and map `size` bytes at `offset`
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpen` if the node cannot be opened and `Mmap` if the
    /// mapping fails (zero size, unaligned offset, window larger than the node).
    pub fn new(path: &Path, size: u64, offset: u64) -> Result<Self> {
        let mmap_err = |source: std::io::Error| XdmaError::Mmap {
            path: path.to_path_buf(),
            source,
        };

        let size = usize::try_from(size)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| mmap_err(std::io::ErrorKind::InvalidInput.into()))?;

        #[allow(clippy::cast_possible_wrap)]
        let nonblock = OFlags::NONBLOCK.bits() as i32;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(nonblock)
            .open(path)
            .map_err(|e| XdmaError::device_open(path, e))?;

        // SAFETY: mmap is unsafe but all preconditions are validated:
        // - File descriptor is valid (just opened via OpenOptions)
        // - Size is non-zero (checked above)
        // - PROT_READ|PROT_WRITE for register access, MAP_SHARED so stores reach the device
        // - The kernel rejects offsets that are not page aligned, reported as an error
        // - The file is stored in the struct so the fd outlives the mapping
        // - Drop unmaps exactly this (ptr, size) pair
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                offset,
            )
        }
        .map_err(|e| mmap_err(e.into()))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| mmap_err(std::io::ErrorKind::AddrNotAvailable.into()))?;

        tracing::info!(
            "Mapped {} ({size:#x} bytes at offset {offset:#x}, {ptr:p})",
            path.display()
        );

        Ok(Self {
            ptr,
            size,
            offset,
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Window length in bytes
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Mapped node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset inside the window, or an error if `[offset, offset+width)`
    /// leaves it or is not naturally aligned
    fn check(&self, offset: u64, width: Width) -> Result<usize> {
        let len = width.bytes();
        let out_of_range = || XdmaError::AddressOutOfRange {
            addr: self.offset + offset,
            len: len as u64,
            start: self.offset,
            end: self.offset + self.size as u64,
        };

        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        if start.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(out_of_range());
        }
        if start % len != 0 {
            return Err(XdmaError::UnalignedAccess {
                addr: self.offset + offset,
                width: len,
            });
        }
        Ok(start)
    }

    /// Volatile load of `width` bytes at window offset `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the access leaves the window or is unaligned.
    pub fn read(&self, offset: u64, width: Width) -> Result<u64> {
        let start = self.check(offset, width)?;

        // SAFETY: Volatile read from memory-mapped hardware registers.
        // - check() guarantees start + width <= size, so the access stays in the mapping
        // - check() guarantees start is a multiple of width; the mapping is page aligned,
        //   so the cast pointer is naturally aligned for the target type
        // - ptr is valid for the lifetime of self (unmapped only in Drop)
        // - read_volatile keeps the compiler from merging or reordering device loads
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe {
            let p = self.ptr.as_ptr().add(start);
            match width {
                Width::W8 => u64::from(p.read_volatile()),
                Width::W16 => u64::from(p.cast::<u16>().read_volatile()),
                Width::W32 => u64::from(p.cast::<u32>().read_volatile()),
                Width::W64 => p.cast::<u64>().read_volatile(),
            }
        };

        tracing::trace!("{}: read {width} @ {offset:#x} = {value:#x}", self.path.display());
        Ok(value)
    }

    /// Volatile store of the low `width` bytes of `value` at window offset `offset`
    ///
    /// # Errors
    ///
    /// Returns error if the access leaves the window or is unaligned.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&mut self, offset: u64, width: Width, value: u64) -> Result<()> {
        let start = self.check(offset, width)?;

        tracing::trace!("{}: write {width} @ {offset:#x} = {value:#x}", self.path.display());

        // SAFETY: Volatile write to memory-mapped hardware registers.
        // - check() guarantees start + width <= size and natural alignment (see read)
        // - &mut self gives exclusive access to the mapping for the duration
        // - write_volatile keeps the compiler from eliding or reordering device stores
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            let p = self.ptr.as_ptr().add(start);
            match width {
                Width::W8 => p.write_volatile(value as u8),
                Width::W16 => p.cast::<u16>().write_volatile(value as u16),
                Width::W32 => p.cast::<u32>().write_volatile(value as u32),
                Width::W64 => p.cast::<u64>().write_volatile(value),
            }
        }

        Ok(())
    }
}

impl Drop for MmapWindow {
    fn drop(&mut self) {
        tracing::debug!("Unmapping {} ({:#x} bytes)", self.path.display(), self.size);

        // SAFETY: munmap requires the pointer and length returned by / passed to mmap.
        // - self.ptr comes from the successful mmap in new()
        // - self.size is the length passed to that mmap
        // - No references into the mapping outlive self
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: MmapWindow exclusively owns its mapping and the fd behind it.
// Moving it to another thread does not invalidate the mapping.
unsafe impl Send for MmapWindow {}

// SAFETY: Shared access only performs bounds-checked volatile loads;
// stores require &mut self. ptr, size, offset and the file never change.
unsafe impl Sync for MmapWindow {}

#[cfg(test)]
mod tests {
    use super::*;

    fn backing(len: u64) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(len).unwrap();
        file
    }

    #[test]
    fn volatile_round_trip_all_widths() {
        let file = backing(0x1000);
        let mut window = MmapWindow::new(file.path(), 0x1000, 0).unwrap();

        window.write(0x10, Width::W8, 0xAB).unwrap();
        window.write(0x12, Width::W16, 0xBEEF).unwrap();
        window.write(0x14, Width::W32, 0xDEAD_BEEF).unwrap();
        window.write(0x18, Width::W64, 0x0123_4567_89AB_CDEF).unwrap();

        assert_eq!(window.read(0x10, Width::W8).unwrap(), 0xAB);
        assert_eq!(window.read(0x12, Width::W16).unwrap(), 0xBEEF);
        assert_eq!(window.read(0x14, Width::W32).unwrap(), 0xDEAD_BEEF);
        assert_eq!(window.read(0x18, Width::W64).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn out_of_window_is_rejected() {
        let file = backing(0x1000);
        let window = MmapWindow::new(file.path(), 0x1000, 0).unwrap();

        let err = window.read(0xFFC, Width::W64).unwrap_err();
        assert!(matches!(
            err,
            XdmaError::AddressOutOfRange { addr: 0xFFC, len: 8, start: 0, end: 0x1000 }
        ));
    }

    #[test]
    fn unaligned_is_rejected() {
        let file = backing(0x1000);
        let window = MmapWindow::new(file.path(), 0x1000, 0).unwrap();
        assert!(matches!(
            window.read(0x2, Width::W32),
            Err(XdmaError::UnalignedAccess { addr: 0x2, width: 4 })
        ));
    }

    #[test]
    fn zero_sized_window_fails_to_map() {
        let file = backing(0x1000);
        assert!(matches!(
            MmapWindow::new(file.path(), 0, 0),
            Err(XdmaError::Mmap { .. })
        ));
    }
}
