//! Positioned I/O on XDMA device nodes
//!
//! The XDMA character devices interpret the file offset as the AXI address,
//! so every transfer is a `pread`/`pwrite` at the target address. Short
//! transfers are continued until the whole buffer has moved.

use crate::error::{Result, XdmaError};
use rustix::fs::OFlags;
use rustix::io::{pread, pwrite, Errno};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Access mode for [`IoHandle::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Owned device node used for positioned transfers
#[derive(Debug)]
pub(crate) struct IoHandle {
    file: File,
    path: PathBuf,
}

impl IoHandle {
    /// Open `path` with the given access mode and extra open flags
    pub(crate) fn open(path: &Path, access: Access, flags: OFlags) -> Result<Self> {
        // OFlags bits are small positive values and always fit an i32
        #[allow(clippy::cast_possible_wrap)]
        let custom = flags.bits() as i32;

        let file = OpenOptions::new()
            .read(access != Access::WriteOnly)
            .write(access != Access::ReadOnly)
            .custom_flags(custom)
            .open(path)
            .map_err(|e| XdmaError::device_open(path, e))?;

        tracing::debug!("Opened {} ({access:?})", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Node path as used in diagnostics and by `Backend::name`
    pub(crate) fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// Fill `buf` from `addr`
    pub(crate) fn read_exact_at(&self, addr: u64, mut buf: &mut [u8]) -> Result<()> {
        let mut offset = addr;
        while !buf.is_empty() {
            match pread(&self.file, buf, offset) {
                Ok(0) => {
                    return Err(XdmaError::transfer(
                        self.name(),
                        offset,
                        format!("read returned 0 of {} remaining bytes", buf.len()),
                    ))
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(Errno::INTR) => continue,
                Err(e) => return Err(XdmaError::transfer(self.name(), offset, e.to_string())),
            }
        }

        tracing::trace!("{}: read {} bytes @ {addr:#x}", self.path.display(), offset - addr);
        Ok(())
    }

    /// Write all of `data` at `addr`
    pub(crate) fn write_all_at(&self, addr: u64, mut data: &[u8]) -> Result<()> {
        let mut offset = addr;
        while !data.is_empty() {
            match pwrite(&self.file, data, offset) {
                Ok(0) => {
                    return Err(XdmaError::transfer(
                        self.name(),
                        offset,
                        format!("write accepted 0 of {} remaining bytes", data.len()),
                    ))
                }
                Ok(n) => {
                    data = &data[n..];
                    offset += n as u64;
                }
                Err(Errno::INTR) => continue,
                Err(e) => return Err(XdmaError::transfer(self.name(), offset, e.to_string())),
            }
        }

        tracing::trace!("{}: wrote {} bytes @ {addr:#x}", self.path.display(), offset - addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positioned_round_trip() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.as_file().set_len(0x100).unwrap();

        let io = IoHandle::open(tmp.path(), Access::ReadWrite, OFlags::empty()).unwrap();
        io.write_all_at(0x40, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        io.read_exact_at(0x40, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn read_past_end_is_a_transfer_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.as_file().set_len(0x10).unwrap();

        let io = IoHandle::open(tmp.path(), Access::ReadOnly, OFlags::empty()).unwrap();
        let mut buf = [0u8; 8];
        let err = io.read_exact_at(0x20, &mut buf).unwrap_err();
        assert!(matches!(err, XdmaError::Transfer { addr: 0x20, .. }));
    }

    #[test]
    fn missing_node_reports_path() {
        let err = IoHandle::open(
            Path::new("/nonexistent/xdma9_h2c_0"),
            Access::WriteOnly,
            OFlags::empty(),
        )
        .unwrap_err();
        match err {
            XdmaError::DeviceOpen { path, .. } => assert!(path.ends_with("xdma9_h2c_0")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
