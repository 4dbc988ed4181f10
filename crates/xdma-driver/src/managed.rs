//! Lifetime protocol between a device and the objects built on top of it
//!
//! Register controllers and accelerator drivers keep using a device for as
//! long as they live, but they do not own it. Each of them holds a
//! [`DeviceLink`]: a slot registered with the device that contains a shared
//! handle to the device's access surface.
//!
//! ```text
//!  Xdma ──owns──▶ Dependents ──▶ [(id, slot), (id, slot), ...]
//!                                        ▲
//!  RegisterControl ──owns──▶ DeviceLink ─┘
//! ```
//!
//! When the device is dropped it empties every slot before releasing its
//! own resources, so a dependent sees `InvalidState` on its next call. A
//! dependent dropped first removes its slot from the still-live registry.
//! Each call clones the handle out of the slot, so an access that is already
//! running keeps the device alive until it returns.

use crate::error::{Result, XdmaError};
use crate::scalar::{Scalar, Width};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// Byte-level access offered to dependents
pub trait DeviceAccess: Send + Sync {
    /// XDMA device number
    fn dev_num(&self) -> u32;

    /// Fill `buf` from device address `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` to device address `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()>;
}

impl dyn DeviceAccess + '_ {
    /// Read `width` bytes at `addr` as a zero-extended bit pattern
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    pub fn read_width(&self, addr: u64, width: Width) -> Result<u64> {
        let mut raw = [0u8; 8];
        self.read_bytes(addr, &mut raw[..width.bytes()])?;
        Ok(width.decode(&raw))
    }

    /// Write the low `width` bytes of `bits` at `addr`
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    pub fn write_width(&self, addr: u64, width: Width, bits: u64) -> Result<()> {
        self.write_bytes(addr, &width.encode(bits)[..width.bytes()])
    }

    /// Typed read
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    pub fn read<T: Scalar>(&self, addr: u64) -> Result<T> {
        let mut value = T::default();
        self.read_bytes(addr, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Typed write
    ///
    /// # Errors
    ///
    /// Returns error if the transfer fails.
    pub fn write<T: Scalar>(&self, addr: u64, value: T) -> Result<()> {
        self.write_bytes(addr, bytemuck::bytes_of(&value))
    }
}

/// A device that dependents can attach to
pub trait ManagedDevice {
    /// Register a new dependent and return its link
    fn link(&self) -> DeviceLink;

    /// Number of live dependents
    fn dependent_count(&self) -> usize;
}

type Slot = RwLock<Option<Arc<dyn DeviceAccess>>>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Arc<Slot>)>>,
}

impl Registry {
    fn unregister(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(entry, _)| *entry != id);
    }
}

/// Registry owned by a device
pub(crate) struct Dependents {
    target: Arc<dyn DeviceAccess>,
    registry: Arc<Registry>,
}

impl Dependents {
    pub(crate) fn new(target: Arc<dyn DeviceAccess>) -> Self {
        Self {
            target,
            registry: Arc::new(Registry::default()),
        }
    }

    pub(crate) fn link(&self) -> DeviceLink {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(RwLock::new(Some(Arc::clone(&self.target))));

        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&slot)));

        tracing::debug!("xdma{}: dependent {id} attached", self.target.dev_num());

        DeviceLink {
            id,
            dev_num: self.target.dev_num(),
            slot,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Empty every slot; later calls through the links fail
    pub(crate) fn invalidate_all(&self) {
        let entries = std::mem::take(
            &mut *self
                .registry
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (_, slot) in &entries {
            slot.write().unwrap_or_else(PoisonError::into_inner).take();
        }

        if !entries.is_empty() {
            tracing::info!(
                "xdma{}: invalidated {} dependent(s)",
                self.target.dev_num(),
                entries.len()
            );
        }
    }
}

/// Non-owning handle from a dependent to its device
pub struct DeviceLink {
    id: u64,
    dev_num: u32,
    slot: Arc<Slot>,
    registry: Weak<Registry>,
}

impl DeviceLink {
    /// Device handle for one operation
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` once the device is gone or the link was detached.
    pub fn device(&self) -> Result<Arc<dyn DeviceAccess>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                XdmaError::invalid_state(format!(
                    "xdma{} is no longer valid (dependent {})",
                    self.dev_num, self.id
                ))
            })
    }

    /// Whether the device is still reachable
    pub fn is_valid(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Device number captured when the link was created
    pub const fn dev_num(&self) -> u32 {
        self.dev_num
    }

    /// Give up access early and leave the device's registry
    pub fn detach(&self) {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("id", &self.id)
            .field("dev_num", &self.dev_num)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scratch(Mutex<[u8; 16]>);

    impl DeviceAccess for Scratch {
        fn dev_num(&self) -> u32 {
            7
        }

        fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
            let mem = self.0.lock().unwrap();
            let start = addr as usize;
            buf.copy_from_slice(&mem[start..start + buf.len()]);
            Ok(())
        }

        fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
            let mut mem = self.0.lock().unwrap();
            let start = addr as usize;
            mem[start..start + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    fn dependents() -> Dependents {
        Dependents::new(Arc::new(Scratch(Mutex::new([0; 16]))))
    }

    #[test]
    fn link_reaches_device() {
        let deps = dependents();
        let link = deps.link();

        let dev = link.device().unwrap();
        dev.write::<u32>(4, 0xCAFE).unwrap();
        assert_eq!(dev.read::<u32>(4).unwrap(), 0xCAFE);
        assert_eq!(dev.read_width(4, Width::W16).unwrap(), u64::from(dev.read::<u16>(4).unwrap()));
        assert_eq!(link.dev_num(), 7);
    }

    #[test]
    fn invalidation_is_observed() {
        let deps = dependents();
        let link = deps.link();
        assert!(link.is_valid());

        deps.invalidate_all();
        assert!(!link.is_valid());
        assert!(matches!(link.device(), Err(XdmaError::InvalidState { .. })));
        assert_eq!(deps.count(), 0);
    }

    #[test]
    fn dropped_link_unregisters() {
        let deps = dependents();
        let a = deps.link();
        let b = deps.link();
        assert_eq!(deps.count(), 2);

        drop(a);
        assert_eq!(deps.count(), 1);
        b.detach();
        assert_eq!(deps.count(), 0);
        assert!(!b.is_valid());
    }

    #[test]
    fn link_outliving_registry() {
        let deps = dependents();
        let link = deps.link();
        deps.invalidate_all();
        drop(deps);
        assert!(link.device().is_err());
        drop(link);
    }

    #[test]
    fn running_access_keeps_device_alive() {
        let deps = dependents();
        let link = deps.link();
        let dev = link.device().unwrap();

        deps.invalidate_all();
        drop(deps);

        // handle cloned before teardown still works
        dev.write::<u8>(0, 1).unwrap();
        assert!(link.device().is_err());
    }
}
