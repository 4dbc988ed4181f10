//! Register layer tests against the loopback backend

use xdma_driver::{
    Backend, BackendType, Direction, LoopbackBackend, Register, RegisterControl, TransportInfo,
    Width, Xdma, XdmaConfig, XdmaError,
};

#[test]
fn write_then_read_back() {
    let xdma = Xdma::new(LoopbackBackend::new(0x2000));
    let mut ctrl = RegisterControl::new(&xdma, 0x1000);
    let reg: Register<u32> = ctrl.register(0x10);

    reg.set(42);
    reg.update(Direction::Write).unwrap();
    reg.set(0);
    reg.update(Direction::Read).unwrap();

    assert_eq!(reg.value(), 42);
    assert_eq!(xdma.read32(0x1010).unwrap(), 42);
    assert_eq!(ctrl.ctrl_offset(), 0x1000);
    assert_eq!(reg.offset(), 0x10);
}

#[test]
fn update_all_refreshes_in_order() {
    let xdma = Xdma::new(LoopbackBackend::new(0x2000));
    let mut ctrl = RegisterControl::new(&xdma, 0x800);
    let ctrl_reg: Register<u32> = ctrl.register(0x0);
    let status: Register<u8> = ctrl.register(0x4);
    let addr: Register<u64> = ctrl.register(0x10);
    assert_eq!(ctrl.register_count(), 3);

    xdma.write32(0x800, 0x81).unwrap();
    xdma.write8(0x804, 0x2).unwrap();
    xdma.write64(0x810, 0x1_0000_0000).unwrap();

    ctrl.update_all_registers().unwrap();
    assert_eq!(ctrl_reg.value(), 0x81);
    assert_eq!(status.value(), 0x2);
    assert_eq!(addr.value(), 0x1_0000_0000);
}

#[test]
fn validated_write_passes_on_memory() {
    let xdma = Xdma::new(LoopbackBackend::new(0x100));
    let ctrl = RegisterControl::new(&xdma, 0x0);
    ctrl.write_register(0x8, 0x55u16, true).unwrap();
    assert_eq!(ctrl.read_register::<u16>(0x8).unwrap(), 0x55);
}

/// Backend whose reads of one address always return a fixed value,
/// like a read-only status register
#[derive(Debug)]
struct StuckRegister(LoopbackBackend);

impl Backend for StuckRegister {
    fn open(_config: &XdmaConfig) -> xdma_driver::Result<Self> {
        Ok(Self(LoopbackBackend::new(0x100)))
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> xdma_driver::Result<()> {
        if addr == 0x20 {
            buf.fill(0);
            buf[0] = 0x1;
            return Ok(());
        }
        self.0.read(addr, buf)
    }

    fn write(&self, addr: u64, data: &[u8]) -> xdma_driver::Result<()> {
        self.0.write(addr, data)
    }

    fn dev_num(&self) -> u32 {
        0
    }

    fn name(&self, dir: Direction) -> String {
        self.0.name(dir)
    }

    fn info(&self) -> TransportInfo {
        self.0.info()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Loopback
    }
}

#[test]
fn validated_write_reports_mismatch() {
    let xdma = Xdma::new(StuckRegister(LoopbackBackend::new(0x100)));
    let ctrl = RegisterControl::new(&xdma, 0x10);

    let err = ctrl.write_register(0x10, 0x80u8, true).unwrap_err();
    match &err {
        XdmaError::ValidationFailed {
            offset,
            expected,
            actual,
        } => {
            assert_eq!(*offset, 0x20);
            assert_eq!(*expected, 0x80);
            assert_eq!(*actual, 0x1);
        }
        other => panic!("unexpected: {other}"),
    }
    assert!(err.to_string().contains("Expected: 0x80, Read: 0x1"));

    // without validation the write goes through silently
    ctrl.write_register(0x10, 0x80u8, false).unwrap();
}

#[test]
fn runtime_widths_outside_the_closed_set_fail() {
    for bytes in [3usize, 6, 16] {
        assert!(matches!(
            Width::from_bytes(bytes),
            Err(XdmaError::UnsupportedWidth { width }) if width == bytes
        ));
    }
}
