//! Backend selection and device-node backends
//!
//! The PCIe, PetaLinux and PIO backends are exercised against regular files,
//! which support pread/pwrite/mmap the same way the XDMA nodes do.

use std::io::Write;
use tempfile::NamedTempFile;
use xdma_driver::{
    open_backend, BackendSelection, BackendType, Direction, MemoryType, PcieBackend,
    PetaLinuxBackend, PioBackend, PioConfig, TransferSize, Xdma, XdmaConfig, XdmaError,
};

fn sized(len: u64) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    file.as_file().set_len(len).unwrap();
    file
}

#[test]
fn pcie_backend_moves_data_by_offset() {
    let card = sized(0x10_0000);
    let mut control = NamedTempFile::new().unwrap();
    control.write_all(&[0u8; 0x100]).unwrap();

    let backend =
        PcieBackend::with_paths(0, 0, card.path(), card.path(), control.path()).unwrap();
    let xdma = Xdma::new(backend);
    assert_eq!(xdma.backend_type(), BackendType::Pcie);
    assert!(!xdma.transport_info().streaming);

    xdma.add_memory_region(MemoryType::Ddr, 0x8_0000, 0x8_0000).unwrap();
    let mem = xdma.alloc_ddr_elements::<u64>(512, None).unwrap();
    let data: Vec<u64> = (0..512).map(|i| i * 0x0101_0101).collect();
    xdma.write_memory(&mem, &data, TransferSize::Whole).unwrap();

    let mut back = vec![0u64; 512];
    xdma.read_memory(&mem, &mut back, TransferSize::Whole).unwrap();
    assert_eq!(back, data);
}

#[test]
fn pcie_read_past_node_end_is_transfer_error() {
    let card = sized(0x100);
    let control = sized(0x100);
    let backend =
        PcieBackend::with_paths(0, 0, card.path(), card.path(), control.path()).unwrap();
    let xdma = Xdma::new(backend);

    let mut buf = [0u8; 16];
    assert!(matches!(
        xdma.read(0x1000, &mut buf),
        Err(XdmaError::Transfer { addr: 0x1000, .. })
    ));
}

#[test]
fn petalinux_backend_round_trip() {
    let mem = sized(0x2000);
    let xdma = Xdma::new(PetaLinuxBackend::with_path(1, mem.path()).unwrap());
    assert_eq!(xdma.dev_num(), 1);

    xdma.write32(0x1004, 0xFEED_F00D).unwrap();
    assert_eq!(xdma.read32(0x1004).unwrap(), 0xFEED_F00D);
    assert_eq!(
        xdma.backend_name(Direction::Read),
        xdma.backend_name(Direction::Write)
    );
}

#[test]
fn pio_backend_through_facade() {
    let node = sized(0x1000);
    let pio = PioBackend::with_path(
        0,
        node.path(),
        PioConfig {
            size: 0x1000,
            offset: 0,
        },
    )
    .unwrap();
    let xdma = Xdma::new(pio);

    xdma.write64(0x18, u64::MAX - 1).unwrap();
    assert_eq!(xdma.read64(0x18).unwrap(), u64::MAX - 1);

    // wider than a single PIO access
    let mut wide = [0u8; 16];
    assert!(matches!(
        xdma.read(0x0, &mut wide),
        Err(XdmaError::UnsupportedWidth { width: 16 })
    ));
    assert!(matches!(
        xdma.write32(0x1000, 1),
        Err(XdmaError::AddressOutOfRange { .. })
    ));
}

#[test]
fn missing_nodes_report_open_failure() {
    let config = XdmaConfig::default().with_device(250);
    assert!(matches!(
        open_backend(BackendSelection::Pcie, &config),
        Err(XdmaError::DeviceOpen { .. })
    ));
    assert!(matches!(
        open_backend(BackendSelection::Pio, &config),
        Err(XdmaError::DeviceOpen { .. })
    ));
}

#[test]
fn loopback_selected_from_config() {
    let config = XdmaConfig::default()
        .with_backend(BackendSelection::Loopback)
        .with_loopback(0x1000, false);
    let xdma = Xdma::from_config(&config).unwrap();
    assert_eq!(xdma.backend_type(), BackendType::Loopback);
    xdma.write16(0x10, 0x1234).unwrap();
    assert_eq!(xdma.read16(0x10).unwrap(), 0x1234);
}

#[test]
#[ignore] // Requires hardware
fn test_pcie_hardware() {
    let config = XdmaConfig::from_env().expect("config");
    let xdma = Xdma::create::<PcieBackend>(&config).expect("PCIe backend");
    println!("xdma{}: {}", xdma.dev_num(), xdma.backend_name(Direction::Read));
    println!("{}", xdma.transport_info());
}

#[test]
#[ignore] // Requires hardware
fn test_pio_hardware() {
    let config = XdmaConfig::from_env().expect("config");
    let pio = xdma_driver::XdmaPio::from_config(&config).expect("PIO window");
    let (start, end) = pio.range();
    println!("PIO window {start:#x}-{end:#x}: {:#x}", pio.read32(start).unwrap());
}
