//! Maps a PCI device's BAR0 register window into this process and enables
//! bus mastering, the two things a kernel driver's probe routine would
//! normally do for us. Grounded in the sysfs `resource0`/`config` interface
//! that Linux exposes for every PCI device, and in the same map-then-enable
//! sequence a userspace driver uses on other platforms (e.g. Redox's
//! `pci:<bdf>/bar0` and `pci:<bdf>/config` schemes).

use std::fmt;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;

use log::info;

/// Offset of the 16-bit PCI command register within configuration space.
const PCI_COMMAND_OFFSET: u64 = 0x04;
/// Memory Space Enable bit of the command register.
const PCI_COMMAND_MEMORY_SPACE: u16 = 1 << 1;
/// Bus Master Enable bit of the command register.
const PCI_COMMAND_BUS_MASTER: u16 = 1 << 2;

/// A successfully mapped BAR0 window. The caller is responsible for
/// `munmap`-ing `base` for `size` bytes when done; nothing in this struct's
/// lifetime does that automatically, matching the device context's
/// "no explicit teardown required beyond unmapping" lifecycle.
pub struct MappedBar0 {
    pub base: *mut u8,
    pub size: usize,
}

// The mapping is only ever touched through explicit volatile register
// accesses, so handing it to another thread is fine; sharing it between
// threads without the caller's own synchronization is not, which is why
// this is Send but not Sync.
unsafe impl Send for MappedBar0 {}

#[derive(Debug)]
pub enum PciError {
    ConfigOpen(String, std::io::Error),
    ConfigReadWrite(String, std::io::Error),
    ConfigTooShort(String, usize),
    ResourceOpen(String, std::io::Error),
    ResourceStat(String, std::io::Error),
    ResourceZeroSize(String),
    ResourceMmap(String, std::io::Error),
}

impl fmt::Display for PciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigOpen(addr, e) => write!(f, "failed to open config space of {}: {}", addr, e),
            Self::ConfigReadWrite(addr, e) => write!(f, "failed to read/write config space of {}: {}", addr, e),
            Self::ConfigTooShort(addr, len) => write!(
                f,
                "config space of {} is only {} bytes, need at least 6",
                addr, len
            ),
            Self::ResourceOpen(addr, e) => write!(f, "failed to open resource0 of {}: {}", addr, e),
            Self::ResourceStat(addr, e) => write!(f, "failed to stat resource0 of {}: {}", addr, e),
            Self::ResourceZeroSize(addr) => write!(f, "resource0 of {} has zero size", addr),
            Self::ResourceMmap(addr, e) => write!(f, "failed to mmap resource0 of {}: {}", addr, e),
        }
    }
}

impl std::error::Error for PciError {}

fn config_path(pci_addr: &str) -> String {
    format!("/sys/bus/pci/devices/{}/config", pci_addr)
}

fn resource0_path(pci_addr: &str) -> String {
    format!("/sys/bus/pci/devices/{}/resource0", pci_addr)
}

/// Set the Bus Master and Memory Space Enable bits in the device's PCI
/// command register. Required before the device can perform DMA.
pub fn enable_bus_mastering(pci_addr: &str) -> Result<(), PciError> {
    let path = config_path(pci_addr);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|e| PciError::ConfigOpen(pci_addr.to_string(), e))?;

    let mut header = [0u8; 6];
    file.read_exact(&mut header)
        .map_err(|e| PciError::ConfigReadWrite(pci_addr.to_string(), e))?;

    let command = u16::from_le_bytes([header[4], header[5]]);
    let new_command = command | PCI_COMMAND_BUS_MASTER | PCI_COMMAND_MEMORY_SPACE;

    if new_command != command {
        file.seek(SeekFrom::Start(PCI_COMMAND_OFFSET))
            .map_err(|e| PciError::ConfigReadWrite(pci_addr.to_string(), e))?;
        file.write_all(&new_command.to_le_bytes())
            .map_err(|e| PciError::ConfigReadWrite(pci_addr.to_string(), e))?;
        info!(
            "{}: enabled bus mastering (command {:#06x} -> {:#06x})",
            pci_addr, command, new_command
        );
    } else {
        info!("{}: bus mastering already enabled", pci_addr);
    }

    Ok(())
}

/// Map the device's BAR0 window (its MMIO register space) into this
/// process. Enables bus mastering first, since a device with DMA disabled
/// is useless to this driver.
pub fn map_bar0(pci_addr: &str) -> Result<MappedBar0, PciError> {
    enable_bus_mastering(pci_addr)?;

    let path = resource0_path(pci_addr);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|e| PciError::ResourceOpen(pci_addr.to_string(), e))?;

    let size = file
        .metadata()
        .map_err(|e| PciError::ResourceStat(pci_addr.to_string(), e))?
        .len() as usize;

    if size == 0 {
        return Err(PciError::ResourceZeroSize(pci_addr.to_string()));
    }

    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };

    if base == libc::MAP_FAILED {
        return Err(PciError::ResourceMmap(
            pci_addr.to_string(),
            std::io::Error::last_os_error(),
        ));
    }

    info!(
        "{}: mapped BAR0 ({} KiB) at {:p}",
        pci_addr,
        size / 1024,
        base
    );

    Ok(MappedBar0 {
        base: base as *mut u8,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_paths_use_sysfs_layout() {
        assert_eq!(
            config_path("0000:01:00.0"),
            "/sys/bus/pci/devices/0000:01:00.0/config"
        );
        assert_eq!(
            resource0_path("0000:01:00.0"),
            "/sys/bus/pci/devices/0000:01:00.0/resource0"
        );
    }

    #[test]
    fn command_bits_are_the_documented_offsets() {
        assert_eq!(PCI_COMMAND_MEMORY_SPACE, 0x2);
        assert_eq!(PCI_COMMAND_BUS_MASTER, 0x4);
    }
}
