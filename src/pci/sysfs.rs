//! Sysfs-backed PCI access
//!
//! Each PCI device appears as a directory under `/sys/bus/pci/devices`
//! named by its `DDDD:BB:DD.F` address, with a `config` file mapped to
//! the device's configuration space. Enumeration reads the first 48
//! bytes of each device's config space and matches the identity fields;
//! link management walks the capability list of a bridge's config space.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{SetupError, SetupResult};
use crate::pci::{PciDeviceId, PciEnumerator, PciIdMatch};

/// Device directories of the sysfs PCI tree
pub const SYS_BUS_PCI_DEVICES: &str = "/sys/bus/pci/devices";

/// Bytes of config space needed for identity matching
const CONFIG_ID_LEN: usize = 48;
/// Bytes of config space read for capability walks
const CONFIG_FULL_LEN: usize = 256;

/// Start of the capability pointer chain
const PCI_CAPABILITY_LIST: usize = 0x34;
/// Capability ID for PCI Express
const PCI_CAP_ID_EXP: u8 = 0x10;
/// Link Capabilities offset within the PCIe capability
const PCI_EXP_LNKCAP: usize = 12;
/// Data Link Layer Link Active Reporting Capable
const PCI_EXP_LNKCAP_DLLLARC: u32 = 0x0010_0000;
/// Link Control offset within the PCIe capability
const PCI_EXP_LNKCTL: usize = 16;
/// Link Disable bit in Link Control
const PCI_EXP_LNKCTL_LD: u16 = 0x0010;
/// Link Status offset within the PCIe capability
const PCI_EXP_LNKSTA: usize = 18;
/// Data Link Layer Link Active bit in Link Status
const PCI_EXP_LNKSTA_DLLLA: u16 = 0x2000;

/// Polling step while waiting for the link to come up
const LINK_WAIT_STEP: Duration = Duration::from_millis(200);
/// Polling attempts (bounds the total wait below one second)
const LINK_WAIT_STEPS: u32 = 4;
/// Settle delay when the bridge cannot report link-active
const LINK_SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Delay after disabling the link
const LINK_DISABLE_DELAY: Duration = Duration::from_millis(30);

/// A PCI geographic address: domain, bus, device, function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    /// PCI domain (segment)
    pub domain: u16,
    /// Bus number
    pub bus: u8,
    /// Device (slot) number
    pub device: u8,
    /// Function number
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SetupError::BadPciAddress(s.to_owned());

        let (domain, rest) = s.split_once(':').ok_or_else(bad)?;
        let (bus, rest) = rest.split_once(':').ok_or_else(bad)?;
        let (device, function) = rest.split_once('.').ok_or_else(bad)?;

        Ok(Self {
            domain: u16::from_str_radix(domain, 16).map_err(|_| bad())?,
            bus: u8::from_str_radix(bus, 16).map_err(|_| bad())?,
            device: u8::from_str_radix(device, 16).map_err(|_| bad())?,
            function: u8::from_str_radix(function, 16).map_err(|_| bad())?,
        })
    }
}

/// PCI enumerator walking a sysfs device directory
#[derive(Debug, Clone)]
pub struct SysfsPciEnumerator {
    devices_dir: PathBuf,
}

impl Default for SysfsPciEnumerator {
    fn default() -> Self {
        Self {
            devices_dir: PathBuf::from(SYS_BUS_PCI_DEVICES),
        }
    }
}

impl PciEnumerator for SysfsPciEnumerator {
    fn count_matches(&self, filter: &PciIdMatch) -> SetupResult<usize> {
        let entries =
            std::fs::read_dir(&self.devices_dir).map_err(SetupError::PciEnumeration)?;

        let mut matches = 0;

        for entry in entries {
            let entry = entry.map_err(SetupError::PciEnumeration)?;

            let mut config = [0u8; CONFIG_ID_LEN];
            let n = read_config(&entry.path(), &mut config).map_err(|source| {
                SetupError::PciConfigRead {
                    device: entry.file_name().to_string_lossy().into_owned(),
                    source,
                }
            })?;

            // Devices without a full standard header cannot be matched.
            if n < CONFIG_ID_LEN {
                continue;
            }

            if filter.matches(&decode_device_id(&config)) {
                matches += 1;
            }
        }

        Ok(matches)
    }
}

impl SysfsPciEnumerator {
    /// Enumerator rooted at an alternate device directory (tests point
    /// this at a synthetic tree).
    pub fn with_devices_dir(devices_dir: impl Into<PathBuf>) -> Self {
        Self {
            devices_dir: devices_dir.into(),
        }
    }

    /// Trigger a PCI rescan: of the whole tree when `address` is `None`,
    /// or below the bridge at `address`.
    pub fn rescan(&self, address: Option<PciAddress>) -> SetupResult<()> {
        let path = match address {
            Some(addr) => self.devices_dir.join(addr.to_string()).join("rescan"),
            None => match self.devices_dir.parent() {
                Some(bus_dir) => bus_dir.join("rescan"),
                None => return Err(SetupError::PciEnumeration(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "device directory has no parent",
                ))),
            },
        };

        std::fs::write(path, b"1\n")?;
        Ok(())
    }

    /// Find the upstream bridge of the device at `address` by resolving
    /// its sysfs directory; the parent path component is the bridge.
    pub fn find_parent_bridge(&self, address: PciAddress) -> SetupResult<PciAddress> {
        let resolved = self
            .devices_dir
            .join(address.to_string())
            .canonicalize()
            .map_err(SetupError::PciEnumeration)?;

        resolved
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .and_then(|name| PciAddress::from_str(name).ok())
            .ok_or_else(|| SetupError::NoParentBridge(address.to_string()))
    }

    /// Enable or disable the downstream link of the bridge at `address`
    /// by toggling Link Disable in its PCIe Link Control register.
    ///
    /// On enable, if the bridge reports Data Link Layer Link Active
    /// Reporting, the link is polled for up to a bounded interval;
    /// otherwise a fixed settle delay is used. A link that has not come
    /// up when the bound expires is logged but not treated as an error.
    pub fn bridge_link_set_enable(
        &self,
        address: PciAddress,
        enable: bool,
    ) -> SetupResult<()> {
        let device_dir = self.devices_dir.join(address.to_string());
        let config_path = device_dir.join("config");

        let mut config = [0u8; CONFIG_FULL_LEN];
        read_config(&device_dir, &mut config).map_err(|source| {
            SetupError::PciConfigRead {
                device: address.to_string(),
                source,
            }
        })?;

        let cap = find_pcie_capability(&config)
            .ok_or_else(|| SetupError::NoPciExpressCapability(address.to_string()))?;

        let lnkctl_offset = cap + PCI_EXP_LNKCTL;
        let mut lnkctl = read_u16(&config, lnkctl_offset);
        if enable {
            lnkctl &= !PCI_EXP_LNKCTL_LD;
        } else {
            lnkctl |= PCI_EXP_LNKCTL_LD;
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&config_path)
            .map_err(|source| SetupError::PciConfigWrite {
                device: address.to_string(),
                source,
            })?;
        file.write_all_at(&lnkctl.to_le_bytes(), lnkctl_offset as u64)
            .map_err(|source| SetupError::PciConfigWrite {
                device: address.to_string(),
                source,
            })?;

        if !enable {
            thread::sleep(LINK_DISABLE_DELAY);
            return Ok(());
        }

        let lnkcap = read_u32(&config, cap + PCI_EXP_LNKCAP);
        if lnkcap & PCI_EXP_LNKCAP_DLLLARC == 0 {
            // No link-active reporting; give the link a fixed settle time.
            thread::sleep(LINK_SETTLE_DELAY);
            return Ok(());
        }

        let status_file = File::open(&config_path).map_err(|source| {
            SetupError::PciConfigRead {
                device: address.to_string(),
                source,
            }
        })?;

        for _ in 0..LINK_WAIT_STEPS {
            thread::sleep(LINK_WAIT_STEP);

            let mut sta = [0u8; 2];
            status_file
                .read_exact_at(&mut sta, (cap + PCI_EXP_LNKSTA) as u64)
                .map_err(|source| SetupError::PciConfigRead {
                    device: address.to_string(),
                    source,
                })?;

            if u16::from_le_bytes(sta) & PCI_EXP_LNKSTA_DLLLA != 0 {
                debug!("link active on bridge {address}");
                return Ok(());
            }
        }

        warn!("link on bridge {address} not active after bounded wait");
        Ok(())
    }
}

/// Read up to `buf.len()` bytes of a device directory's config file.
/// Returns the number of bytes actually available.
fn read_config(device_dir: &Path, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut file = File::open(device_dir.join("config"))?;

    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(filled)
}

fn decode_device_id(config: &[u8]) -> PciDeviceId {
    PciDeviceId {
        vendor_id: read_u16(config, 0),
        device_id: read_u16(config, 2),
        device_class: read_u16(config, 10),
        subvendor_id: read_u16(config, 44),
        subdevice_id: read_u16(config, 46),
    }
}

fn read_u16(config: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([config[offset], config[offset + 1]])
}

fn read_u32(config: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        config[offset],
        config[offset + 1],
        config[offset + 2],
        config[offset + 3],
    ])
}

/// Walk the capability pointer chain looking for the PCI Express
/// capability. The chain lives above the standard header; a malformed
/// pointer terminates the walk.
fn find_pcie_capability(config: &[u8]) -> Option<usize> {
    let mut pos = (config[PCI_CAPABILITY_LIST] & !0x03) as usize;

    // 48 capabilities is more than config space can hold; guards loops.
    for _ in 0..48 {
        if pos < 0x40 || pos + 1 >= config.len() {
            return None;
        }

        if config[pos] == PCI_CAP_ID_EXP {
            return Some(pos);
        }

        pos = (config[pos + 1] & !0x03) as usize;
    }

    None
}
