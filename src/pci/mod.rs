//! PCI enumeration interface
//!
//! The loader only needs one question answered before it spawns modprobe:
//! "does any device matching this vendor/class filter exist?". The query
//! lives behind a trait so the decision logic tests against a mock; the
//! production implementation walks the sysfs PCI tree.
//!
//! The sysfs backend additionally exposes the link-management plumbing
//! (parent-bridge lookup, PCIe link toggle, bus rescan) used by driver
//! components that recover GPUs behind a downstream port.

mod sysfs;

pub use sysfs::{PciAddress, SysfsPciEnumerator};

use crate::error::SetupResult;

/// Filter describing the PCI devices a caller cares about.
///
/// `None` in an ID field means "don't care". The class comparison is
/// masked, so a filter can select a whole base class (e.g. all display
/// controllers) or one exact class code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PciIdMatch {
    /// Vendor ID, or any vendor
    pub vendor_id: Option<u16>,
    /// Device ID, or any device
    pub device_id: Option<u16>,
    /// Subsystem vendor ID, or any
    pub subvendor_id: Option<u16>,
    /// Subsystem device ID, or any
    pub subdevice_id: Option<u16>,
    /// Class code to compare under `device_class_mask`
    pub device_class: u16,
    /// Mask applied to the device's class code before comparison
    pub device_class_mask: u16,
}

/// Mask selecting only the base class byte of a class code
pub const PCI_BASE_CLASS_MASK: u16 = 0xff00;
/// Base class code for display controllers
pub const PCI_BASE_CLASS_DISPLAY: u16 = 0x0300;

impl PciIdMatch {
    /// Filter for every display-class device of one vendor.
    pub fn display_class(vendor_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            device_class: PCI_BASE_CLASS_DISPLAY,
            device_class_mask: PCI_BASE_CLASS_MASK,
            ..Self::default()
        }
    }

    /// Apply the filter to one device's identity.
    pub fn matches(&self, id: &PciDeviceId) -> bool {
        fn id_compare(wanted: Option<u16>, actual: u16) -> bool {
            wanted.map_or(true, |w| w == actual)
        }

        id_compare(self.vendor_id, id.vendor_id)
            && id_compare(self.device_id, id.device_id)
            && id_compare(self.subvendor_id, id.subvendor_id)
            && id_compare(self.subdevice_id, id.subdevice_id)
            && (id.device_class & self.device_class_mask) == self.device_class
    }
}

/// Identity fields extracted from a device's config space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceId {
    /// Vendor ID (config offset 0)
    pub vendor_id: u16,
    /// Device ID (config offset 2)
    pub device_id: u16,
    /// Class code (config offsets 10..12: subclass, base class)
    pub device_class: u16,
    /// Subsystem vendor ID (config offset 44)
    pub subvendor_id: u16,
    /// Subsystem device ID (config offset 46)
    pub subdevice_id: u16,
}

/// Count-matching-devices query used by the hardware-presence gate.
///
/// An `Err` means the enumeration itself failed (sysfs unavailable,
/// config space unreadable); the gate treats that as "cannot veto" and
/// lets the load attempt proceed.
#[cfg_attr(test, mockall::automock)]
pub trait PciEnumerator {
    /// Count the devices matching `filter`.
    fn count_matches(&self, filter: &PciIdMatch) -> SetupResult<usize>;
}
