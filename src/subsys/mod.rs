//! Per-subsystem drivers
//!
//! One module per kernel subsystem. Each driver owns its naming rule,
//! its major-number source (fixed, or discovered from the device-class
//! table) and its policy registry, and composes the loader and the
//! reconciler into the operations the CLI exposes: load, create a
//! device file, query a device file's state.

pub mod caps;
pub mod imex;
pub mod modeset;
pub mod msr;
pub mod nvidia;
pub mod nvlink;
pub mod nvswitch;
pub mod uvm;
pub mod vgpu_vfio;

use crate::pci::PciIdMatch;

/// NVIDIA's PCI vendor ID
pub const NVIDIA_VENDOR_ID: u16 = 0x10de;

/// Hardware gate shared by the NVIDIA module loads: any NVIDIA
/// display-class device.
pub fn nvidia_device_filter() -> PciIdMatch {
    PciIdMatch::display_class(NVIDIA_VENDOR_ID)
}
