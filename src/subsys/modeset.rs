//! The mode-setting subsystem
//!
//! nvidia-modeset shares the primary driver's major and sits at a fixed
//! minor. Embedded Tegra platforms carry no PCI GPU, so this is the one
//! load that may bypass the hardware gate there.

use std::path::Path;

use crate::loader::ModuleLoader;
use crate::reconcile::ReconcileContext;
use crate::subsys::{nvidia, nvidia_device_filter};

/// Kernel module name
pub const MODULE_NAME: &str = "nvidia-modeset";
/// Fixed minor number of the mode-setting device
pub const MINOR: u32 = 254;
/// Device node
pub const DEVICE_PATH: &str = "/dev/nvidia-modeset";

/// Make sure the nvidia-modeset module is loaded. The hardware gate may
/// be bypassed on recognized embedded platforms.
pub fn load(print_errors: bool) -> bool {
    ModuleLoader::system(Some(nvidia_device_filter())).load(print_errors, MODULE_NAME, true)
}

/// Reconcile the mode-setting device file. It shares the primary
/// driver's major and parameter registry.
pub fn create_device_file() -> bool {
    ReconcileContext::default().create_device_file(
        nvidia::MAJOR,
        MINOR,
        Path::new(DEVICE_PATH),
        Some(Path::new(nvidia::PARAMS_PATH)),
        false,
    )
}
