//! The Unified Memory subsystem
//!
//! nvidia-uvm gets its major number assigned dynamically, so it is
//! discovered from the device-class table. The subsystem owns a pair of
//! nodes: the main device and the tools device at the next minor.

use std::path::Path;

use crate::chardev::{get_chardev_major, PROC_DEVICES_PATH};
use crate::loader::ModuleLoader;
use crate::reconcile::ReconcileContext;
use crate::subsys::nvidia_device_filter;

/// Kernel module name (also its device-class table entry)
pub const MODULE_NAME: &str = "nvidia-uvm";
/// Main device node
pub const DEVICE_PATH: &str = "/dev/nvidia-uvm";
/// Tools device node, one minor above the main device
pub const TOOLS_DEVICE_PATH: &str = "/dev/nvidia-uvm-tools";

/// Dynamically assigned major number, if the module is registered.
pub fn chardev_major() -> Option<u32> {
    get_chardev_major(Path::new(PROC_DEVICES_PATH), MODULE_NAME)
}

/// Make sure the nvidia-uvm module is loaded.
pub fn load(print_errors: bool) -> bool {
    ModuleLoader::system(Some(nvidia_device_filter())).load(print_errors, MODULE_NAME, false)
}

/// Reconcile both UVM device files, the main node at `base_minor` and
/// the tools node at `base_minor + 1`. UVM has no parameter registry;
/// built-in policy defaults apply.
pub fn create_device_files(base_minor: u32) -> bool {
    let Some(major) = chardev_major() else {
        return false;
    };

    let ctx = ReconcileContext::default();
    ctx.create_device_file(major, base_minor, Path::new(DEVICE_PATH), None, false)
        && ctx.create_device_file(
            major,
            base_minor + 1,
            Path::new(TOOLS_DEVICE_PATH),
            None,
            false,
        )
}
