//! The vGPU VFIO subsystem
//!
//! Mediated-device nodes for vGPU guests, minor per instance, under a
//! dynamically assigned major.

use std::path::{Path, PathBuf};

use crate::chardev::{get_chardev_major, PROC_DEVICES_PATH};
use crate::loader::ModuleLoader;
use crate::reconcile::ReconcileContext;
use crate::subsys::nvidia_device_filter;

/// Kernel module name (also its device-class table entry)
pub const MODULE_NAME: &str = "nvidia-vgpu-vfio";

/// Device-file path for the vGPU instance at `minor`.
pub fn device_file_path(minor: u32) -> PathBuf {
    PathBuf::from(format!("/dev/nvidia-vgpu{minor}"))
}

/// Make sure the nvidia-vgpu-vfio module is loaded.
pub fn load(print_errors: bool) -> bool {
    ModuleLoader::system(Some(nvidia_device_filter())).load(print_errors, MODULE_NAME, false)
}

/// Reconcile the device file for the vGPU instance at `minor`.
pub fn create_device_file(minor: u32) -> bool {
    let Some(major) = get_chardev_major(Path::new(PROC_DEVICES_PATH), MODULE_NAME) else {
        return false;
    };

    ReconcileContext::default().create_device_file(
        major,
        minor,
        &device_file_path(minor),
        None,
        false,
    )
}
