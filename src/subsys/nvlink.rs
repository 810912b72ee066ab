//! The NVLink control subsystem
//!
//! A single control node at minor 0, under a dynamically assigned major.

use std::path::Path;

use crate::chardev::{get_chardev_major, PROC_DEVICES_PATH};
use crate::reconcile::ReconcileContext;

/// Device-class table entry name
pub const CHARDEV_NAME: &str = "nvidia-nvlink";
/// Control device node
pub const DEVICE_PATH: &str = "/dev/nvidia-nvlink";
/// The control device's minor number
pub const MINOR: u32 = 0;

/// Reconcile the NVLink control device file. Built-in policy defaults
/// apply; there is no NVLink-specific registry.
pub fn create_device_file() -> bool {
    let Some(major) = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME) else {
        return false;
    };

    ReconcileContext::default().create_device_file(
        major,
        MINOR,
        Path::new(DEVICE_PATH),
        None,
        false,
    )
}
