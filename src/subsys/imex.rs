//! The IMEX channel subsystem
//!
//! IMEX channels carry memory import/export rights between nodes. Their
//! device files live under a shared container directory, one `channel<N>`
//! node per minor, governed by the primary driver's parameter registry.

use std::path::{Path, PathBuf};

use crate::chardev::{get_chardev_major, PROC_DEVICES_PATH};
use crate::policy::DeviceFilePolicy;
use crate::reconcile::{ensure_device_directory, ReconcileContext};
use crate::state::{inspect, DeviceFileState};
use crate::subsys::nvidia;

/// Device-class table entry name
pub const CHARDEV_NAME: &str = "nvidia-caps-imex-channels";
/// Shared container directory for channel nodes
pub const DEVICE_DIR: &str = "/dev/nvidia-caps-imex-channels";
/// Container directory permission bits
pub const DEVICE_DIR_MODE: u32 = 0o755;

/// Device-file path for the channel at `minor`.
pub fn device_file_path(minor: u32) -> PathBuf {
    PathBuf::from(format!("{DEVICE_DIR}/channel{minor}"))
}

/// Reconcile the channel device file at `minor`.
pub fn create_channel_device_file(minor: u32) -> bool {
    let Some(major) = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME) else {
        return false;
    };

    if !ensure_device_directory(Path::new(DEVICE_DIR), DEVICE_DIR_MODE) {
        return false;
    }

    ReconcileContext::default().create_device_file(
        major,
        minor,
        &device_file_path(minor),
        Some(Path::new(nvidia::PARAMS_PATH)),
        false,
    )
}

/// Observed state of the channel node at `minor`, or `None` when the
/// driver has not registered the channel major.
pub fn channel_device_file_state(minor: u32) -> Option<DeviceFileState> {
    let major = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME)?;

    let policy = DeviceFilePolicy::read(Some(Path::new(nvidia::PARAMS_PATH)));
    Some(inspect(&device_file_path(minor), major, minor, &policy))
}
