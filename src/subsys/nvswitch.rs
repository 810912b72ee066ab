//! The NVSwitch subsystem
//!
//! One node per switch instance, minor chosen by the caller, under a
//! dynamically assigned major.

use std::path::{Path, PathBuf};

use crate::chardev::{get_chardev_major, PROC_DEVICES_PATH};
use crate::policy::DeviceFilePolicy;
use crate::reconcile::ReconcileContext;
use crate::state::{inspect, DeviceFileState};

/// Device-class table entry name
pub const CHARDEV_NAME: &str = "nvidia-nvswitch";

/// Device-file path for the switch instance at `minor`.
pub fn device_file_path(minor: u32) -> PathBuf {
    PathBuf::from(format!("/dev/nvidia-nvswitch{minor}"))
}

/// Reconcile the device file for the switch instance at `minor`.
pub fn create_device_file(minor: u32) -> bool {
    let Some(major) = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME) else {
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

/// Observed state of the switch node at `minor`, or `None` when the
/// driver has not registered its major.
pub fn device_file_state(minor: u32) -> Option<DeviceFileState> {
    let major = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME)?;
    Some(inspect(
        &device_file_path(minor),
        major,
        minor,
        &DeviceFilePolicy::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_embeds_the_minor() {
        assert_eq!(
            device_file_path(3),
            PathBuf::from("/dev/nvidia-nvswitch3")
        );
    }
}
