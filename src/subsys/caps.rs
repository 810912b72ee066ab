//! The capability-device subsystem
//!
//! Capability device files (MIG config/monitor, fabric-manager access
//! and friends) are announced by the kernel through per-capability proc
//! files which carry the assigned minor number alongside the usual
//! policy keys. The nodes live together under `/dev/nvidia-caps`, and
//! each gets a `/dev/char/<major>:<minor>` alias so generic tooling can
//! find it by device number.

use std::path::{Path, PathBuf};

use crate::chardev::{get_chardev_major, PROC_DEVICES_PATH};
use crate::policy::{read_device_file_minor, DeviceFilePolicy};
use crate::reconcile::{ensure_device_directory, ReconcileContext};
use crate::state::{inspect, DeviceFileState};

/// Device-class table entry name
pub const CHARDEV_NAME: &str = "nvidia-caps";
/// Shared container directory for capability nodes
pub const DEVICE_DIR: &str = "/dev/nvidia-caps";
/// Container directory permission bits
pub const DEVICE_DIR_MODE: u32 = 0o755;

/// Device-file path for the capability at `minor`.
pub fn device_file_path(minor: u32) -> PathBuf {
    PathBuf::from(format!("{DEVICE_DIR}/nvidia-cap{minor}"))
}

/// Reconcile the device file described by the capability proc file at
/// `cap_registry` (e.g. `/proc/driver/nvidia/capabilities/mig/config`).
///
/// The minor number, mode and modify policy all come from that file.
/// Returns the minor on success so the caller can open the node.
pub fn create_device_file(cap_registry: &Path) -> Option<u32> {
    let minor = read_device_file_minor(cap_registry)?;
    let major = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME)?;

    if !ensure_device_directory(Path::new(DEVICE_DIR), DEVICE_DIR_MODE) {
        return None;
    }

    let created = ReconcileContext::default().create_device_file(
        major,
        minor,
        &device_file_path(minor),
        Some(cap_registry),
        true,
    );

    created.then_some(minor)
}

/// Observed state of the capability node described by `cap_registry`,
/// together with its minor. `None` when the capability or the major is
/// not registered.
pub fn device_file_state(cap_registry: &Path) -> Option<(DeviceFileState, u32)> {
    let minor = read_device_file_minor(cap_registry)?;
    let major = get_chardev_major(Path::new(PROC_DEVICES_PATH), CHARDEV_NAME)?;

    let policy = DeviceFilePolicy::read(Some(cap_registry));
    Some((
        inspect(&device_file_path(minor), major, minor, &policy),
        minor,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_lives_in_the_shared_directory() {
        assert_eq!(
            device_file_path(42),
            PathBuf::from("/dev/nvidia-caps/nvidia-cap42")
        );
    }

    #[test]
    fn unannounced_capability_yields_nothing() {
        // No proc file, no minor, no node.
        assert_eq!(
            create_device_file(Path::new("/nonexistent/capabilities/mig/config")),
            None
        );
    }
}
