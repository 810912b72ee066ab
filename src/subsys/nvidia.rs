//! The primary NVIDIA driver subsystem
//!
//! The main driver registers the fixed major 195. Minor 255 is the
//! control device `/dev/nvidiactl`; lower minors are the per-GPU
//! `/dev/nvidia<N>` nodes.

use std::path::{Path, PathBuf};

use crate::loader::ModuleLoader;
use crate::policy::DeviceFilePolicy;
use crate::reconcile::ReconcileContext;
use crate::state::{inspect, DeviceFileState};
use crate::subsys::nvidia_device_filter;

/// Kernel module name
pub const MODULE_NAME: &str = "nvidia";
/// Fixed major number registered by the driver
pub const MAJOR: u32 = 195;
/// Minor number of the control device
pub const CONTROL_MINOR: u32 = 255;
/// Driver parameter registry exported by the module
pub const PARAMS_PATH: &str = "/proc/driver/nvidia/params";

/// Device-file path for `minor`: `/dev/nvidiactl` for the control minor,
/// `/dev/nvidia<minor>` below it, nothing above it.
pub fn device_file_path(minor: u32) -> Option<PathBuf> {
    match minor {
        CONTROL_MINOR => Some(PathBuf::from("/dev/nvidiactl")),
        m if m < CONTROL_MINOR => Some(PathBuf::from(format!("/dev/nvidia{m}"))),
        _ => None,
    }
}

/// Make sure the nvidia module is loaded.
pub fn load(print_errors: bool) -> bool {
    ModuleLoader::system(Some(nvidia_device_filter())).load(print_errors, MODULE_NAME, false)
}

/// Reconcile the device file for `minor`.
pub fn create_device_file(minor: u32) -> bool {
    let Some(path) = device_file_path(minor) else {
        return false;
    };

    ReconcileContext::default().create_device_file(
        MAJOR,
        minor,
        &path,
        Some(Path::new(PARAMS_PATH)),
        false,
    )
}

/// Observed state of the device file for `minor`, for callers that only
/// check permissions and never create.
pub fn device_file_state(minor: u32) -> DeviceFileState {
    let Some(path) = device_file_path(minor) else {
        return DeviceFileState::empty();
    };

    let policy = DeviceFilePolicy::read(Some(Path::new(PARAMS_PATH)));
    inspect(&path, MAJOR, minor, &policy)
}
