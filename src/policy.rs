//! Run-time device-file policy
//!
//! The kernel module exports the requested ownership, mode and
//! modification policy for its device files through a registry file
//! (`/proc/driver/nvidia/params` for the primary driver, a per-capability
//! proc file for capability devices). The policy is re-read on every
//! reconciliation because module parameters can change between
//! invocations; a missing or garbled registry silently yields defaults.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Default device-file mode: world read/write
pub const DEVICE_FILE_MODE: u32 = 0o666;
/// Default device-file owner
pub const DEVICE_FILE_UID: u32 = 0;
/// Default device-file group
pub const DEVICE_FILE_GID: u32 = 0;

/// Target identity and mutability for a subsystem's device files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilePolicy {
    /// Requested owner
    pub uid: u32,
    /// Requested group
    pub gid: u32,
    /// Requested permission bits (rwx classes only)
    pub mode: u32,
    /// Whether this helper may create or modify device files at all
    pub modify: bool,
}

impl Default for DeviceFilePolicy {
    fn default() -> Self {
        Self {
            uid: DEVICE_FILE_UID,
            gid: DEVICE_FILE_GID,
            mode: DEVICE_FILE_MODE,
            modify: true,
        }
    }
}

impl DeviceFilePolicy {
    /// Read the policy from the registry file at `registry_path`,
    /// starting from defaults. `None`, an unopenable file, and
    /// unrecognized or unparsable lines all leave the defaults in place.
    pub fn read(registry_path: Option<&Path>) -> Self {
        let mut policy = Self::default();

        let Some(path) = registry_path else {
            return policy;
        };

        for (key, value) in registry_entries(path) {
            match key.as_str() {
                "DeviceFileUID" => policy.uid = value,
                "DeviceFileGID" => policy.gid = value,
                "DeviceFileMode" => policy.mode = value,
                // "DeviceFileModify" is the spelling used by the
                // per-capability proc files.
                "ModifyDeviceFiles" | "DeviceFileModify" => {
                    policy.modify = value == 1;
                }
                _ => {}
            }
        }

        policy
    }
}

/// Read the `DeviceFileMinor` entry of a capability registry file.
///
/// Capability device files do not have caller-chosen minor numbers; the
/// kernel assigns one and publishes it in the capability's own proc file.
pub fn read_device_file_minor(registry_path: &Path) -> Option<u32> {
    registry_entries(registry_path)
        .into_iter()
        .find(|(key, _)| key == "DeviceFileMinor")
        .map(|(_, value)| value)
}

/// Collect the `"Key: <integer>"` entries of a registry file, skipping
/// anything that does not parse.
fn registry_entries(path: &Path) -> Vec<(String, u32)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Vec::new(),
    };

    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let value = value.trim().parse::<u32>().ok()?;
            Some((key.trim().to_owned(), value))
        })
        .collect()
}
