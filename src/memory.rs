//! Memory auto-onlining control
//!
//! Platforms that hot-add GPU memory to the kernel (Grace Hopper class
//! systems) need new memory blocks onlined as movable so the driver can
//! later offline them. The kernel setting is a one-word sysfs write.

use std::fs;
use std::path::Path;

use log::debug;

/// Kernel control file for memory-block auto-onlining
pub const AUTO_ONLINE_BLOCKS_PATH: &str = "/sys/devices/system/memory/auto_online_blocks";

/// Online-policy value written for hot-added GPU memory
const ONLINE_MOVABLE: &str = "online_movable";

/// Switch memory-block auto-onlining to `online_movable`.
pub fn enable_auto_online_movable() -> bool {
    write_online_policy(Path::new(AUTO_ONLINE_BLOCKS_PATH))
}

fn write_online_policy(control_path: &Path) -> bool {
    match fs::write(control_path, ONLINE_MOVABLE) {
        Ok(()) => true,
        Err(err) => {
            debug!(
                "failed to set auto-online policy at {}: {err}",
                control_path.display()
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_the_policy_word() {
        let dir = tempdir().unwrap();
        let control = dir.path().join("auto_online_blocks");
        std::fs::write(&control, b"offline\n").unwrap();

        assert!(write_online_policy(&control));
        assert_eq!(std::fs::read(&control).unwrap(), b"online_movable");
    }

    #[test]
    fn missing_control_file_reports_failure() {
        let dir = tempdir().unwrap();
        assert!(!write_online_policy(&dir.path().join("missing/blocks")));
    }
}
