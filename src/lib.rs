//! # nvprobe - NVIDIA module loading and device-file setup
//!
//! A distribution-independent library for making sure the NVIDIA kernel
//! modules are loaded and their `/dev` nodes exist with the right
//! identity and permissions, on behalf of driver components that run
//! without sufficient privileges (e.g. the CUDA driver inside a normal
//! user's process). The companion `nvprobe` binary is installed
//! setuid-root and exposes these operations on the command line.
//!
//! Distributions normally own module loading and device-file creation
//! through their service manager; this crate covers the systems where
//! they don't, using only generic kernel facilities: `/proc/modules`,
//! `/proc/sys/kernel/modprobe`, `/proc/devices`, sysfs PCI enumeration
//! and plain `mknod`/`chmod`/`chown`.
//!
//! ## Safety posture
//!
//! Everything here expects to run with elevated privileges, so nothing
//! world-writable is trusted: the module loader path comes from a
//! kernel-owned file and is verified before exec, the child process
//! gets a minimal explicit environment, and a subprocess's exit status
//! is never believed over the kernel's own module table.
//!
//! ## Quick start
//!
//! ```no_run
//! use nvprobe::subsys::nvidia;
//!
//! if nvidia::load(true) && nvidia::create_device_file(0) {
//!     println!("GPU 0 ready at /dev/nvidia0");
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod chardev;
pub mod error;
pub mod loader;
pub mod memory;
pub mod modules;
pub mod pci;
pub mod platform;
pub mod policy;
pub mod reconcile;
pub mod state;
pub mod subsys;

// Re-export the pieces callers compose most often.
pub use chardev::get_chardev_major;
pub use error::{SetupError, SetupResult};
pub use loader::{LoaderPaths, ModuleLoader, ProcessRunner, SystemProcessRunner};
pub use modules::is_module_loaded;
pub use pci::{PciAddress, PciEnumerator, PciIdMatch, SysfsPciEnumerator};
pub use policy::DeviceFilePolicy;
pub use reconcile::ReconcileContext;
pub use state::DeviceFileState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
