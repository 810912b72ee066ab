//! The MSR subsystem
//!
//! Some driver components read model-specific registers through the
//! kernel's msr module. There is no PCI device to gate on and the
//! kernel creates the per-CPU nodes itself, so this driver is load-only.

use crate::loader::ModuleLoader;

/// Kernel module name
pub const MODULE_NAME: &str = "msr";

/// Make sure the msr module is loaded.
pub fn load(print_errors: bool) -> bool {
    ModuleLoader::system(None).load(print_errors, MODULE_NAME, false)
}
