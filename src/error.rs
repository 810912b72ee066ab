//! Error types for the nvprobe library
//!
//! The device-setup entry points deliberately report plain booleans (a
//! setuid helper's callers only branch on success), so these errors stay
//! internal to the fallible plumbing: the PCI sysfs backend and the
//! subprocess runner.

use std::io;
use thiserror::Error;

/// Error type for nvprobe's fallible internals
#[derive(Error, Debug)]
pub enum SetupError {
    /// The PCI device directory could not be walked
    #[error("PCI sysfs enumeration failed: {0}")]
    PciEnumeration(io::Error),

    /// Reading a device's config space failed mid-scan
    #[error("failed to read PCI config space of {device}: {source}")]
    PciConfigRead {
        /// Device address in DDDD:BB:DD.F form
        device: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Writing a device's config space failed
    #[error("failed to write PCI config space of {device}: {source}")]
    PciConfigWrite {
        /// Device address in DDDD:BB:DD.F form
        device: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A PCI device address string did not parse as DDDD:BB:DD.F
    #[error("malformed PCI device address: {0}")]
    BadPciAddress(String),

    /// The device sits directly under the root with no upstream bridge
    #[error("{0} has no parent PCI bridge")]
    NoParentBridge(String),

    /// The capability list walk found no PCI Express capability
    #[error("{0} has no PCI Express capability")]
    NoPciExpressCapability(String),

    /// Spawning the module loader failed (fork or exec)
    #[error("failed to execute `{program}`: {source}")]
    Spawn {
        /// The program we attempted to execute
        program: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Any other I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for nvprobe's fallible internals
pub type SetupResult<T> = std::result::Result<T, SetupError>;
