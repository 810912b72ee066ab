//! Observed device-file state
//!
//! A device file is classified against its target by three independent
//! facts, each derived from a single `stat`. The reconciler needs them
//! separately: a wrong device number forces remove-and-recreate, while a
//! wrong mode or owner is fixed in place.

use std::ops::BitOr;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use crate::policy::DeviceFilePolicy;

/// Permission classes compared against the policy mode (rwx for user,
/// group and other; setuid/setgid/sticky are outside the comparison).
pub const MODE_MASK: u32 = 0o777;

/// Additive facts about an on-disk device file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFileState {
    /// The path resolves to something
    pub exists: bool,
    /// It is a character special file with the expected device number
    pub correct_device: bool,
    /// Mode bits, owner and group all match the policy
    pub correct_access: bool,
}

impl DeviceFileState {
    /// The empty state: nothing observed at the path
    pub const fn empty() -> Self {
        Self {
            exists: false,
            correct_device: false,
            correct_access: false,
        }
    }

    /// All three facts hold; nothing for the reconciler to do
    pub fn is_satisfied(&self) -> bool {
        self.exists && self.correct_device && self.correct_access
    }
}

impl BitOr for DeviceFileState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            exists: self.exists || rhs.exists,
            correct_device: self.correct_device || rhs.correct_device,
            correct_access: self.correct_access || rhs.correct_access,
        }
    }
}

/// Encode a (major, minor) pair the way the kernel reports it in
/// `st_rdev`.
pub fn make_device_number(major: u32, minor: u32) -> u64 {
    // libc::makedev handles the split encoding of large minors.
    libc::makedev(major, minor)
}

/// Stat `path` and classify it against the expected device identity and
/// the policy's ownership and mode. A failed stat yields the empty state.
pub fn inspect(
    path: &Path,
    major: u32,
    minor: u32,
    policy: &DeviceFilePolicy,
) -> DeviceFileState {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return DeviceFileState::empty(),
    };

    DeviceFileState {
        exists: true,
        correct_device: meta.file_type().is_char_device()
            && meta.rdev() == make_device_number(major, minor),
        correct_access: (meta.mode() & MODE_MASK) == policy.mode
            && meta.uid() == policy.uid
            && meta.gid() == policy.gid,
    }
}
