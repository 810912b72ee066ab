//! Device-file reconciliation
//!
//! Brings a device special file into agreement with the policy-derived
//! target state: create it if missing, remove and recreate it if its
//! type or device number is wrong, and fix permissions in place
//! otherwise. Identity is never patched in place; a node that exists
//! with the wrong major/minor is always removed first.
//!
//! Every step is an individually idempotent syscall, so two racing
//! invocations converge on the same final state.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::debug;

use crate::policy::DeviceFilePolicy;
use crate::state::{inspect, make_device_number};

/// Root under which device files live
pub const DEV_ROOT: &str = "/dev";
/// Canonical by-device-number alias directory
pub const DEV_CHAR_DIR: &str = "/dev/char";

/// Filesystem roots used by reconciliation.
///
/// Production code uses [`ReconcileContext::default`]; tests point both
/// roots into a temporary tree.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    /// Device root the alias targets must live under (`/dev`)
    pub dev_root: PathBuf,
    /// Alias directory (`/dev/char`)
    pub alias_dir: PathBuf,
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self {
            dev_root: PathBuf::from(DEV_ROOT),
            alias_dir: PathBuf::from(DEV_CHAR_DIR),
        }
    }
}

impl ReconcileContext {
    /// Reconcile the character special file at `path` with the target
    /// identity `(major, minor)` and the policy read from
    /// `registry_path`. When `alias` is set, the `/dev/char` alias link
    /// is maintained as well and its failure fails the reconciliation.
    pub fn create_device_file(
        &self,
        major: u32,
        minor: u32,
        path: &Path,
        registry_path: Option<&Path>,
        alias: bool,
    ) -> bool {
        if path.as_os_str().is_empty() {
            return false;
        }

        let policy = DeviceFilePolicy::read(registry_path);

        // Policy can forbid touching device files entirely; the node is
        // then whatever the administrator made it, but the alias is
        // still kept current where one is maintained.
        if !policy.modify {
            debug!("device file modification disallowed for {}", path.display());
            return !alias || self.create_dev_char_alias(major, minor, path);
        }

        let state = inspect(path, major, minor, &policy);

        if !state.is_satisfied() {
            // Wrong type or wrong device number cannot be fixed in
            // place; permission-only mismatches never force recreation.
            let recreate = !state.exists || !state.correct_device;

            if state.exists && !state.correct_device {
                debug!("removing conflicting node at {}", path.display());
                if fs::remove_file(path).is_err() {
                    return false;
                }
            }

            if recreate {
                let dev = make_device_number(major, minor);
                if mknod_chr(path, policy.mode, dev).is_err() {
                    return false;
                }
            }

            let fixed = fs::set_permissions(path, fs::Permissions::from_mode(policy.mode))
                .and_then(|_| chown(path, policy.uid, policy.gid))
                .is_ok();

            if !fixed {
                // Never leave a node we just created with wrong
                // ownership behind.
                if recreate {
                    let _ = fs::remove_file(path);
                }
                return false;
            }
        }

        !alias || self.create_dev_char_alias(major, minor, path)
    }

    /// Maintain the `/dev/char/<major>:<minor>` alias pointing at
    /// `target` via a relative symbolic link.
    ///
    /// The target must be an existing character device under the device
    /// root. A pre-existing alias is replaced; if the replacement link
    /// cannot be created but an alias already resolves to the same
    /// inode (e.g. a racing invocation won), that counts as success.
    pub fn create_dev_char_alias(&self, major: u32, minor: u32, target: &Path) -> bool {
        let target_meta = match fs::metadata(target) {
            Ok(meta) => meta,
            Err(_) => return false,
        };
        if !target_meta.file_type().is_char_device() {
            return false;
        }

        let Ok(relative) = target.strip_prefix(&self.dev_root) else {
            return false;
        };
        let link_value = Path::new("..").join(relative);
        let alias_path = self.alias_dir.join(format!("{major}:{minor}"));

        // Stale alias contents don't matter; it is about to be rewritten.
        let _ = fs::remove_file(&alias_path);

        if std::os::unix::fs::symlink(&link_value, &alias_path).is_ok() {
            return true;
        }

        match fs::metadata(&alias_path) {
            Ok(alias_meta) => {
                alias_meta.ino() == target_meta.ino() && alias_meta.dev() == target_meta.dev()
            }
            Err(_) => false,
        }
    }
}

/// Make sure a container directory for device files exists with the
/// given permission bits (capability and IMEX channel nodes live in
/// shared subdirectories of `/dev`).
pub fn ensure_device_directory(path: &Path, mode: u32) -> bool {
    match fs::create_dir(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(_) => return false,
    }

    // chmod explicitly; mkdir is subject to the umask.
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).is_ok()
}

fn mknod_chr(path: &Path, mode: u32, dev: libc::dev_t) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let rc = unsafe {
        libc::mknod(c_path.as_ptr(), libc::S_IFCHR | mode as libc::mode_t, dev)
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn chown(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
