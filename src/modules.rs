//! Live kernel-module table queries
//!
//! The kernel exposes loaded modules one per line in `/proc/modules`; the
//! first whitespace-delimited token of each line is the module name. The
//! module table is the only authoritative record of load state, so it is
//! re-read on every query and never cached.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Live module listing maintained by the kernel
pub const PROC_MODULES_PATH: &str = "/proc/modules";

/// Kernel module names are significant up to 15 characters
/// (`MODULE_NAME_LEN - 1`); longer tokens are truncated before comparison.
const MODULE_NAME_LEN: usize = 15;

/// Compare two module names the way the kernel's own tooling does:
/// `-` and `_` are interchangeable, everything else is literal, and
/// names of different length never match.
pub fn module_names_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).all(|(x, y)| {
        x == y || (matches!(x, b'-' | b'_') && matches!(y, b'-' | b'_'))
    })
}

/// Check whether `module` appears in the live module listing at
/// `modules_path`.
///
/// An unreadable listing is reported as "not loaded": the caller then
/// attempts a load, which is harmless and cannot hide a genuinely loaded
/// module.
pub fn is_module_loaded(modules_path: &Path, module: &str) -> bool {
    let file = match File::open(modules_path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    let wanted = truncate_name(module);

    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => return false,
        };

        if let Some(name) = line.split_whitespace().next() {
            if module_names_match(truncate_name(name), wanted) {
                return true;
            }
        }
    }

    false
}

fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MODULE_NAME_LEN) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}
