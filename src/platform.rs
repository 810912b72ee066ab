//! Platform identity probe
//!
//! Embedded Tegra systems carry their GPU on the SoC rather than on the
//! PCI bus, so the PCI hardware gate must not veto module loads there.
//! The SoC family is published as a short string in sysfs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// SoC family identity file
pub const SOC_FAMILY_PATH: &str = "/sys/devices/soc0/family";

/// Family tag reported by Tegra platforms
const TEGRA_FAMILY: &str = "Tegra";

/// The family string is short; anything longer than this cannot match.
const FAMILY_READ_LEN: usize = 32;

/// Report whether `family_path` identifies a recognized embedded SoC
/// family. A missing or unreadable identity file means "not embedded".
pub fn is_embedded_soc(family_path: &Path) -> bool {
    let mut file = match File::open(family_path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    let mut buf = [0u8; FAMILY_READ_LEN];
    let n = match file.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return false,
    };

    match std::str::from_utf8(&buf[..n]) {
        Ok(family) => family.trim_end_matches(&['\n', '\0'][..]) == TEGRA_FAMILY,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn tegra_family_is_embedded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("family");
        fs::write(&path, b"Tegra\n").unwrap();
        assert!(is_embedded_soc(&path));
    }

    #[test]
    fn other_family_is_not_embedded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("family");
        fs::write(&path, b"jep106:036b\n").unwrap();
        assert!(!is_embedded_soc(&path));

        // Prefix alone is not a match.
        fs::write(&path, b"TegraFoo\n").unwrap();
        assert!(!is_embedded_soc(&path));
    }

    #[test]
    fn missing_identity_file_is_not_embedded() {
        assert!(!is_embedded_soc(Path::new("/nonexistent/soc0/family")));
    }
}
