//! Major-number lookup in the kernel's device-class table
//!
//! `/proc/devices` lists registered drivers in two sections ("Character
//! devices:" and "Block devices:"), each entry a major number followed by
//! the driver name. Dynamically assigned majors (NVIDIA's UVM, NVLink,
//! NVSwitch, vGPU and capability drivers) have to be looked up here before
//! their device files can be created.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Device-class table maintained by the kernel
pub const PROC_DEVICES_PATH: &str = "/proc/devices";

/// Header line introducing the character-device section
const CHAR_DEVICES_HEADER: &str = "Character devices:";

/// Look up the major number registered for `name` in the character-device
/// section of the table at `devices_path`.
///
/// Only entries between the "Character devices:" header and the blank line
/// terminating the section are considered; an identically named entry in
/// another section (e.g. a block device) is never matched. Returns `None`
/// when the table, the section, or the entry is absent.
pub fn get_chardev_major(devices_path: &Path, name: &str) -> Option<u32> {
    let file = File::open(devices_path).ok()?;

    let mut in_char_section = false;

    for line in BufReader::new(file).lines() {
        let line = line.ok()?;

        if !in_char_section {
            in_char_section = line.trim_end() == CHAR_DEVICES_HEADER;
            continue;
        }

        // A blank line closes the section.
        if line.trim().is_empty() {
            return None;
        }

        if let Some((major, entry_name)) = parse_entry(&line) {
            if entry_name == name {
                return Some(major);
            }
        }
    }

    None
}

/// Split a table line into its major number and name.
fn parse_entry(line: &str) -> Option<(u32, &str)> {
    let trimmed = line.trim_start();
    let (digits, rest) = trimmed.split_once(' ')?;
    let major = digits.parse::<u32>().ok()?;
    Some((major, rest.trim_end_matches('\n')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const SAMPLE: &str = "Character devices:\n\
        \x20 1 mem\n\
        \x20 4 /dev/vc/0\n\
        195 nvidia\n\
        250 nvidia-uvm\n\
        508 nvidia-caps-imex-channels\n\
        \n\
        Block devices:\n\
        \x20 8 sd\n\
        259 blkext\n";

    #[test]
    fn finds_entry_in_character_section() {
        let file = table(SAMPLE);
        assert_eq!(get_chardev_major(file.path(), "nvidia-uvm"), Some(250));
        assert_eq!(get_chardev_major(file.path(), "nvidia"), Some(195));
        assert_eq!(
            get_chardev_major(file.path(), "nvidia-caps-imex-channels"),
            Some(508)
        );
    }

    #[test]
    fn absent_entry_is_none() {
        let file = table(SAMPLE);
        assert_eq!(get_chardev_major(file.path(), "nvidia-nvswitch"), None);
    }

    #[test]
    fn block_section_is_never_searched() {
        let file = table(SAMPLE);
        assert_eq!(get_chardev_major(file.path(), "sd"), None);

        // Same name only present outside the character section.
        let file = table("Block devices:\n250 nvidia-uvm\n");
        assert_eq!(get_chardev_major(file.path(), "nvidia-uvm"), None);
    }

    #[test]
    fn entry_after_section_end_is_ignored() {
        let file = table("Character devices:\n  1 mem\n\n250 nvidia-uvm\n");
        assert_eq!(get_chardev_major(file.path(), "nvidia-uvm"), None);
    }

    #[test]
    fn name_must_match_exactly() {
        let file = table(SAMPLE);
        assert_eq!(get_chardev_major(file.path(), "nvidia-uv"), None);
        assert_eq!(get_chardev_major(file.path(), "nvidia-uvm-extra"), None);
    }

    #[test]
    fn missing_table_is_none() {
        assert_eq!(
            get_chardev_major(Path::new("/nonexistent/devices"), "nvidia"),
            None
        );
    }
}
