//! Hot-plug re-scan nudges.
//!
//! Writing `change` into a device's `uevent` file makes the kernel re-emit
//! the hot-plug event, which some emulators need to notice controllers that
//! were grabbed by another process a moment earlier.

use std::fs;
use std::path::Path;

use tracing::{debug, trace};

/// Standard location of the device class tree.
pub const DEFAULT_SYSFS_CLASS_ROOT: &str = "/sys/class";

/// Writes `change` to every `uevent` file under `<class_root>/<subsystem>/*`.
///
/// Best effort: unreadable directories and failed writes are skipped.
/// Returns the number of devices that were nudged.
pub fn nudge_device_rescan(class_root: &Path, subsystem: &str) -> usize {
    let dir = class_root.join(subsystem);
    let Ok(entries) = fs::read_dir(&dir) else {
        debug!(path = %dir.display(), "No device class directory to nudge");
        return 0;
    };

    let mut nudged = 0;
    for entry in entries.flatten() {
        let uevent = entry.path().join("uevent");
        if !uevent.exists() {
            continue;
        }
        match fs::write(&uevent, b"change") {
            Ok(()) => nudged += 1,
            Err(err) => trace!(path = %uevent.display(), error = %err, "uevent write refused"),
        }
    }

    debug!(subsystem, nudged, "Device re-scan nudge sent");
    nudged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nudge_writes_change_to_each_uevent() {
        let root = tempfile::tempdir().unwrap();
        for name in ["event0", "event1"] {
            let dev = root.path().join("input").join(name);
            fs::create_dir_all(&dev).unwrap();
            fs::write(dev.join("uevent"), b"").unwrap();
        }
        // Entrée sans fichier uevent : ignorée
        fs::create_dir_all(root.path().join("input").join("mice")).unwrap();

        assert_eq!(nudge_device_rescan(root.path(), "input"), 2);
        let content = fs::read_to_string(root.path().join("input/event0/uevent")).unwrap();
        assert_eq!(content, "change");
    }

    #[test]
    fn test_nudge_missing_subsystem() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(nudge_device_rescan(root.path(), "input"), 0);
    }
}
