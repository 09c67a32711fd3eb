//! Small operating-system helpers shared by the RetroKiosk crates.
//!
//! - [`get_os_string`] : platform description logged at startup
//! - [`process`] : lookup and forced termination of stray external processes
//! - [`wake`] : best-effort hot-plug re-scan nudges for input devices
mod process;
mod wake;

pub use process::{ProcessInfo, find_processes_by_name, terminate_processes_by_name};
pub use wake::{DEFAULT_SYSFS_CLASS_ROOT, nudge_device_rescan};

/// Returns a string describing the operating system and its version.
///
/// Uses the `os_info` crate to get a portable description of the running
/// system.
///
/// # Format
/// - Linux: "Linux/6.5.0" or "Raspbian/12"
/// - Other: "{OS}/Unknown"
///
/// # Examples
///
/// ```
/// use rkutils::get_os_string;
///
/// let os = get_os_string();
/// println!("OS: {}", os); // Ex: "Debian/12"
/// ```
pub fn get_os_string() -> String {
    let info = os_info::get();
    let os_type = format!("{:?}", info.os_type());

    let version = info.version();
    if version != &os_info::Version::Unknown {
        format!("{}/{}", os_type, version)
    } else {
        format!("{}/Unknown", os_type)
    }
}
