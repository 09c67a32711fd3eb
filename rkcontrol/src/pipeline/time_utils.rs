//! Time formatting for the on-screen position.

/// Formats seconds as HH:MM:SS.
///
/// # Examples
/// ```
/// # use rkcontrol::pipeline::time_utils::format_hhmmss;
/// assert_eq!(format_hhmmss(0), "00:00:00");
/// assert_eq!(format_hhmmss(61), "00:01:01");
/// assert_eq!(format_hhmmss(3661), "01:01:01");
/// ```
pub fn format_hhmmss(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Formats floating seconds, as reported by the player. Negative and
/// non-finite values show as zero.
pub fn format_hhmmss_f64(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return format_hhmmss(0);
    }
    format_hhmmss(seconds.floor() as u64)
}

/// "position / duration", or just the position for live streams.
pub fn format_progress(position: f64, duration: f64) -> String {
    if duration > 0.0 {
        format!("{} / {}", format_hhmmss_f64(position), format_hhmmss_f64(duration))
    } else {
        format_hhmmss_f64(position)
    }
}
