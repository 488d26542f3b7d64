//! Duration formatting utilities.
//!
//! This module turns simulated-clock durations into the short human strings
//! shown next to a service (uptime, age).

use std::time::Duration;

/// Format an uptime the way the service panel shows it
///
/// - under a minute: "42 seconds"
/// - under an hour: "5 minutes"
/// - otherwise: "2h 15m"
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use sbasim::utils::duration::format_uptime;
///
/// assert_eq!(format_uptime(Duration::from_secs(5)), "5 seconds");
/// assert_eq!(format_uptime(Duration::from_secs(125)), "2 minutes");
/// assert_eq!(format_uptime(Duration::from_secs(8100)), "2h 15m");
/// ```
pub fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs();

    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", seconds / 60)
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        format!("{}h {}m", hours, minutes)
    }
}
