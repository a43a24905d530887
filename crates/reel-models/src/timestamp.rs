//! Clock-style timestamp helpers.

/// Format a duration in seconds as `MM:SS`, or `HH:MM:SS` from one hour up.
///
/// # Examples
/// ```
/// use reel_models::timestamp::format_duration;
/// assert_eq!(format_duration(125.4), "02:05");
/// assert_eq!(format_duration(3723.0), "01:02:03");
/// ```
pub fn format_duration(total_secs: f64) -> String {
    let total = if total_secs.is_finite() && total_secs > 0.0 {
        total_secs.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Format whole seconds as `HH:MM:SS` for ffmpeg seek arguments.
pub fn format_seek(total_secs: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_under_an_hour() {
        assert_eq!(format_duration(0.0), "00:00");
        assert_eq!(format_duration(59.9), "00:59");
        assert_eq!(format_duration(3599.0), "59:59");
    }

    #[test]
    fn test_format_duration_hours() {
        assert_eq!(format_duration(3600.0), "01:00:00");
        assert_eq!(format_duration(36000.0 + 61.0), "10:01:01");
    }

    #[test]
    fn test_format_duration_rejects_garbage() {
        assert_eq!(format_duration(-5.0), "00:00");
        assert_eq!(format_duration(f64::NAN), "00:00");
    }

    #[test]
    fn test_format_seek() {
        assert_eq!(format_seek(3723), "01:02:03");
        assert_eq!(format_seek(5), "00:00:05");
    }
}
