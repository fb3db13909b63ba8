//! Formatting helpers shared by the CLI and other consumers.

/// Format a count compactly (e.g., "1.2K", "3.4M").
pub fn format_count(count: i64) -> String {
    let abs = count.unsigned_abs();
    if abs >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if abs >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Format a distance given in meters (e.g., "850 m", "12.40 km").
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() {
        return "0 m".to_string();
    }
    if meters.abs() >= 1000.0 {
        format!("{:.2} km", meters / 1000.0)
    } else if meters.abs() >= 10.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.2} m", meters)
    }
}

/// Format a duration in seconds (e.g., "45s", "2h 5m", "3d 4h").
pub fn format_duration(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Format an hour of day as a one-hour slot (e.g., "2-3pm").
pub fn format_hour_slot(hour: u32) -> String {
    let label = |h: u32| match h {
        0 => "12am".to_string(),
        1..=11 => format!("{}am", h),
        12 => "12pm".to_string(),
        _ => format!("{}pm", h - 12),
    };
    let next = (hour + 1) % 24;
    format!("{}-{}", label(hour % 24).trim_end_matches(['a', 'p', 'm']), label(next))
}
