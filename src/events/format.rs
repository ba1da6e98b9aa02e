/*!
 * Duration Display
 * Human strings for microsecond event durations and millisecond wait times
 */

/// Render an event duration given in microseconds
#[inline]
pub fn format_duration_us(us: u64) -> String {
    if us < 1_000 {
        format!("{}µs", us)
    } else if us < 1_000_000 {
        format!("{:.2}ms", us as f64 / 1_000.0)
    } else {
        format!("{:.2}s", us as f64 / 1_000_000.0)
    }
}

/// Render a wait time given in milliseconds
#[inline]
pub fn format_wait_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1_000.0)
    } else if ms < 3_600_000 {
        format!("{:.2}min", ms as f64 / 60_000.0)
    } else {
        format!("{:.2}hr", ms as f64 / 3_600_000.0)
    }
}
