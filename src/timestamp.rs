use chrono::{DateTime, FixedOffset, Local, Timelike};

/// Formats the terms-of-service timestamp for registration.
///
/// The registration service expects the exact format the Android client
/// produces: RFC3339 with the fractional seconds truncated to two digits and
/// a colon-separated UTC offset, e.g. `2024-05-01T08:30:12.34+02:00`.
pub fn tos_timestamp() -> String {
    format_tos(Local::now().fixed_offset())
}

fn format_tos(when: DateTime<FixedOffset>) -> String {
    // Truncated, not rounded. nanosecond() can exceed 999_999_999 during a
    // leap second, so cap at 99.
    let centis = (when.nanosecond() / 10_000_000).min(99);
    format!(
        "{}.{:02}{}",
        when.format("%Y-%m-%dT%H:%M:%S"),
        centis,
        when.format("%:z")
    )
}
