//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - The training metrics CSV writer
//! - Error handling types
//! - Time formatting for progress output

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{EmotionError, Result};
pub use logging::init_logging;
pub use metrics::{MetricKind, MetricRecord, MetricsWriter};

/// Format a duration in seconds as `DDd HHh MMm SSs`
///
/// Fractional seconds are truncated. Days are not capped.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (m, s) = (total / 60, total % 60);
    let (h, m) = (m / 60, m % 60);
    let (d, h) = (h / 24, h % 24);
    format!("{:02}d {:02}h {:02}m {:02}s", d, h, m, s)
}

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_zero() {
        assert_eq!(format_time(0.0), "00d 00h 00m 00s");
    }

    #[test]
    fn test_format_time_decomposition() {
        // 1 day, 2 hours, 3 minutes, 4 seconds
        let secs = 86_400.0 + 2.0 * 3600.0 + 3.0 * 60.0 + 4.0;
        assert_eq!(format_time(secs), "01d 02h 03m 04s");
    }

    #[test]
    fn test_format_time_truncates_fraction() {
        assert_eq!(format_time(59.99), "00d 00h 00m 59s");
        assert_eq!(format_time(3600.5), "00d 01h 00m 00s");
    }

    #[test]
    fn test_format_time_many_days() {
        assert_eq!(format_time(100.0 * 86_400.0), "100d 00h 00m 00s");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(60000), "60,000");
        assert_eq!(format_number(1000000), "1,000,000");
        assert_eq!(format_number(42), "42");
    }
}
