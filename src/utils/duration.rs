// Duration parsing and formatting for config values and status output

use anyhow::Result;
use std::time::Duration;

/// Parse a duration expression like `1s`, `1500ms`, `2m` or `1h30m`
///
/// A bare number is taken as milliseconds.
pub fn parse_duration(expr: &str) -> Result<Duration> {
    let expr = expr.trim();
    if expr.is_empty() {
        anyhow::bail!("Duration cannot be empty");
    }

    let mut total_millis = 0u64;
    let mut remaining = expr;

    if let Ok(millis) = expr.parse::<u64>() {
        total_millis = millis;
        remaining = "";
    }

    // Units in order: h, m, s, ms. Each unit is a number followed by its suffix.
    while !remaining.is_empty() {
        let digits_end = remaining
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("Invalid duration format: {}", expr))?;
        if digits_end == 0 {
            anyhow::bail!("Invalid duration format: {}", expr);
        }
        let value: u64 = remaining[..digits_end]
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration format: {}", expr))?;
        let rest = &remaining[digits_end..];

        let (factor, unit_len) = if rest.starts_with("ms") {
            (1, 2)
        } else if rest.starts_with('h') {
            (3_600_000, 1)
        } else if rest.starts_with('m') {
            (60_000, 1)
        } else if rest.starts_with('s') {
            (1_000, 1)
        } else {
            anyhow::bail!("Invalid duration format: {}", expr);
        };

        total_millis += value * factor;
        remaining = &rest[unit_len..];
    }

    if total_millis == 0 {
        anyhow::bail!("Duration must be greater than 0");
    }

    Ok(Duration::from_millis(total_millis))
}

/// Format seconds for display
pub fn format_duration(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1s500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m5s");
        assert_eq!(format_duration(3725), "1h2m5s");
    }
}
