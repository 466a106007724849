/// Parse a user-entered decimal, the way the sensor feed and threshold inputs
/// are read. Anything that is not a finite number is rejected.
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Whole seconds, with negative and non-finite input treated as zero
fn whole_seconds(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    }
}

/// `MM:SS` for the elapsed-time display
pub fn format_elapsed(secs: f64) -> String {
    let total = whole_seconds(secs);
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// `M:SS` as used for event timestamps
pub fn format_event_time(secs: f64) -> String {
    let total = whole_seconds(secs);
    format!("{}:{:02}", total / 60, total % 60)
}

/// Two decimals or `--` for values that may not exist yet
pub fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("--"), |v| format!("{v:.2}"))
}

/// Arrow for the sign of a change
pub fn trend_arrow(change: f64) -> &'static str {
    if change > 0.0 {
        "↑"
    } else if change < 0.0 {
        "↓"
    } else {
        "→"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("512.25"), Some(512.25));
        assert_eq!(parse_decimal("  -3 \n"), Some(-3.0));
        assert_eq!(parse_decimal("1e2"), Some(100.0));
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_parse_decimal_rejects_trailing_text() {
        // units or labels after the number make the whole line unusable
        assert_eq!(parse_decimal("512.3 ohm"), None);
        assert_eq!(parse_decimal("512.3Ω"), None);
        assert_eq!(parse_decimal("Z=512.3"), None);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0.0), "00:00");
        assert_eq!(format_elapsed(9.99), "00:09");
        assert_eq!(format_elapsed(61.0), "01:01");
        assert_eq!(format_elapsed(3600.0), "60:00");
        assert_eq!(format_elapsed(-4.0), "00:00");
    }

    #[test]
    fn test_format_event_time() {
        assert_eq!(format_event_time(5.4), "0:05");
        assert_eq!(format_event_time(125.0), "2:05");
        assert_eq!(format_event_time(-1.0), "0:00");
        assert_eq!(format_event_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_format_optional() {
        assert_eq!(format_optional(None), "--");
        assert_eq!(format_optional(Some(1.004)), "1.00");
        assert_eq!(format_optional(Some(42.0)), "42.00");
    }

    #[test]
    fn test_trend_arrow() {
        assert_eq!(trend_arrow(1.0), "↑");
        assert_eq!(trend_arrow(-0.5), "↓");
        assert_eq!(trend_arrow(0.0), "→");
    }
}
