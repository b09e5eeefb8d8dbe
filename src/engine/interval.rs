use std::sync::LazyLock;

use regex::Regex;

use crate::limits::MAX_DURATION_MINUTES;
use crate::model::*;

use super::ParseError;

// ── Interval Resolver ─────────────────────────────────────────────

/// `H:MM` / `HH:MM`, optional `:SS`, optional am/pm suffix (any case, space optional).
static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2})(?::(\d{2}))?\s*([aApP][mM])?\s*$")
        .expect("clock pattern is valid")
});

/// Parse a textual start time into a minute of the day.
///
/// With an am/pm suffix the hour must be 1–12: `12 am` is the midnight hour,
/// `12 pm` is noon, any other pm hour gets +12. Without a suffix the hour is
/// read as 24-hour (0–23). Seconds are accepted and dropped.
pub fn parse_clock(text: &str) -> Result<Minute, ParseError> {
    let unrecognized = || ParseError::Unrecognized(text.to_string());
    let caps = CLOCK.captures(text).ok_or_else(unrecognized)?;

    let hour: Minute = caps[1].parse().map_err(|_| unrecognized())?;
    let minute: Minute = caps[2].parse().map_err(|_| unrecognized())?;
    if minute > 59 {
        return Err(unrecognized());
    }
    if let Some(secs) = caps.get(3)
        && secs.as_str().parse::<u32>().map_or(true, |s| s > 59)
    {
        return Err(unrecognized());
    }

    let hour = match caps.get(4).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(suffix) => {
            if !(1..=12).contains(&hour) {
                return Err(unrecognized());
            }
            match (suffix.as_str(), hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                (_, 12) => 12,
                (_, h) => h + 12,
            }
        }
        None if hour <= 23 => hour,
        None => return Err(unrecognized()),
    };

    Ok(hour * 60 + minute)
}

/// Normalize a start time plus a duration into `[start, start + duration)`.
pub fn resolve(time_text: &str, duration_minutes: i64) -> Result<Span, ParseError> {
    if duration_minutes <= 0 || duration_minutes > MAX_DURATION_MINUTES {
        return Err(ParseError::InvalidDuration(duration_minutes));
    }
    let start = parse_clock(time_text)?;
    Ok(Span::new(start, start + duration_minutes))
}

// ── Display helpers ───────────────────────────────────────────────

/// "10:00 AM". Minutes outside the day wrap onto the clock face.
pub fn format_clock(minute: Minute) -> String {
    let m = minute.rem_euclid(MINUTES_PER_DAY);
    let (hour, min) = (m / 60, m % 60);
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let h12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{h12}:{min:02} {suffix}")
}

/// "40m", "1h", "1h 5m".
pub fn format_minutes(minutes: Minute) -> String {
    if minutes < 60 {
        return format!("{minutes}m");
    }
    match (minutes / 60, minutes % 60) {
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_four_hour() {
        assert_eq!(parse_clock("10:00"), Ok(600));
        assert_eq!(parse_clock("9:05"), Ok(545));
        assert_eq!(parse_clock("00:00"), Ok(0));
        assert_eq!(parse_clock("23:59"), Ok(1439));
        assert_eq!(parse_clock("14:30:45"), Ok(870));
    }

    #[test]
    fn twelve_hour() {
        assert_eq!(parse_clock("10:00 am"), Ok(600));
        assert_eq!(parse_clock("3:15 PM"), Ok(915));
        assert_eq!(parse_clock("3:15pm"), Ok(915));
        assert_eq!(parse_clock(" 7:45:10 Pm "), Ok(1185));
    }

    #[test]
    fn twelve_oclock_edges() {
        assert_eq!(parse_clock("12:00 am"), Ok(0));
        assert_eq!(parse_clock("12:59 AM"), Ok(59));
        assert_eq!(parse_clock("12:00 pm"), Ok(720));
        assert_eq!(parse_clock("12:30 PM"), Ok(750));
    }

    #[test]
    fn rejects_garbage() {
        for text in ["", "noon", "10", "10:5", "24:00", "10:60", "13:00 pm", "0:30 am", "10:00:61", "10:00 xm"] {
            assert_eq!(
                parse_clock(text),
                Err(ParseError::Unrecognized(text.to_string())),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn resolve_builds_half_open_span() {
        let span = resolve("10:00 am", 60).unwrap();
        assert_eq!(span, Span::new(600, 660));
    }

    #[test]
    fn resolve_overnight_not_wrapped() {
        let span = resolve("23:00", 120).unwrap();
        assert_eq!(span, Span::new(1380, 1500));
    }

    #[test]
    fn resolve_rejects_bad_duration() {
        assert_eq!(resolve("10:00", 0), Err(ParseError::InvalidDuration(0)));
        assert_eq!(resolve("10:00", -30), Err(ParseError::InvalidDuration(-30)));
        assert_eq!(
            resolve("10:00", MAX_DURATION_MINUTES + 1),
            Err(ParseError::InvalidDuration(MAX_DURATION_MINUTES + 1))
        );
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "12:00 AM");
        assert_eq!(format_clock(600), "10:00 AM");
        assert_eq!(format_clock(720), "12:00 PM");
        assert_eq!(format_clock(915), "3:15 PM");
        assert_eq!(format_clock(1500), "1:00 AM"); // next day wraps
        assert_eq!(format_clock(-30), "11:30 PM");
    }

    #[test]
    fn minutes_formatting() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(40), "40m");
        assert_eq!(format_minutes(60), "1h");
        assert_eq!(format_minutes(65), "1h 5m");
        assert_eq!(format_minutes(150), "2h 30m");
    }
}
