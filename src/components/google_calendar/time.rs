use crate::error::{input_error, AppResult};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};

/// Layout used when rendering event times for humans
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp.
///
/// Offset-less date-times and bare dates are taken to be in the local zone,
/// a bare date meaning local midnight.
pub fn parse_iso8601(value: &str) -> AppResult<DateTime<FixedOffset>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| input_error(&format!("Not an ISO-8601 timestamp: {}", value)))?;

    // Ambiguous wall-clock times resolve to the earlier instant
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| input_error("Invalid local time"))?;

    Ok(local.fixed_offset())
}

/// Re-express a timestamp in local time with an explicit offset
pub fn to_local_iso(dt: &DateTime<FixedOffset>) -> String {
    dt.with_timezone(&Local).to_rfc3339()
}

/// Current local time with an explicit offset
pub fn now_local_iso() -> String {
    Local::now().to_rfc3339()
}

/// Render an event time as local `YYYY-MM-DD HH:MM:SS`.
///
/// Values the parser does not understand are returned as received.
pub fn format_local(value: &str) -> String {
    match parse_iso8601(value) {
        Ok(dt) => dt.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offset_timestamps() {
        let dt = parse_iso8601("2025-04-06T10:00:00-04:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -4 * 3600);
        assert_eq!(dt.to_rfc3339(), "2025-04-06T10:00:00-04:00");

        assert!(parse_iso8601("2025-04-06T14:00:00Z").is_ok());
        assert!(parse_iso8601("2025-04-06T10:00:00.250+02:00").is_ok());
        assert!(parse_iso8601("2025-04-06T10:00-04:00").is_ok());
        assert!(parse_iso8601("2025-04-06 10:00:00+01:00").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_iso8601("not-a-date"),
            Err(crate::error::Error::InvalidInput(_))
        ));
        assert!(parse_iso8601("bad").is_err());
        assert!(parse_iso8601("").is_err());
        assert!(parse_iso8601("2025-13-40T10:00:00Z").is_err());
    }

    #[test]
    fn naive_values_are_local() {
        let dt = parse_iso8601("2025-04-06T10:00:00").unwrap();
        assert_eq!(
            dt.with_timezone(&Local).format(DISPLAY_FORMAT).to_string(),
            "2025-04-06 10:00:00"
        );
    }

    #[test]
    fn local_normalization_keeps_the_instant() {
        let dt = parse_iso8601("2025-04-06T10:00:00-04:00").unwrap();
        let normalized = to_local_iso(&dt);
        let reparsed = DateTime::parse_from_rfc3339(&normalized).unwrap();
        assert_eq!(reparsed, dt);
        assert_eq!(
            reparsed.offset().local_minus_utc(),
            dt.with_timezone(&Local).offset().local_minus_utc()
        );
    }

    #[test]
    fn all_day_dates_render_as_local_midnight() {
        assert_eq!(format_local("2025-04-06"), "2025-04-06 00:00:00");
        assert_eq!(format_local("whenever"), "whenever");
    }
}
