// Date and time handling for the clock built-ins
// Timestamps render as ISO 8601 in the configured timezone.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::error::{ErrorCode, EvaluatorError};

/// DateTime errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateTimeError {
    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),
}

impl From<DateTimeError> for EvaluatorError {
    fn from(e: DateTimeError) -> Self {
        EvaluatorError::raise(ErrorCode::ParseFailure, e.to_string())
    }
}

/// Resolve an IANA timezone identifier.
pub fn parse_timezone(name: &str) -> Result<Tz, DateTimeError> {
    name.parse::<Tz>()
        .map_err(|_| DateTimeError::UnknownTimezone(name.to_string()))
}

/// Format an instant as ISO 8601 with millisecond precision in `tz`.
pub fn format_iso8601(dt: &DateTime<Utc>, tz: Tz) -> String {
    tz.from_utc_datetime(&dt.naive_utc())
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as ISO 8601 in `tz`.
pub fn now(tz: Tz) -> String {
    format_iso8601(&Utc::now(), tz)
}

/// Milliseconds since the Unix epoch.
pub fn millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_iso8601(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Europe/Oslo").unwrap(), Tz::Europe__Oslo);
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(DateTimeError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_format_in_timezone() {
        let instant = parse_iso8601("2024-01-15T12:00:00Z");
        assert_eq!(format_iso8601(&instant, Tz::UTC), "2024-01-15T12:00:00.000Z");
        assert_eq!(
            format_iso8601(&instant, Tz::Asia__Tokyo),
            "2024-01-15T21:00:00.000+09:00"
        );
    }

    #[test]
    fn test_now_round_trips() {
        let text = now(Tz::UTC);
        assert!(DateTime::parse_from_rfc3339(&text).is_ok());
        assert!(millis() > 1_600_000_000_000);
    }
}
