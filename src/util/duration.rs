use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration {0:?}: expected e.g. 30s, 1m, 1h30m, 500ms")]
    Invalid(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { input: String, unit: String },
    #[error("duration must be greater than zero")]
    Zero,
}

/// Parses an interval like `30s`, `1m`, `1h30m` or `1.5h`.
///
/// Units: `ms`, `s`, `m`, `h`. Every number needs a unit and the total must
/// be non-zero, since the aggregation loop ticks on it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gator::util::parse_interval;
///
/// assert_eq!(parse_interval("1m30s").unwrap(), Duration::from_secs(90));
/// assert!(parse_interval("10").is_err());
/// ```
pub fn parse_interval(input: &str) -> Result<Duration, DurationParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let invalid = || DurationParseError::Invalid(input.to_string());
    let mut total_ms: f64 = 0.0;
    let mut rest = s;

    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let scale = match unit {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => {
                return Err(DurationParseError::UnknownUnit {
                    input: input.to_string(),
                    unit: unit.to_string(),
                })
            }
        };
        total_ms += value * scale;
    }

    if !total_ms.is_finite() {
        return Err(invalid());
    }
    let duration = Duration::from_millis(total_ms.round() as u64);
    if duration.is_zero() {
        return Err(DurationParseError::Zero);
    }
    Ok(duration)
}
