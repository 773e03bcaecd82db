use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::TimeDelta;
use grantry_core::AppError;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

/// Non-negative grant duration written in Go-style syntax (`1h30m`, `45s`, `1.5h`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantDuration(Duration);

impl GrantDuration {
    /// The zero duration.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Wraps a standard library duration.
    #[must_use]
    pub const fn from_std(value: Duration) -> Self {
        Self(value)
    }

    /// Creates a duration of whole seconds.
    #[must_use]
    pub const fn from_secs(seconds: u64) -> Self {
        Self(Duration::from_secs(seconds))
    }

    /// Creates a duration of whole minutes.
    #[must_use]
    pub const fn from_minutes(minutes: u64) -> Self {
        Self(Duration::from_secs(minutes * 60))
    }

    /// Creates a duration of whole hours.
    #[must_use]
    pub const fn from_hours(hours: u64) -> Self {
        Self(Duration::from_secs(hours * 3_600))
    }

    /// Parses Go duration syntax. Negative values are rejected.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        parse_go_duration(value).map(Self).map_err(AppError::Validation)
    }

    /// Returns the standard library representation.
    #[must_use]
    pub const fn as_std(&self) -> Duration {
        self.0
    }

    /// Returns true when the duration is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Converts to a chrono delta, saturating at the chrono maximum.
    #[must_use]
    pub fn to_time_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.0).unwrap_or(TimeDelta::MAX)
    }

    /// Converts a non-negative chrono delta; negative input yields zero.
    #[must_use]
    pub fn from_time_delta(value: TimeDelta) -> Self {
        Self(value.to_std().unwrap_or(Duration::ZERO))
    }
}

impl From<Duration> for GrantDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Display for GrantDuration {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let total = self.0.as_nanos();
        if total == 0 {
            return formatter.write_str("0s");
        }

        if total < NANOS_PER_SECOND {
            let (unit, suffix) = if total < NANOS_PER_MICRO {
                (1, "ns")
            } else if total < NANOS_PER_MILLI {
                (NANOS_PER_MICRO, "µs")
            } else {
                (NANOS_PER_MILLI, "ms")
            };
            return write!(formatter, "{}{suffix}", format_fraction(total, unit));
        }

        let hours = total / NANOS_PER_HOUR;
        let minutes = (total % NANOS_PER_HOUR) / NANOS_PER_MINUTE;
        let seconds = total % NANOS_PER_MINUTE;

        if hours > 0 {
            write!(formatter, "{hours}h")?;
        }
        if hours > 0 || minutes > 0 {
            write!(formatter, "{minutes}m")?;
        }
        write!(
            formatter,
            "{}s",
            format_fraction(seconds, NANOS_PER_SECOND)
        )
    }
}

fn format_fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }

    let mut width = 0_usize;
    let mut remaining_unit = unit;
    while remaining_unit > 1 {
        remaining_unit /= 10;
        width += 1;
    }

    let digits = format!("{fraction:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

fn parse_go_duration(input: &str) -> Result<Duration, String> {
    let value = input.trim();
    if value.is_empty() {
        return Err("duration must not be empty".to_owned());
    }

    let (negative, mut rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(format!("invalid duration '{input}'"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let integer_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (integer_part, after_integer) = rest.split_at(integer_len);

        let (fraction_part, after_number) = match after_integer.strip_prefix('.') {
            Some(after_dot) => {
                let fraction_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(fraction_len)
            }
            None => ("", after_integer),
        };

        if integer_part.is_empty() && fraction_part.is_empty() {
            return Err(format!("invalid duration '{input}'"));
        }

        let unit_len = after_number
            .find(|character: char| character.is_ascii_digit() || character == '.')
            .unwrap_or(after_number.len());
        let (unit, next) = after_number.split_at(unit_len);

        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => NANOS_PER_HOUR,
            "" => return Err(format!("missing unit in duration '{input}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };

        let whole: u128 = if integer_part.is_empty() {
            0
        } else {
            integer_part
                .parse()
                .map_err(|_| format!("invalid duration '{input}'"))?
        };

        let mut nanos = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| format!("duration '{input}' overflows"))?;

        if !fraction_part.is_empty() {
            let digits = &fraction_part[..fraction_part.len().min(18)];
            let fraction: u128 = digits
                .parse()
                .map_err(|_| format!("invalid duration '{input}'"))?;
            let scale = 10_u128.pow(u32::try_from(digits.len()).unwrap_or(18));
            nanos = nanos.saturating_add(fraction * unit_nanos / scale);
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration '{input}' overflows"))?;
        rest = next;
    }

    if negative && total > 0 {
        return Err(format!("duration '{input}' must not be negative"));
    }

    let seconds = u64::try_from(total / NANOS_PER_SECOND)
        .map_err(|_| format!("duration '{input}' overflows"))?;
    let subsec = u32::try_from(total % NANOS_PER_SECOND)
        .map_err(|_| format!("duration '{input}' overflows"))?;

    Ok(Duration::new(seconds, subsec))
}

/// Duration fields that take part in policy resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationField {
    /// The requester's `spec.duration`.
    RequestDuration,
    /// The template's `spec.accessConfig.defaultDuration`.
    TemplateDefaultDuration,
    /// The template's `spec.accessConfig.maxDuration`.
    TemplateMaxDuration,
}

impl DurationField {
    /// Returns the field path shown to users.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestDuration => "spec.duration",
            Self::TemplateDefaultDuration => "template spec.accessConfig.defaultDuration",
            Self::TemplateMaxDuration => "template spec.accessConfig.maxDuration",
        }
    }
}

/// A duration string that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDuration {
    /// Field holding the bad value.
    pub field: DurationField,
    /// Parser detail.
    pub detail: String,
}

impl Display for InvalidDuration {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} error: {}", self.field.as_str(), self.detail)
    }
}

impl From<InvalidDuration> for AppError {
    fn from(value: InvalidDuration) -> Self {
        AppError::Validation(value.to_string())
    }
}

/// Policy branch that produced a resolved duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSource {
    /// No duration requested; the template default applies.
    TemplateDefault,
    /// The requested duration fits under the template maximum.
    Requested,
    /// The requested duration exceeded the maximum and was clamped.
    ClampedToMaximum,
}

/// Result of duration policy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationResolution {
    /// Duration the grant lasts for.
    pub duration: GrantDuration,
    /// Branch taken.
    pub source: DurationSource,
    /// Human readable explanation of the decision.
    pub justification: String,
}

/// Resolves the effective grant duration from request and template values.
///
/// An absent, blank or zero request falls back to the template default. A
/// request above the template maximum is clamped rather than rejected.
pub fn resolve_duration(
    requested: Option<&str>,
    template_default: &str,
    template_max: &str,
) -> Result<DurationResolution, InvalidDuration> {
    let requested = match requested.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_go_duration(value).map_err(|detail| InvalidDuration {
            field: DurationField::RequestDuration,
            detail,
        })?,
        None => Duration::ZERO,
    };
    let default = parse_go_duration(template_default).map_err(|detail| InvalidDuration {
        field: DurationField::TemplateDefaultDuration,
        detail,
    })?;
    let max = parse_go_duration(template_max).map_err(|detail| InvalidDuration {
        field: DurationField::TemplateMaxDuration,
        detail,
    })?;

    Ok(resolve_parsed_duration(
        GrantDuration(requested),
        GrantDuration(default),
        GrantDuration(max),
    ))
}

/// Applies the duration policy to already parsed values.
#[must_use]
pub fn resolve_parsed_duration(
    requested: GrantDuration,
    template_default: GrantDuration,
    template_max: GrantDuration,
) -> DurationResolution {
    if requested.is_zero() {
        DurationResolution {
            duration: template_default,
            source: DurationSource::TemplateDefault,
            justification: format!(
                "Access request duration defaulting to template duration time ({template_default})"
            ),
        }
    } else if requested <= template_max {
        DurationResolution {
            duration: requested,
            source: DurationSource::Requested,
            justification: format!("Access requested custom duration ({requested})"),
        }
    } else {
        DurationResolution {
            duration: template_max,
            source: DurationSource::ClampedToMaximum,
            justification: format!(
                "Access requested duration ({requested}) larger than template maximum duration ({template_max})"
            ),
        }
    }
}
