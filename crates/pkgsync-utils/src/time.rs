use std::{fmt, str::FromStr, time::Duration};

use crate::error::DurationError;

/// Parses a compact duration string such as `1d2h30m15s`.
///
/// Each component is a run of digits followed by one of `s`, `m`, `h` or `d`.
/// Components may appear in any order and repeat; their values are summed.
/// Returns `None` for malformed input or on overflow. The empty string is zero.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pkgsync_utils::time::parse_duration;
///
/// assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
/// ```
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut total: u64 = 0;
    let mut chars = input.trim().chars().peekable();

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            chars.next();
        }
        if digits.is_empty() {
            return None;
        }

        let number: u64 = digits.parse().ok()?;
        let unit: u64 = match chars.next()? {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return None,
        };
        total = total.checked_add(number.checked_mul(unit)?)?;
    }

    Some(Duration::from_secs(total))
}

/// How often a cached resource should be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshInterval {
    /// Rebuild on every use.
    Always,
    /// Keep the first instance for the life of the process.
    Never,
    Every(Duration),
}

impl RefreshInterval {
    /// Whether a resource of the given age should be replaced.
    pub fn is_stale(&self, age: Duration) -> bool {
        match self {
            RefreshInterval::Always => true,
            RefreshInterval::Never => false,
            RefreshInterval::Every(interval) => age >= *interval,
        }
    }
}

impl FromStr for RefreshInterval {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "always" => Ok(RefreshInterval::Always),
            "never" => Ok(RefreshInterval::Never),
            "" => Err(DurationError::Invalid(s.to_string())),
            other => {
                parse_duration(other)
                    .map(RefreshInterval::Every)
                    .ok_or_else(|| DurationError::Invalid(s.to_string()))
            }
        }
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshInterval::Always => write!(f, "always"),
            RefreshInterval::Never => write!(f, "never"),
            RefreshInterval::Every(d) => write!(f, "{}s", d.as_secs()),
        }
    }
}
