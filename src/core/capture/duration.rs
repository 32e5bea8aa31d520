//! Recording length value object

use std::fmt;
use std::str::FromStr;

use crate::error::DurationParseError;

/// Recording length in whole seconds. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordDuration {
    seconds: u64,
}

impl RecordDuration {
    pub const fn from_secs(seconds: u64) -> Self {
        Self { seconds }
    }

    pub const fn as_secs(&self) -> u64 {
        self.seconds
    }
}

impl FromStr for RecordDuration {
    type Err = DurationParseError;

    /// Accepts a bare number of seconds or a number with an `s`, `m` or `h`
    /// suffix: "90", "30s", "5m", "2h".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DurationParseError {
            input: s.to_string(),
        };
        let input = s.trim().to_lowercase();

        let (digits, multiplier) = match input.char_indices().last() {
            Some((idx, 's')) => (&input[..idx], 1),
            Some((idx, 'm')) => (&input[..idx], 60),
            Some((idx, 'h')) => (&input[..idx], 60 * 60),
            Some(_) => (input.as_str(), 1),
            None => return Err(err()),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        let value: u64 = digits.parse().map_err(|_| err())?;
        let seconds = value.checked_mul(multiplier).ok_or_else(err)?;
        if seconds == 0 {
            return Err(err());
        }

        Ok(Self { seconds })
    }
}

impl fmt::Display for RecordDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.seconds / 3600, (self.seconds % 3600) / 60, self.seconds % 60);
        match (h, m, s) {
            (0, 0, s) => write!(f, "{}s", s),
            (0, m, 0) => write!(f, "{}m", m),
            (0, m, s) => write!(f, "{}m{}s", m, s),
            (h, 0, 0) => write!(f, "{}h", h),
            (h, m, s) => write!(f, "{}h{}m{}s", h, m, s),
        }
    }
}
