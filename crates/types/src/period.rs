use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Error returned when a period string is not `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    /// Not of the form `YYYY-MM`
    Format(String),
    /// Month outside 1..=12
    Month(u32),
}

impl std::fmt::Display for PeriodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format(s) => write!(f, "period must be YYYY-MM, got '{}'", s),
            Self::Month(m) => write!(f, "month out of range [1, 12]: {}", m),
        }
    }
}

impl std::error::Error for PeriodError {}

/// A calendar month, the time key of every query and stored record.
///
/// # Examples
///
/// ```
/// use geoband_types::period::Period;
///
/// let start: Period = "2023-11".parse().unwrap();
/// let end: Period = "2024-02".parse().unwrap();
/// let months: Vec<String> = Period::range(start, end).map(|p| p.to_string()).collect();
/// assert_eq!(months, ["2023-11", "2023-12", "2024-01", "2024-02"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    pub fn new(year: u16, month: u8) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::Month(month as u32));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// The following month.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year.saturating_add(1),
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `start` to `end`, both inclusive. Empty when
    /// `start > end`.
    pub fn range(start: Period, end: Period) -> impl Iterator<Item = Period> {
        let mut next = (start <= end).then_some(start);
        std::iter::from_fn(move || {
            let current = next?;
            next = (current < end).then(|| current.succ());
            Some(current)
        })
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || PeriodError::Format(s.to_string());

        let (year, month) = s.trim().split_once('-').ok_or_else(format_err)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format_err());
        }
        let year: u16 = year.parse().map_err(|_| format_err())?;
        let month: u32 = month.parse().map_err(|_| format_err())?;
        if !(1..=12).contains(&month) {
            return Err(PeriodError::Month(month));
        }

        Ok(Self {
            year,
            month: month as u8,
        })
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
