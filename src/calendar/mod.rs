//! Calendar module: local (Solar Hijri) dates and Gregorian conversion
//!
//! All functions here are pure and safe to call from any number of tasks.
//!
//! # Example
//!
//! ```
//! use archive_harvester::calendar::{to_gregorian_iso, LocalDate};
//!
//! let iso = to_gregorian_iso(1403, 7, 13).unwrap();
//! assert_eq!(iso.to_string(), "2024-10-04");
//!
//! let back = LocalDate::from_gregorian(iso).unwrap();
//! assert_eq!(back, LocalDate::new(1403, 7, 13).unwrap());
//! ```

mod format;
mod jalali;

pub use format::{parse_iso_date, parse_local_date_string, DateFormat};
pub use jalali::{days_in_month, is_leap_year, MAX_YEAR, MIN_YEAR};

use crate::{CalendarError, CalendarResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An ISO (proleptic Gregorian) calendar date
pub type IsoDate = chrono::NaiveDate;

/// A validated date in the source's local (Solar Hijri) calendar
///
/// Construction rejects month/day combinations that do not exist in the
/// given year; values are never truncated into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalDate {
    year: i32,
    month: u32,
    day: u32,
}

impl LocalDate {
    /// Creates a local date, failing with `InvalidCalendarDate` if it does not exist
    pub fn new(year: i32, month: u32, day: u32) -> CalendarResult<Self> {
        let max_day = days_in_month(year, month)
            .ok_or(CalendarError::InvalidCalendarDate { year, month, day })?;

        if day == 0 || day > max_day {
            return Err(CalendarError::InvalidCalendarDate { year, month, day });
        }

        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Converts this date to its Gregorian equivalent
    pub fn to_gregorian(&self) -> CalendarResult<IsoDate> {
        jalali::to_gregorian(self.year, self.month, self.day).ok_or(
            CalendarError::InvalidCalendarDate {
                year: self.year,
                month: self.month,
                day: self.day,
            },
        )
    }

    /// Converts a Gregorian date into the local calendar
    pub fn from_gregorian(date: IsoDate) -> CalendarResult<Self> {
        let (year, month, day) =
            jalali::from_gregorian(date).ok_or_else(|| CalendarError::Parse {
                input: date.to_string(),
                reason: "outside the supported calendar range".to_string(),
            })?;
        Self::new(year, month, day)
    }

    /// Returns the following calendar day, or None past the supported range
    pub fn succ(&self) -> Option<Self> {
        let max_day = days_in_month(self.year, self.month)?;
        if self.day < max_day {
            return Some(Self {
                day: self.day + 1,
                ..*self
            });
        }
        if self.month < 12 {
            return Some(Self {
                year: self.year,
                month: self.month + 1,
                day: 1,
            });
        }
        Self::new(self.year + 1, 1, 1).ok()
    }
}

/// Converts a local calendar (year, month, day) triple to an ISO date
pub fn to_gregorian_iso(year: i32, month: u32, day: u32) -> CalendarResult<IsoDate> {
    LocalDate::new(year, month, day)?.to_gregorian()
}

impl fmt::Display for LocalDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for LocalDate {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_local_date_string(s, DateFormat::LocalNumeric)
    }
}

impl Serialize for LocalDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
