//! Date string formats found in archive pages
//!
//! Every format locates its pattern anywhere inside the input, so a raw field
//! such as `تاریخ انتشار: ۰۹:۰۰ - ۱۸ مهر ۱۳۹۷` parses without pre-trimming.

use super::{IsoDate, LocalDate};
use crate::{CalendarError, CalendarResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How a date field's raw text is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateFormat {
    /// Local calendar, numeric: `1403/07/13` or `1403-07-13 09:30`
    #[default]
    LocalNumeric,
    /// Local calendar with a month name: `18 مهر 1397`
    LocalMonthName,
    /// Gregorian, numeric: `2024/10/04` or `2024-10-04`
    GregorianNumeric,
    /// Gregorian with an English month name: `04 October 2024`
    GregorianLongMonth,
}

impl DateFormat {
    /// Returns true if the text is written in the local calendar
    pub fn is_local(&self) -> bool {
        matches!(self, DateFormat::LocalNumeric | DateFormat::LocalMonthName)
    }
}

const LOCAL_MONTHS: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

const GREGORIAN_MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn numeric_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{4})\s*[/\-.]\s*([0-9]{1,2})\s*[/\-.]\s*([0-9]{1,2})(?:[^0-9]|$)")
            .expect("numeric date regex is valid")
    })
}

fn local_month_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let months = LOCAL_MONTHS.join("|");
        Regex::new(&format!(r"([0-9]{{1,2}})\s+({})\s+([0-9]{{4}})", months))
            .expect("month-name date regex is valid")
    })
}

fn gregorian_long_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]{1,2})\s+([A-Za-z]{3,9})\.?,?\s+([0-9]{4})")
            .expect("long-month date regex is valid")
    })
}

/// Maps Persian and Arabic-Indic digits to ASCII and unifies Arabic letter variants
fn normalize_digits(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{064A}' => '\u{06CC}',
            '\u{0643}' => '\u{06A9}',
            _ => c,
        })
        .collect()
}

fn parse_error(input: &str, reason: &str) -> CalendarError {
    CalendarError::Parse {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

fn capture_number(caps: &regex::Captures<'_>, index: usize, input: &str) -> CalendarResult<u32> {
    caps.get(index)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or_else(|| parse_error(input, "number out of range"))
}

fn find_numeric(input: &str, normalized: &str) -> CalendarResult<(i32, u32, u32)> {
    let caps = numeric_regex()
        .captures(normalized)
        .ok_or_else(|| parse_error(input, "no YYYY/MM/DD date found"))?;

    let year = capture_number(&caps, 1, input)?;
    let month = capture_number(&caps, 2, input)?;
    let day = capture_number(&caps, 3, input)?;
    Ok((year as i32, month, day))
}

fn find_local_month_name(input: &str, normalized: &str) -> CalendarResult<(i32, u32, u32)> {
    let caps = local_month_regex()
        .captures(normalized)
        .ok_or_else(|| parse_error(input, "no 'day month-name year' date found"))?;

    let day = capture_number(&caps, 1, input)?;
    let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let month = LOCAL_MONTHS
        .iter()
        .position(|m| *m == name)
        .ok_or_else(|| parse_error(input, "unknown month name"))?;
    let year = capture_number(&caps, 3, input)?;
    Ok((year as i32, month as u32 + 1, day))
}

fn find_gregorian_long(input: &str, normalized: &str) -> CalendarResult<IsoDate> {
    for caps in gregorian_long_regex().captures_iter(normalized) {
        let name = caps
            .get(2)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        let month = GREGORIAN_MONTHS
            .iter()
            .position(|m| *m == name || (name.len() >= 3 && m.starts_with(name.as_str())));

        if let Some(month) = month {
            let day = capture_number(&caps, 1, input)?;
            let year = capture_number(&caps, 3, input)?;
            return IsoDate::from_ymd_opt(year as i32, month as u32 + 1, day)
                .ok_or_else(|| parse_error(input, "invalid Gregorian date"));
        }
    }
    Err(parse_error(input, "no 'day month year' date found"))
}

/// Parses a local calendar date out of `input`
///
/// Gregorian formats are parsed and then converted to the local calendar.
///
/// # Errors
///
/// Returns `CalendarError::Parse` if no date in the requested format is found,
/// or `CalendarError::InvalidCalendarDate` if the numbers found do not form a
/// valid local date.
pub fn parse_local_date_string(input: &str, format: DateFormat) -> CalendarResult<LocalDate> {
    let normalized = normalize_digits(input);

    match format {
        DateFormat::LocalNumeric => {
            let (y, m, d) = find_numeric(input, &normalized)?;
            LocalDate::new(y, m, d)
        }
        DateFormat::LocalMonthName => {
            let (y, m, d) = find_local_month_name(input, &normalized)?;
            LocalDate::new(y, m, d)
        }
        DateFormat::GregorianNumeric | DateFormat::GregorianLongMonth => {
            LocalDate::from_gregorian(parse_iso_date(input, format)?)
        }
    }
}

/// Parses `input` in the given format and returns its ISO Gregorian date
pub fn parse_iso_date(input: &str, format: DateFormat) -> CalendarResult<IsoDate> {
    match format {
        DateFormat::LocalNumeric | DateFormat::LocalMonthName => {
            parse_local_date_string(input, format)?.to_gregorian()
        }
        DateFormat::GregorianNumeric => {
            let normalized = normalize_digits(input);
            let (y, m, d) = find_numeric(input, &normalized)?;
            IsoDate::from_ymd_opt(y, m, d)
                .ok_or_else(|| parse_error(input, "invalid Gregorian date"))
        }
        DateFormat::GregorianLongMonth => {
            let normalized = normalize_digits(input);
            find_gregorian_long(input, &normalized)
        }
    }
}
