//! Solar Hijri (Jalali) calendar arithmetic
//!
//! Leap years follow the 33-year cycle break table; conversions go through
//! the Gregorian date of 1 Farvardin of the year.

use chrono::{Datelike, NaiveDate};

/// Jalali years at which the leap cycle changes phase
const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// First supported Jalali year
pub const MIN_YEAR: i32 = -61;

/// Last supported Jalali year
pub const MAX_YEAR: i32 = 3177;

/// Days before the first day of each month, for months 1..=12
const fn days_before_month(month: u32) -> i64 {
    if month <= 7 {
        (month as i64 - 1) * 31
    } else {
        186 + (month as i64 - 7) * 30
    }
}

#[derive(Debug, Clone, Copy)]
struct YearInfo {
    /// Years since the last leap year; 0 means this year is leap
    leap: i32,
    gregorian_year: i32,
    /// Day of March on which 1 Farvardin falls
    march_day: u32,
}

fn year_info(jy: i32) -> Option<YearInfo> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&jy) {
        return None;
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;

    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + (jump % 33) / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march_day = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(YearInfo {
        leap,
        gregorian_year: gy,
        march_day: u32::try_from(march_day).ok()?,
    })
}

/// Returns true if the Jalali year has a 30-day Esfand
///
/// Years outside the supported range are reported as non-leap.
pub fn is_leap_year(year: i32) -> bool {
    year_info(year).map(|info| info.leap == 0).unwrap_or(false)
}

/// Number of days in a Jalali month, or None for an invalid month/year
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    match month {
        1..=6 => Some(31),
        7..=11 => Some(30),
        12 if is_leap_year(year) => Some(30),
        12 => Some(29),
        _ => None,
    }
}

/// Converts an already validated Jalali date to Gregorian
pub(crate) fn to_gregorian(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let info = year_info(year)?;
    let first = NaiveDate::from_ymd_opt(info.gregorian_year, 3, info.march_day)?;
    let offset = days_before_month(month) + i64::from(day) - 1;
    first.checked_add_signed(chrono::Duration::days(offset))
}

/// Converts a Gregorian date to a Jalali (year, month, day) triple
pub(crate) fn from_gregorian(date: NaiveDate) -> Option<(i32, u32, u32)> {
    let gy = date.year();
    let mut jy = gy - 621;
    let info = year_info(jy)?;
    let first = NaiveDate::from_ymd_opt(gy, 3, info.march_day)?;
    let mut k = (date - first).num_days();

    if k >= 0 {
        if k <= 185 {
            return Some((jy, (1 + k / 31) as u32, (k % 31 + 1) as u32));
        }
        k -= 186;
    } else {
        jy -= 1;
        year_info(jy)?;
        k += 179;
        if info.leap == 1 {
            k += 1;
        }
    }

    Some((jy, (7 + k / 30) as u32, (k % 30 + 1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_years() {
        let leaps: Vec<i32> = (1395..1412).filter(|y| is_leap_year(*y)).collect();
        assert_eq!(leaps, vec![1395, 1399, 1403, 1408]);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(1403, 1), Some(31));
        assert_eq!(days_in_month(1403, 6), Some(31));
        assert_eq!(days_in_month(1403, 7), Some(30));
        assert_eq!(days_in_month(1403, 11), Some(30));
        assert_eq!(days_in_month(1403, 12), Some(30));
        assert_eq!(days_in_month(1402, 12), Some(29));
        assert_eq!(days_in_month(1403, 0), None);
        assert_eq!(days_in_month(1403, 13), None);
        assert_eq!(days_in_month(MAX_YEAR + 1, 1), None);
    }

    #[test]
    fn test_new_year_dates() {
        assert_eq!(
            to_gregorian(1403, 1, 1),
            NaiveDate::from_ymd_opt(2024, 3, 20)
        );
        assert_eq!(
            to_gregorian(1404, 1, 1),
            NaiveDate::from_ymd_opt(2025, 3, 21)
        );
    }

    #[test]
    fn test_from_gregorian_before_nowruz() {
        // Falls in Esfand of the previous Jalali year
        let date = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        assert_eq!(from_gregorian(date), Some((1403, 12, 30)));

        let date = NaiveDate::from_ymd_opt(2024, 3, 19).unwrap();
        assert_eq!(from_gregorian(date), Some((1402, 12, 29)));
    }

    #[test]
    fn test_year_info_out_of_range() {
        assert!(year_info(MIN_YEAR - 1).is_none());
        assert!(year_info(MAX_YEAR + 1).is_none());
    }
}
