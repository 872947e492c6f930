//! Czech civil calendar: public holidays, Easter and month arithmetic that
//! clamps to the end of the month.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::{CalcError, CalcResult};
use crate::format::between;

/// Before this date the holiday rules are not reliable, so business days
/// are not reported.
pub fn calendar_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1925, 4, 15).unwrap_or(NaiveDate::MIN)
}

/// First day of the first full Gregorian year.
pub fn min_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1583, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn max_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2999, 12, 31).unwrap_or(NaiveDate::MAX)
}

pub fn in_range(date: NaiveDate) -> bool {
    between(min_date(), date, max_date())
}

/// Rejects dates outside `min_date()..=max_date()`.
pub fn check_range(date: NaiveDate) -> CalcResult<NaiveDate> {
    if in_range(date) {
        Ok(date)
    } else {
        Err(CalcError::DateOutOfRange)
    }
}

/// Good Friday became a public holiday in 2016.
const GOOD_FRIDAY_SINCE: i32 = 2016;

struct FixedHoliday {
    day: u32,
    month: u32,
    since: Option<i32>,
    until: Option<i32>,
}

const FIXED_HOLIDAYS: &[FixedHoliday] = &[
    FixedHoliday { day: 1, month: 1, since: None, until: None },
    FixedHoliday { day: 1, month: 5, since: None, until: None },
    FixedHoliday { day: 8, month: 5, since: Some(1992), until: None },
    FixedHoliday { day: 9, month: 5, since: None, until: Some(1991) },
    FixedHoliday { day: 5, month: 7, since: None, until: None },
    FixedHoliday { day: 6, month: 7, since: None, until: None },
    FixedHoliday { day: 28, month: 9, since: Some(2000), until: None },
    FixedHoliday { day: 28, month: 10, since: None, until: None },
    FixedHoliday { day: 17, month: 11, since: Some(2000), until: None },
    FixedHoliday { day: 24, month: 12, since: None, until: None },
    FixedHoliday { day: 25, month: 12, since: None, until: None },
    FixedHoliday { day: 26, month: 12, since: None, until: None },
];

impl FixedHoliday {
    fn matches(&self, date: NaiveDate) -> bool {
        let year = date.year();
        date.day() == self.day
            && date.month() == self.month
            && self.since.map_or(true, |since| year >= since)
            && self.until.map_or(true, |until| year <= until)
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.day() == days_in_month(date.year(), date.month())
}

/// Easter Sunday in the Gregorian calendar (anonymous computus).
pub fn easter_sunday(year: i32) -> CalcResult<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or(CalcError::DateOutOfRange)
}

/// Easter Monday, or Good Friday where it is observed.
pub fn is_movable_holiday(date: NaiveDate) -> bool {
    let Ok(easter) = easter_sunday(date.year()) else {
        return false;
    };
    date == easter + Duration::days(1)
        || (date.year() >= GOOD_FRIDAY_SINCE && date == easter - Duration::days(2))
}

/// Weekends and Czech public holidays.
pub fn is_holiday(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        || FIXED_HOLIDAYS.iter().any(|holiday| holiday.matches(date))
        || is_movable_holiday(date)
}

/// Working days in `(beg, end]`.
pub fn business_days(beg: NaiveDate, end: NaiveDate) -> i64 {
    beg.iter_days()
        .skip(1)
        .take_while(|day| *day <= end)
        .filter(|day| !is_holiday(*day))
        .count() as i64
}

/// Shifts by whole years; 29 February falls back to 28 February.
pub fn add_years(date: NaiveDate, years: i32) -> CalcResult<NaiveDate> {
    let year = date.year() + years;
    let day = date.day().min(days_in_month(year, date.month()));
    NaiveDate::from_ymd_opt(year, date.month(), day).ok_or(CalcError::DateOutOfRange)
}

/// Shifts by whole months, clamping the day to the target month's length.
pub fn add_months(date: NaiveDate, months: i32) -> CalcResult<NaiveDate> {
    let index = date.month0() as i32 + months;
    let year = date.year() + index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).ok_or(CalcError::DateOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn easter_sundays_across_centuries() {
        for expected in [
            ymd(1700, 4, 11),
            ymd(1701, 3, 27),
            ymd(1734, 4, 25),
            ymd(2016, 3, 27),
            ymd(2291, 4, 19),
            ymd(2299, 4, 16),
        ] {
            assert_eq!(easter_sunday(expected.year()).unwrap(), expected);
        }
    }

    #[test]
    fn good_friday_only_from_2016() {
        assert!(is_movable_holiday(ymd(2016, 3, 25)));
        assert!(!is_movable_holiday(ymd(2016, 3, 24)));
        assert!(!is_movable_holiday(ymd(2015, 4, 3)));
        assert!(is_movable_holiday(ymd(2015, 4, 6)));
    }

    #[test]
    fn holidays() {
        assert!(is_holiday(ymd(2016, 1, 1)));
        assert!(!is_holiday(ymd(2016, 1, 5)));
        assert!(is_holiday(ymd(2016, 1, 16)));
        assert!(is_holiday(ymd(2016, 2, 7)));
        assert!(!is_holiday(ymd(2016, 2, 29)));
        assert!(!is_holiday(ymd(2016, 3, 8)));
        assert!(is_holiday(ymd(2016, 3, 20)));
        assert!(is_holiday(ymd(2016, 3, 25)));
        assert!(is_holiday(ymd(2016, 3, 28)));
        assert!(!is_holiday(ymd(2016, 4, 18)));
        assert!(!is_holiday(ymd(2016, 5, 19)));
        assert!(!is_holiday(ymd(2016, 6, 3)));
        assert!(!is_holiday(ymd(1991, 5, 8)));
        assert!(is_holiday(ymd(1991, 5, 9)));
        assert!(is_holiday(ymd(1992, 5, 8)));
        assert!(!is_holiday(ymd(1999, 11, 17)));
        assert!(is_holiday(ymd(2000, 11, 17)));
    }

    #[test]
    fn business_days_skip_weekend_and_christmas() {
        // 2016-12-23 is a Friday; the next working day is Tuesday 27th.
        assert_eq!(business_days(ymd(2016, 12, 23), ymd(2016, 12, 26)), 0);
        assert_eq!(business_days(ymd(2016, 12, 23), ymd(2016, 12, 27)), 1);
        assert_eq!(business_days(ymd(2016, 7, 4), ymd(2016, 7, 4)), 0);
        // Mon 2016-07-04 .. Fri 07-08 with 5th and 6th off.
        assert_eq!(business_days(ymd(2016, 7, 3), ymd(2016, 7, 8)), 3);
    }

    #[test]
    fn supported_range() {
        assert!(in_range(ymd(1583, 1, 1)));
        assert!(in_range(ymd(2999, 12, 31)));
        assert!(!in_range(ymd(1582, 12, 31)));
        assert_eq!(check_range(ymd(3000, 1, 1)), Err(CalcError::DateOutOfRange));
        assert_eq!(check_range(ymd(2016, 7, 1)), Ok(ymd(2016, 7, 1)));
    }

    #[test]
    fn year_and_month_shifts_clamp() {
        assert_eq!(add_years(ymd(2016, 7, 5), 1).unwrap(), ymd(2017, 7, 5));
        assert_eq!(add_years(ymd(2016, 2, 29), 1).unwrap(), ymd(2017, 2, 28));
        assert_eq!(add_months(ymd(2016, 7, 5), 1).unwrap(), ymd(2016, 8, 5));
        assert_eq!(add_months(ymd(2015, 1, 31), 1).unwrap(), ymd(2015, 2, 28));
        assert_eq!(add_months(ymd(2016, 1, 31), 1).unwrap(), ymd(2016, 2, 29));
        assert_eq!(add_months(ymd(2016, 11, 30), 3).unwrap(), ymd(2017, 2, 28));
        assert_eq!(add_months(ymd(2016, 1, 15), -1).unwrap(), ymd(2015, 12, 15));
    }
}
