//! Day-count conventions: the fraction of a year or a month between two dates.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::{days_in_month, is_last_day_of_month, is_leap_year};
use crate::error::{CalcError, CalcResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YearConvention {
    #[serde(rename = "ACT/ACT")]
    ActAct,
    #[serde(rename = "ACT/365")]
    Act365,
    #[serde(rename = "ACT/360")]
    Act360,
    #[serde(rename = "ACT/364")]
    Act364,
    #[serde(rename = "30U/360")]
    Thirty360Us,
    #[serde(rename = "30E/360")]
    Thirty360E,
    #[serde(rename = "30E/360 ISDA")]
    Thirty360EIsda,
    #[serde(rename = "30E+/360")]
    Thirty360EPlus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonthConvention {
    #[serde(rename = "ACT")]
    Act,
    #[serde(rename = "30U")]
    ThirtyUs,
    #[serde(rename = "30E")]
    ThirtyE,
    #[serde(rename = "30E ISDA")]
    ThirtyEIsda,
    #[serde(rename = "30E+")]
    ThirtyEPlus,
}

/// Day adjustment rule shared by the 30/360 year and 30 month families.
#[derive(Clone, Copy)]
enum ThirtyRule {
    Us,
    European,
    Isda,
    EuropeanPlus,
}

impl YearConvention {
    pub const ALL: [YearConvention; 8] = [
        YearConvention::ActAct,
        YearConvention::Act365,
        YearConvention::Act360,
        YearConvention::Act364,
        YearConvention::Thirty360Us,
        YearConvention::Thirty360E,
        YearConvention::Thirty360EIsda,
        YearConvention::Thirty360EPlus,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            YearConvention::ActAct => "ACT/ACT",
            YearConvention::Act365 => "ACT/365",
            YearConvention::Act360 => "ACT/360",
            YearConvention::Act364 => "ACT/364",
            YearConvention::Thirty360Us => "30U/360",
            YearConvention::Thirty360E => "30E/360",
            YearConvention::Thirty360EIsda => "30E/360 ISDA",
            YearConvention::Thirty360EPlus => "30E+/360",
        }
    }
}

impl MonthConvention {
    pub const ALL: [MonthConvention; 5] = [
        MonthConvention::Act,
        MonthConvention::ThirtyUs,
        MonthConvention::ThirtyE,
        MonthConvention::ThirtyEIsda,
        MonthConvention::ThirtyEPlus,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MonthConvention::Act => "ACT",
            MonthConvention::ThirtyUs => "30U",
            MonthConvention::ThirtyE => "30E",
            MonthConvention::ThirtyEIsda => "30E ISDA",
            MonthConvention::ThirtyEPlus => "30E+",
        }
    }
}

impl fmt::Display for YearConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for MonthConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for YearConvention {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        YearConvention::ALL
            .into_iter()
            .find(|conv| conv.label() == s.trim())
            .ok_or_else(|| CalcError::UnknownConvention(s.to_string()))
    }
}

impl FromStr for MonthConvention {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonthConvention::ALL
            .into_iter()
            .find(|conv| conv.label() == s.trim())
            .ok_or_else(|| CalcError::UnknownConvention(s.to_string()))
    }
}

fn ensure_ordered(beg: NaiveDate, end: NaiveDate) -> CalcResult<()> {
    if end < beg {
        return Err(CalcError::InvertedInterval { beg, end });
    }
    Ok(())
}

fn next_day(date: NaiveDate) -> CalcResult<NaiveDate> {
    date.succ_opt().ok_or(CalcError::DateOutOfRange)
}

/// Day difference under a 30-day-month rule, i.e. `360*dy + 30*dm + dd`.
fn thirty_day_span(beg: NaiveDate, end: NaiveDate, rule: ThirtyRule) -> i64 {
    let (y1, m1, mut d1) = (beg.year() as i64, beg.month() as i64, beg.day() as i64);
    let (y2, mut m2, mut d2) = (end.year() as i64, end.month() as i64, end.day() as i64);
    match rule {
        ThirtyRule::Us => {
            if d2 == 31 && d1 >= 30 {
                d2 = 30;
            }
            if d1 == 31 {
                d1 = 30;
            }
        }
        ThirtyRule::European => {
            d1 = d1.min(30);
            d2 = d2.min(30);
        }
        ThirtyRule::Isda => {
            if is_last_day_of_month(beg) {
                d1 = 30;
            }
            if is_last_day_of_month(end) {
                d2 = 30;
            }
        }
        ThirtyRule::EuropeanPlus => {
            d1 = d1.min(30);
            if d2 == 31 {
                m2 += 1;
                d2 = 1;
            }
        }
    }
    360 * (y2 - y1) + 30 * (m2 - m1) + (d2 - d1)
}

/// Splits the actual days of `[from, to)` into non-leap and leap year days.
fn split_by_leap(from: NaiveDate, to: NaiveDate) -> CalcResult<(i64, i64)> {
    let mut nonleap = 0;
    let mut leap = 0;
    let mut cursor = from;
    while cursor.year() < to.year() {
        let next_year =
            NaiveDate::from_ymd_opt(cursor.year() + 1, 1, 1).ok_or(CalcError::DateOutOfRange)?;
        let days = (next_year - cursor).num_days();
        if is_leap_year(cursor.year()) {
            leap += days;
        } else {
            nonleap += days;
        }
        cursor = next_year;
    }
    let days = (to - cursor).num_days();
    if is_leap_year(cursor.year()) {
        leap += days;
    } else {
        nonleap += days;
    }
    Ok((nonleap, leap))
}

/// Year fraction between `beg` (excluded) and `end` (included).
pub fn year_factor(beg: NaiveDate, end: NaiveDate, conv: YearConvention) -> CalcResult<f64> {
    ensure_ordered(beg, end)?;

    let actual = |denominator: f64| -> CalcResult<f64> {
        let from = next_day(beg)?;
        let to = next_day(end)?;
        Ok((to - from).num_days() as f64 / denominator)
    };

    match conv {
        YearConvention::ActAct => {
            let (nonleap, leap) = split_by_leap(next_day(beg)?, next_day(end)?)?;
            Ok(nonleap as f64 / 365.0 + leap as f64 / 366.0)
        }
        YearConvention::Act365 => actual(365.0),
        YearConvention::Act360 => actual(360.0),
        YearConvention::Act364 => actual(364.0),
        YearConvention::Thirty360Us => Ok(thirty_day_span(beg, end, ThirtyRule::Us) as f64 / 360.0),
        YearConvention::Thirty360E => {
            Ok(thirty_day_span(beg, end, ThirtyRule::European) as f64 / 360.0)
        }
        YearConvention::Thirty360EIsda => {
            Ok(thirty_day_span(beg, end, ThirtyRule::Isda) as f64 / 360.0)
        }
        YearConvention::Thirty360EPlus => {
            Ok(thirty_day_span(beg, end, ThirtyRule::EuropeanPlus) as f64 / 360.0)
        }
    }
}

/// Month fraction between `beg` (excluded) and `end` (included).
pub fn month_factor(beg: NaiveDate, end: NaiveDate, conv: MonthConvention) -> CalcResult<f64> {
    ensure_ordered(beg, end)?;

    match conv {
        MonthConvention::Act => actual_months(beg, end),
        MonthConvention::ThirtyUs => Ok(thirty_day_span(beg, end, ThirtyRule::Us) as f64 / 30.0),
        MonthConvention::ThirtyE => {
            Ok(thirty_day_span(beg, end, ThirtyRule::European) as f64 / 30.0)
        }
        MonthConvention::ThirtyEIsda => {
            Ok(thirty_day_span(beg, end, ThirtyRule::Isda) as f64 / 30.0)
        }
        MonthConvention::ThirtyEPlus => {
            Ok(thirty_day_span(beg, end, ThirtyRule::EuropeanPlus) as f64 / 30.0)
        }
    }
}

fn actual_months(beg: NaiveDate, end: NaiveDate) -> CalcResult<f64> {
    if beg == end {
        return Ok(0.0);
    }
    let start = next_day(beg)?;
    let (mut year, mut month, mut day) = (start.year(), start.month(), start.day());
    let mut months = 0.0;
    while year < end.year() || month != end.month() {
        if day == 1 {
            months += 1.0;
        } else {
            let length = days_in_month(year, month);
            months += (length - day + 1) as f64 / length as f64;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
        day = 1;
    }
    months += (end.day() as f64 - day as f64 + 1.0) / days_in_month(year, month) as f64;
    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn close(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn year_factors_match_reference_values() {
        let (beg, end) = (ymd(2011, 7, 12), ymd(2016, 7, 5));
        let cases = [
            (YearConvention::ActAct, 4.9821618384609625),
            (YearConvention::Act365, 1820.0 / 365.0),
            (YearConvention::Act360, 1820.0 / 360.0),
            (YearConvention::Act364, 1820.0 / 364.0),
            (YearConvention::Thirty360Us, 1793.0 / 360.0),
            (YearConvention::Thirty360E, 1793.0 / 360.0),
            (YearConvention::Thirty360EIsda, 1793.0 / 360.0),
            (YearConvention::Thirty360EPlus, 1793.0 / 360.0),
        ];
        for (conv, expected) in cases {
            let got = year_factor(beg, end, conv).unwrap();
            assert!(close(got, expected), "{conv}: {got} != {expected}");
        }
    }

    #[test]
    fn thirty_us_end_of_month() {
        let got = year_factor(ymd(2011, 7, 30), ymd(2016, 7, 31), YearConvention::Thirty360Us);
        assert!(close(got.unwrap(), 5.0));
        let got = month_factor(ymd(2011, 7, 30), ymd(2016, 7, 31), MonthConvention::ThirtyUs);
        assert!(close(got.unwrap(), 60.0));
    }

    #[test]
    fn european_plus_rolls_into_next_month() {
        let got = year_factor(ymd(2016, 1, 15), ymd(2016, 3, 31), YearConvention::Thirty360EPlus);
        // 30*(4-1) + (1-15) = 76
        assert!(close(got.unwrap(), 76.0 / 360.0));
    }

    #[test]
    fn isda_treats_february_end_as_thirtieth() {
        let got = month_factor(ymd(2015, 2, 28), ymd(2015, 3, 31), MonthConvention::ThirtyEIsda);
        assert!(close(got.unwrap(), 1.0));
    }

    #[test]
    fn month_factors_match_reference_values() {
        let (beg, end) = (ymd(2011, 7, 12), ymd(2016, 7, 5));
        let got = month_factor(beg, end, MonthConvention::Act).unwrap();
        assert!(close(got, 59.774193548387096));
        for conv in [
            MonthConvention::ThirtyUs,
            MonthConvention::ThirtyE,
            MonthConvention::ThirtyEIsda,
            MonthConvention::ThirtyEPlus,
        ] {
            assert!(close(month_factor(beg, end, conv).unwrap(), 1793.0 / 30.0));
        }
    }

    #[test]
    fn empty_interval_on_month_end_is_zero() {
        let day = ymd(2016, 7, 31);
        assert_eq!(month_factor(day, day, MonthConvention::Act).unwrap(), 0.0);
        assert_eq!(year_factor(day, day, YearConvention::ActAct).unwrap(), 0.0);
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let err = year_factor(ymd(2011, 7, 12), ymd(2011, 7, 11), YearConvention::ActAct);
        assert!(matches!(err, Err(CalcError::InvertedInterval { .. })));
        let err = month_factor(ymd(2011, 7, 12), ymd(2011, 7, 11), MonthConvention::Act);
        assert!(matches!(err, Err(CalcError::InvertedInterval { .. })));
    }

    #[test]
    fn labels_round_trip_and_unknown_fails() {
        assert_eq!("30E/360 ISDA".parse::<YearConvention>().unwrap(), YearConvention::Thirty360EIsda);
        assert_eq!("30E+".parse::<MonthConvention>().unwrap(), MonthConvention::ThirtyEPlus);
        assert!("ACT/XXX".parse::<YearConvention>().is_err());
        assert!("XXX".parse::<MonthConvention>().is_err());
        let json = serde_json::to_string(&YearConvention::Thirty360EPlus).unwrap();
        assert_eq!(json, "\"30E+/360\"");
    }
}
