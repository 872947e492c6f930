//! End of a statutory or contractual period counted from a start date.
//!
//! A period ending on a weekend or public holiday moves to the next working
//! day (the previous one when counting backwards).

use std::{fmt, str::FromStr};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    calendar::{add_months, calendar_epoch, in_range, is_holiday, max_date, min_date},
    error::{CalcError, CalcResult},
    format::{between, format_date, format_weekday_date},
};

pub const MIN_DURATION: i32 = -999;
pub const MAX_DURATION: i32 = 999;

/// Appended when the result falls where the holiday table is incomplete.
pub const UNCERTAIN_NOTE: &str = "(evidence pracovních dnů v tomto období není úplná)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "m")]
    Month,
    #[serde(rename = "y")]
    Year,
    /// Counts working days only.
    #[serde(rename = "b")]
    BusinessDay,
}

impl Unit {
    pub const ALL: [Unit; 5] = [
        Unit::Day,
        Unit::Week,
        Unit::Month,
        Unit::Year,
        Unit::BusinessDay,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Unit::Day => "d",
            Unit::Week => "w",
            Unit::Month => "m",
            Unit::Year => "y",
            Unit::BusinessDay => "b",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Unit {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .into_iter()
            .find(|unit| unit.code() == s.trim())
            .ok_or_else(|| CalcError::UnknownUnit(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deadline {
    pub beg: NaiveDate,
    pub dur: i32,
    pub unit: Unit,
    /// The raw end of the period.
    pub res: NaiveDate,
    /// `res` moved off weekends and holidays.
    pub bus: NaiveDate,
    pub uncertain: bool,
}

impl Deadline {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.res != self.bus {
            lines.push(format!("{} není pracovní den", format_date(self.res)));
        }
        lines.push(format_weekday_date(self.bus));
        if self.uncertain {
            lines.push(UNCERTAIN_NOTE.to_string());
        }
        lines
    }
}

fn skip_holidays(mut date: NaiveDate, step: Duration) -> NaiveDate {
    while is_holiday(date) {
        date += step;
    }
    date
}

pub fn deadline(beg: NaiveDate, dur: i32, unit: Unit) -> CalcResult<Deadline> {
    if !in_range(beg) {
        return Err(CalcError::StartOutOfRange);
    }
    if !between(MIN_DURATION, dur, MAX_DURATION) {
        return Err(CalcError::DurationOutOfRange);
    }
    let step = Duration::days(if dur < 0 { -1 } else { 1 });

    let res = match unit {
        Unit::Day => beg + Duration::days(dur.into()),
        Unit::Week => beg + Duration::weeks(dur.into()),
        Unit::Month | Unit::Year => {
            let months = if unit == Unit::Year { dur * 12 } else { dur };
            let year = beg.year() + (beg.month0() as i32 + months).div_euclid(12);
            if !between(min_date().year(), year, max_date().year()) {
                return Err(CalcError::ResultOutOfRange);
            }
            add_months(beg, months)?
        }
        Unit::BusinessDay => {
            let mut res = beg;
            for _ in 0..dur.unsigned_abs() {
                res = skip_holidays(res + step, step);
            }
            // A zero-length period starting on a holiday.
            skip_holidays(res, step)
        }
    };

    let bus = match unit {
        Unit::BusinessDay => res,
        _ => skip_holidays(res, step),
    };
    if !in_range(bus) {
        return Err(CalcError::ResultOutOfRange);
    }

    let epoch = calendar_epoch();
    Ok(Deadline {
        beg,
        dur,
        unit,
        res,
        bus,
        uncertain: res.min(bus) < epoch || (beg < epoch && unit == Unit::BusinessDay),
    })
}
