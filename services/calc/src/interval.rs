//! Length of a time interval in every supported measure.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    calendar::{add_months, add_years, business_days, calendar_epoch, check_range},
    daycount::{month_factor, year_factor, MonthConvention, YearConvention},
    error::{CalcError, CalcResult},
    format::{grammar, GR_BUSDAY, GR_DAY, GR_MONTH, GR_YEAR},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub years: i32,
    pub months: i32,
    pub days: i64,
}

impl Span {
    /// "2 roky 3 měsíce 5 dnů"
    pub fn describe(&self) -> String {
        format!(
            "{} {} {}",
            grammar(self.years.into(), &GR_YEAR),
            grammar(self.months.into(), &GR_MONTH),
            grammar(self.days, &GR_DAY)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Factor<C> {
    pub convention: C,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntervalReport {
    pub beg: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
    /// Absent before the calendar epoch.
    pub business_days: Option<i64>,
    pub span: Span,
    pub year_factors: Vec<Factor<YearConvention>>,
    pub month_factors: Vec<Factor<MonthConvention>>,
}

impl IntervalReport {
    /// Human-readable lines in the order the measures are computed.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![grammar(self.days, &GR_DAY)];
        if let Some(business) = self.business_days {
            lines.push(grammar(business, &GR_BUSDAY));
        }
        lines.push(self.span.describe());
        lines.extend(self.year_factors.iter().map(|factor| {
            format!("{} let ({})", decimal_comma(factor.value), factor.convention)
        }));
        lines.extend(self.month_factors.iter().map(|factor| {
            format!("{} měsíců ({})", decimal_comma(factor.value), factor.convention)
        }));
        lines
    }
}

fn decimal_comma(value: f64) -> String {
    format!("{value:.6}").replace('.', ",")
}

/// Whole years, then whole months, then remaining days. Each step shifts
/// from `beg` so that month-end clamping does not accumulate.
fn span(beg: NaiveDate, end: NaiveDate) -> CalcResult<Span> {
    let mut years = 0;
    while add_years(beg, years + 1)? <= end {
        years += 1;
    }
    let anchor = add_years(beg, years)?;
    let mut months = 0;
    while add_months(anchor, months + 1)? <= end {
        months += 1;
    }
    let anchor = add_months(anchor, months)?;
    Ok(Span {
        years,
        months,
        days: (end - anchor).num_days(),
    })
}

pub fn measure(beg: NaiveDate, end: NaiveDate) -> CalcResult<IntervalReport> {
    check_range(beg)?;
    check_range(end)?;
    if beg >= end {
        return Err(CalcError::EmptyInterval { beg, end });
    }

    let year_factors = YearConvention::ALL
        .into_iter()
        .map(|convention| {
            Ok(Factor {
                convention,
                value: year_factor(beg, end, convention)?,
            })
        })
        .collect::<CalcResult<Vec<_>>>()?;
    let month_factors = MonthConvention::ALL
        .into_iter()
        .map(|convention| {
            Ok(Factor {
                convention,
                value: month_factor(beg, end, convention)?,
            })
        })
        .collect::<CalcResult<Vec<_>>>()?;

    Ok(IntervalReport {
        beg,
        end,
        days: (end - beg).num_days(),
        business_days: (beg >= calendar_epoch()).then(|| business_days(beg, end)),
        span: span(beg, end)?,
        year_factors,
        month_factors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted() {
        let day = ymd(2016, 7, 5);
        assert_eq!(
            measure(day, day).unwrap_err(),
            CalcError::EmptyInterval { beg: day, end: day }
        );
        assert!(measure(day, ymd(2016, 7, 4)).is_err());
    }

    #[test]
    fn rejects_dates_out_of_range() {
        assert_eq!(
            measure(ymd(1925, 4, 15), ymd(3000, 1, 1)).unwrap_err(),
            CalcError::DateOutOfRange
        );
        assert_eq!(
            measure(ymd(1582, 12, 31), ymd(2016, 1, 1)).unwrap_err(),
            CalcError::DateOutOfRange
        );
        assert!(measure(ymd(1583, 1, 1), ymd(2999, 12, 31)).is_ok());
    }

    #[test]
    fn reports_all_measures() {
        let report = measure(ymd(2011, 7, 12), ymd(2016, 7, 5)).unwrap();
        assert_eq!(report.days, 1820);
        assert_eq!(
            report.span,
            Span {
                years: 4,
                months: 11,
                days: 23
            }
        );
        assert_eq!(report.year_factors.len(), YearConvention::ALL.len());
        assert_eq!(report.month_factors.len(), MonthConvention::ALL.len());
        assert_eq!(report.year_factors[0].value, 4.9821618384609625);
        assert_eq!(report.month_factors[0].value, 59.774193548387096);
        assert!(report.business_days.is_some());
    }

    #[test]
    fn span_clamps_from_month_end() {
        let report = measure(ymd(2016, 1, 31), ymd(2016, 3, 30)).unwrap();
        assert_eq!(
            report.span,
            Span {
                years: 0,
                months: 1,
                days: 30
            }
        );
        assert_eq!(report.span.describe(), "0 let 1 měsíc 30 dnů");
    }

    #[test]
    fn no_business_days_before_epoch() {
        let report = measure(ymd(1920, 1, 1), ymd(1921, 1, 1)).unwrap();
        assert_eq!(report.business_days, None);
        assert_eq!(report.span.years, 1);
        assert_eq!(report.lines()[1], "1 rok 0 měsíců 0 dnů");
    }

    #[test]
    fn business_days_over_christmas() {
        let report = measure(ymd(2016, 12, 23), ymd(2016, 12, 27)).unwrap();
        assert_eq!(report.business_days, Some(1));
        assert_eq!(report.lines()[1], "1 pracovní den");
    }
}
