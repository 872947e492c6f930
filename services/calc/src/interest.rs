//! Interest accrued on a principal between two dates.
//!
//! Contractual models use a fixed rate and a day-count convention. The
//! statutory default-interest regimes derive the rate from the CNB
//! discount or repo rate and report each rate they used.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    calendar::check_range,
    daycount::{month_factor, year_factor, MonthConvention, YearConvention},
    error::{CalcError, CalcResult},
    rates::{RateKind, RateSource},
};

/// Statutory default-interest regimes, in the order they were enacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatutoryRegime {
    /// Twice the discount rate in force on the default date.
    #[serde(rename = "discount_doubled")]
    DiscountDoubled,
    /// REPO + 7 pp, reset on every 1 January and 1 July.
    #[serde(rename = "floating_repo_plus_7")]
    FloatingRepoPlus7,
    /// REPO + 7 pp as of the last day of the preceding half-year.
    #[serde(rename = "repo_plus_7")]
    RepoPlus7,
    /// REPO + 8 pp as of the last day of the preceding half-year.
    #[serde(rename = "repo_plus_8")]
    RepoPlus8,
    /// REPO + 8 pp as of the first day of the half-year of default.
    #[serde(rename = "repo_plus_8_half_year_start")]
    RepoPlus8HalfYearStart,
    /// 0.25 % of the principal per day.
    #[serde(rename = "quarter_percent_per_day")]
    QuarterPercentPerDay,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum InterestModel {
    #[default]
    None,
    Fixed { amount: f64 },
    /// `rate` in percent per annum.
    PerAnnum { rate: f64, convention: YearConvention },
    /// `rate` in percent per month.
    PerMensem { rate: f64, convention: MonthConvention },
    /// `rate` in per mille per day.
    PerDiem { rate: f64 },
    Statutory { regime: StatutoryRegime },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Accrual {
    pub amount: f64,
    /// Rates looked up by the statutory regimes, keyed by their reference date.
    pub rates_used: BTreeMap<NaiveDate, f64>,
}

impl Accrual {
    fn flat(amount: f64) -> Self {
        Accrual {
            amount,
            rates_used: BTreeMap::new(),
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> CalcResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(CalcError::DateOutOfRange)
}

fn half_year_start(date: NaiveDate) -> CalcResult<NaiveDate> {
    ymd(date.year(), if date.month() > 6 { 7 } else { 1 }, 1)
}

fn half_year_end(date: NaiveDate) -> CalcResult<NaiveDate> {
    if date.month() > 6 {
        ymd(date.year(), 12, 31)
    } else {
        ymd(date.year(), 6, 30)
    }
}

fn preceding_half_year_end(date: NaiveDate) -> CalcResult<NaiveDate> {
    if date.month() > 6 {
        ymd(date.year(), 6, 30)
    } else {
        ymd(date.year() - 1, 12, 31)
    }
}

struct RateLog<'a, R: ?Sized> {
    rates: &'a R,
    used: BTreeMap<NaiveDate, f64>,
}

impl<'a, R: RateSource + ?Sized> RateLog<'a, R> {
    fn new(rates: &'a R) -> Self {
        RateLog {
            rates,
            used: BTreeMap::new(),
        }
    }

    fn get(&mut self, kind: RateKind, date: NaiveDate) -> CalcResult<f64> {
        let rate = self
            .rates
            .rate(kind, date)
            .ok_or_else(|| CalcError::MissingRate {
                kind: kind.code().to_string(),
                date,
            })?;
        tracing::debug!(kind = %kind, %date, rate, "statutory rate");
        self.used.insert(date, rate);
        Ok(rate)
    }

    fn finish(self, amount: f64) -> Accrual {
        Accrual {
            amount,
            rates_used: self.used,
        }
    }
}

/// Interest on `principal` for `(past, present]`.
///
/// `past` is the end of the previous period; it is `None` only for the first
/// period, where a fixed charge is due. Interest never accrues before the
/// default date.
pub fn accrue<R: RateSource + ?Sized>(
    past: Option<NaiveDate>,
    present: NaiveDate,
    principal: f64,
    default_date: NaiveDate,
    model: &InterestModel,
    rates: &R,
) -> CalcResult<Accrual> {
    for date in past.into_iter().chain([present, default_date]) {
        check_range(date)?;
    }
    match model {
        InterestModel::None => return Ok(Accrual::flat(0.0)),
        InterestModel::Fixed { amount } => {
            return Ok(Accrual::flat(if past.is_some() { 0.0 } else { *amount }));
        }
        _ => {}
    }

    let past = match past {
        Some(past) if past <= present => past,
        _ => return Err(CalcError::InvalidPeriod),
    };
    let floor = default_date.pred_opt().ok_or(CalcError::DateOutOfRange)?;
    let past = past.max(floor);
    if past >= present {
        return Ok(Accrual::flat(0.0));
    }

    let amount = match model {
        InterestModel::None | InterestModel::Fixed { .. } => 0.0,
        InterestModel::PerAnnum { rate, convention } => {
            principal * year_factor(past, present, *convention)? * rate / 100.0
        }
        InterestModel::PerMensem { rate, convention } => {
            principal * month_factor(past, present, *convention)? * rate / 100.0
        }
        InterestModel::PerDiem { rate } => {
            principal * (present - past).num_days() as f64 * rate / 1000.0
        }
        InterestModel::Statutory { regime } => {
            return statutory(past, present, principal, default_date, *regime, rates);
        }
    };
    Ok(Accrual::flat(amount))
}

fn statutory<R: RateSource + ?Sized>(
    past: NaiveDate,
    present: NaiveDate,
    principal: f64,
    default_date: NaiveDate,
    regime: StatutoryRegime,
    rates: &R,
) -> CalcResult<Accrual> {
    let mut log = RateLog::new(rates);
    let years = || year_factor(past, present, YearConvention::ActAct);

    let amount = match regime {
        StatutoryRegime::DiscountDoubled => {
            let rate = log.get(RateKind::Disc, default_date)?;
            principal * years()? * rate / 50.0
        }
        StatutoryRegime::FloatingRepoPlus7 => {
            let mut weighted = 0.0;
            let mut from = past;
            loop {
                let first = from.succ_opt().ok_or(CalcError::DateOutOfRange)?;
                let rate = log.get(RateKind::Repo, half_year_start(first)?)? + 7.0;
                let end = half_year_end(first)?;
                if end < present {
                    weighted += year_factor(from, end, YearConvention::ActAct)? * rate;
                    from = end;
                } else {
                    weighted += year_factor(from, present, YearConvention::ActAct)? * rate;
                    break;
                }
            }
            principal * weighted / 100.0
        }
        StatutoryRegime::RepoPlus7 => {
            let rate = log.get(RateKind::Repo, preceding_half_year_end(default_date)?)?;
            principal * years()? * (rate + 7.0) / 100.0
        }
        StatutoryRegime::RepoPlus8 => {
            let rate = log.get(RateKind::Repo, preceding_half_year_end(default_date)?)?;
            principal * years()? * (rate + 8.0) / 100.0
        }
        StatutoryRegime::RepoPlus8HalfYearStart => {
            let rate = log.get(RateKind::Repo, half_year_start(default_date)?)?;
            principal * years()? * (rate + 8.0) / 100.0
        }
        StatutoryRegime::QuarterPercentPerDay => {
            principal * (present - past).num_days() as f64 / 400.0
        }
    };
    Ok(log.finish(amount))
}
