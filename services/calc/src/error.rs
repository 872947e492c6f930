use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::{max_date, min_date};
use crate::format::format_date;

pub type CalcResult<T> = Result<T, CalcError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("unknown day count convention: {0}")]
    UnknownConvention(String),

    /// The end of an interval lies before its beginning.
    #[error("interval end {end} precedes its beginning {beg}")]
    InvertedInterval { beg: NaiveDate, end: NaiveDate },

    /// Interval calculations need a strictly positive span.
    #[error("interval beginning {beg} must precede its end {end}")]
    EmptyInterval { beg: NaiveDate, end: NaiveDate },

    #[error("interest period is missing or invalid")]
    InvalidPeriod,

    #[error("no {kind} rate valid on {date}")]
    MissingRate { kind: String, date: NaiveDate },

    /// Dates are accepted from 1583-01-01 through 2999-12-31.
    #[error("date out of supported range")]
    DateOutOfRange,

    #[error("deadline start out of supported range")]
    StartOutOfRange,

    #[error("deadline length must be between -999 and 999")]
    DurationOutOfRange,

    #[error("deadline end out of supported range")]
    ResultOutOfRange,

    #[error("unknown unit: {0}")]
    UnknownUnit(String),
}

impl CalcError {
    /// Czech message shown to end users.
    pub fn user_message(&self) -> String {
        let range = || format!("{} a {}", format_date(min_date()), format_date(max_date()));
        match self {
            CalcError::EmptyInterval { .. } | CalcError::InvertedInterval { .. } => {
                "Počátek musí předcházet konci".to_string()
            }
            CalcError::InvalidPeriod => "Chybný interval".to_string(),
            CalcError::MissingRate { .. } => "Chybné datum, data nejsou k disposici".to_string(),
            CalcError::DateOutOfRange => format!("Datum musí být mezi {}", range()),
            CalcError::StartOutOfRange => format!("Počátek musí být mezi {}", range()),
            CalcError::ResultOutOfRange => format!("Výsledek musí být mezi {}", range()),
            CalcError::DurationOutOfRange => "Délka musí být mezi -999 a 999".to_string(),
            CalcError::UnknownUnit(_) => "Neznámá jednotka".to_string(),
            CalcError::UnknownConvention(_) => "Chybné zadání, prosím, opravte údaje".to_string(),
        }
    }
}
