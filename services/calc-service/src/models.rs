use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use legal_calc::{Balances, Deadline, InterestModel, IntervalReport, Ledger};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub beg_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct IntervalResponse {
    #[serde(flatten)]
    pub report: IntervalReport,
    pub lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InterestRequest {
    pub principal: f64,
    pub default_date: NaiveDate,
    /// End of the previous period; omitted for the first one.
    pub past_date: Option<NaiveDate>,
    pub present_date: NaiveDate,
    pub model: InterestModel,
}

#[derive(Debug, Serialize)]
pub struct InterestResponse {
    pub amount: f64,
    /// Czech formatting, e.g. `1.234,50`.
    pub amount_text: String,
    pub rates_used: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Serialize)]
pub struct HolidayResponse {
    pub date: NaiveDate,
    pub holiday: bool,
    pub easter_sunday: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct ConventionsResponse {
    pub year: Vec<&'static str>,
    pub month: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct DeadlineRequest {
    pub beg_date: NaiveDate,
    /// Negative to count backwards.
    pub dur: i32,
    /// `d`, `w`, `m`, `y` or `b`.
    pub unit: String,
}

#[derive(Debug, Serialize)]
pub struct DeadlineResponse {
    #[serde(flatten)]
    pub deadline: Deadline,
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DebtResponse {
    pub ledger: Ledger,
    /// Absent when a row failed.
    pub closing: Option<Balances>,
    pub total_text: Option<String>,
    /// Message of the first failed row.
    pub error: Option<String>,
}
