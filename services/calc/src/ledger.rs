//! History of a money debt: debits, credits and balance checks, with
//! interest accrued between consecutive movements.
//!
//! Movements are processed by date; on the same day debits come first,
//! then credits, then balance checks. A balance check reports the state
//! including interest accrued up to its date but leaves the running state
//! untouched. Once interest cannot be computed (a rate is missing), the
//! remaining rows carry no balances.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    calendar::{add_months, check_range},
    error::{CalcError, CalcResult},
    format::{format_amount, format_whole},
    interest::{accrue, InterestModel, StatutoryRegime},
    rates::RateSource,
};

/// Minimum monthly charge of the per-day penalty, in CZK only.
const QUARTER_PERCENT_MINIMUM_CZK: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentPreference {
    Interest,
    Principal,
}

impl RepaymentPreference {
    pub fn code(&self) -> &'static str {
        match self {
            RepaymentPreference::Interest => "interest",
            RepaymentPreference::Principal => "principal",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RepaymentPreference::Interest => "úrok",
            RepaymentPreference::Principal => "jistina",
        }
    }

    /// Accepts either the code or the Czech label.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        [RepaymentPreference::Interest, RepaymentPreference::Principal]
            .into_iter()
            .find(|pref| pref.code() == value || pref.label() == value)
    }
}

/// Processing order of movements that share a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
    Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transaction_type", rename_all = "snake_case")]
pub enum Movement {
    Debit {
        amount: f64,
    },
    Credit {
        amount: f64,
        repayment_preference: RepaymentPreference,
    },
    /// Reports the balance without changing it.
    Balance,
}

impl Movement {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Movement::Debit { .. } => TransactionKind::Debit,
            Movement::Credit { .. } => TransactionKind::Credit,
            Movement::Balance => TransactionKind::Balance,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Movement::Debit { amount } | Movement::Credit { amount, .. } => *amount,
            Movement::Balance => 0.0,
        }
    }

    fn preference(&self) -> Option<RepaymentPreference> {
        match self {
            Movement::Credit {
                repayment_preference,
                ..
            } => Some(*repayment_preference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub movement: Movement,
}

fn default_currency() -> String {
    "CZK".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub internal_note: String,
    /// ISO 4217 code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Decimal places amounts and accrued interest are rounded to.
    #[serde(default)]
    pub rounding: u32,
    #[serde(default)]
    pub interest: InterestModel,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Default for Debt {
    fn default() -> Self {
        Debt {
            title: String::new(),
            note: String::new(),
            internal_note: String::new(),
            currency: default_currency(),
            rounding: 0,
            interest: InterestModel::None,
            transactions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Balances {
    pub pre_principal: f64,
    pub pre_interest: f64,
    pub pre_total: f64,
    pub change_principal: f64,
    pub change_interest: f64,
    pub post_principal: f64,
    pub post_interest: f64,
    pub post_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRow {
    /// 1-based position in the input.
    pub id: usize,
    pub date: NaiveDate,
    pub description: String,
    pub kind: TransactionKind,
    pub repayment: Option<RepaymentPreference>,
    /// Positive for debits, negative for credits.
    pub change: f64,
    /// Absent once an earlier row failed.
    pub balances: Option<Balances>,
    pub err: bool,
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    /// The day after the first debit.
    pub default_date: Option<NaiveDate>,
    pub rows: Vec<LedgerRow>,
    pub rates_used: BTreeMap<NaiveDate, f64>,
}

impl Ledger {
    pub fn has_error(&self) -> bool {
        self.rows.iter().any(|row| row.err)
    }

    /// Balances after the last row, unless the ledger failed.
    pub fn closing(&self) -> Option<Balances> {
        if self.has_error() {
            return None;
        }
        self.rows.last().and_then(|row| row.balances)
    }
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round_ties_even() / scale
}

pub fn display_currency(currency: &str) -> &str {
    if currency == "CZK" {
        "Kč"
    } else {
        currency
    }
}

/// `1.234 Kč` for whole amounts, `1.234,50 EUR` otherwise.
pub fn format_money(amount: f64, rounding: u32, currency: &str) -> String {
    let number = if rounding == 0 {
        format_whole(amount.round_ties_even() as i64)
    } else {
        format_amount(round_to(amount, rounding))
    };
    format!("{} {}", number.replace('-', "−"), display_currency(currency))
}

/// Splits a credit between principal and interest. Whatever exceeds both
/// reduces the principal below zero.
fn settle(
    principal: &mut f64,
    interest: f64,
    mut amount: f64,
    preference: RepaymentPreference,
) -> (f64, f64) {
    match preference {
        RepaymentPreference::Principal => {
            let to_principal = if amount > *principal { *principal } else { amount };
            amount -= to_principal;
            let to_interest = if amount > interest { interest } else { amount };
            amount -= to_interest;
            *principal -= amount;
            (to_principal, to_interest)
        }
        RepaymentPreference::Interest => {
            let to_interest = if amount > interest { interest } else { amount };
            (amount - to_interest, to_interest)
        }
    }
}

fn new_row(id: usize, trn: &Transaction, rounding: u32) -> (LedgerRow, f64) {
    let amount = round_to(trn.movement.amount(), rounding);
    let change = match trn.movement {
        Movement::Debit { .. } => amount,
        Movement::Credit { .. } => -amount,
        Movement::Balance => 0.0,
    };
    let row = LedgerRow {
        id,
        date: trn.date,
        description: trn.description.clone(),
        kind: trn.movement.kind(),
        repayment: trn.movement.preference(),
        change,
        balances: None,
        err: false,
        msg: None,
    };
    (row, amount)
}

/// Computes the history of `debt`.
pub fn rows<R: RateSource + ?Sized>(debt: &Debt, rates: &R) -> CalcResult<Ledger> {
    for trn in &debt.transactions {
        check_range(trn.date)?;
    }

    let mut order: Vec<(usize, &Transaction)> = debt
        .transactions
        .iter()
        .enumerate()
        .map(|(index, trn)| (index + 1, trn))
        .collect();
    order.sort_by_key(|(_, trn)| (trn.date, trn.movement.kind()));

    let default_date = order
        .iter()
        .find(|(_, trn)| trn.movement.kind() == TransactionKind::Debit)
        .map(|(_, trn)| trn.date.succ_opt().ok_or(CalcError::DateOutOfRange))
        .transpose()?;

    if debt.interest
        == (InterestModel::Statutory {
            regime: StatutoryRegime::QuarterPercentPerDay,
        })
    {
        return quarter_percent_rows(debt, &order, default_date);
    }

    let mut ledger = Ledger {
        default_date,
        ..Ledger::default()
    };
    let (mut principal, mut interest) = (0.0, 0.0);
    let mut last: Option<NaiveDate> = None;
    let mut failed = false;

    for (id, trn) in order {
        let (mut row, amount) = new_row(id, trn, debt.rounding);
        if !failed {
            let (old_principal, old_interest) = (principal, interest);
            let accrues = matches!(debt.interest, InterestModel::Fixed { .. })
                || (last.is_some() && debt.interest != InterestModel::None && principal > 0.0);
            if accrues {
                let since = default_date.unwrap_or(trn.date);
                match accrue(last, trn.date, principal, since, &debt.interest, rates) {
                    Ok(accrual) => {
                        interest += round_to(accrual.amount, debt.rounding);
                        ledger.rates_used.extend(accrual.rates_used);
                    }
                    Err(err) => {
                        tracing::debug!(row = id, error = %err, "interest not computed");
                        failed = true;
                        row.msg = Some(err.user_message());
                    }
                }
            }

            let mut balances = Balances::default();
            if row.kind != TransactionKind::Balance {
                balances.pre_principal = principal;
                balances.pre_interest = interest;
                balances.pre_total = principal + interest;
            }
            let (to_principal, to_interest) = match trn.movement {
                Movement::Debit { .. } => (-amount, 0.0),
                Movement::Credit {
                    repayment_preference,
                    ..
                } => settle(&mut principal, interest, amount, repayment_preference),
                Movement::Balance => (0.0, 0.0),
            };
            principal -= to_principal;
            interest -= to_interest;
            balances.change_principal = -to_principal;
            balances.change_interest = -to_interest;
            balances.post_principal = principal;
            balances.post_interest = interest;
            balances.post_total = principal + interest;
            row.balances = Some(balances);

            if row.kind == TransactionKind::Balance {
                principal = old_principal;
                interest = old_interest;
            } else {
                last = Some(trn.date);
            }
        }
        row.err = failed;
        ledger.rows.push(row);
    }
    Ok(ledger)
}

/// The per-day penalty of 0.25 % of the principal, charged at least
/// 25 CZK for every started month of default. Interest is not rounded.
fn quarter_percent_rows(
    debt: &Debt,
    order: &[(usize, &Transaction)],
    default_date: Option<NaiveDate>,
) -> CalcResult<Ledger> {
    let mut ledger = Ledger {
        default_date,
        ..Ledger::default()
    };
    let (Some((_, first)), Some((_, last))) = (order.first(), order.last()) else {
        return Ok(ledger);
    };
    let minimum = if debt.currency == "CZK" {
        QUARTER_PERCENT_MINIMUM_CZK
    } else {
        0.0
    };

    let (mut principal, mut interest) = (0.0, 0.0);
    // Charged so far in the current month, and what the daily rate adds up to.
    let (mut charged, mut running) = (0.0, 0.0);
    let mut next_reset = default_date;
    let mut months = 0;
    let mut pending = order.iter().peekable();

    for day in first.date.iter_days().take_while(|day| *day <= last.date) {
        let reset = next_reset == Some(day);
        if reset {
            running = 0.0;
            charged = minimum;
        }
        running += f64::max(principal / 400.0, 0.0);
        let mut due = 0.0;
        if running > charged {
            due = running - charged;
            charged = running;
        }
        if reset {
            due += minimum;
            months += 1;
            next_reset = default_date
                .map(|date| add_months(date, months))
                .transpose()?;
        }
        interest += due;

        while let Some((id, trn)) = pending.next_if(|(_, trn)| trn.date == day) {
            let (mut row, amount) = new_row(*id, trn, debt.rounding);
            let mut balances = Balances::default();
            if row.kind != TransactionKind::Balance {
                balances.pre_principal = principal;
                balances.pre_interest = interest;
                balances.pre_total = principal + interest;
            }
            let (to_principal, to_interest) = match trn.movement {
                Movement::Debit { .. } => {
                    principal += amount;
                    (-amount, 0.0)
                }
                Movement::Credit {
                    repayment_preference,
                    ..
                } => {
                    let split = settle(&mut principal, interest, amount, repayment_preference);
                    principal -= split.0;
                    interest -= split.1;
                    split
                }
                Movement::Balance => (0.0, 0.0),
            };
            balances.change_principal = -to_principal;
            balances.change_interest = -to_interest;
            balances.post_principal = principal;
            balances.post_interest = interest;
            balances.post_total = principal + interest;
            row.balances = Some(balances);
            ledger.rows.push(row);
        }
    }
    Ok(ledger)
}
