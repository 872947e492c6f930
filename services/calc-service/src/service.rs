use axum::http::StatusCode;
use chrono::{Datelike, NaiveDate, Utc};

use legal_calc::{
    accrue, calendar, deadline as compute_deadline, debt_from_xml, debt_to_xml,
    format::format_amount, format_money, ledger_file::BAD_FORMAT, ledger_to_csv, measure, rows,
    transactions_from_csv, CalcError, Debt, InterestModel, LedgerFileError, MonthConvention,
    RateTable, RowError, Transaction, Unit, YearConvention,
};
use legal_store::RateStore;

use crate::models::{
    ConventionsResponse, DeadlineRequest, DeadlineResponse, DebtResponse, ErrorResponse,
    HolidayResponse, InterestRequest, InterestResponse, IntervalRequest, IntervalResponse,
};
use crate::state::AppState;

/// Shown to users whenever their input cannot be processed.
pub const INVALID_INPUT: &str = "Chybné zadání, prosím, opravte údaje";

/// Shown when a ledger with a failed row is exported.
pub const LEDGER_FAILED: &str = "Výpočet obsahuje chyby, export není možný";

#[derive(Debug)]
pub struct ServiceError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ServiceError {
    pub fn new(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message,
                reasons: Vec::new(),
            },
        }
    }

    pub fn with_reasons(
        status: StatusCode,
        code: &'static str,
        message: String,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code,
                message,
                reasons,
            },
        }
    }

    pub fn invalid_input(reason: String) -> Self {
        Self::with_reasons(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_input",
            INVALID_INPUT.to_string(),
            vec![reason],
        )
    }
}

impl From<CalcError> for ServiceError {
    fn from(err: CalcError) -> Self {
        let (status, code) = match err {
            CalcError::EmptyInterval { .. }
            | CalcError::InvertedInterval { .. }
            | CalcError::InvalidPeriod => (StatusCode::BAD_REQUEST, "invalid_interval"),
            CalcError::DateOutOfRange
            | CalcError::StartOutOfRange
            | CalcError::ResultOutOfRange
            | CalcError::DurationOutOfRange => (StatusCode::BAD_REQUEST, "out_of_range"),
            CalcError::UnknownConvention(_) | CalcError::UnknownUnit(_) => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            CalcError::MissingRate { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "rate_unavailable")
            }
        };
        Self::with_reasons(status, code, err.user_message(), vec![err.to_string()])
    }
}

impl From<LedgerFileError> for ServiceError {
    fn from(err: LedgerFileError) -> Self {
        match err {
            LedgerFileError::Format(reason) => Self::with_reasons(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_file",
                BAD_FORMAT.to_string(),
                vec![reason],
            ),
            LedgerFileError::Rows(errors) => Self::with_reasons(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_rows",
                BAD_FORMAT.to_string(),
                errors.iter().map(RowError::to_string).collect(),
            ),
            LedgerFileError::LedgerFailed => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "ledger_failed",
                LEDGER_FAILED.to_string(),
            ),
            err @ (LedgerFileError::Xml(_) | LedgerFileError::Csv(_)) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "export_failed",
                err.to_string(),
            ),
        }
    }
}

pub fn interval(payload: IntervalRequest) -> Result<IntervalResponse, ServiceError> {
    let report = measure(payload.beg_date, payload.end_date)?;
    let lines = report.lines();
    Ok(IntervalResponse { report, lines })
}

fn validate_model(model: &InterestModel) -> Result<(), ServiceError> {
    let rate = match *model {
        InterestModel::PerAnnum { rate, .. }
        | InterestModel::PerMensem { rate, .. }
        | InterestModel::PerDiem { rate } => Some(rate),
        InterestModel::Fixed { amount } => Some(amount),
        _ => None,
    };
    if rate.is_some_and(|rate| !rate.is_finite() || rate < 0.0) {
        return Err(ServiceError::invalid_input(
            "rate must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_interest(payload: &InterestRequest) -> Result<(), ServiceError> {
    if !payload.principal.is_finite() || payload.principal < 0.0 {
        return Err(ServiceError::invalid_input(
            "principal must be a non-negative number".to_string(),
        ));
    }
    validate_model(&payload.model)
}

pub async fn interest(
    state: &AppState,
    payload: InterestRequest,
) -> Result<InterestResponse, ServiceError> {
    validate_interest(&payload)?;
    let rates = state.rates.read().await;
    let accrual = accrue(
        payload.past_date,
        payload.present_date,
        payload.principal,
        payload.default_date,
        &payload.model,
        &*rates,
    )?;
    tracing::info!(
        model = ?payload.model,
        amount = accrual.amount,
        rates_used = accrual.rates_used.len(),
        "interest calculated"
    );
    Ok(InterestResponse {
        amount: accrual.amount,
        amount_text: format_amount(accrual.amount),
        rates_used: accrual.rates_used,
    })
}

pub fn deadline(payload: DeadlineRequest) -> Result<DeadlineResponse, ServiceError> {
    let unit: Unit = payload.unit.parse()?;
    let deadline = compute_deadline(payload.beg_date, payload.dur, unit)?;
    let lines = deadline.lines();
    Ok(DeadlineResponse { deadline, lines })
}

fn validate_debt(debt: &Debt) -> Result<(), ServiceError> {
    if !matches!(debt.rounding, 0 | 2) {
        return Err(ServiceError::invalid_input(format!(
            "rounding must be 0 or 2, got {}",
            debt.rounding
        )));
    }
    if debt.currency.len() != 3 || !debt.currency.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ServiceError::invalid_input(format!(
            "currency {:?} is not an ISO 4217 code",
            debt.currency
        )));
    }
    validate_model(&debt.interest)?;
    let reasons: Vec<String> = debt
        .transactions
        .iter()
        .enumerate()
        .filter(|(_, trn)| {
            let amount = trn.movement.amount();
            !amount.is_finite() || amount < 0.0
        })
        .map(|(index, _)| {
            format!(
                "transaction {}: amount must be a non-negative number",
                index + 1
            )
        })
        .collect();
    if !reasons.is_empty() {
        return Err(ServiceError::with_reasons(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_input",
            INVALID_INPUT.to_string(),
            reasons,
        ));
    }
    Ok(())
}

pub async fn debt(state: &AppState, debt: Debt) -> Result<DebtResponse, ServiceError> {
    validate_debt(&debt)?;
    let ledger = {
        let rates = state.rates.read().await;
        rows(&debt, &*rates)?
    };
    let closing = ledger.closing();
    let error = ledger.rows.iter().find_map(|row| row.msg.clone());
    tracing::info!(
        rows = ledger.rows.len(),
        model = ?debt.interest,
        failed = ledger.has_error(),
        "debt ledger computed"
    );
    Ok(DebtResponse {
        total_text: closing
            .map(|balances| format_money(balances.post_total, debt.rounding, &debt.currency)),
        closing,
        error,
        ledger,
    })
}

pub fn debt_xml(debt: &Debt) -> Result<String, ServiceError> {
    validate_debt(debt)?;
    let created = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    Ok(debt_to_xml(debt, &created)?)
}

pub async fn debt_csv(state: &AppState, debt: &Debt) -> Result<String, ServiceError> {
    validate_debt(debt)?;
    let rates = state.rates.read().await;
    let ledger = rows(debt, &*rates)?;
    Ok(ledger_to_csv(&ledger)?)
}

pub fn import_xml(text: &str) -> Result<Debt, ServiceError> {
    let debt = debt_from_xml(text)?;
    validate_debt(&debt)?;
    Ok(debt)
}

pub fn import_csv(text: &str) -> Result<Vec<Transaction>, ServiceError> {
    Ok(transactions_from_csv(text)?)
}

pub fn holiday(date: &str) -> Result<HolidayResponse, ServiceError> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|err| ServiceError::invalid_input(format!("date {date:?}: {err}")))?;
    Ok(HolidayResponse {
        date,
        holiday: calendar::is_holiday(date),
        easter_sunday: calendar::easter_sunday(date.year())?,
    })
}

pub fn conventions() -> ConventionsResponse {
    ConventionsResponse {
        year: YearConvention::ALL.iter().map(YearConvention::label).collect(),
        month: MonthConvention::ALL.iter().map(MonthConvention::label).collect(),
    }
}

pub async fn readiness(state: &AppState) -> Result<(), ServiceError> {
    if let Some(store) = &state.store {
        store.ping().await.map_err(|err| {
            ServiceError::new(StatusCode::SERVICE_UNAVAILABLE, "db_unavailable", err.to_string())
        })?;
    }
    Ok(())
}

/// Replaces the in-memory rate table with the database copy.
pub async fn reload_rates(state: &AppState) -> Result<usize, ServiceError> {
    let Some(store) = &state.store else {
        return Ok(0);
    };
    let table: RateTable = store.load_rates().await.map_err(|err| {
        ServiceError::new(StatusCode::SERVICE_UNAVAILABLE, "db_unavailable", err.to_string())
    })?;
    let count = table.len();
    *state.rates.write().await = table;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use legal_calc::{Movement, MpiRate, RateKind, StatutoryRegime};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn state() -> AppState {
        AppState::offline(
            [MpiRate {
                kind: RateKind::Repo,
                valid: date(2012, 11, 2),
                rate: 0.05,
            }]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn interval_reports_lines() {
        let response = interval(IntervalRequest {
            beg_date: date(2016, 12, 23),
            end_date: date(2016, 12, 27),
        })
        .unwrap();
        assert_eq!(response.lines[0], "4 dny");
        assert_eq!(response.report.business_days, Some(1));
    }

    #[test]
    fn empty_interval_is_bad_request() {
        let err = interval(IntervalRequest {
            beg_date: date(2016, 12, 23),
            end_date: date(2016, 12, 23),
        })
        .err()
        .unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "invalid_interval");
    }

    #[tokio::test]
    async fn statutory_interest_uses_loaded_rates() {
        let response = interest(
            &state(),
            InterestRequest {
                principal: 1000.0,
                default_date: date(2016, 3, 15),
                past_date: Some(date(2016, 12, 31)),
                present_date: date(2017, 12, 31),
                model: InterestModel::Statutory {
                    regime: StatutoryRegime::RepoPlus8,
                },
            },
        )
        .await
        .unwrap();
        assert!((response.amount - 80.5).abs() < 1e-9);
        assert_eq!(response.amount_text, "80,50");
        assert_eq!(response.rates_used.get(&date(2015, 12, 31)), Some(&0.05));
    }

    #[tokio::test]
    async fn missing_rate_and_bad_principal() {
        let payload = |principal: f64| InterestRequest {
            principal,
            default_date: date(2016, 3, 15),
            past_date: Some(date(2016, 12, 31)),
            present_date: date(2017, 12, 31),
            model: InterestModel::Statutory {
                regime: StatutoryRegime::DiscountDoubled,
            },
        };
        let err = interest(&state(), payload(1000.0)).await.err().unwrap();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body.code, "rate_unavailable");

        let err = interest(&state(), payload(-1.0)).await.err().unwrap();
        assert_eq!(err.body.code, "invalid_input");
        assert_eq!(err.body.message, INVALID_INPUT);
    }

    #[test]
    fn holidays_and_conventions() {
        let response = holiday("2016-03-28").unwrap();
        assert!(response.holiday);
        assert_eq!(response.easter_sunday, date(2016, 3, 27));
        assert!(holiday("28.3.2016").is_err());
        let conventions = conventions();
        assert_eq!(conventions.year.len(), 8);
        assert_eq!(conventions.month[0], "ACT");
    }

    #[test]
    fn dates_out_of_range_are_bad_requests() {
        let err = interval(IntervalRequest {
            beg_date: date(1925, 4, 15),
            end_date: date(3000, 1, 1),
        })
        .err()
        .unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "out_of_range");
        assert_eq!(err.body.message, "Datum musí být mezi 01.01.1583 a 31.12.2999");
    }

    #[test]
    fn deadline_moves_off_weekends() {
        let response = deadline(DeadlineRequest {
            beg_date: date(2016, 7, 1),
            dur: 8,
            unit: "d".to_string(),
        })
        .unwrap();
        assert_eq!(response.deadline.bus, date(2016, 7, 11));
        assert_eq!(response.lines, ["09.07.2016 není pracovní den", "Po 11.07.2016"]);

        let request = |dur: i32, unit: &str| DeadlineRequest {
            beg_date: date(2016, 7, 1),
            dur,
            unit: unit.to_string(),
        };
        let err = deadline(request(1, "x")).err().unwrap();
        assert_eq!((err.status, err.body.code), (StatusCode::BAD_REQUEST, "invalid_input"));
        let err = deadline(request(1000, "d")).err().unwrap();
        assert_eq!((err.status, err.body.code), (StatusCode::BAD_REQUEST, "out_of_range"));
        assert_eq!(err.body.message, "Délka musí být mezi -999 a 999");
    }

    fn sample_debt() -> Debt {
        Debt {
            title: "Půjčka".to_string(),
            note: String::new(),
            internal_note: String::new(),
            currency: "CZK".to_string(),
            rounding: 0,
            interest: InterestModel::PerDiem { rate: 1.0 },
            transactions: vec![
                Transaction {
                    description: "úvěr".to_string(),
                    date: date(2016, 1, 1),
                    movement: Movement::Debit { amount: 1000.0 },
                },
                Transaction {
                    description: "stav".to_string(),
                    date: date(2016, 1, 11),
                    movement: Movement::Balance,
                },
            ],
        }
    }

    #[tokio::test]
    async fn debt_ledger_with_total() {
        let response = debt(&state(), sample_debt()).await.unwrap();
        assert_eq!(response.ledger.rows.len(), 2);
        assert_eq!(response.closing.map(|b| b.post_total), Some(1010.0));
        assert_eq!(response.total_text.as_deref(), Some("1.010 Kč"));
        assert_eq!(response.error, None);

        let mut failing = sample_debt();
        failing.interest = InterestModel::Statutory {
            regime: StatutoryRegime::DiscountDoubled,
        };
        let response = debt(&state(), failing).await.unwrap();
        assert_eq!(response.closing, None);
        assert_eq!(
            response.error.as_deref(),
            Some("Chybné datum, data nejsou k disposici")
        );
    }

    #[tokio::test]
    async fn debt_input_is_validated() {
        let mut bad = sample_debt();
        bad.rounding = 3;
        let err = debt(&state(), bad).await.err().unwrap();
        assert_eq!(err.body.code, "invalid_input");

        let mut bad = sample_debt();
        bad.transactions[0].movement = Movement::Debit { amount: -1.0 };
        let err = debt(&state(), bad).await.err().unwrap();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body.reasons.len(), 1);

        let mut bad = sample_debt();
        bad.transactions[1].date = date(3000, 1, 1);
        let err = debt(&state(), bad).await.err().unwrap();
        assert_eq!((err.status, err.body.code), (StatusCode::BAD_REQUEST, "out_of_range"));
    }

    #[tokio::test]
    async fn debt_files() {
        let xml = debt_xml(&sample_debt()).unwrap();
        assert_eq!(import_xml(&xml).unwrap(), sample_debt());

        let csv = debt_csv(&state(), &sample_debt()).await.unwrap();
        assert_eq!(import_csv(&csv).unwrap(), sample_debt().transactions);

        let err = import_xml("XXX").err().unwrap();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body.code, "invalid_file");
        assert_eq!(err.body.message, BAD_FORMAT);

        let err = import_csv("Datum,Popis,Přednost,Pohyb\n2016-01-01,a,,x\n2016-02-01,b,,-1\n")
            .err()
            .unwrap();
        assert_eq!(err.body.code, "invalid_rows");
        assert_eq!(err.body.reasons.len(), 2);
        assert!(err.body.reasons[0].starts_with("row 2:"));

        let mut failing = sample_debt();
        failing.interest = InterestModel::Statutory {
            regime: StatutoryRegime::DiscountDoubled,
        };
        let err = debt_csv(&state(), &failing).await.err().unwrap();
        assert_eq!(err.body.code, "ledger_failed");
    }

    #[tokio::test]
    async fn offline_state_is_ready() {
        let state = state();
        assert!(readiness(&state).await.is_ok());
        assert_eq!(reload_rates(&state).await.ok(), Some(0));
        assert_eq!(state.rates.read().await.len(), 1);
    }
}
