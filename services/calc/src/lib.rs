//! Czech legal calculators: civil calendar, day-count conventions, interval
//! lengths, deadlines, contractual and statutory interest, debt ledgers and
//! CNB rate tables.

pub mod calendar;
pub mod daycount;
pub mod deadline;
pub mod error;
pub mod format;
pub mod interest;
pub mod interval;
pub mod ledger;
pub mod ledger_file;
pub mod rates;

pub use daycount::{month_factor, year_factor, MonthConvention, YearConvention};
pub use deadline::{deadline, Deadline, Unit};
pub use error::{CalcError, CalcResult};
pub use interest::{accrue, Accrual, InterestModel, StatutoryRegime};
pub use interval::{measure, IntervalReport};
pub use ledger::{
    format_money, rows, Balances, Debt, Ledger, LedgerRow, Movement, RepaymentPreference,
    Transaction, TransactionKind,
};
pub use ledger_file::{
    debt_from_xml, debt_to_xml, ledger_to_csv, transactions_from_csv, LedgerFileError, RowError,
};
pub use rates::{parse_cnb_history, MpiRate, RateKind, RateSource, RateTable, RateTableError};
