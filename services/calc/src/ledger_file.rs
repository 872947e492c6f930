//! Saving and loading debts: the XML document that stores a whole debt and
//! the CSV table of a computed ledger.
//!
//! Loading validates every transaction and reports all malformed ones at
//! once, each with its position in the file.

use std::fmt;

use chrono::NaiveDate;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    calendar::in_range,
    daycount::{MonthConvention, YearConvention},
    format::normalize_float,
    interest::{InterestModel, StatutoryRegime},
    ledger::{Debt, Ledger, Movement, RepaymentPreference, Transaction},
};

/// Value of the root element's `application` attribute.
pub const XML_APPLICATION: &str = "hjp";

/// Shown to users when a file cannot be read at all.
pub const BAD_FORMAT: &str = "Chybný formát souboru";

const CSV_HEADER: [&str; 12] = [
    "Datum",
    "Popis",
    "Přednost",
    "Pohyb",
    "Předchozí zůstatek/jistina",
    "Předchozí zůstatek/úrok",
    "Předchozí zůstatek/celkem",
    "Započteno/jistina",
    "Započteno/úrok",
    "Nový zůstatek/jistina",
    "Nový zůstatek/úrok",
    "Nový zůstatek/celkem",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    /// Transaction number in an XML file, line number in a CSV file.
    pub row: usize,
    pub reason: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerFileError {
    #[error("invalid file format: {0}")]
    Format(String),

    #[error("{} invalid rows", .0.len())]
    Rows(Vec<RowError>),

    #[error("ledger contains errors and cannot be exported")]
    LedgerFailed,

    #[error("write xml: {0}")]
    Xml(String),

    #[error("write csv: {0}")]
    Csv(String),
}

fn xml_error(err: impl fmt::Display) -> LedgerFileError {
    LedgerFileError::Xml(err.to_string())
}

fn csv_error(err: impl fmt::Display) -> LedgerFileError {
    LedgerFileError::Csv(err.to_string())
}

fn model_code(model: &InterestModel) -> &'static str {
    match model {
        InterestModel::None => "none",
        InterestModel::Fixed { .. } => "fixed",
        InterestModel::PerAnnum { .. } => "per_annum",
        InterestModel::PerMensem { .. } => "per_mensem",
        InterestModel::PerDiem { .. } => "per_diem",
        InterestModel::Statutory { regime } => match regime {
            StatutoryRegime::DiscountDoubled => "cust1",
            StatutoryRegime::FloatingRepoPlus7 => "cust2",
            StatutoryRegime::RepoPlus7 => "cust3",
            StatutoryRegime::QuarterPercentPerDay => "cust4",
            StatutoryRegime::RepoPlus8 => "cust5",
            StatutoryRegime::RepoPlus8HalfYearStart => "cust6",
        },
    }
}

fn statutory(code: &str) -> Option<StatutoryRegime> {
    Some(match code {
        "cust1" => StatutoryRegime::DiscountDoubled,
        "cust2" => StatutoryRegime::FloatingRepoPlus7,
        "cust3" => StatutoryRegime::RepoPlus7,
        "cust4" => StatutoryRegime::QuarterPercentPerDay,
        "cust5" => StatutoryRegime::RepoPlus8,
        "cust6" => StatutoryRegime::RepoPlus8HalfYearStart,
        _ => return None,
    })
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn start(&mut self, tag: BytesStart<'_>) -> Result<(), LedgerFileError> {
        self.writer.write_event(Event::Start(tag)).map_err(xml_error)
    }

    fn end(&mut self, name: &str) -> Result<(), LedgerFileError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn element(&mut self, tag: BytesStart<'_>, text: &str) -> Result<(), LedgerFileError> {
        let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
        self.start(tag)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)?;
        self.end(&name)
    }

    fn text(&mut self, name: &str, text: &str) -> Result<(), LedgerFileError> {
        self.element(BytesStart::new(name), text)
    }

    fn rate(&mut self, name: &str, unit: &str, rate: f64) -> Result<(), LedgerFileError> {
        let tag = BytesStart::new(name).with_attributes([("unit", unit)]);
        self.element(tag, &format!("{rate:.6}"))
    }
}

/// Serialises `debt`; `created` stamps the root element.
pub fn debt_to_xml(debt: &Debt, created: &str) -> Result<String, LedgerFileError> {
    let mut out = XmlOut {
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
    };
    out.writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;

    let version = env!("CARGO_PKG_VERSION");
    out.start(BytesStart::new("debt").with_attributes([
        ("application", XML_APPLICATION),
        ("version", version),
        ("created", created),
    ]))?;
    out.text("title", &debt.title)?;
    out.text("note", &debt.note)?;
    out.text("internal_note", &debt.internal_note)?;
    out.element(
        BytesStart::new("currency").with_attributes([("standard", "ISO 4217")]),
        &debt.currency,
    )?;
    out.text("rounding", &debt.rounding.to_string())?;

    out.start(BytesStart::new("interest").with_attributes([("model", model_code(&debt.interest))]))?;
    match debt.interest {
        InterestModel::Fixed { amount } => out.text("amount", &format!("{amount:.2}"))?,
        InterestModel::PerAnnum { rate, convention } => {
            out.rate("pa_rate", "percent per annum", rate)?;
            out.text("day_count_convention", convention.label())?;
        }
        InterestModel::PerMensem { rate, convention } => {
            out.rate("pm_rate", "percent per month", rate)?;
            out.text("day_count_convention", convention.label())?;
        }
        InterestModel::PerDiem { rate } => out.rate("pd_rate", "per mil per day", rate)?,
        InterestModel::None | InterestModel::Statutory { .. } => {}
    }
    out.end("interest")?;

    out.start(BytesStart::new("transactions"))?;
    for trn in &debt.transactions {
        let name = match trn.movement {
            Movement::Debit { .. } => "debit",
            Movement::Credit { .. } => "credit",
            Movement::Balance => "balance",
        };
        out.start(BytesStart::new(name))?;
        out.text("description", &trn.description)?;
        out.text("date", &trn.date.format("%Y-%m-%d").to_string())?;
        match trn.movement {
            Movement::Debit { amount } => out.text("amount", &format!("{amount:.2}"))?,
            Movement::Credit {
                amount,
                repayment_preference,
            } => {
                out.text("amount", &format!("{amount:.2}"))?;
                out.text("repayment_preference", repayment_preference.code())?;
            }
            Movement::Balance => {}
        }
        out.end(name)?;
    }
    out.end("transactions")?;
    out.end("debt")?;

    let mut xml = String::from_utf8(out.writer.into_inner()).map_err(xml_error)?;
    xml.push('\n');
    Ok(xml)
}

#[derive(Debug, Deserialize)]
struct XmlDebt {
    #[serde(rename = "@application")]
    application: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    internal_note: String,
    currency: XmlValue<String>,
    rounding: u32,
    interest: XmlInterest,
    #[serde(default)]
    transactions: XmlTransactions,
}

#[derive(Debug, Deserialize)]
struct XmlValue<T> {
    #[serde(rename = "$text")]
    value: T,
}

#[derive(Debug, Deserialize)]
struct XmlInterest {
    #[serde(rename = "@model")]
    model: String,
    amount: Option<f64>,
    pa_rate: Option<XmlValue<f64>>,
    pm_rate: Option<XmlValue<f64>>,
    pd_rate: Option<XmlValue<f64>>,
    day_count_convention: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct XmlTransactions {
    #[serde(rename = "$value", default)]
    items: Vec<XmlTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum XmlTransaction {
    Debit(XmlEntry),
    Credit(XmlEntry),
    Balance(XmlEntry),
}

#[derive(Debug, Deserialize)]
struct XmlEntry {
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: String,
    amount: Option<String>,
    repayment_preference: Option<String>,
}

fn parse_interest(interest: XmlInterest) -> Result<InterestModel, LedgerFileError> {
    let missing = |field: &str| {
        LedgerFileError::Format(format!("interest model {} needs {field}", interest.model))
    };
    let convention = || {
        interest
            .day_count_convention
            .as_deref()
            .ok_or_else(|| missing("day_count_convention"))
    };
    let model = match interest.model.as_str() {
        "none" => InterestModel::None,
        "fixed" => InterestModel::Fixed {
            amount: interest.amount.ok_or_else(|| missing("amount"))?,
        },
        "per_annum" => InterestModel::PerAnnum {
            rate: interest.pa_rate.as_ref().ok_or_else(|| missing("pa_rate"))?.value,
            convention: convention()?
                .parse::<YearConvention>()
                .map_err(|err| LedgerFileError::Format(err.to_string()))?,
        },
        "per_mensem" => InterestModel::PerMensem {
            rate: interest.pm_rate.as_ref().ok_or_else(|| missing("pm_rate"))?.value,
            convention: convention()?
                .parse::<MonthConvention>()
                .map_err(|err| LedgerFileError::Format(err.to_string()))?,
        },
        "per_diem" => InterestModel::PerDiem {
            rate: interest.pd_rate.as_ref().ok_or_else(|| missing("pd_rate"))?.value,
        },
        code => InterestModel::Statutory {
            regime: statutory(code)
                .ok_or_else(|| LedgerFileError::Format(format!("unknown interest model {code:?}")))?,
        },
    };
    Ok(model)
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("date {value:?}: {err}"))?;
    if !in_range(date) {
        return Err(format!("date {date} out of range"));
    }
    Ok(date)
}

fn parse_amount(value: Option<&str>) -> Result<f64, String> {
    let value = value.ok_or("amount is required")?;
    match value.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(format!("amount {value:?} is not a non-negative number")),
    }
}

fn parse_preference(value: Option<&str>) -> Result<RepaymentPreference, String> {
    let value = value.ok_or("repayment preference is required")?;
    RepaymentPreference::parse(value).ok_or_else(|| format!("repayment preference {value:?}"))
}

fn parse_entry(item: XmlTransaction) -> Result<Transaction, String> {
    let (entry, kind) = match item {
        XmlTransaction::Debit(entry) => (entry, "debit"),
        XmlTransaction::Credit(entry) => (entry, "credit"),
        XmlTransaction::Balance(entry) => (entry, "balance"),
    };
    let date = parse_date(&entry.date)?;
    let movement = match kind {
        "debit" => Movement::Debit {
            amount: parse_amount(entry.amount.as_deref())?,
        },
        "credit" => Movement::Credit {
            amount: parse_amount(entry.amount.as_deref())?,
            repayment_preference: parse_preference(entry.repayment_preference.as_deref())?,
        },
        _ => Movement::Balance,
    };
    Ok(Transaction {
        description: entry.description.trim().to_string(),
        date,
        movement,
    })
}

pub fn debt_from_xml(text: &str) -> Result<Debt, LedgerFileError> {
    let doc: XmlDebt =
        quick_xml::de::from_str(text).map_err(|err| LedgerFileError::Format(err.to_string()))?;
    if doc.application != XML_APPLICATION {
        return Err(LedgerFileError::Format(format!(
            "unexpected application {:?}",
            doc.application
        )));
    }
    let interest = parse_interest(doc.interest)?;

    let mut transactions = Vec::new();
    let mut errors = Vec::new();
    for (index, item) in doc.transactions.items.into_iter().enumerate() {
        match parse_entry(item) {
            Ok(trn) => transactions.push(trn),
            Err(reason) => errors.push(RowError {
                row: index + 1,
                reason,
            }),
        }
    }
    if !errors.is_empty() {
        return Err(LedgerFileError::Rows(errors));
    }

    Ok(Debt {
        title: doc.title.trim().to_string(),
        note: doc.note.trim().to_string(),
        internal_note: doc.internal_note.trim().to_string(),
        currency: doc.currency.value.trim().to_string(),
        rounding: doc.rounding,
        interest,
        transactions,
    })
}

fn cell(value: f64) -> String {
    format!("{:.2}", normalize_float(value))
}

/// The computed ledger as a table. A failed ledger is not exported.
pub fn ledger_to_csv(ledger: &Ledger) -> Result<String, LedgerFileError> {
    if ledger.has_error() {
        return Err(LedgerFileError::LedgerFailed);
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;
    for row in &ledger.rows {
        let b = row.balances.unwrap_or_default();
        writer
            .write_record([
                row.date.format("%Y-%m-%d").to_string(),
                row.description.clone(),
                row.repayment
                    .map(|pref| pref.label().to_string())
                    .unwrap_or_default(),
                cell(row.change),
                cell(b.pre_principal),
                cell(b.pre_interest),
                cell(b.pre_total),
                cell(b.change_principal),
                cell(b.change_interest),
                cell(b.post_principal),
                cell(b.post_interest),
                cell(b.post_total),
            ])
            .map_err(csv_error)?;
    }
    let bytes = writer.into_inner().map_err(csv_error)?;
    String::from_utf8(bytes).map_err(csv_error)
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize, LedgerFileError> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or_else(|| LedgerFileError::Format(format!("missing column {name:?}")))
}

fn parse_csv_row(
    record: &csv::StringRecord,
    columns: [usize; 4],
) -> Result<Transaction, String> {
    let [date, description, preference, change] = columns.map(|index| record.get(index));
    let date = parse_date(date.unwrap_or_default())?;
    let change = change.unwrap_or_default();
    let change: f64 = change
        .trim()
        .parse()
        .map_err(|_| format!("movement {change:?} is not a number"))?;
    let movement = if !change.is_finite() {
        return Err("movement is not finite".to_string());
    } else if change > 0.0 {
        Movement::Debit { amount: change }
    } else if change < 0.0 {
        Movement::Credit {
            amount: -change,
            repayment_preference: parse_preference(preference.filter(|p| !p.trim().is_empty()))?,
        }
    } else {
        Movement::Balance
    };
    Ok(Transaction {
        description: description.unwrap_or_default().trim().to_string(),
        date,
        movement,
    })
}

/// Reads transactions back from an exported ledger table. Balance columns
/// are ignored; they are recomputed.
pub fn transactions_from_csv(text: &str) -> Result<Vec<Transaction>, LedgerFileError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| LedgerFileError::Format(err.to_string()))?
        .clone();
    let columns = [
        column(&headers, CSV_HEADER[0])?,
        column(&headers, CSV_HEADER[1])?,
        column(&headers, CSV_HEADER[2])?,
        column(&headers, CSV_HEADER[3])?,
    ];

    let mut transactions = Vec::new();
    let mut errors = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| LedgerFileError::Format(err.to_string()))?;
        let row = record
            .position()
            .map_or(index + 2, |position| position.line() as usize);
        match parse_csv_row(&record, columns) {
            Ok(trn) => transactions.push(trn),
            Err(reason) => errors.push(RowError { row, reason }),
        }
    }
    if !errors.is_empty() {
        return Err(LedgerFileError::Rows(errors));
    }
    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::rows;
    use crate::rates::RateTable;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sample() -> Debt {
        Debt {
            title: "Půjčka <Novák & syn>".to_string(),
            note: "Poznámka".to_string(),
            internal_note: String::new(),
            currency: "EUR".to_string(),
            rounding: 2,
            interest: InterestModel::PerAnnum {
                rate: 8.5,
                convention: YearConvention::Thirty360EIsda,
            },
            transactions: vec![
                Transaction {
                    description: "úvěr".to_string(),
                    date: ymd(2016, 1, 1),
                    movement: Movement::Debit { amount: 1000.0 },
                },
                Transaction {
                    description: "splátka".to_string(),
                    date: ymd(2016, 6, 30),
                    movement: Movement::Credit {
                        amount: 250.5,
                        repayment_preference: RepaymentPreference::Principal,
                    },
                },
                Transaction {
                    description: String::new(),
                    date: ymd(2016, 12, 31),
                    movement: Movement::Balance,
                },
            ],
        }
    }

    #[test]
    fn xml_keeps_the_debt() {
        let xml = debt_to_xml(&sample(), "2016-07-05T12:00:00").unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"application="hjp""#));
        assert!(xml.contains(r#"<interest model="per_annum">"#));
        assert!(xml.contains("<day_count_convention>30E/360 ISDA</day_count_convention>"));
        assert!(xml.contains("&lt;Novák &amp; syn&gt;"));
        assert_eq!(debt_from_xml(&xml).unwrap(), sample());
    }

    #[test]
    fn xml_statutory_codes() {
        let mut debt = sample();
        for (regime, code) in [
            (StatutoryRegime::DiscountDoubled, "cust1"),
            (StatutoryRegime::QuarterPercentPerDay, "cust4"),
            (StatutoryRegime::RepoPlus8HalfYearStart, "cust6"),
        ] {
            debt.interest = InterestModel::Statutory { regime };
            let xml = debt_to_xml(&debt, "2016-07-05T12:00:00").unwrap();
            assert!(xml.contains(&format!(r#"model="{code}""#)));
            assert_eq!(debt_from_xml(&xml).unwrap().interest, debt.interest);
        }
    }

    #[test]
    fn xml_garbage_is_a_format_error() {
        assert!(matches!(
            debt_from_xml("XXX"),
            Err(LedgerFileError::Format(_))
        ));
        let foreign = debt_to_xml(&sample(), "now")
            .unwrap()
            .replace(r#"application="hjp""#, r#"application="psj""#);
        assert!(matches!(
            debt_from_xml(&foreign),
            Err(LedgerFileError::Format(_))
        ));
    }

    #[test]
    fn xml_reports_every_bad_transaction() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<debt application="hjp" version="1.0" created="2016-07-05T12:00:00">
  <title>t</title>
  <note></note>
  <internal_note></internal_note>
  <currency standard="ISO 4217">CZK</currency>
  <rounding>0</rounding>
  <interest model="none"></interest>
  <transactions>
    <debit><description>a</description><date>2016-13-01</date><amount>10.00</amount></debit>
    <debit><description>b</description><date>2016-01-01</date><amount>10.00</amount></debit>
    <credit><description>c</description><date>2016-02-01</date><amount>5.00</amount></credit>
    <balance><description>d</description><date>1500-01-01</date></balance>
  </transactions>
</debt>
"#;
        let Err(LedgerFileError::Rows(errors)) = debt_from_xml(xml) else {
            panic!("expected row errors");
        };
        let rows: Vec<usize> = errors.iter().map(|err| err.row).collect();
        assert_eq!(rows, [1, 3, 4]);
        assert!(errors[1].reason.contains("repayment preference"));
    }

    #[test]
    fn csv_table_and_reimport() {
        let debt = sample();
        let ledger = rows(&debt, &RateTable::new()).unwrap();
        let csv = ledger_to_csv(&ledger).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "2016-01-01,úvěr,,1000.00,0.00,0.00,0.00,1000.00,0.00,1000.00,0.00,1000.00"
        );
        assert!(lines.next().unwrap().starts_with("2016-06-30,splátka,jistina,-250.50,"));

        let transactions = transactions_from_csv(&csv).unwrap();
        assert_eq!(transactions, debt.transactions);
    }

    #[test]
    fn csv_rows_with_errors() {
        let csv = "Datum,Popis,Přednost,Pohyb\n\
                   2016-01-01,a,,100.00\n\
                   2016-02-30,b,,100.00\n\
                   2016-03-01,c,,-5.00\n\
                   2016-03-02,d,úrok,x\n";
        let Err(LedgerFileError::Rows(errors)) = transactions_from_csv(csv) else {
            panic!("expected row errors");
        };
        let rows: Vec<usize> = errors.iter().map(|err| err.row).collect();
        assert_eq!(rows, [3, 4, 5]);

        assert!(matches!(
            transactions_from_csv("Datum,Popis\n2016-01-01,a\n"),
            Err(LedgerFileError::Format(_))
        ));
    }

    #[test]
    fn failed_ledger_is_not_exported() {
        let mut debt = sample();
        debt.interest = InterestModel::Statutory {
            regime: StatutoryRegime::RepoPlus8,
        };
        let ledger = rows(&debt, &RateTable::new()).unwrap();
        assert_eq!(ledger_to_csv(&ledger), Err(LedgerFileError::LedgerFailed));
    }
}
