//! Czech number and date formatting and plural forms.

use chrono::{Datelike, NaiveDate};

/// Amounts below this magnitude are treated as zero.
pub const LIMIT: f64 = 0.005;

pub const GR_DAY: [&str; 3] = ["den", "dny", "dnů"];
pub const GR_BUSDAY: [&str; 3] = ["pracovní den", "pracovní dny", "pracovních dnů"];
pub const GR_MONTH: [&str; 3] = ["měsíc", "měsíce", "měsíců"];
pub const GR_YEAR: [&str; 3] = ["rok", "roky", "let"];

/// Weekday abbreviations, Monday first.
pub const WEEKDAYS: [&str; 7] = ["Po", "Út", "St", "Čt", "Pá", "So", "Ne"];

/// Prefixes `n` with the matching Czech plural form: `[one, few, many]`.
pub fn grammar(n: i64, forms: &[&str; 3]) -> String {
    let form = match n.unsigned_abs() {
        1 => forms[0],
        2..=4 => forms[1],
        _ => forms[2],
    };
    format!("{n} {form}")
}

pub fn normalize_float(value: f64) -> f64 {
    if value.abs() < LIMIT {
        0.0
    } else {
        value
    }
}

pub fn between<T: PartialOrd>(lower: T, value: T, upper: T) -> bool {
    lower <= value && value <= upper
}

/// `01.07.2016`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// `Pá 01.07.2016`
pub fn format_weekday_date(date: NaiveDate) -> String {
    format!(
        "{} {}",
        WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        format_date(date)
    )
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}

/// Whole amount with `.` as the thousands separator.
pub fn format_whole(value: i64) -> String {
    let digits = group_thousands(&value.unsigned_abs().to_string());
    if value < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}

/// Amount with two decimals, `,` as the decimal separator and `.` between
/// thousands. Values that round to zero are printed unsigned.
pub fn format_amount(value: f64) -> String {
    let rounded = format!("{:.2}", value.abs());
    let (whole, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));
    let negative = value < 0.0 && rounded != "0.00";
    format!(
        "{}{},{}",
        if negative { "-" } else { "" },
        group_thousands(whole),
        fraction
    )
}
