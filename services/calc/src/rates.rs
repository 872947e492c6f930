//! Czech National Bank monetary-policy rates (discount, lombard, repo).
//!
//! The bank publishes each rate history as a text file: a header line
//! followed by `YYYYMMDD|rate` rows with a decimal comma. A rate holds from
//! its date until the next row.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CNB_HISTORY_PREFIX: &str = "https://www.cnb.cz/cs/faq/vyvoj_";
const CNB_HISTORY_SUFFIX: &str = "_historie.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateKind {
    Disc,
    Lomb,
    Repo,
}

impl RateKind {
    pub const ALL: [RateKind; 3] = [RateKind::Disc, RateKind::Lomb, RateKind::Repo];

    pub fn code(&self) -> &'static str {
        match self {
            RateKind::Disc => "DISC",
            RateKind::Lomb => "LOMB",
            RateKind::Repo => "REPO",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            RateKind::Disc => "diskontni",
            RateKind::Lomb => "lombard",
            RateKind::Repo => "repo",
        }
    }

    pub fn header(&self) -> String {
        format!(
            "PLATNA_OD|CNB_{}_SAZBA_V_%",
            match self {
                RateKind::Disc => "DISKONTNI",
                RateKind::Lomb => "LOMBARDNI",
                RateKind::Repo => "REPO",
            }
        )
    }

    pub fn history_url(&self) -> String {
        format!("{CNB_HISTORY_PREFIX}{}{CNB_HISTORY_SUFFIX}", self.slug())
    }
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RateKind {
    type Err = RateTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RateKind::ALL
            .into_iter()
            .find(|kind| kind.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RateTableError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MpiRate {
    pub kind: RateKind,
    pub valid: NaiveDate,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateTableError {
    #[error("unknown rate kind: {0}")]
    UnknownKind(String),

    #[error("unexpected header in {kind} rate table: {found:?}")]
    BadHeader { kind: RateKind, found: String },

    #[error("{kind} rate table, line {line}: {reason}")]
    BadLine {
        kind: RateKind,
        line: usize,
        reason: String,
    },
}

/// Parses one CNB history file. Blank lines are ignored; any other malformed
/// row fails the whole table with its 1-based line number.
pub fn parse_cnb_history(kind: RateKind, text: &str) -> Result<Vec<MpiRate>, RateTableError> {
    let mut lines = text.lines().map(|line| line.trim_end_matches('\r'));
    let header = lines.next().unwrap_or_default();
    if header.trim() != kind.header() {
        return Err(RateTableError::BadHeader {
            kind,
            found: header.to_string(),
        });
    }

    let mut rates = Vec::new();
    for (index, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bad = |reason: &str| RateTableError::BadLine {
            kind,
            line: index + 2,
            reason: reason.to_string(),
        };
        let (date, rate) = line.split_once('|').ok_or_else(|| bad("missing separator"))?;
        if date.len() != 8 {
            return Err(bad("date must be YYYYMMDD"));
        }
        let valid =
            NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| bad("invalid date"))?;
        let rate = rate
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| bad("invalid rate"))?;
        rates.push(MpiRate { kind, valid, rate });
    }
    Ok(rates)
}

/// Rate lookup used by the statutory interest models.
pub trait RateSource {
    /// The rate in force on `date`, i.e. the latest entry not after it.
    fn rate(&self, kind: RateKind, date: NaiveDate) -> Option<f64>;
}

#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: BTreeMap<RateKind, BTreeMap<NaiveDate, f64>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rate: MpiRate) {
        self.rates
            .entry(rate.kind)
            .or_default()
            .insert(rate.valid, rate.rate);
    }

    pub fn len(&self) -> usize {
        self.rates.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Extend<MpiRate> for RateTable {
    fn extend<I: IntoIterator<Item = MpiRate>>(&mut self, iter: I) {
        for rate in iter {
            self.insert(rate);
        }
    }
}

impl FromIterator<MpiRate> for RateTable {
    fn from_iter<I: IntoIterator<Item = MpiRate>>(iter: I) -> Self {
        let mut table = RateTable::new();
        table.extend(iter);
        table
    }
}

impl RateSource for RateTable {
    fn rate(&self, kind: RateKind, date: NaiveDate) -> Option<f64> {
        self.rates
            .get(&kind)?
            .range(..=date)
            .next_back()
            .map(|(_, rate)| *rate)
    }
}
