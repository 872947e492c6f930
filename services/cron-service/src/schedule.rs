//! Firing predicates for scheduled jobs.
//!
//! A schedule is `"<minute> <hour> <weekday>"`, each field being `*`, `*/n`
//! or a comma-separated list. Weekdays run from 0 (Monday) to 6 (Sunday).

use std::{fmt, str::FromStr};

use chrono::{Datelike, Timelike};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WhenError {
    #[error("expected 3 fields (minute hour weekday), found {0}")]
    FieldCount(usize),

    #[error("invalid {field} field {text:?}")]
    Invalid { field: &'static str, text: String },

    #[error("{field} value {value} is out of range 0..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Every(u32),
    List(Vec<u32>),
}

impl Field {
    fn parse(field: &'static str, text: &str, max: u32) -> Result<Self, WhenError> {
        let invalid = || WhenError::Invalid {
            field,
            text: text.to_string(),
        };
        if text == "*" {
            return Ok(Field::Any);
        }
        if let Some(step) = text.strip_prefix("*/") {
            let step = step.parse::<u32>().map_err(|_| invalid())?;
            if step == 0 {
                return Err(invalid());
            }
            return Ok(Field::Every(step));
        }
        let values = text
            .split(',')
            .map(|item| {
                let value = item.trim().parse::<u32>().map_err(|_| invalid())?;
                if value > max {
                    return Err(WhenError::OutOfRange { field, value, max });
                }
                Ok(value)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Field::List(values))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Every(step) => value % step == 0,
            Field::List(values) => values.contains(&value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct When {
    minute: Field,
    hour: Field,
    weekday: Field,
    source: String,
}

impl When {
    pub fn always() -> Self {
        When {
            minute: Field::Any,
            hour: Field::Any,
            weekday: Field::Any,
            source: "* * *".to_string(),
        }
    }

    pub fn matches<T: Datelike + Timelike>(&self, time: &T) -> bool {
        self.minute.matches(time.minute())
            && self.hour.matches(time.hour())
            && self.weekday.matches(time.weekday().num_days_from_monday())
    }
}

impl FromStr for When {
    type Err = WhenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [minute, hour, weekday] = fields.as_slice() else {
            return Err(WhenError::FieldCount(fields.len()));
        };
        Ok(When {
            minute: Field::parse("minute", minute, 59)?,
            hour: Field::parse("hour", hour, 23)?,
            weekday: Field::parse("weekday", weekday, 6)?,
            source: fields.join(" "),
        })
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> chrono::NaiveDateTime {
        // 2016-07-04 is a Monday.
        NaiveDate::from_ymd_opt(2016, 7, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn every_sixth_hour_on_the_hour() {
        let when: When = "0 */6 *".parse().unwrap();
        assert!(when.matches(&at(4, 0, 0)));
        assert!(when.matches(&at(5, 18, 0)));
        assert!(!when.matches(&at(5, 18, 1)));
        assert!(!when.matches(&at(5, 7, 0)));
    }

    #[test]
    fn weekday_lists() {
        // Friday 20:01 and Sunday..Thursday 18:30.
        let friday: When = "1 20 4".parse().unwrap();
        assert!(friday.matches(&at(8, 20, 1)));
        assert!(!friday.matches(&at(7, 20, 1)));
        let weeknights: When = "30 18 6,0,1,2,3".parse().unwrap();
        assert!(weeknights.matches(&at(10, 18, 30)));
        assert!(weeknights.matches(&at(4, 18, 30)));
        assert!(!weeknights.matches(&at(8, 18, 30)));
        assert!(!weeknights.matches(&at(9, 18, 30)));
    }

    #[test]
    fn always_matches() {
        assert!(When::always().matches(&at(9, 13, 37)));
        assert_eq!("*  *\t*".parse::<When>().unwrap().to_string(), "* * *");
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!("* *".parse::<When>().unwrap_err(), WhenError::FieldCount(2));
        assert!(matches!(
            "*/0 * *".parse::<When>(),
            Err(WhenError::Invalid { field: "minute", .. })
        ));
        assert_eq!(
            "0 24 *".parse::<When>().unwrap_err(),
            WhenError::OutOfRange {
                field: "hour",
                value: 24,
                max: 23
            }
        );
        assert!("0 4 mon".parse::<When>().is_err());
    }
}
