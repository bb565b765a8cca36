// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A calendar date stored as days since the Common Era.
///
/// The compact `i32` representation is what date columns hold; [`NaiveDate`]
/// is only materialized at the parsing and formatting boundaries.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Date(i32);

impl Date {
    /// Sentinel encoding an absent date inside a date column.
    pub const NULL: Date = Date(i32::MIN);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|date| Date(date.num_days_from_ce()))
    }

    /// The raw day count, as stored in date columns.
    pub fn days(self) -> i32 {
        self.0
    }

    pub fn from_days(days: i32) -> Self {
        Date(days)
    }
}

impl FromStr for Date {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|date| Date(date.num_days_from_ce()))
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match NaiveDate::from_num_days_from_ce_opt(self.0) {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None => write!(f, "invalid date ({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let date: Date = "2021-03-18".parse().unwrap();
        assert_eq!(date.to_string(), "2021-03-18");
        assert_eq!(date, Date::from_ymd(2021, 3, 18).unwrap());
    }

    #[test]
    fn ordering_follows_the_calendar() {
        let early: Date = "2020-12-31".parse().unwrap();
        let late: Date = "2021-01-01".parse().unwrap();
        assert!(early < late);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("2021-13-01".parse::<Date>().is_err());
        assert!("yesterday".parse::<Date>().is_err());
    }
}
