//! Billing periods - month names and the (month, year) natural key.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar month, stored and displayed by its English name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Month {
    /// January
    January,
    /// February
    February,
    /// March
    March,
    /// April
    April,
    /// May
    May,
    /// June
    June,
    /// July
    July,
    /// August
    August,
    /// September
    September,
    /// October
    October,
    /// November
    November,
    /// December
    December,
}

impl Month {
    /// All months in calendar order.
    pub const ALL: [Self; 12] = [
        Self::January,
        Self::February,
        Self::March,
        Self::April,
        Self::May,
        Self::June,
        Self::July,
        Self::August,
        Self::September,
        Self::October,
        Self::November,
        Self::December,
    ];

    /// English month name as written to every backend.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::January => "January",
            Self::February => "February",
            Self::March => "March",
            Self::April => "April",
            Self::May => "May",
            Self::June => "June",
            Self::July => "July",
            Self::August => "August",
            Self::September => "September",
            Self::October => "October",
            Self::November => "November",
            Self::December => "December",
        }
    }

    /// Zero-based position in the calendar.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The following month, wrapping December to January.
    #[must_use]
    pub const fn succ(self) -> Self {
        Self::ALL[(self.index() + 1) % 12]
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Month {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::invalid_input(format!("Invalid month name: '{wanted}'")))
    }
}

impl TryFrom<String> for Month {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.name().to_string()
    }
}

/// A (month, year) pair. At most one calculation exists per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// Month of the bill
    pub month: Month,
    /// Calendar year of the bill
    pub year: i32,
}

impl BillingPeriod {
    /// Creates a period, rejecting years that cannot be a real bill.
    pub fn new(month: Month, year: i32) -> Result<Self> {
        if !(1900..=9999).contains(&year) {
            return Err(Error::invalid_input(format!("Invalid year: {year}")));
        }
        Ok(Self { month, year })
    }

    /// The billing period after this one. December rolls over into January.
    #[must_use]
    pub const fn next(self) -> Self {
        match self.month {
            Month::December => Self {
                month: Month::January,
                year: self.year + 1,
            },
            month => Self {
                month: month.succ(),
                year: self.year,
            },
        }
    }

    /// Parses the `"June 2025"` label used in the CSV `Month` column.
    pub fn parse_label(label: &str) -> Result<Self> {
        let mut parts = label.split_whitespace();
        let (Some(month), Some(year), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::invalid_input(format!(
                "Expected '<Month> <Year>', got '{label}'"
            )));
        };
        let year = year
            .parse::<i32>()
            .map_err(|_| Error::invalid_input(format!("Invalid year in '{label}'")))?;
        Self::new(month.parse()?, year)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.month, self.year)
    }
}

impl PartialOrd for BillingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BillingPeriod {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.year, self.month).cmp(&(other.year, other.month))
    }
}
