use crate::error::{CertificationError, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate};
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A calendar month. Measurements and certificates are dated at month
/// granularity; day-of-month is never significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(CertificationError::InvalidPeriod(format!(
                "month {} out of range 1..=12",
                month
            )));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(CertificationError::InvalidPeriod(format!(
                "year {} out of the supported calendar range",
                year
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses "YYYY-MM", "YYYY-MM-DD" or an RFC 3339 timestamp. Only the
    /// year and month are kept.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();

        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::from_date(timestamp.date_naive()));
        }

        Err(CertificationError::InvalidPeriod(format!(
            "'{}'. Expected YYYY-MM, YYYY-MM-DD or an RFC 3339 timestamp",
            text
        )))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + self.month as i64
    }

    /// Whole months from `self` to `other`; negative when `other` is earlier.
    pub fn months_until(&self, other: Period) -> i64 {
        other.ordinal() - self.ordinal()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let next = self.next();
        next.first_day()
            .checked_sub_days(Days::new(1))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Every month from `start` to `end` inclusive. Empty when `end < start`.
pub fn months_in_range(start: Period, end: Period) -> Vec<Period> {
    let mut months = Vec::new();
    let mut current = start;
    while current <= end {
        months.push(current);
        current = current.next();
    }
    months
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = CertificationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Period::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Period {
    fn schema_name() -> String {
        "Period".to_string()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        let mut schema = SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            ..Default::default()
        };
        schema.string().pattern = Some(r"^\d{4}-\d{2}".to_string());
        schema.metadata().description = Some(
            "Year-month in YYYY-MM format (a full date or timestamp is accepted and truncated)"
                .to_string(),
        );
        schema.into()
    }
}
