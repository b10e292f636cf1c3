//! Typed cell access
//!
//! A [`Cell`] is one raw value of a source record together with its
//! provenance. Every accessor follows the same contract: an empty or
//! whitespace-only value is absent (`Ok(None)`), a non-empty value that does not
//! parse as the requested type is a [`CellError::Parse`] carrying file, row and
//! column.

use crate::domain::{CellError, CellProvenance};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use std::fmt;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
];

/// One raw cell value with provenance
#[derive(Debug, Clone)]
pub struct Cell<'a> {
    raw: &'a str,
    provenance: CellProvenance,
}

impl<'a> Cell<'a> {
    /// Creates a new cell
    pub fn new(raw: &'a str, provenance: CellProvenance) -> Self {
        Self { raw, provenance }
    }

    /// Returns the raw, untrimmed value
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// Returns the provenance of this cell
    pub fn provenance(&self) -> &CellProvenance {
        &self.provenance
    }

    /// Returns true if the cell is empty or whitespace-only
    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }

    fn parse_error(&self, expected: &'static str) -> CellError {
        CellError::Parse {
            provenance: self.provenance.clone(),
            expected,
            value: self.raw.to_string(),
        }
    }

    fn trimmed(&self) -> Option<&'a str> {
        let value = self.raw.trim();
        (!value.is_empty()).then_some(value)
    }

    /// Returns the trimmed string value
    pub fn as_string(&self) -> Result<Option<&'a str>, CellError> {
        Ok(self.trimmed())
    }

    /// Returns the value parsed as a signed integer
    pub fn as_int(&self) -> Result<Option<i64>, CellError> {
        self.trimmed()
            .map(|v| v.parse::<i64>().map_err(|_| self.parse_error("integer")))
            .transpose()
    }

    /// Returns the value parsed as a floating point number
    pub fn as_double(&self) -> Result<Option<f64>, CellError> {
        self.trimmed()
            .map(|v| match v.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                _ => Err(self.parse_error("number")),
            })
            .transpose()
    }

    /// Returns the value parsed as a boolean
    ///
    /// Accepts `true/false`, `1/0`, `yes/no` and `y/n`, case-insensitively.
    pub fn as_bool(&self) -> Result<Option<bool>, CellError> {
        self.trimmed()
            .map(|v| match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(true),
                "false" | "0" | "no" | "n" => Ok(false),
                _ => Err(self.parse_error("boolean")),
            })
            .transpose()
    }

    /// Returns the value parsed as a calendar date
    ///
    /// A datetime value is accepted and truncated to its date.
    pub fn as_date(&self) -> Result<Option<NaiveDate>, CellError> {
        self.trimmed()
            .map(|v| {
                parse_date(v)
                    .or_else(|| parse_datetime(v).map(|dt| dt.date()))
                    .ok_or_else(|| self.parse_error("date"))
            })
            .transpose()
    }

    /// Returns the value parsed as a datetime
    ///
    /// A date-only value is accepted as midnight of that date.
    pub fn as_datetime(&self) -> Result<Option<NaiveDateTime>, CellError> {
        self.trimmed()
            .map(|v| {
                parse_datetime(v)
                    .or_else(|| parse_date(v).map(|d| d.and_time(NaiveTime::MIN)))
                    .ok_or_else(|| self.parse_error("datetime"))
            })
            .transpose()
    }

    /// Returns the value as a date of the precision given by a vendor precision cell
    ///
    /// An absent precision means full precision (datetime when the value carries
    /// a time, date otherwise). Precision `U` means unknown, which yields an
    /// absent date. An unrecognised precision code is a parse error on the
    /// precision cell.
    pub fn as_partial_date(&self, precision: &Cell<'_>) -> Result<Option<PartialDate>, CellError> {
        let code = match precision.trimmed() {
            Some(code) => Some(
                DatePrecision::from_code(code)
                    .ok_or_else(|| precision.parse_error("date precision code"))?,
            ),
            None => None,
        };

        let Some(value) = self.trimmed() else {
            return Ok(None);
        };

        let partial = match code {
            Some(DatePrecision::Unknown) => return Ok(None),
            Some(DatePrecision::Year) => {
                let date = self.date_prefix(value)?;
                PartialDate::Year(chrono::Datelike::year(&date))
            }
            Some(DatePrecision::YearMonth) => {
                let date = self.date_prefix(value)?;
                PartialDate::YearMonth(
                    chrono::Datelike::year(&date),
                    chrono::Datelike::month(&date),
                )
            }
            Some(DatePrecision::Date) => PartialDate::Date(self.date_prefix(value)?),
            Some(DatePrecision::DateTime) => PartialDate::DateTime(
                self.as_datetime()?
                    .ok_or_else(|| self.parse_error("datetime"))?,
            ),
            None => match parse_datetime(value) {
                Some(dt) => PartialDate::DateTime(dt),
                None => PartialDate::Date(self.date_prefix(value)?),
            },
        };
        Ok(Some(partial))
    }

    /// Parses a value of reduced precision, tolerating vendor padding
    ///
    /// Vendors pad `Y`/`YM` values to a full date (`2019-01-01`) but some send
    /// the truncated form (`2019`, `2019-06`).
    fn date_prefix(&self, value: &str) -> Result<NaiveDate, CellError> {
        if let Some(date) = parse_date(value).or_else(|| parse_datetime(value).map(|dt| dt.date())) {
            return Ok(date);
        }
        if let Ok(year) = value.parse::<i32>() {
            if (1..=9999).contains(&year) && value.len() == 4 {
                return NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| self.parse_error("date"));
            }
        }
        NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
            .map_err(|_| self.parse_error("date"))
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Vendor date precision code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePrecision {
    Year,
    YearMonth,
    Date,
    DateTime,
    Unknown,
}

impl DatePrecision {
    /// Parses a vendor precision code (`Y`, `YM`, `YMD`, `YMDT`, `U`)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "Y" => Some(DatePrecision::Year),
            "YM" => Some(DatePrecision::YearMonth),
            "YMD" => Some(DatePrecision::Date),
            "YMDT" => Some(DatePrecision::DateTime),
            "U" => Some(DatePrecision::Unknown),
            _ => None,
        }
    }
}

/// A date known only to some precision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialDate {
    Year(i32),
    YearMonth(i32, u32),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl PartialDate {
    /// Returns the earliest calendar date covered by this value
    pub fn earliest_date(&self) -> NaiveDate {
        match self {
            PartialDate::Year(y) => NaiveDate::from_ymd_opt(*y, 1, 1).unwrap_or(NaiveDate::MIN),
            PartialDate::YearMonth(y, m) => {
                NaiveDate::from_ymd_opt(*y, *m, 1).unwrap_or(NaiveDate::MIN)
            }
            PartialDate::Date(d) => *d,
            PartialDate::DateTime(dt) => dt.date(),
        }
    }

    /// Returns the value as a JSON string in reduced-precision ISO 8601 form
    pub fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialDate::Year(y) => write!(f, "{y:04}"),
            PartialDate::YearMonth(y, m) => write!(f, "{y:04}-{m:02}"),
            PartialDate::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PartialDate::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}
