//! Organisation date overrides
//!
//! Some source systems fill unknown clinical dates with a fixed placeholder
//! that predates the organisation's clinical system. Each organisation listed
//! in `[[transform.date_overrides]]` gets an earliest valid date; clinical
//! dates before it are omitted from the resource.

use crate::config::schema::DateOverrideConfig;
use crate::core::parse::PartialDate;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Earliest valid clinical date per organisation
#[derive(Debug, Clone, Default)]
pub struct DateOverrides {
    earliest: HashMap<String, NaiveDate>,
}

impl DateOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entries: &[DateOverrideConfig]) -> Self {
        let mut overrides = Self::new();
        for entry in entries {
            overrides.insert(&entry.organisation, entry.earliest_valid_date);
        }
        overrides
    }

    pub fn insert(&mut self, organisation: &str, earliest_valid_date: NaiveDate) {
        self.earliest
            .insert(organisation.trim().to_string(), earliest_valid_date);
    }

    pub fn earliest_valid_date(&self, organisation: &str) -> Option<NaiveDate> {
        self.earliest.get(organisation.trim()).copied()
    }

    pub fn len(&self) -> usize {
        self.earliest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.earliest.is_empty()
    }

    /// Returns the date unless it falls before the organisation's earliest valid date
    pub fn filter(&self, organisation: &str, date: Option<PartialDate>) -> Option<PartialDate> {
        let date = date?;
        match self.earliest_valid_date(organisation) {
            Some(earliest) if date.earliest_date() < earliest => {
                tracing::debug!(
                    organisation = %organisation,
                    date = %date,
                    earliest = %earliest,
                    "Dropping clinical date before organisation's earliest valid date"
                );
                None
            }
            _ => Some(date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn overrides() -> DateOverrides {
        DateOverrides::from_config(&[DateOverrideConfig {
            organisation: "ORG1".to_string(),
            earliest_valid_date: date(1990, 1, 1),
        }])
    }

    #[test_case(PartialDate::Date(date(1900, 1, 1)), false ; "placeholder dropped")]
    #[test_case(PartialDate::Date(date(1990, 1, 1)), true ; "boundary kept")]
    #[test_case(PartialDate::Year(1989), false ; "year before dropped")]
    #[test_case(PartialDate::YearMonth(2001, 4), true ; "later kept")]
    fn test_filter_for_configured_organisation(value: PartialDate, kept: bool) {
        assert_eq!(overrides().filter("ORG1", Some(value)).is_some(), kept);
    }

    #[test]
    fn test_unconfigured_organisation_keeps_every_date() {
        let value = PartialDate::Date(date(1900, 1, 1));
        assert_eq!(overrides().filter("ORG2", Some(value)), Some(value));
        assert_eq!(overrides().filter("ORG1", None), None);
    }
}
