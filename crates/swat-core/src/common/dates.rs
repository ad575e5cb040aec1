//! `DD-Mon-YYYY` date handling shared by the control-file editor, the
//! time-series extractor and the persisted simulation file.

use crate::domain::{SwatError, SwatResult};
use chrono::{Datelike, NaiveDate};

pub const DATE_FORMAT: &str = "%d-%b-%Y";

pub fn parse_date(value: &str) -> SwatResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        SwatError::configuration(
            "CONFIG.DATE_FORMAT",
            format!(
                "Invalid date format: \"{}\"; expected format is DD-Mon-YYYY (e.g., 15-Mar-2010)",
                value
            ),
        )
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Day of year, 1-based, as written to `time.sim`.
pub fn julian_day(date: NaiveDate) -> u32 {
    date.ordinal()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    begin: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(begin: NaiveDate, end: NaiveDate) -> SwatResult<Self> {
        if begin >= end {
            return Err(SwatError::configuration(
                "CONFIG.DATE_RANGE",
                format!(
                    "begin_date {} must be earlier than end_date {}",
                    format_date(begin),
                    format_date(end)
                ),
            ));
        }
        Ok(Self { begin, end })
    }

    pub fn parse(begin: &str, end: &str) -> SwatResult<Self> {
        Self::new(parse_date(begin)?, parse_date(end)?)
    }

    pub const fn begin(&self) -> NaiveDate {
        self.begin
    }

    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin <= date && date <= self.end
    }
}

/// Serde adapter for `NaiveDate` fields stored as `DD-Mon-YYYY` strings.
pub mod dd_mon_yyyy {
    use super::{DATE_FORMAT, format_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::{DATE_FORMAT, format_date};
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(date) => serializer.serialize_str(&format_date(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| {
                    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                        .map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DateRange, format_date, julian_day, parse_date};
    use chrono::NaiveDate;

    #[test]
    fn parses_and_formats_dd_mon_yyyy() {
        let date = parse_date("15-Mar-2010").expect("date should parse");
        assert_eq!(date, NaiveDate::from_ymd_opt(2010, 3, 15).unwrap());
        assert_eq!(format_date(date), "15-Mar-2010");
        assert_eq!(julian_day(date), 74);
    }

    #[test]
    fn rejects_iso_dates() {
        let error = parse_date("2025-01-01").expect_err("iso format should fail");
        assert_eq!(
            error.message(),
            "Invalid date format: \"2025-01-01\"; expected format is DD-Mon-YYYY (e.g., 15-Mar-2010)"
        );
    }

    #[test]
    fn range_requires_begin_before_end() {
        let error = DateRange::parse("01-Jan-2012", "01-Jan-2010").expect_err("reversed range");
        assert_eq!(
            error.message(),
            "begin_date 01-Jan-2012 must be earlier than end_date 01-Jan-2010"
        );

        let range = DateRange::parse("01-Jan-2010", "31-Dec-2012").expect("range should build");
        assert!(range.contains(range.begin()));
        assert!(range.contains(range.end()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2013, 1, 1).unwrap()));
    }
}
