//! Time series extracted from SWAT+ output tables.
//!
//! Every output table carries `yr`, `mon` and `day` columns; extraction folds
//! them into a `date`, optionally moves that date to a reference day or month,
//! trims the table to an inclusive date window, applies row filters and keeps
//! the requested columns.

use crate::common::dates::{dd_mon_yyyy, format_date};
use crate::common::serialization::write_text_artifact;
use crate::domain::{SwatError, SwatResult};
use crate::table::{Cell, TextTable};
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const DATE_COLUMN: &str = "date";
const TIME_COLUMNS: [&str; 3] = ["yr", "mon", "day"];

/// How to cut one output file into a time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractSpec {
    pub has_units: bool,
    #[serde(default, with = "dd_mon_yyyy::option", skip_serializing_if = "Option::is_none")]
    pub begin_date: Option<NaiveDate>,
    #[serde(default, with = "dd_mon_yyyy::option", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_filter: Option<IndexMap<String, Vec<Cell>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usecols: Option<Vec<String>>,
}

/// One dated row of a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    #[serde(with = "dd_mon_yyyy")]
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: IndexMap<String, Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries {
    records: Vec<TimeSeriesRecord>,
}

impl TimeSeries {
    pub fn from_records(records: Vec<TimeSeriesRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TimeSeriesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names after `date`, in record order.
    pub fn columns(&self) -> Vec<&str> {
        self.records
            .first()
            .map(|record| record.values.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|record| record.date).collect()
    }

    /// Numeric values of `column`; missing and text cells yield `None`.
    pub fn values(&self, column: &str) -> SwatResult<Vec<Option<f64>>> {
        self.records
            .iter()
            .map(|record| {
                record
                    .values
                    .get(column)
                    .map(Cell::as_f64)
                    .ok_or_else(|| {
                        SwatError::data(
                            "DATA.SERIES_COLUMN",
                            format!("Column \"{}\" is not part of the time series", column),
                        )
                    })
            })
            .collect()
    }

    /// Persists the records as a JSON array with `DD-Mon-YYYY` dates.
    pub fn save_json(&self, json_file: &Path) -> SwatResult<()> {
        ensure_json_extension(json_file)?;
        let text = serde_json::to_string_pretty(self).map_err(|source| {
            SwatError::internal(
                "SYS.SERIES_ENCODE",
                format!("failed to encode time series: {}", source),
            )
        })?;
        write_text_artifact(json_file, &text, "IO.SERIES_WRITE")
    }
}

pub fn ensure_json_extension(json_file: &Path) -> SwatResult<()> {
    let extension = json_file
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extension != "json" {
        let shown = if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        };
        return Err(SwatError::configuration(
            "CONFIG.JSON_EXTENSION",
            format!(
                "Expected \".json\" extension for \"json_file\", but got \"{}\"",
                shown
            ),
        ));
    }
    Ok(())
}

/// Reads `target_file` and cuts it into a time series according to `spec`.
pub fn extract(target_file: impl AsRef<Path>, spec: &ExtractSpec) -> SwatResult<TimeSeries> {
    let target_file = target_file.as_ref();
    let file_name = target_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = target_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let table = TextTable::read(target_file, spec.has_units)?;
    let missing: Vec<&str> = TIME_COLUMNS
        .iter()
        .copied()
        .filter(|column| !table.has_column(column))
        .collect();
    if !missing.is_empty() {
        return Err(SwatError::format(
            "FORMAT.SERIES_TIME_COLUMNS",
            format!(
                "Missing required time series columns {:?} in file \"{}\"",
                missing, file_name
            ),
        ));
    }

    let daily = stem.ends_with("_day") || stem.ends_with("_subday");
    let monthly = stem.ends_with("_mon");
    if spec.ref_day.is_some() && daily {
        return Err(SwatError::configuration(
            "CONFIG.REF_DAY",
            format!(
                "Parameter \"ref_day\" is not applicable for daily time series in file \"{}\" because it would assign the same day to all records within a month.",
                file_name
            ),
        ));
    }
    if spec.ref_month.is_some() && (daily || monthly) {
        return Err(SwatError::configuration(
            "CONFIG.REF_MONTH",
            format!(
                "Parameter \"ref_month\" is not applicable for monthly, daily or sub-daily time series in file \"{}\" because it would assign the same month to all records within a year.",
                file_name
            ),
        ));
    }

    let [year_index, month_index, day_index] = TIME_COLUMNS.map(|column| table.column_index(column));
    let (year_index, month_index, day_index) = (year_index?, month_index?, day_index?);

    let mut dated: Vec<(NaiveDate, &Vec<Cell>)> = Vec::with_capacity(table.row_count());
    for (row_number, row) in table.rows().iter().enumerate() {
        let date = row_date(&row[year_index], &row[month_index], &row[day_index])
            .and_then(|date| shift_date(date, spec.ref_day, spec.ref_month))
            .ok_or_else(|| {
                SwatError::data(
                    "DATA.SERIES_DATE",
                    format!(
                        "row {} of file \"{}\" does not form a valid date",
                        row_number + 1,
                        file_name
                    ),
                )
            })?;
        dated.push((date, row));
    }

    let earliest = dated.iter().map(|(date, _)| *date).min();
    let latest = dated.iter().map(|(date, _)| *date).max();
    let begin = spec.begin_date.or(earliest);
    let end = spec.end_date.or(latest);
    if let (Some(begin), Some(end)) = (begin, end) {
        dated.retain(|(date, _)| begin <= *date && *date <= end);
    }
    if dated.is_empty() {
        let shown = |date: Option<NaiveDate>| date.map(format_date).unwrap_or_else(|| "None".to_string());
        return Err(SwatError::data(
            "DATA.SERIES_EMPTY",
            format!(
                "No data found between \"{}\" and \"{}\" in file \"{}\"",
                shown(spec.begin_date),
                shown(spec.end_date),
                file_name
            ),
        ));
    }

    if let Some(filter) = &spec.apply_filter {
        for (column, allowed) in filter {
            let index = table.column_index(column).map_err(|_| {
                SwatError::data(
                    "DATA.SERIES_FILTER",
                    format!(
                        "Column \"{}\" in apply_filter was not found in file \"{}\"",
                        column, file_name
                    ),
                )
            })?;
            let allowed_text: Vec<String> = allowed.iter().map(Cell::render).collect();
            dated.retain(|(_, row)| allowed_text.iter().any(|value| row[index].matches_text(value)));
            if dated.is_empty() {
                return Err(SwatError::data(
                    "DATA.SERIES_FILTER",
                    format!(
                        "Filtering by column \"{}\" with values {:?} returned no rows in \"{}\"",
                        column, allowed_text, file_name
                    ),
                ));
            }
        }
    }

    let selected: Vec<(String, usize)> = match &spec.usecols {
        Some(usecols) => usecols
            .iter()
            .map(|column| {
                table
                    .column_index(column)
                    .map(|index| (column.clone(), index))
                    .map_err(|_| {
                        SwatError::data(
                            "DATA.SERIES_USECOLS",
                            format!(
                                "Column \"{}\" specified in \"usecols\" was not found in file \"{}\"",
                                column, file_name
                            ),
                        )
                    })
            })
            .collect::<SwatResult<_>>()?,
        None => table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != DATE_COLUMN)
            .map(|(index, name)| (name.clone(), index))
            .collect(),
    };

    let records: Vec<TimeSeriesRecord> = dated
        .into_iter()
        .map(|(date, row)| TimeSeriesRecord {
            date,
            values: selected
                .iter()
                .map(|(name, index)| (name.clone(), row[*index].clone()))
                .collect(),
        })
        .collect();
    debug!(
        file = %target_file.display(),
        records = records.len(),
        columns = selected.len(),
        "extracted time series"
    );
    Ok(TimeSeries::from_records(records))
}

fn row_date(year: &Cell, month: &Cell, day: &Cell) -> Option<NaiveDate> {
    let year = i32::try_from(year.as_i64()?).ok()?;
    let month = u32::try_from(month.as_i64()?).ok()?;
    let day = u32::try_from(day.as_i64()?).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn shift_date(date: NaiveDate, ref_day: Option<u32>, ref_month: Option<u32>) -> Option<NaiveDate> {
    let date = match ref_day {
        Some(day) => date.with_day(day)?,
        None => date,
    };
    match ref_month {
        Some(month) => date.with_month(month),
        None => Some(date),
    }
}
