//! Read-modify-write engine for the fixed-width and whitespace aligned text
//! tables found in a SWAT+ `TxtInOut` directory.
//!
//! A table file is laid out as a free-form header line, a column-name row, an
//! optional units row and the data rows. Rows are parsed with the first
//! strategy that yields a rectangular grid; writing rebuilds every column as
//! right-justified text padded to the widest cell plus three spaces.

pub mod cell;
pub mod parser;

pub use cell::Cell;
pub use parser::ParseStrategy;

use crate::common::serialization::{read_text_artifact, write_text_artifact};
use crate::domain::{ChangeType, SwatError, SwatResult};
use indexmap::IndexMap;
use parser::{Grid, align_units, fixed_width_spans, parse_csv, split_lines, token_spans};
use std::path::{Path, PathBuf};
use tracing::debug;

const COLUMN_PADDING: usize = 3;
const OUTPUT_STEM_SUFFIXES: [&str; 5] = ["_day", "_mon", "_yr", "_aa", "_subday"];

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("file '{}' is empty; expected a header line", path.display())]
    Empty { path: PathBuf },
    #[error("file '{}' has no column-name row below its header line", path.display())]
    MissingColumns { path: PathBuf },
    #[error("failed to parse '{}' with the csv, whitespace, multi-space or fixed-width strategies", path.display())]
    Unparseable { path: PathBuf },
    #[error("units row of '{}' has {actual} fields but the table has {expected} columns", path.display())]
    UnitsMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("Overwriting SWAT+ Output Files is not allowed: '{}'", path.display())]
    OutputOverwrite { path: PathBuf },
    #[error("Column \"{column}\" was not found in file \"{}\"", path.display())]
    UnknownColumn { path: PathBuf, column: String },
    #[error("row {row} is out of range for file '{}' with {rows} rows", path.display())]
    RowOutOfRange { path: PathBuf, row: usize, rows: usize },
    #[error("cannot apply {change_type} to non-numeric value '{value}' in column \"{column}\" of '{}'", path.display())]
    NonNumeric {
        path: PathBuf,
        column: String,
        value: String,
        change_type: ChangeType,
    },
}

impl From<TableError> for SwatError {
    fn from(error: TableError) -> Self {
        let message = error.to_string();
        match error {
            TableError::Empty { .. } | TableError::MissingColumns { .. } => {
                SwatError::format("FORMAT.TABLE_LAYOUT", message)
            }
            TableError::Unparseable { .. } => SwatError::format("FORMAT.TABLE_PARSE", message),
            TableError::UnitsMismatch { .. } => SwatError::format("FORMAT.TABLE_UNITS", message),
            TableError::OutputOverwrite { .. } => {
                SwatError::configuration("CONFIG.OUTPUT_OVERWRITE", message)
            }
            TableError::UnknownColumn { .. } => SwatError::data("DATA.TABLE_COLUMN", message),
            TableError::RowOutOfRange { .. } => SwatError::data("DATA.TABLE_ROW", message),
            TableError::NonNumeric { .. } => SwatError::data("DATA.TABLE_VALUE", message),
        }
    }
}

/// `column -> allowed values` row filter; a row passes when every listed
/// column matches one of its values.
pub type RowFilter = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct TextTable {
    path: PathBuf,
    header_line: String,
    columns: Vec<String>,
    units_row: Option<Vec<Cell>>,
    rows: Vec<Vec<Cell>>,
    strategy: ParseStrategy,
    output_only: bool,
}

impl TextTable {
    pub fn read(path: impl AsRef<Path>, has_units: bool) -> SwatResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SwatError::io_system(
                "IO.TABLE_READ",
                format!("file '{}' does not exist", path.display()),
            ));
        }
        let text = read_text_artifact(path, "IO.TABLE_READ")?;
        let table = Self::parse(path, &text, has_units)?;
        debug!(
            file = %path.display(),
            strategy = table.strategy.as_str(),
            columns = table.columns.len(),
            rows = table.rows.len(),
            "parsed table"
        );
        Ok(table)
    }

    pub fn parse(path: &Path, text: &str, has_units: bool) -> Result<Self, TableError> {
        let mut lines = text.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| TableError::Empty {
                path: path.to_path_buf(),
            })?
            .to_string();
        let mut lines = lines.skip_while(|line| line.trim().is_empty());
        let column_line = lines.next().ok_or_else(|| TableError::MissingColumns {
            path: path.to_path_buf(),
        })?;
        // A units row may be entirely blank, so it is taken positionally.
        let units_line = if has_units {
            Some(lines.next().ok_or_else(|| units_mismatch(path, 0, 0))?)
        } else {
            None
        };
        let data_lines: Vec<&str> = lines.filter(|line| !line.trim().is_empty()).collect();
        let body = Body {
            column_line,
            units_line,
            data_lines,
        };

        let is_csv = path.extension().is_some_and(|extension| extension == "csv");
        let (strategy, columns, units_row, rows) = if is_csv {
            match Self::parse_csv_body(path, &body)? {
                Some(parsed) => parsed,
                None => Self::parse_text_body(path, &body)?,
            }
        } else {
            Self::parse_text_body(path, &body)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            header_line,
            columns,
            units_row,
            rows,
            strategy,
            output_only: is_output_path(path),
        })
    }

    fn parse_csv_body(path: &Path, body: &Body<'_>) -> Result<Option<ParsedBody>, TableError> {
        let text = std::iter::once(body.column_line)
            .chain(body.units_line)
            .chain(body.data_lines.iter().copied())
            .collect::<Vec<_>>()
            .join("\n");
        let Ok(mut grid) = parse_csv(&text) else {
            return Ok(None);
        };
        if grid.is_empty() || grid[0].iter().any(String::is_empty) {
            return Ok(None);
        }
        let columns = grid.remove(0);
        let units_row = if body.units_line.is_some() {
            if grid.is_empty() {
                return Err(units_mismatch(path, columns.len(), 0));
            }
            let units = grid.remove(0);
            if units.len() != columns.len() {
                return Err(units_mismatch(path, columns.len(), units.len()));
            }
            Some(units.iter().map(|token| Cell::parse(token)).collect())
        } else {
            None
        };
        Ok(Some((
            ParseStrategy::Csv,
            columns,
            units_row,
            typed_rows(grid),
        )))
    }

    fn parse_text_body(path: &Path, body: &Body<'_>) -> Result<ParsedBody, TableError> {
        let column_line = body.column_line;
        let data_lines = body.data_lines.as_slice();

        let mut grid_lines = Vec::with_capacity(data_lines.len() + 1);
        grid_lines.push(column_line);
        grid_lines.extend_from_slice(data_lines);

        let (strategy, mut grid) = ParseStrategy::TEXT_ORDER
            .into_iter()
            .find_map(|strategy| split_lines(strategy, &grid_lines).map(|grid| (strategy, grid)))
            .ok_or_else(|| TableError::Unparseable {
                path: path.to_path_buf(),
            })?;
        let columns = grid.remove(0);

        let units_row = match body.units_line {
            Some(units_line) => {
                let reference_line = data_lines.first().copied().unwrap_or(column_line);
                let mut reference: Vec<(usize, usize)> = token_spans(reference_line)
                    .into_iter()
                    .map(|(start, end, _)| (start, end))
                    .collect();
                if reference.len() != columns.len() {
                    reference = fixed_width_spans(&grid_lines);
                }
                let units = align_units(units_line, &reference, columns.len())
                    .map_err(|actual| units_mismatch(path, columns.len(), actual))?;
                Some(units)
            }
            None => None,
        };

        Ok((strategy, columns, units_row, typed_rows(grid)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header_line(&self) -> &str {
        &self.header_line
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn units_row(&self) -> Option<&[Cell]> {
        self.units_row.as_deref()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub const fn strategy(&self) -> ParseStrategy {
        self.strategy
    }

    pub const fn is_output_only(&self) -> bool {
        self.output_only
    }

    pub fn column_index(&self, column: &str) -> SwatResult<usize> {
        self.columns
            .iter()
            .position(|name| name == column)
            .ok_or_else(|| self.unknown_column(column).into())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|name| name == column)
    }

    pub fn column(&self, column: &str) -> SwatResult<Vec<&Cell>> {
        let index = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn value(&self, row: usize, column: &str) -> SwatResult<&Cell> {
        let index = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|cells| &cells[index])
            .ok_or_else(|| self.row_out_of_range(row).into())
    }

    pub fn set_value(&mut self, row: usize, column: &str, cell: Cell) -> SwatResult<()> {
        let index = self.column_index(column)?;
        let error = self.row_out_of_range(row);
        let cells = self.rows.get_mut(row).ok_or(error)?;
        cells[index] = cell;
        Ok(())
    }

    /// Keeps only the rows accepted by `filter`.
    pub fn retain_rows(&mut self, filter: &RowFilter) -> SwatResult<()> {
        let mask = self.filter_mask(Some(filter))?;
        let mut flags = mask.into_iter();
        self.rows.retain(|_| flags.next().unwrap_or(false));
        Ok(())
    }

    /// Applies a calibration change to every numeric cell of `column` whose row
    /// passes `filter`. Returns the number of changed cells.
    pub fn apply_change(
        &mut self,
        column: &str,
        change_type: ChangeType,
        value: f64,
        filter: Option<&RowFilter>,
    ) -> SwatResult<usize> {
        let index = self.column_index(column)?;
        let mask = self.filter_mask(filter)?;
        let mut changed = 0;
        for (row, selected) in self.rows.iter_mut().zip(mask) {
            if !selected {
                continue;
            }
            let cell = &mut row[index];
            let current = cell.as_f64().ok_or_else(|| TableError::NonNumeric {
                path: self.path.clone(),
                column: column.to_string(),
                value: cell.render(),
                change_type,
            })?;
            let updated = change_type.apply(current, value);
            let integral = matches!(cell, Cell::Integer(_)) && updated.fract() == 0.0;
            *cell = if integral {
                Cell::Integer(updated as i64)
            } else {
                Cell::Real(updated)
            };
            changed += 1;
        }
        debug!(
            file = %self.path.display(),
            column,
            change_type = change_type.as_str(),
            value,
            changed,
            "applied table change"
        );
        Ok(changed)
    }

    fn filter_mask(&self, filter: Option<&RowFilter>) -> SwatResult<Vec<bool>> {
        let mut mask = vec![true; self.rows.len()];
        let Some(filter) = filter else {
            return Ok(mask);
        };
        for (column, allowed) in filter {
            let index = self.column_index(column)?;
            for (selected, row) in mask.iter_mut().zip(&self.rows) {
                *selected &= allowed.iter().any(|value| row[index].matches_text(value));
            }
        }
        Ok(mask)
    }

    /// Serializes the table in its on-disk layout.
    pub fn render(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.header_line);
        output.push('\n');

        if self.rows.is_empty() && self.units_row.is_none() {
            let line: String = self
                .columns
                .iter()
                .map(|name| {
                    let width = name.chars().count().max(1) + COLUMN_PADDING;
                    format!("{name:>width$}")
                })
                .collect();
            output.push_str(&line);
            output.push('\n');
            return output;
        }

        let rendered: Vec<Vec<String>> = self
            .units_row
            .iter()
            .chain(self.rows.iter())
            .map(|row| row.iter().map(Cell::render).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, name)| {
                rendered
                    .iter()
                    .map(|row| row[index].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
                    + COLUMN_PADDING
            })
            .collect();

        let mut push_line = |fields: &[String]| {
            for (field, width) in fields.iter().zip(&widths) {
                output.push_str(&format!("{field:>width$}", width = *width));
            }
            output.push('\n');
        };
        push_line(self.columns.as_slice());
        for row in &rendered {
            push_line(row.as_slice());
        }
        output
    }

    /// Writes the table back to its source path.
    pub fn write(&self) -> SwatResult<()> {
        if self.output_only {
            return Err(TableError::OutputOverwrite {
                path: self.path.clone(),
            }
            .into());
        }
        write_text_artifact(&self.path, &self.render(), "IO.TABLE_WRITE")?;
        debug!(file = %self.path.display(), rows = self.rows.len(), "wrote table");
        Ok(())
    }

    fn unknown_column(&self, column: &str) -> TableError {
        TableError::UnknownColumn {
            path: self.path.clone(),
            column: column.to_string(),
        }
    }

    fn row_out_of_range(&self, row: usize) -> TableError {
        TableError::RowOutOfRange {
            path: self.path.clone(),
            row,
            rows: self.rows.len(),
        }
    }
}

type ParsedBody = (ParseStrategy, Vec<String>, Option<Vec<Cell>>, Vec<Vec<Cell>>);

struct Body<'a> {
    column_line: &'a str,
    units_line: Option<&'a str>,
    data_lines: Vec<&'a str>,
}

/// SWAT+ output files: stems ending `_day`, `_mon`, `_yr`, `_aa`, `_subday`,
/// or any `.csv` file.
pub fn is_output_path(path: &Path) -> bool {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    OUTPUT_STEM_SUFFIXES
        .iter()
        .any(|suffix| stem.ends_with(suffix))
        || path.extension().is_some_and(|extension| extension == "csv")
}

fn typed_rows(grid: Grid) -> Vec<Vec<Cell>> {
    grid.into_iter()
        .map(|row| row.iter().map(|token| Cell::parse(token)).collect())
        .collect()
}

fn units_mismatch(path: &Path, expected: usize, actual: usize) -> TableError {
    TableError::UnitsMismatch {
        path: path.to_path_buf(),
        expected,
        actual,
    }
}
