use super::TxtInOut;
use crate::common::serialization::{
    format_scientific_f64, format_shortest_f64, write_text_verbatim,
};
use crate::domain::{ParameterChange, SwatError, SwatResult, compact_units};
use std::fs;
use tracing::debug;

const CALIBRATION_FILE: &str = "calibration.cal";
const VALUE_FIELD_LIMIT: usize = 15;
const ZERO_COLUMNS: usize = 6;

/// Renders the full `calibration.cal` text for `parameters`.
pub fn render_calibration(parameters: &[ParameterChange]) -> SwatResult<String> {
    let mut text = format!("Number of parameters:\n{}\n", parameters.len());
    text.push_str(&format!(
        "{:<12}{:<21}{:<14}{:<9}{:<8}{:<7}{:<8}{:<9}{:<8}{:<5}{:>7}\n",
        "NAME", "CHG_TYPE", "VAL", "CONDS", "LYR1", "LYR2", "YEAR1", "YEAR2", "DAY1", "DAY2",
        "OBJ_TOT"
    ));

    for change in parameters {
        let units = match change.units() {
            Some(units) => compact_units(units)?,
            None => Vec::new(),
        };
        let conditions = condition_lines(change);

        text.push_str(&format!(
            "{:<12}{:>8}{}{:>16}",
            change.name(),
            change.change_type().as_str(),
            format_value_field(change.value()),
            conditions.len()
        ));
        for _ in 0..ZERO_COLUMNS {
            text.push_str(&format!("{:>8}", 0));
        }
        text.push_str(&format!("{:>8}", units.len()));
        if !units.is_empty() {
            let joined = units
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join("    ");
            text.push_str("       ");
            text.push_str(&joined);
        }
        for line in conditions {
            text.push('\n');
            text.push_str(&line);
        }
        text.push('\n');
    }
    Ok(text)
}

/// 16-wide right-aligned value; switches to `d.dddddde+XX` when the shortest
/// form does not fit in 15 characters.
fn format_value_field(value: f64) -> String {
    let shortest = format_shortest_f64(value);
    let rendered = if shortest.len() > VALUE_FIELD_LIMIT {
        format_scientific_f64(value, 6)
    } else {
        shortest
    };
    format!("{rendered:>16}")
}

fn condition_lines(change: &ParameterChange) -> Vec<String> {
    let Some(conditions) = change.conditions() else {
        return Vec::new();
    };
    conditions
        .iter()
        .flat_map(|(kind, values)| {
            values
                .iter()
                .map(move |value| format!("{:<19}{:<15} {:<16}{}", kind.as_str(), "=", 0, value))
        })
        .collect()
}

impl TxtInOut {
    /// Recreates `calibration.cal` and enables it in `file.cio`.
    pub fn write_calibration_file(&self, parameters: &[ParameterChange]) -> SwatResult<()> {
        let path = self.root_dir.join(CALIBRATION_FILE);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| {
                SwatError::io_system(
                    "IO.CALIBRATION_REMOVE",
                    format!("failed to remove '{}': {}", path.display(), source),
                )
            })?;
        }
        self.set_calibration_in_file_cio(true)?;

        let text = render_calibration(parameters)?;
        write_text_verbatim(&path, &text, "IO.CALIBRATION_WRITE")?;
        debug!(file = %path.display(), parameters = parameters.len(), "wrote calibration file");
        Ok(())
    }
}
