//! Fixed-line edits of `time.sim`, `print.prt` and `file.cio`.

use super::TxtInOut;
use crate::common::dates::{DateRange, julian_day};
use crate::common::serialization::{read_text_artifact, write_text_verbatim};
use crate::domain::{SwatError, SwatResult};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const TIME_SIM: &str = "time.sim";
const PRINT_PRT: &str = "print.prt";
const FILE_CIO: &str = "file.cio";
const PERIOD_LINE: usize = 3;
const CSV_PRINT_LINE: usize = 7;
const PRINT_PREAMBLE_LINES: usize = 10;
const CALIBRATION_CIO_INDEX: usize = 21;
const VALID_TIMESTEPS: [(u32, &str); 5] = [
    (0, "1 day"),
    (1, "12 hours"),
    (24, "1 hour"),
    (96, "15 minutes"),
    (1440, "1 minute"),
];

/// Output objects known to `print.prt`, grouped by category.
pub const PRINT_OBJECT_CATALOG: [(&str, &[&str]); 8] = [
    (
        "model_components",
        &[
            "channel_sd",
            "channel_sdmorph",
            "aquifer",
            "reservoir",
            "recall",
            "ru",
            "hyd",
            "water_allo",
        ],
    ),
    (
        "basin_model_components",
        &[
            "basin_sd_cha",
            "basin_sd_chamorph",
            "basin_aqu",
            "basin_res",
            "basin_psc",
        ],
    ),
    ("nutrient_balance", &["basin_nb", "lsunit_nb", "hru-lte_nb"]),
    (
        "water_balance",
        &["basin_wb", "lsunit_wb", "hru_wb", "hru-lte_wb"],
    ),
    (
        "plant_weather",
        &["basin_pw", "lsunit_pw", "hru_pw", "hru-lte_pw"],
    ),
    ("losses", &["basin_ls", "lsunit_ls", "hru_ls", "hru-lte_ls"]),
    (
        "salts",
        &[
            "basin_salt",
            "hru_salt",
            "ru_salt",
            "aqu_salt",
            "channel_salt",
            "res_salt",
            "wetland_salt",
        ],
    ),
    (
        "constituents",
        &[
            "basin_cs",
            "hru_cs",
            "ru_cs",
            "aqu_cs",
            "channel_cs",
            "res_cs",
            "wetland_cs",
        ],
    ),
];

/// Daily, monthly, yearly and average-annual print switches of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintFlags {
    pub daily: bool,
    pub monthly: bool,
    pub yearly: bool,
    pub avann: bool,
}

impl Default for PrintFlags {
    fn default() -> Self {
        Self {
            daily: true,
            monthly: true,
            yearly: true,
            avann: true,
        }
    }
}

impl PrintFlags {
    fn render_line(self, object: &str) -> String {
        let mut line = format!("{object:<29}");
        for flag in [self.daily, self.monthly, self.yearly, self.avann] {
            line.push_str(&format!("{:<14}", if flag { "y" } else { "n" }));
        }
        let mut line = line.trim_end().to_string();
        line.push('\n');
        line
    }
}

/// Partial flags from configuration; unset switches default to enabled.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrintFlagsOverride {
    pub daily: Option<bool>,
    pub monthly: Option<bool>,
    pub yearly: Option<bool>,
    pub avann: Option<bool>,
}

impl PrintFlagsOverride {
    pub fn resolve(self) -> PrintFlags {
        let defaults = PrintFlags::default();
        PrintFlags {
            daily: self.daily.unwrap_or(defaults.daily),
            monthly: self.monthly.unwrap_or(defaults.monthly),
            yearly: self.yearly.unwrap_or(defaults.yearly),
            avann: self.avann.unwrap_or(defaults.avann),
        }
    }
}

pub fn is_known_object(object: &str) -> bool {
    PRINT_OBJECT_CATALOG
        .iter()
        .any(|(_, objects)| objects.contains(&object))
}

pub(crate) fn ensure_known_object(object: &str) -> SwatResult<()> {
    if is_known_object(object) {
        return Ok(());
    }
    Err(SwatError::configuration(
        "CONFIG.PRINT_OBJECT",
        format!(
            "Object \"{}\" not found in print.prt file; use \"allow_unavailable_object=True\" to proceed",
            object
        ),
    ))
}

pub(crate) fn validate_timestep(step: u32) -> SwatResult<()> {
    if VALID_TIMESTEPS.iter().any(|(valid, _)| *valid == step) {
        return Ok(());
    }
    let allowed = VALID_TIMESTEPS
        .iter()
        .map(|(value, label)| format!("{value} = {label}"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(SwatError::configuration(
        "CONFIG.TIMESTEP",
        format!("Received invalid step: {step}; must be one of [{allowed}]"),
    ))
}

pub(crate) fn validate_warmup(warmup: u32) -> SwatResult<()> {
    if warmup == 0 {
        return Err(SwatError::configuration(
            "CONFIG.WARMUP",
            format!("Expected warmup >= 1, but received warmup = {warmup}"),
        ));
    }
    Ok(())
}

impl TxtInOut {
    /// Rewrites the begin/end julian day and year on line 3 of `time.sim`.
    pub fn set_simulation_period(&self, period: DateRange) -> SwatResult<()> {
        let (begin, end) = (period.begin(), period.end());
        self.edit_period_line(TIME_SIM, 5, |fields| {
            fields[0] = julian_day(begin).to_string();
            fields[1] = begin.format("%Y").to_string();
            fields[2] = julian_day(end).to_string();
            fields[3] = end.format("%Y").to_string();
            time_sim_line(fields)
        })
    }

    pub fn set_simulation_timestep(&self, step: u32) -> SwatResult<()> {
        validate_timestep(step)?;
        self.edit_period_line(TIME_SIM, 5, |fields| {
            fields[4] = step.to_string();
            time_sim_line(fields)
        })
    }

    pub fn set_warmup_year(&self, warmup: u32) -> SwatResult<()> {
        validate_warmup(warmup)?;
        self.edit_period_line(PRINT_PRT, 6, |fields| {
            fields[0] = warmup.to_string();
            format!(
                "{:<12} {:<11} {:<11} {:<10} {:<10} {:<10} \n",
                fields[0], fields[1], fields[2], fields[3], fields[4], fields[5]
            )
        })
    }

    /// Sets the window in which output files record results.
    pub fn set_print_period(&self, period: DateRange) -> SwatResult<()> {
        let (begin, end) = (period.begin(), period.end());
        self.edit_period_line(PRINT_PRT, 6, |fields| {
            format!(
                "{:<12}{:<11}{:<11}{:<10}{:<10}{}\n",
                fields[0],
                julian_day(begin),
                begin.format("%Y"),
                julian_day(end),
                end.format("%Y"),
                fields[5]
            )
        })
    }

    pub fn set_print_interval(&self, interval: u32) -> SwatResult<()> {
        self.edit_period_line(PRINT_PRT, 5, |fields| {
            format!(
                "{:<12}{:<11}{:<11}{:<10}{:<10}{}\n",
                fields[0], fields[1], fields[2], fields[3], fields[4], interval
            )
        })
    }

    pub fn enable_csv_print(&self) -> SwatResult<()> {
        self.set_csv_print(true)
    }

    pub fn disable_csv_print(&self) -> SwatResult<()> {
        self.set_csv_print(false)
    }

    fn set_csv_print(&self, enable: bool) -> SwatResult<()> {
        let path = self.root_dir.join(PRINT_PRT);
        let mut lines = read_lines(&path)?;
        let line = lines
            .get_mut(CSV_PRINT_LINE - 1)
            .ok_or_else(|| short_file(&path, CSV_PRINT_LINE))?;
        let rest: String = line.chars().skip(1).collect();
        *line = format!("{}{}", if enable { 'y' } else { 'n' }, rest);
        write_lines(&path, &lines)?;
        debug!(file = %path.display(), enable, "set csv print");
        Ok(())
    }

    /// Rewrites the print flags of `object`, or of every listed object when
    /// `object` is `None`. A named object missing from the file is appended.
    pub fn enable_object_in_print_prt(
        &self,
        object: Option<&str>,
        flags: PrintFlags,
        allow_unavailable: bool,
    ) -> SwatResult<()> {
        if let Some(object) = object {
            if !allow_unavailable {
                ensure_known_object(object)?;
            }
        }

        let path = self.root_dir.join(PRINT_PRT);
        let lines = read_lines(&path)?;
        let mut rewritten = String::new();
        let mut found = false;
        for (index, line) in lines.iter().enumerate() {
            let Some(line_object) = line.split_whitespace().next() else {
                rewritten.push_str(line);
                continue;
            };
            if index < PRINT_PREAMBLE_LINES {
                rewritten.push_str(line);
                continue;
            }
            match object {
                None => rewritten.push_str(&flags.render_line(line_object)),
                Some(object) if object == line_object => {
                    rewritten.push_str(&flags.render_line(line_object));
                    found = true;
                }
                Some(_) => rewritten.push_str(line),
            }
        }
        if let Some(object) = object.filter(|_| !found) {
            if !rewritten.is_empty() && !rewritten.ends_with('\n') {
                rewritten.push('\n');
            }
            rewritten.push_str(&flags.render_line(object));
        }

        write_text_verbatim(&path, &rewritten, "IO.PRINT_PRT_WRITE")?;
        debug!(file = %path.display(), object = object.unwrap_or("*"), appended = object.is_some() && !found, "updated print.prt objects");
        Ok(())
    }

    /// Points line 22 of `file.cio` at `calibration.cal`, enabling or
    /// disabling `cal_parms.cal`.
    pub fn set_calibration_in_file_cio(&self, enabled: bool) -> SwatResult<()> {
        let path = self.root_dir.join(FILE_CIO);
        let mut lines = read_lines(&path)?;
        let line = lines
            .get_mut(CALIBRATION_CIO_INDEX)
            .ok_or_else(|| short_file(&path, CALIBRATION_CIO_INDEX + 1))?;

        let mut values = vec![
            "chg",
            if enabled { "cal_parms.cal" } else { "null" },
            "calibration.cal",
        ];
        values.extend(std::iter::repeat_n("null", 9));
        let last = values.len() - 1;
        let mut rendered = String::new();
        for (index, value) in values.iter().enumerate() {
            let width = if index == last { 4 } else { 18 };
            rendered.push_str(&format!("{value:<width$}"));
        }
        *line = format!("{}\n", rendered.trim_end());

        write_lines(&path, &lines)
    }

    fn edit_period_line(
        &self,
        file_name: &str,
        required_fields: usize,
        rebuild: impl FnOnce(&mut Vec<String>) -> String,
    ) -> SwatResult<()> {
        let path = self.root_dir.join(file_name);
        let mut lines = read_lines(&path)?;
        let line = lines
            .get_mut(PERIOD_LINE - 1)
            .ok_or_else(|| short_file(&path, PERIOD_LINE))?;
        let mut fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if fields.len() < required_fields {
            return Err(SwatError::format(
                "FORMAT.CONTROL_LINE",
                format!(
                    "line {} of '{}' has {} fields, expected at least {}",
                    PERIOD_LINE,
                    path.display(),
                    fields.len(),
                    required_fields
                ),
            ));
        }
        *line = rebuild(&mut fields);
        write_lines(&path, &lines)?;
        debug!(file = %path.display(), line = PERIOD_LINE, "rewrote control line");
        Ok(())
    }
}

fn time_sim_line(fields: &[String]) -> String {
    format!(
        "{:>8} {:>10} {:>10} {:>10} {:>10} \n",
        fields[0], fields[1], fields[2], fields[3], fields[4]
    )
}

/// Lines with their terminators, so untouched lines are written back as read.
fn read_lines(path: &Path) -> SwatResult<Vec<String>> {
    if !path.is_file() {
        return Err(SwatError::io_system(
            "IO.CONTROL_READ",
            format!("file '{}' does not exist", path.display()),
        ));
    }
    let text = read_text_artifact(path, "IO.CONTROL_READ")?;
    Ok(text.split_inclusive('\n').map(str::to_string).collect())
}

fn write_lines(path: &Path, lines: &[String]) -> SwatResult<()> {
    write_text_verbatim(path, &lines.concat(), "IO.CONTROL_WRITE")
}

fn short_file(path: &Path, line: usize) -> SwatError {
    SwatError::format(
        "FORMAT.CONTROL_LINE",
        format!("file '{}' has no line {}", path.display(), line),
    )
}
