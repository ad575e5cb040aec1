use crate::common::serialization::{read_text_artifact, write_text_artifact};
use crate::domain::{SwatError, SwatResult};
use crate::numerics::Problem;
use crate::timeseries::TimeSeries;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SIMULATION_FILE: &str = "sensitivity_simulation.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub sample_length: usize,
    pub total_time_sec: u64,
    pub time_per_sample_sec: f64,
}

impl TimingSummary {
    /// Whole seconds overall and tenths of a second per sample, ties to even.
    pub fn new(sample_length: usize, elapsed_sec: f64) -> Self {
        let per_sample = if sample_length == 0 {
            0.0
        } else {
            elapsed_sec / sample_length as f64
        };
        Self {
            sample_length,
            total_time_sec: elapsed_sec.round_ties_even() as u64,
            time_per_sample_sec: (per_sample * 10.0).round_ties_even() / 10.0,
        }
    }
}

/// Results of one sample row: its variable values, the run directory that
/// produced them and one `<stem>_df` series per extracted output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub var: IndexMap<String, f64>,
    pub dir: String,
    #[serde(flatten)]
    pub outputs: IndexMap<String, TimeSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub time: TimingSummary,
    pub problem: Problem,
    pub sample: Vec<Vec<f64>>,
    /// Keyed by the 1-based row number of `sample`.
    pub simulation: IndexMap<String, SimulationRecord>,
}

impl SimulationReport {
    pub fn save(&self, path: &Path) -> SwatResult<()> {
        let text = serde_json::to_string_pretty(self).map_err(|source| {
            SwatError::internal(
                "SYS.REPORT_ENCODE",
                format!("failed to encode simulation report: {}", source),
            )
        })?;
        write_text_artifact(path, &text, "IO.REPORT_WRITE")
    }

    pub fn load(path: &Path) -> SwatResult<Self> {
        if !path.is_file() {
            return Err(SwatError::io_system(
                "IO.REPORT_READ",
                format!("file '{}' does not exist", path.display()),
            ));
        }
        let text = read_text_artifact(path, "IO.REPORT_READ")?;
        serde_json::from_str(&text).map_err(|source| {
            SwatError::format(
                "FORMAT.REPORT",
                format!("failed to parse simulation report '{}': {}", path.display(), source),
            )
        })
    }

    /// Records in sample order, with their numeric keys.
    pub fn scenarios(&self) -> SwatResult<Vec<(usize, &SimulationRecord)>> {
        let mut scenarios = self
            .simulation
            .iter()
            .map(|(key, record)| {
                key.parse::<usize>().map(|index| (index, record)).map_err(|_| {
                    SwatError::format(
                        "FORMAT.REPORT",
                        format!("simulation key '{}' is not a sample number", key),
                    )
                })
            })
            .collect::<SwatResult<Vec<_>>>()?;
        scenarios.sort_by_key(|(index, _)| *index);
        Ok(scenarios)
    }
}

#[cfg(test)]
mod tests {
    use super::{SimulationRecord, SimulationReport, TimingSummary};
    use crate::numerics::Problem;
    use crate::table::Cell;
    use crate::timeseries::{TimeSeries, TimeSeriesRecord};
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn record(dir: &str, value: f64) -> SimulationRecord {
        let mut values = IndexMap::new();
        values.insert("flo_out".to_string(), Cell::Real(value));
        let series = TimeSeries::from_records(vec![TimeSeriesRecord {
            date: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
            values,
        }]);
        let mut outputs = IndexMap::new();
        outputs.insert("channel_sd_day_df".to_string(), series);
        let mut var = IndexMap::new();
        var.insert("cn2".to_string(), -12.5);
        SimulationRecord {
            var,
            dir: dir.to_string(),
            outputs,
        }
    }

    #[test]
    fn timing_rounds_like_the_persisted_layout() {
        let timing = TimingSummary::new(8, 13.46);
        assert_eq!(timing.total_time_sec, 13);
        assert!((timing.time_per_sample_sec - 1.7).abs() < 1.0e-12);

        let halves = TimingSummary::new(10, 2.5);
        assert_eq!(halves.total_time_sec, 2);
        assert!((halves.time_per_sample_sec - 0.2).abs() < 1.0e-12);
        assert_eq!(TimingSummary::new(1, 3.5).total_time_sec, 4);
    }

    #[test]
    fn report_survives_a_save_and_load() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut simulation = IndexMap::new();
        simulation.insert("2".to_string(), record("sim_1", 3.5));
        simulation.insert("1".to_string(), record("sim_1", 3.5));
        let report = SimulationReport {
            time: TimingSummary::new(2, 4.0),
            problem: Problem::new(vec!["cn2".to_string()], vec![[-25.0, 25.0]]).unwrap(),
            sample: vec![vec![-12.5], vec![-12.5]],
            simulation,
        };

        let path = temp.path().join("sensitivity_simulation.json");
        report.save(&path).expect("report should save");
        let raw = std::fs::read_to_string(&path).expect("report readable");
        assert!(raw.contains("\"channel_sd_day_df\": ["));
        assert!(raw.contains("\"num_vars\": 1"));

        let loaded = SimulationReport::load(&path).expect("report should load");
        assert_eq!(loaded, report);
        let order: Vec<usize> = loaded
            .scenarios()
            .expect("keys are numeric")
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        assert_eq!(order, vec![1, 2]);
    }
}
