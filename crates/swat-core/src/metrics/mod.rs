//! Goodness-of-fit indicators between simulated and observed series.
//!
//! All indicator functions take observed and simulated slices of equal length
//! and return a scalar score.

use crate::domain::{SwatError, SwatResult};
use crate::numerics::{Problem, stable_sum};
use crate::sensitivity::SimulationReport;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Indicator {
    Nse,
    Kge,
    Mse,
    Rmse,
    Pbias,
    Mare,
}

type IndicatorFn = fn(&[f64], &[f64]) -> f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Objective {
    Maximize,
    Minimize,
    MinimizeAbsolute,
}

impl Indicator {
    pub const ALL: [Self; 6] = [
        Self::Nse,
        Self::Kge,
        Self::Mse,
        Self::Rmse,
        Self::Pbias,
        Self::Mare,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Kge => "KGE",
            Self::Mse => "MSE",
            Self::Rmse => "RMSE",
            Self::Pbias => "PBIAS",
            Self::Mare => "MARE",
        }
    }

    pub const fn full_name(self) -> &'static str {
        match self {
            Self::Nse => "Nash-Sutcliffe Efficiency",
            Self::Kge => "Kling-Gupta Efficiency",
            Self::Mse => "Mean Squared Error",
            Self::Rmse => "Root Mean Squared Error",
            Self::Pbias => "Percent Bias",
            Self::Mare => "Mean Absolute Relative Error",
        }
    }

    const fn function(self) -> IndicatorFn {
        match self {
            Self::Nse => nse,
            Self::Kge => kge,
            Self::Mse => mse,
            Self::Rmse => rmse,
            Self::Pbias => pbias,
            Self::Mare => mare,
        }
    }

    const fn objective(self) -> Objective {
        match self {
            Self::Nse | Self::Kge => Objective::Maximize,
            Self::Mse | Self::Rmse | Self::Mare => Objective::Minimize,
            Self::Pbias => Objective::MinimizeAbsolute,
        }
    }

    pub fn compute(self, observed: &[f64], simulated: &[f64]) -> f64 {
        (self.function())(observed, simulated)
    }

    /// Whether `candidate` scores strictly better than `incumbent`. NaN never wins.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        if candidate.is_nan() {
            return false;
        }
        if incumbent.is_nan() {
            return true;
        }
        match self.objective() {
            Objective::Maximize => candidate > incumbent,
            Objective::Minimize => candidate < incumbent,
            Objective::MinimizeAbsolute => candidate.abs() < incumbent.abs(),
        }
    }
}

impl Display for Indicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Indicator {
    type Err = SwatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|indicator| indicator.as_str() == value)
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|item| item.as_str()).collect();
                SwatError::configuration(
                    "CONFIG.INDICATOR",
                    format!(
                        "Invalid indicator \"{}\"; supported indicators are {:?}",
                        value, supported
                    ),
                )
            })
    }
}

impl TryFrom<String> for Indicator {
    type Error = SwatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Indicator> for String {
    fn from(indicator: Indicator) -> Self {
        indicator.as_str().to_string()
    }
}

/// Nash-Sutcliffe Efficiency. Range: (-inf, 1], 1 = perfect.
pub fn nse(observed: &[f64], simulated: &[f64]) -> f64 {
    let mean_obs = stable_sum(observed.iter().copied()) / observed.len() as f64;
    let numerator = stable_sum(observed.iter().zip(simulated).map(|(o, s)| (o - s).powi(2)));
    let denominator = stable_sum(observed.iter().map(|o| (o - mean_obs).powi(2)));
    if denominator == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - numerator / denominator
}

/// Kling-Gupta Efficiency. Range: (-inf, 1], 1 = perfect.
pub fn kge(observed: &[f64], simulated: &[f64]) -> f64 {
    let n = observed.len() as f64;
    let mean_o = stable_sum(observed.iter().copied()) / n;
    let mean_s = stable_sum(simulated.iter().copied()) / n;
    let std_o = (stable_sum(observed.iter().map(|o| (o - mean_o).powi(2))) / n).sqrt();
    let std_s = (stable_sum(simulated.iter().map(|s| (s - mean_s).powi(2))) / n).sqrt();

    let r = if std_o == 0.0 || std_s == 0.0 {
        0.0
    } else {
        stable_sum(
            observed
                .iter()
                .zip(simulated)
                .map(|(o, s)| (o - mean_o) * (s - mean_s)),
        ) / (n * std_o * std_s)
    };
    let alpha = if std_o == 0.0 { 0.0 } else { std_s / std_o };
    let beta = if mean_o == 0.0 { 0.0 } else { mean_s / mean_o };

    1.0 - ((r - 1.0).powi(2) + (alpha - 1.0).powi(2) + (beta - 1.0).powi(2)).sqrt()
}

/// Mean Squared Error. Range: [0, inf), 0 = perfect.
pub fn mse(observed: &[f64], simulated: &[f64]) -> f64 {
    stable_sum(observed.iter().zip(simulated).map(|(o, s)| (o - s).powi(2)))
        / observed.len() as f64
}

pub fn rmse(observed: &[f64], simulated: &[f64]) -> f64 {
    mse(observed, simulated).sqrt()
}

/// Percent Bias. Optimal = 0. Positive = overestimation.
pub fn pbias(observed: &[f64], simulated: &[f64]) -> f64 {
    let sum_obs = stable_sum(observed.iter().copied());
    if sum_obs == 0.0 {
        return f64::INFINITY;
    }
    100.0 * stable_sum(simulated.iter().zip(observed).map(|(s, o)| s - o)) / sum_obs
}

/// Mean Absolute Relative Error over points with a non-zero observation.
pub fn mare(observed: &[f64], simulated: &[f64]) -> f64 {
    let relative: Vec<f64> = observed
        .iter()
        .zip(simulated)
        .filter(|(o, _)| **o != 0.0)
        .map(|(o, s)| ((o - s) / o).abs())
        .collect();
    if relative.is_empty() {
        return f64::INFINITY;
    }
    stable_sum(relative.iter().copied()) / relative.len() as f64
}

/// Min-max scaling derived from valid (present, non-negative) observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationRange {
    pub min: f64,
    pub max: f64,
}

impl NormalizationRange {
    pub fn from_observed(values: &[Option<f64>]) -> SwatResult<Self> {
        let mut valid = values
            .iter()
            .flatten()
            .copied()
            .filter(|value| value.is_finite() && *value >= 0.0);
        let Some(first) = valid.next() else {
            return Err(SwatError::data(
                "DATA.OBSERVED_EMPTY",
                "No valid observed values remain after removing negative and missing entries",
            ));
        };
        let (min, max) = valid.fold((first, first), |(min, max), value| {
            (min.min(value), max.max(value))
        });
        if max <= min {
            return Err(SwatError::data(
                "DATA.NORMALIZATION_RANGE",
                format!("Observed values span a degenerate range [{}, {}]", min, max),
            ));
        }
        Ok(Self { min, max })
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

/// Observed series read from a CSV file with a `date` column.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedSeries {
    values: IndexMap<NaiveDate, f64>,
    range: NormalizationRange,
}

impl ObservedSeries {
    /// Reads `date` and `obs_col`; rows with a missing or negative
    /// observation are dropped.
    pub fn read(path: &Path, date_format: &str, obs_col: &str) -> SwatResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| {
                SwatError::io_system(
                    "IO.OBSERVED_READ",
                    format!("failed to open '{}': {}", path.display(), source),
                )
            })?;
        let headers = reader.headers().map_err(|source| csv_format_error(path, source))?.clone();
        let position = |column: &str| headers.iter().position(|header| header == column);
        let (Some(date_index), Some(value_index)) = (position("date"), position(obs_col)) else {
            return Err(SwatError::format(
                "FORMAT.OBSERVED_COLUMNS",
                format!(
                    "Observed file '{}' must contain the columns \"date\" and \"{}\"",
                    path.display(),
                    obs_col
                ),
            ));
        };

        let mut raw = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| csv_format_error(path, source))?;
            let date_text = record.get(date_index).unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_text, date_format).map_err(|_| {
                SwatError::data(
                    "DATA.OBSERVED_DATE",
                    format!(
                        "Date \"{}\" in '{}' does not match the format \"{}\"",
                        date_text,
                        path.display(),
                        date_format
                    ),
                )
            })?;
            let value = record
                .get(value_index)
                .filter(|text| !text.is_empty())
                .and_then(|text| text.parse::<f64>().ok())
                .filter(|value| !value.is_nan());
            raw.push((date, value));
        }

        let range = NormalizationRange::from_observed(
            &raw.iter().map(|(_, value)| *value).collect::<Vec<_>>(),
        )?;
        let values = raw
            .into_iter()
            .filter_map(|(date, value)| value.filter(|value| *value >= 0.0).map(|value| (date, value)))
            .collect();
        Ok(Self { values, range })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub const fn range(&self) -> NormalizationRange {
        self.range
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.values.get(&date).copied()
    }
}

fn csv_format_error(path: &Path, source: csv::Error) -> SwatError {
    SwatError::format(
        "FORMAT.OBSERVED_CSV",
        format!("failed to read '{}': {}", path.display(), source),
    )
}

/// Which simulated column to score against which observations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorRequest {
    pub sensim_file: PathBuf,
    pub df_name: String,
    pub sim_col: String,
    pub obs_file: PathBuf,
    pub date_format: String,
    pub obs_col: String,
    pub indicators: Vec<Indicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioScore {
    pub scenario: usize,
    pub scores: IndexMap<Indicator, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioIndicators {
    pub problem: Problem,
    pub indicators: Vec<Indicator>,
    pub scenarios: Vec<ScenarioScore>,
}

impl ScenarioIndicators {
    /// Scores of one indicator across all scenarios, in sample order.
    pub fn column(&self, indicator: Indicator) -> Vec<f64> {
        self.scenarios
            .iter()
            .map(|scenario| scenario.scores.get(&indicator).copied().unwrap_or(f64::NAN))
            .collect()
    }
}

/// Scores every scenario of a persisted simulation against the observations.
/// Both series are merged on date and scaled by the observed range.
pub fn scenario_indicators(request: &IndicatorRequest) -> SwatResult<ScenarioIndicators> {
    let indicators = checked_indicators(&request.indicators)?;
    let report = SimulationReport::load(&request.sensim_file)?;
    let observed = ObservedSeries::read(&request.obs_file, &request.date_format, &request.obs_col)?;
    let range = observed.range();

    let mut scenarios = Vec::with_capacity(report.simulation.len());
    for (scenario, record) in report.scenarios()? {
        let series = record.outputs.get(&request.df_name).ok_or_else(|| {
            SwatError::data(
                "DATA.SCENARIO_OUTPUT",
                format!(
                    "Simulation \"{}\" has no output named \"{}\"",
                    scenario, request.df_name
                ),
            )
        })?;
        let simulated = series.values(&request.sim_col)?;

        let (obs, sim): (Vec<f64>, Vec<f64>) = series
            .dates()
            .into_iter()
            .zip(simulated)
            .filter_map(|(date, value)| Some((observed.get(date)?, value?)))
            .map(|(obs, sim)| (range.apply(obs), range.apply(sim)))
            .unzip();
        if obs.is_empty() {
            return Err(SwatError::data(
                "DATA.MERGE_EMPTY",
                format!(
                    "Simulation \"{}\" shares no dates with observed file '{}'",
                    scenario,
                    request.obs_file.display()
                ),
            ));
        }

        let scores = indicators
            .iter()
            .map(|indicator| (*indicator, indicator.compute(&obs, &sim)))
            .collect();
        scenarios.push(ScenarioScore { scenario, scores });
    }
    debug!(scenarios = scenarios.len(), "scored scenarios");

    Ok(ScenarioIndicators {
        problem: report.problem,
        indicators,
        scenarios,
    })
}

pub(crate) fn checked_indicators(indicators: &[Indicator]) -> SwatResult<Vec<Indicator>> {
    if indicators.is_empty() {
        return Err(SwatError::configuration(
            "CONFIG.INDICATOR",
            "at least one indicator is required",
        ));
    }
    let mut unique = Vec::with_capacity(indicators.len());
    for indicator in indicators {
        if !unique.contains(indicator) {
            unique.push(*indicator);
        }
    }
    Ok(unique)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestScenario {
    pub indicator: Indicator,
    pub scenario: usize,
    pub value: f64,
}

/// Best scenario per indicator; the earliest scenario wins ties.
pub fn best_scenarios(scored: &ScenarioIndicators) -> Vec<BestScenario> {
    scored
        .indicators
        .iter()
        .filter_map(|indicator| {
            scored
                .scenarios
                .iter()
                .filter_map(|scenario| {
                    scenario.scores.get(indicator).map(|value| BestScenario {
                        indicator: *indicator,
                        scenario: scenario.scenario,
                        value: *value,
                    })
                })
                .fold(None, |best: Option<BestScenario>, candidate| match best {
                    Some(best) if !indicator.is_better(candidate.value, best.value) => Some(best),
                    _ => Some(candidate),
                })
        })
        .collect()
}
