pub mod sobol;

pub use sobol::{SaltelliSobol, SobolError};

use crate::domain::{BoundedParameter, SwatError, SwatResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Variable names and bounds handed to a sampling design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub num_vars: usize,
    pub names: Vec<String>,
    pub bounds: Vec<[f64; 2]>,
}

impl Problem {
    pub fn new(names: Vec<String>, bounds: Vec<[f64; 2]>) -> SwatResult<Self> {
        if names.len() != bounds.len() {
            return Err(SwatError::configuration(
                "CONFIG.PROBLEM_SHAPE",
                format!(
                    "problem has {} names but {} bounds",
                    names.len(),
                    bounds.len()
                ),
            ));
        }
        if names.is_empty() {
            return Err(SwatError::configuration(
                "CONFIG.PROBLEM_SHAPE",
                "problem requires at least one variable",
            ));
        }
        for (name, [lower, upper]) in names.iter().zip(&bounds) {
            if !(lower < upper) {
                return Err(SwatError::configuration(
                    "CONFIG.PARAMETER_BOUNDS",
                    format!(
                        "variable '{}' must have lower bound < upper bound, got [{}, {}]",
                        name, lower, upper
                    ),
                ));
            }
        }
        Ok(Self {
            num_vars: names.len(),
            names,
            bounds,
        })
    }

    /// One variable per parameter; a base name declared more than once gets
    /// a `|k` counter suffix.
    pub fn from_parameters(parameters: &[BoundedParameter]) -> SwatResult<Self> {
        let mut totals: IndexMap<&str, usize> = IndexMap::new();
        for parameter in parameters {
            *totals.entry(parameter.name()).or_default() += 1;
        }
        let mut seen: IndexMap<&str, usize> = IndexMap::new();
        let mut names = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let name = parameter.name();
            if totals.get(name).copied().unwrap_or(0) > 1 {
                let counter = seen.entry(name).or_default();
                *counter += 1;
                names.push(format!("{name}|{counter}"));
            } else {
                names.push(name.to_string());
            }
        }
        let bounds = parameters.iter().map(BoundedParameter::bounds).collect();
        Self::new(names, bounds)
    }
}

/// First-order, total and second-order indices with bootstrap confidence
/// half-widths. `S2` holds values above the diagonal only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityIndices {
    #[serde(rename = "S1")]
    pub first_order: Vec<f64>,
    #[serde(rename = "S1_conf")]
    pub first_order_conf: Vec<f64>,
    #[serde(rename = "ST")]
    pub total_order: Vec<f64>,
    #[serde(rename = "ST_conf")]
    pub total_order_conf: Vec<f64>,
    #[serde(rename = "S2")]
    pub second_order: Vec<Vec<Option<f64>>>,
    #[serde(rename = "S2_conf")]
    pub second_order_conf: Vec<Vec<Option<f64>>>,
}

/// Sampling and analysis seam of the sensitivity pipeline.
pub trait SampleDesign: Send + Sync {
    /// Sample matrix in problem units, one row per model evaluation.
    fn sample(&self, problem: &Problem, base_samples: usize) -> SwatResult<Vec<Vec<f64>>>;

    fn analyze(&self, problem: &Problem, outputs: &[f64]) -> SwatResult<SensitivityIndices>;
}

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;
    for value in values {
        kahan_add(&mut sum, &mut correction, value);
    }
    sum
}

pub fn mean(values: &[f64]) -> f64 {
    stable_sum(values.iter().copied()) / values.len() as f64
}

/// Variance with `ddof` delta degrees of freedom.
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    let center = mean(values);
    stable_sum(values.iter().map(|value| (value - center).powi(2)))
        / (values.len() as f64 - ddof as f64)
}

#[cfg(test)]
mod tests {
    use super::{Problem, mean, stable_sum, variance};
    use crate::domain::{BoundedParameter, ChangeType};

    #[test]
    fn stable_sum_reduces_order_loss_for_large_and_small_values() {
        assert_eq!(stable_sum([1.0e16, 1.0, -1.0e16]), 0.0);
    }

    #[test]
    fn moments_match_known_values() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1.0e-12);
        assert!((variance(&values, 0) - 4.0).abs() < 1.0e-12);
        assert!((variance(&values, 1) - 32.0 / 7.0).abs() < 1.0e-12);
    }

    #[test]
    fn recurring_parameter_names_get_counter_suffixes() {
        let parameters = vec![
            BoundedParameter::new("cn2", ChangeType::PercentChange, -25.0, 25.0).unwrap(),
            BoundedParameter::new("esco", ChangeType::AbsoluteValue, 0.0, 1.0).unwrap(),
            BoundedParameter::new("cn2", ChangeType::PercentChange, -10.0, 10.0)
                .unwrap()
                .with_units(&[2])
                .unwrap(),
        ];
        let problem = Problem::from_parameters(&parameters).expect("problem should build");
        assert_eq!(problem.num_vars, 3);
        assert_eq!(problem.names, vec!["cn2|1", "esco", "cn2|2"]);
        assert_eq!(problem.bounds[2], [-10.0, 10.0]);
    }

    #[test]
    fn problem_shape_must_agree() {
        let error = Problem::new(vec!["a".to_string()], vec![]).expect_err("shape mismatch");
        assert_eq!(error.placeholder(), "CONFIG.PROBLEM_SHAPE");
        let error = Problem::new(vec!["a".to_string()], vec![[1.0, 1.0]])
            .expect_err("degenerate bounds");
        assert_eq!(error.placeholder(), "CONFIG.PARAMETER_BOUNDS");
    }
}
