//! Sobol low-discrepancy sequence, Saltelli cross-sampling and the Sobol
//! index estimators with bootstrap confidence intervals.

use super::{Problem, SampleDesign, SensitivityIndices, mean, variance};
use crate::domain::{SwatError, SwatResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BITS: usize = 32;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RESAMPLES: usize = 100;
pub const DEFAULT_CONF_LEVEL: f64 = 0.95;

/// Joe-Kuo direction numbers `(s, a, m_1..m_s)` for dimensions 2 onwards.
const JOE_KUO: [(u32, u32, &[u32]); 39] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
    (5, 11, &[1, 1, 5, 1, 1]),
    (5, 13, &[1, 1, 1, 3, 11]),
    (5, 14, &[1, 3, 5, 5, 31]),
    (6, 1, &[1, 3, 3, 9, 7, 49]),
    (6, 13, &[1, 1, 1, 15, 21, 21]),
    (6, 16, &[1, 3, 1, 13, 27, 49]),
    (6, 19, &[1, 1, 1, 15, 7, 5]),
    (6, 22, &[1, 3, 1, 15, 13, 25]),
    (6, 25, &[1, 1, 5, 5, 19, 61]),
    (7, 1, &[1, 3, 7, 11, 23, 15, 103]),
    (7, 4, &[1, 3, 7, 13, 13, 15, 69]),
    (7, 7, &[1, 1, 3, 13, 7, 35, 63]),
    (7, 8, &[1, 3, 5, 9, 1, 25, 53]),
    (7, 14, &[1, 3, 1, 13, 9, 35, 107]),
    (7, 19, &[1, 3, 1, 5, 27, 61, 31]),
    (7, 21, &[1, 1, 5, 11, 19, 41, 61]),
    (7, 28, &[1, 3, 5, 3, 3, 13, 69]),
    (7, 31, &[1, 1, 7, 13, 1, 19, 1]),
    (7, 32, &[1, 3, 7, 5, 13, 19, 59]),
    (7, 37, &[1, 1, 3, 9, 25, 29, 41]),
    (7, 41, &[1, 3, 5, 13, 23, 1, 55]),
    (7, 42, &[1, 3, 7, 3, 13, 59, 17]),
    (7, 50, &[1, 3, 1, 3, 5, 53, 69]),
    (7, 55, &[1, 1, 5, 5, 23, 33, 13]),
    (7, 56, &[1, 1, 7, 7, 1, 61, 123]),
    (7, 59, &[1, 1, 7, 9, 13, 61, 49]),
    (7, 62, &[1, 3, 3, 5, 3, 55, 33]),
    (8, 14, &[1, 3, 1, 15, 31, 13, 49, 245]),
    (8, 21, &[1, 3, 5, 15, 31, 59, 171, 97]),
    (8, 22, &[1, 3, 1, 11, 3, 31, 183, 161]),
];

pub const MAX_DIMENSION: usize = JOE_KUO.len() + 1;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SobolError {
    #[error("sobol sampling requires at least one base sample")]
    EmptySample,
    #[error("sobol sequence supports at most {max} dimensions, {requested} requested")]
    TooManyDimensions { requested: usize, max: usize },
    #[error("sobol sequence supports at most 2^32 points, {requested} requested")]
    TooManyPoints { requested: usize },
    #[error(
        "Incorrect number of samples in model output: {outputs} values is not a multiple of {step} (2 * {num_vars} + 2)"
    )]
    OutputShape {
        outputs: usize,
        step: usize,
        num_vars: usize,
    },
    #[error("confidence level must lie strictly between 0 and 1, got {value}")]
    ConfidenceLevel { value: f64 },
}

impl From<SobolError> for SwatError {
    fn from(error: SobolError) -> Self {
        let message = error.to_string();
        match error {
            SobolError::OutputShape { .. } => SwatError::data("DATA.SOBOL_OUTPUTS", message),
            _ => SwatError::configuration("CONFIG.SOBOL", message),
        }
    }
}

fn direction_numbers(dimension: usize) -> [u32; BITS] {
    let mut directions = [0u32; BITS];
    if dimension == 0 {
        for (bit, direction) in directions.iter_mut().enumerate() {
            *direction = 1 << (BITS - 1 - bit);
        }
        return directions;
    }

    let (degree, coefficients, initial) = JOE_KUO[dimension - 1];
    let degree = degree as usize;
    for (bit, m) in initial.iter().enumerate() {
        directions[bit] = m << (BITS - 1 - bit);
    }
    for bit in degree..BITS {
        let mut direction = directions[bit - degree] ^ (directions[bit - degree] >> degree);
        for term in 1..degree {
            if (coefficients >> (degree - 1 - term)) & 1 == 1 {
                direction ^= directions[bit - term];
            }
        }
        directions[bit] = direction;
    }
    directions
}

/// First `count` points of the `dimensions`-dimensional Sobol sequence in
/// Gray-code order, each coordinate XOR-shifted by `shifts`.
pub fn sobol_points(count: usize, dimensions: usize, shifts: &[u32]) -> Result<Vec<Vec<f64>>, SobolError> {
    if dimensions > MAX_DIMENSION {
        return Err(SobolError::TooManyDimensions {
            requested: dimensions,
            max: MAX_DIMENSION,
        });
    }
    if count as u64 > 1u64 << BITS {
        return Err(SobolError::TooManyPoints { requested: count });
    }
    let directions: Vec<[u32; BITS]> = (0..dimensions).map(direction_numbers).collect();
    let scale = 1.0 / (1u64 << BITS) as f64;

    let mut state = vec![0u32; dimensions];
    let mut points = Vec::with_capacity(count);
    for index in 0..count {
        if index > 0 {
            let bit = (index - 1).trailing_ones() as usize;
            for (value, direction) in state.iter_mut().zip(&directions) {
                *value ^= direction[bit];
            }
        }
        points.push(
            state
                .iter()
                .enumerate()
                .map(|(dimension, value)| {
                    let shift = shifts.get(dimension).copied().unwrap_or(0);
                    f64::from(value ^ shift) * scale
                })
                .collect(),
        );
    }
    Ok(points)
}

/// Saltelli design over a digitally shifted Sobol sequence, analysed with the
/// Saltelli (2010) and Jansen estimators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaltelliSobol {
    pub seed: u64,
    pub scramble: bool,
    pub num_resamples: usize,
    pub conf_level: f64,
}

impl Default for SaltelliSobol {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            scramble: true,
            num_resamples: DEFAULT_RESAMPLES,
            conf_level: DEFAULT_CONF_LEVEL,
        }
    }
}

impl SaltelliSobol {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    fn sample_unit(&self, num_vars: usize, base_samples: usize) -> Result<Vec<Vec<f64>>, SobolError> {
        if base_samples == 0 {
            return Err(SobolError::EmptySample);
        }
        let dimensions = 2 * num_vars;
        let shifts: Vec<u32> = if self.scramble {
            let mut rng = StdRng::seed_from_u64(self.seed);
            (0..dimensions).map(|_| rng.r#gen::<u32>()).collect()
        } else {
            Vec::new()
        };
        let base = sobol_points(base_samples, dimensions, &shifts)?;

        let mut rows = Vec::with_capacity(base_samples * (dimensions + 2));
        for point in base {
            let (a, b) = point.split_at(num_vars);
            rows.push(a.to_vec());
            for column in 0..num_vars {
                let mut row = a.to_vec();
                row[column] = b[column];
                rows.push(row);
            }
            for column in 0..num_vars {
                let mut row = b.to_vec();
                row[column] = a[column];
                rows.push(row);
            }
            rows.push(b.to_vec());
        }
        Ok(rows)
    }

    fn analyze_indices(&self, num_vars: usize, outputs: &[f64]) -> Result<SensitivityIndices, SobolError> {
        let step = 2 * num_vars + 2;
        if outputs.is_empty() || outputs.len() % step != 0 {
            return Err(SobolError::OutputShape {
                outputs: outputs.len(),
                step,
                num_vars,
            });
        }
        let z = normal_quantile(0.5 + self.conf_level / 2.0)?;

        let center = mean(outputs);
        let spread = variance(outputs, 0).sqrt();
        let normalized: Vec<f64> = outputs.iter().map(|value| (value - center) / spread).collect();
        let blocks = SaltelliBlocks::split(&normalized, num_vars);
        let samples = blocks.a.len();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let resamples: Vec<Vec<usize>> = (0..self.num_resamples)
            .map(|_| (0..samples).map(|_| rng.gen_range(0..samples)).collect())
            .collect();
        let all: Vec<usize> = (0..samples).collect();

        let confidence = |estimate: &dyn Fn(&[usize]) -> f64| -> f64 {
            if resamples.len() < 2 {
                return f64::NAN;
            }
            let draws: Vec<f64> = resamples.iter().map(|indices| estimate(indices)).collect();
            z * variance(&draws, 1).sqrt()
        };

        let mut indices = SensitivityIndices {
            first_order: Vec::with_capacity(num_vars),
            first_order_conf: Vec::with_capacity(num_vars),
            total_order: Vec::with_capacity(num_vars),
            total_order_conf: Vec::with_capacity(num_vars),
            second_order: vec![vec![None; num_vars]; num_vars],
            second_order_conf: vec![vec![None; num_vars]; num_vars],
        };
        for j in 0..num_vars {
            let first = |subset: &[usize]| blocks.first_order(j, subset);
            let total = |subset: &[usize]| blocks.total_order(j, subset);
            indices.first_order.push(first(&all));
            indices.first_order_conf.push(confidence(&first));
            indices.total_order.push(total(&all));
            indices.total_order_conf.push(confidence(&total));
        }
        for j in 0..num_vars {
            for k in (j + 1)..num_vars {
                let second = |subset: &[usize]| blocks.second_order(j, k, subset);
                indices.second_order[j][k] = Some(second(&all));
                indices.second_order_conf[j][k] = Some(confidence(&second));
            }
        }
        Ok(indices)
    }
}

impl SampleDesign for SaltelliSobol {
    fn sample(&self, problem: &Problem, base_samples: usize) -> SwatResult<Vec<Vec<f64>>> {
        let unit = self.sample_unit(problem.num_vars, base_samples)?;
        Ok(unit
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&problem.bounds)
                    .map(|(value, [lower, upper])| lower + value * (upper - lower))
                    .collect()
            })
            .collect())
    }

    fn analyze(&self, problem: &Problem, outputs: &[f64]) -> SwatResult<SensitivityIndices> {
        Ok(self.analyze_indices(problem.num_vars, outputs)?)
    }
}

/// Model outputs regrouped by the Saltelli row layout `A, AB_j.., BA_j.., B`.
struct SaltelliBlocks {
    a: Vec<f64>,
    b: Vec<f64>,
    ab: Vec<Vec<f64>>,
    ba: Vec<Vec<f64>>,
}

impl SaltelliBlocks {
    fn split(outputs: &[f64], num_vars: usize) -> Self {
        let step = 2 * num_vars + 2;
        let mut blocks = Self {
            a: Vec::new(),
            b: Vec::new(),
            ab: vec![Vec::new(); num_vars],
            ba: vec![Vec::new(); num_vars],
        };
        for chunk in outputs.chunks_exact(step) {
            blocks.a.push(chunk[0]);
            for column in 0..num_vars {
                blocks.ab[column].push(chunk[1 + column]);
                blocks.ba[column].push(chunk[1 + num_vars + column]);
            }
            blocks.b.push(chunk[step - 1]);
        }
        blocks
    }

    fn pooled_variance(&self, subset: &[usize]) -> f64 {
        let pooled: Vec<f64> = subset
            .iter()
            .map(|&index| self.a[index])
            .chain(subset.iter().map(|&index| self.b[index]))
            .collect();
        variance(&pooled, 0)
    }

    fn first_order(&self, column: usize, subset: &[usize]) -> f64 {
        let terms: Vec<f64> = subset
            .iter()
            .map(|&index| self.b[index] * (self.ab[column][index] - self.a[index]))
            .collect();
        mean(&terms) / self.pooled_variance(subset)
    }

    fn total_order(&self, column: usize, subset: &[usize]) -> f64 {
        let terms: Vec<f64> = subset
            .iter()
            .map(|&index| (self.a[index] - self.ab[column][index]).powi(2))
            .collect();
        0.5 * mean(&terms) / self.pooled_variance(subset)
    }

    fn second_order(&self, j: usize, k: usize, subset: &[usize]) -> f64 {
        let terms: Vec<f64> = subset
            .iter()
            .map(|&index| self.ba[j][index] * self.ab[k][index] - self.a[index] * self.b[index])
            .collect();
        let joint = mean(&terms) / self.pooled_variance(subset);
        joint - self.first_order(j, subset) - self.first_order(k, subset)
    }
}

/// Inverse standard normal CDF (Acklam's rational approximation).
pub fn normal_quantile(probability: f64) -> Result<f64, SobolError> {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const LOW: f64 = 0.02425;

    if !(probability > 0.0 && probability < 1.0) {
        return Err(SobolError::ConfidenceLevel {
            value: 2.0 * probability - 1.0,
        });
    }
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    let value = if probability < LOW {
        tail((-2.0 * probability.ln()).sqrt())
    } else if probability > 1.0 - LOW {
        -tail((-2.0 * (1.0 - probability).ln()).sqrt())
    } else {
        let q = probability - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    };
    Ok(value)
}
