//! Sample, deduplicate and dispatch SWAT+ runs for a sensitivity study.
//!
//! A sampling design expands the bounded parameters into a sample matrix.
//! Identical rows are simulated once: every unique row gets its own
//! `sim_<i>` copy of the TxtInOut directory, a calibration file, one model
//! execution and the extracted output series. The results are then mapped
//! back onto every row of the original matrix.

pub mod indices;
pub mod report;

pub use indices::parameter_sensitivity_indices;
pub use report::{SIMULATION_FILE, SimulationRecord, SimulationReport, TimingSummary};

use crate::domain::{BoundedParameter, ParameterChange, SwatError, SwatResult};
use crate::numerics::{Problem, SampleDesign};
use crate::timeseries::{self, ExtractSpec, TimeSeries};
use crate::txtinout::{self, ModelExecutor, ParameterRegistry, TxtInOut, validation};
use indexmap::IndexMap;
use serde::Deserialize;
use std::any::Any;
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Study definition, usually read from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensitivityStudy {
    pub parameters: Vec<BoundedParameter>,
    /// The design draws `2^sample_number` base samples.
    pub sample_number: u32,
    /// Output file name to extraction settings.
    pub extract_data: IndexMap<String, ExtractSpec>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default = "default_true")]
    pub save_output: bool,
    /// Remove each `sim_<i>` directory once its outputs are extracted.
    #[serde(default = "default_true")]
    pub clean_setup: bool,
    #[serde(default)]
    pub skip_validation: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct SensitivityConfig {
    pub txtinout_dir: PathBuf,
    pub sensim_dir: PathBuf,
    pub study: SensitivityStudy,
}

/// Everything a worker needs to turn one unique row into outputs.
struct RunContext {
    source: TxtInOut,
    sensim_dir: PathBuf,
    parameters: Vec<BoundedParameter>,
    extract_data: IndexMap<String, ExtractSpec>,
    clean_setup: bool,
    executor: Arc<dyn ModelExecutor>,
}

#[derive(Debug)]
struct UniqueRun {
    dir: String,
    outputs: IndexMap<String, TimeSeries>,
}

enum RunEvent {
    Started(usize),
    Finished(usize, SwatResult<UniqueRun>),
}

/// Runs the study and returns the report, saving it to
/// `sensitivity_simulation.json` inside the sensim directory when requested.
pub fn simulation_by_sample_parameters(
    config: &SensitivityConfig,
    design: &dyn SampleDesign,
    executor: Arc<dyn ModelExecutor>,
) -> SwatResult<SimulationReport> {
    let started = Instant::now();
    let study = &config.study;

    let source = TxtInOut::new(&config.txtinout_dir)?;
    let sensim_dir = txtinout::absolute_dir(&config.sensim_dir)?;
    txtinout::ensure_empty_dir(&sensim_dir)?;
    let output_keys = output_keys(&study.extract_data)?;
    validation::ensure_unique_entries(&study.parameters)?;
    let registry = ParameterRegistry::load(source.root_dir())?;
    registry.validate_names(&study.parameters)?;
    if !study.skip_validation {
        registry.validate_units_and_conditions(&study.parameters)?;
    }

    let problem = Problem::from_parameters(&study.parameters)?;
    let base_samples = 1usize.checked_shl(study.sample_number).ok_or_else(|| {
        SwatError::configuration(
            "CONFIG.SAMPLE_NUMBER",
            format!("sample_number {} is too large", study.sample_number),
        )
    })?;
    let sample = design.sample(&problem, base_samples)?;
    let unique = unique_rows(&sample);
    info!(
        samples = sample.len(),
        unique = unique.len(),
        "deduplicated sample matrix"
    );

    let context = Arc::new(RunContext {
        source,
        sensim_dir: sensim_dir.clone(),
        parameters: study.parameters.clone(),
        extract_data: study.extract_data.clone(),
        clean_setup: study.clean_setup,
        executor,
    });
    let runs = dispatch(context, &unique, study.max_workers)?;

    let mut simulation = IndexMap::with_capacity(sample.len());
    for (position, row) in sample.iter().enumerate() {
        let run = runs.get(&row_key(row)).ok_or_else(|| {
            SwatError::internal(
                "SYS.SAMPLE_EXPANSION",
                format!("sample row {} has no simulation result", position + 1),
            )
        })?;
        let var = problem
            .names
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect();
        simulation.insert(
            (position + 1).to_string(),
            SimulationRecord {
                var,
                dir: run.dir.clone(),
                outputs: run.outputs.clone(),
            },
        );
    }
    debug!(outputs = ?output_keys, "expanded simulation results");

    let report = SimulationReport {
        time: TimingSummary::new(sample.len(), started.elapsed().as_secs_f64()),
        problem,
        sample,
        simulation,
    };
    if study.save_output {
        let path = sensim_dir.join(SIMULATION_FILE);
        report.save(&path)?;
        info!(file = %path.display(), "saved sensitivity simulation");
    }
    Ok(report)
}

/// Runs every unique row on a bounded pool and collects results keyed by the
/// row's bit pattern. All runs are awaited; the first failure is returned.
fn dispatch(
    context: Arc<RunContext>,
    unique: &[Vec<f64>],
    max_workers: Option<usize>,
) -> SwatResult<IndexMap<Vec<u64>, UniqueRun>> {
    let workers = max_workers
        .filter(|workers| *workers > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1)
        });
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|source| {
            SwatError::internal(
                "SYS.WORKER_POOL",
                format!("failed to build a pool of {} workers: {}", workers, source),
            )
        })?;

    let num_sim = unique.len();
    let (tx, rx) = mpsc::channel();
    for (offset, row) in unique.iter().enumerate() {
        let index = offset + 1;
        let row = row.clone();
        let context = Arc::clone(&context);
        let tx = tx.clone();
        pool.spawn(move || {
            let _ = tx.send(RunEvent::Started(index));
            let result = panic::catch_unwind(AssertUnwindSafe(|| simulate(&context, index, &row)))
                .unwrap_or_else(|payload| Err(worker_panic(index, payload.as_ref())));
            let _ = tx.send(RunEvent::Finished(index, result));
        });
    }
    drop(tx);

    let mut runs = IndexMap::with_capacity(num_sim);
    let mut first_error = None;
    let mut completed = 0usize;
    while completed < num_sim {
        let event = rx.recv().map_err(|_| {
            SwatError::internal(
                "SYS.WORKER_POOL",
                format!("worker pool stopped after {completed} of {num_sim} simulations"),
            )
        })?;
        match event {
            RunEvent::Started(index) => info!("Started simulation: {index}/{num_sim}"),
            RunEvent::Finished(index, result) => {
                completed += 1;
                info!("Completed simulation: {completed}/{num_sim}");
                match result {
                    Ok(run) => {
                        runs.insert(row_key(&unique[index - 1]), run);
                    }
                    Err(error) => {
                        warn!(index, error = %error, "simulation failed");
                        first_error.get_or_insert(error);
                    }
                }
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(runs),
    }
}

fn worker_panic(index: usize, payload: &(dyn Any + Send)) -> SwatError {
    let reason = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    SwatError::internal(
        "SYS.WORKER_PANIC",
        format!("simulation {index} panicked: {reason}"),
    )
}

fn simulate(context: &RunContext, index: usize, row: &[f64]) -> SwatResult<UniqueRun> {
    let dir = format!("sim_{index}");
    let run_dir = context.sensim_dir.join(&dir);
    fs::create_dir(&run_dir).map_err(|source| {
        SwatError::io_system(
            "IO.RUN_DIR",
            format!("failed to create '{}': {}", run_dir.display(), source),
        )
    })?;
    let run = TxtInOut::new(context.source.copy_required_files(&run_dir)?)?;

    let changes: Vec<ParameterChange> = context
        .parameters
        .iter()
        .zip(row)
        .map(|(parameter, value)| parameter.with_value(*value))
        .collect();
    run.write_calibration_file(&changes)?;
    context.executor.execute(&run)?;

    let mut outputs = IndexMap::with_capacity(context.extract_data.len());
    for (file, spec) in &context.extract_data {
        let series = timeseries::extract(run.root_dir().join(file), spec)?;
        outputs.insert(output_key(file)?, series);
    }

    if context.clean_setup {
        if let Err(source) = fs::remove_dir_all(&run_dir) {
            warn!(dir = %run_dir.display(), error = %source, "failed to remove simulation directory");
        }
    }
    Ok(UniqueRun { dir, outputs })
}

fn output_key(file: &str) -> SwatResult<String> {
    Path::new(file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty() && Path::new(file).file_name() == Some(OsStr::new(file)))
        .map(|stem| format!("{stem}_df"))
        .ok_or_else(|| {
            SwatError::configuration(
                "CONFIG.EXTRACT_FILE",
                format!("\"{}\" in extract_data must be a plain file name", file),
            )
        })
}

fn output_keys(extract_data: &IndexMap<String, ExtractSpec>) -> SwatResult<Vec<String>> {
    if extract_data.is_empty() {
        return Err(SwatError::configuration(
            "CONFIG.EXTRACT_DATA",
            "extract_data must name at least one output file",
        ));
    }
    let mut keys = Vec::with_capacity(extract_data.len());
    for file in extract_data.keys() {
        let key = output_key(file)?;
        if keys.contains(&key) {
            return Err(SwatError::configuration(
                "CONFIG.EXTRACT_FILE",
                format!("extract_data files share the output key \"{}\"", key),
            ));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn row_key(row: &[f64]) -> Vec<u64> {
    row.iter().map(|value| value.to_bits()).collect()
}

fn compare_rows(left: &[f64], right: &[f64]) -> Ordering {
    left.iter()
        .zip(right)
        .map(|(a, b)| a.total_cmp(b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| left.len().cmp(&right.len()))
}

/// Distinct rows by exact bit pattern, in lexicographic order.
pub fn unique_rows(sample: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut unique = sample.to_vec();
    unique.sort_by(|left, right| compare_rows(left, right));
    unique.dedup_by(|left, right| row_key(left) == row_key(right));
    unique
}
