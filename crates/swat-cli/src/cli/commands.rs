use super::CliError;
use super::helpers::{load_json_config, parse_filter, parse_indicator, print_json};
use std::path::PathBuf;
use std::sync::Arc;
use swat_core::common::dates::parse_date;
use swat_core::metrics::{Indicator, IndicatorRequest};
use swat_core::numerics::SaltelliSobol;
use swat_core::sensitivity::{
    SIMULATION_FILE, SensitivityConfig, SensitivityStudy, parameter_sensitivity_indices,
    simulation_by_sample_parameters,
};
use swat_core::table::Cell;
use swat_core::timeseries::{ExtractSpec, extract};
use swat_core::txtinout::{RunOptions, SubprocessExecutor, TxtInOut};

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// TxtInOut directory holding the model inputs and executable
    #[arg(long)]
    txtinout: PathBuf,

    /// Empty directory to run a fresh copy in (default: run in place)
    #[arg(long)]
    sim_dir: Option<PathBuf>,

    /// JSON run options (parameters, dates, warm-up, print control)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct SensitivityArgs {
    /// TxtInOut directory holding the model inputs and executable
    #[arg(long)]
    txtinout: PathBuf,

    /// Empty directory receiving the simulation runs
    #[arg(long)]
    sensim_dir: PathBuf,

    /// JSON study definition
    #[arg(long)]
    config: PathBuf,

    /// Number of parallel runs (default: from the study, else all CPUs)
    #[arg(long)]
    max_workers: Option<usize>,

    /// Do not write sensitivity_simulation.json
    #[arg(long)]
    no_save: bool,

    /// Keep every sim_<i> directory after extraction
    #[arg(long)]
    keep_run_dirs: bool,
}

#[derive(clap::Args)]
pub(super) struct IndicesArgs {
    /// sensitivity_simulation.json written by the sensitivity command
    #[arg(long)]
    sensim_file: PathBuf,

    /// Output series to score, e.g. channel_sd_day_df
    #[arg(long)]
    df_name: String,

    /// Simulated column within the output series
    #[arg(long)]
    sim_col: String,

    /// CSV file with a `date` column and observations
    #[arg(long)]
    obs_file: PathBuf,

    /// chrono format of the observed `date` column
    #[arg(long, default_value = "%Y-%m-%d")]
    date_format: String,

    /// Observed column within the CSV file
    #[arg(long)]
    obs_col: String,

    /// Indicator to analyze (NSE, KGE, MSE, RMSE, PBIAS, MARE); repeatable
    #[arg(long = "indicator", required = true, value_parser = parse_indicator)]
    indicators: Vec<Indicator>,

    /// Write the indices to this JSON file
    #[arg(long)]
    json_file: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ExtractArgs {
    /// SWAT+ output file
    #[arg(long)]
    file: PathBuf,

    /// The file has a units row below the column names
    #[arg(long)]
    has_units: bool,

    /// First date to keep (DD-Mon-YYYY)
    #[arg(long)]
    begin: Option<String>,

    /// Last date to keep (DD-Mon-YYYY)
    #[arg(long)]
    end: Option<String>,

    /// Day of month assigned to every record of a monthly or yearly file
    #[arg(long)]
    ref_day: Option<u32>,

    /// Month assigned to every record of a yearly file
    #[arg(long)]
    ref_month: Option<u32>,

    /// Keep rows whose COLUMN holds one of the values (COLUMN=V1,V2; repeatable)
    #[arg(long = "filter", value_name = "COLUMN=VALUES", value_parser = parse_filter)]
    filters: Vec<(String, Vec<String>)>,

    /// Columns to keep besides `date`
    #[arg(long, value_delimiter = ',')]
    usecols: Vec<String>,

    /// Write the records to this JSON file instead of stdout
    #[arg(long)]
    json_file: Option<PathBuf>,
}

pub(super) fn run_run_command(args: RunArgs) -> Result<i32, CliError> {
    let options: RunOptions = match &args.config {
        Some(path) => load_json_config(path)?,
        None => RunOptions::default(),
    };
    let txtinout = TxtInOut::new(&args.txtinout).map_err(CliError::Compute)?;
    let run_dir = txtinout
        .run_swat(args.sim_dir.as_deref(), &options)
        .map_err(CliError::Compute)?;
    println!("Simulation completed in '{}'.", run_dir.display());
    Ok(0)
}

pub(super) fn run_sensitivity_command(args: SensitivityArgs) -> Result<i32, CliError> {
    let mut study: SensitivityStudy = load_json_config(&args.config)?;
    if args.max_workers.is_some() {
        study.max_workers = args.max_workers;
    }
    if args.no_save {
        study.save_output = false;
    }
    if args.keep_run_dirs {
        study.clean_setup = false;
    }
    let save_output = study.save_output;

    let config = SensitivityConfig {
        txtinout_dir: args.txtinout,
        sensim_dir: args.sensim_dir,
        study,
    };
    let report = simulation_by_sample_parameters(
        &config,
        &SaltelliSobol::default(),
        Arc::new(SubprocessExecutor),
    )
    .map_err(CliError::Compute)?;

    println!(
        "Simulated {} samples in {} s ({} s per sample).",
        report.time.sample_length, report.time.total_time_sec, report.time.time_per_sample_sec
    );
    if save_output {
        println!(
            "JSON report: {}",
            config.sensim_dir.join(SIMULATION_FILE).display()
        );
    }
    Ok(0)
}

pub(super) fn run_indices_command(args: IndicesArgs) -> Result<i32, CliError> {
    let request = IndicatorRequest {
        sensim_file: args.sensim_file,
        df_name: args.df_name,
        sim_col: args.sim_col,
        obs_file: args.obs_file,
        date_format: args.date_format,
        obs_col: args.obs_col,
        indicators: args.indicators,
    };
    let report = parameter_sensitivity_indices(
        &request,
        &SaltelliSobol::default(),
        args.json_file.as_deref(),
    )
    .map_err(CliError::Compute)?;
    print_json(&report)?;
    Ok(0)
}

pub(super) fn run_extract_command(args: ExtractArgs) -> Result<i32, CliError> {
    let spec = ExtractSpec {
        has_units: args.has_units,
        begin_date: args
            .begin
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(CliError::Compute)?,
        end_date: args
            .end
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(CliError::Compute)?,
        ref_day: args.ref_day,
        ref_month: args.ref_month,
        apply_filter: (!args.filters.is_empty()).then(|| {
            args.filters
                .into_iter()
                .map(|(column, values)| {
                    (column, values.iter().map(|value| Cell::parse(value)).collect())
                })
                .collect()
        }),
        usecols: (!args.usecols.is_empty()).then_some(args.usecols),
    };
    let series = extract(&args.file, &spec).map_err(CliError::Compute)?;

    match &args.json_file {
        Some(json_file) => {
            series.save_json(json_file).map_err(CliError::Compute)?;
            println!(
                "Saved {} records to '{}'.",
                series.len(),
                json_file.display()
            );
        }
        None => print_json(&series)?,
    }
    Ok(0)
}
