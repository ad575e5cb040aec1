mod commands;
mod helpers;

use clap::Parser;
use swat_core::domain::SwatError;

pub fn run_from_env() -> i32 {
    helpers::init_tracing();
    let args: Vec<String> = std::env::args().collect();

    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let swat_error = error.as_swat_error();
            eprintln!("{}", swat_error.diagnostic_line());
            if let Some(summary_line) = swat_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            swat_error.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "swatplus-rs",
    version,
    about = "Run, sample and score SWAT+ watershed simulations"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Configure and run SWAT+ once
    Run(commands::RunArgs),
    /// Run a Sobol sensitivity study over bounded parameters
    Sensitivity(commands::SensitivityArgs),
    /// Compute sensitivity indices of a saved study against observations
    Indices(commands::IndicesArgs),
    /// Extract a time series from a SWAT+ output file
    Extract(commands::ExtractArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_run_command(args),
        CliCommand::Sensitivity(args) => commands::run_sensitivity_command(args),
        CliCommand::Indices(args) => commands::run_indices_command(args),
        CliCommand::Extract(args) => commands::run_extract_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(SwatError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_swat_error(&self) -> SwatError {
        match self {
            Self::Usage(message) => {
                SwatError::configuration("CONFIG.CLI_USAGE", message.trim_end().to_string())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => SwatError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
