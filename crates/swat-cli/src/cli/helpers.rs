use super::CliError;
use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use swat_core::domain::SwatError;
use swat_core::metrics::Indicator;
use tracing_subscriber::EnvFilter;

/// Logs to stderr; `RUST_LOG` overrides the default `info` level.
pub(super) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(super) fn load_json_config<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    serde_json::from_str(&content).map_err(|source| {
        CliError::Compute(SwatError::configuration(
            "CONFIG.CLI_CONFIG",
            format!("invalid config file '{}': {}", path.display(), source),
        ))
    })
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).context("failed to encode JSON output")?;
    println!("{}", text);
    Ok(())
}

pub(super) fn parse_indicator(value: &str) -> Result<Indicator, String> {
    value.parse().map_err(|error: SwatError| error.message().to_string())
}

pub(super) fn parse_filter(value: &str) -> Result<(String, Vec<String>), String> {
    let (column, values) = value
        .split_once('=')
        .ok_or_else(|| format!("filter \"{value}\" must look like COLUMN=V1,V2"))?;
    let column = column.trim();
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    if column.is_empty() || values.is_empty() {
        return Err(format!("filter \"{value}\" needs a column and at least one value"));
    }
    Ok((column.to_string(), values))
}
