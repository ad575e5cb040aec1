use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CHANNEL_DAY: &str = "channel_sd_day: written by SWAT+\n\
    jday  mon  day  yr  unit  gis_id  name  flo_out\n\
    \x20              ha  m^3/s\n\
    1  1  1  2010  1  561  cha561  2.5\n\
    2  1  2  2010  1  561  cha561  3.5\n\
    3  1  3  2010  1  561  cha561  4.0\n";

fn swatplus(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_swatplus-rs"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .expect("binary should run")
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_every_command() {
    let output = swatplus(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["run", "sensitivity", "indices", "extract"] {
        assert!(stdout.contains(command), "help should mention {command}");
    }
}

#[test]
fn extract_prints_records_with_formatted_dates() {
    let temp = TempDir::new().expect("tempdir should be created");
    let file = temp.path().join("channel_sd_day.txt");
    write_file(&file, CHANNEL_DAY);

    let output = swatplus(&[
        "extract",
        "--file",
        file.to_str().unwrap(),
        "--has-units",
        "--begin",
        "02-Jan-2010",
        "--usecols",
        "flo_out",
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let records: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let records = records.as_array().expect("records should be an array");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["date"], "02-Jan-2010");
    assert_eq!(records[1]["flo_out"], 4.0);
    assert!(records[0].get("gis_id").is_none());
}

#[test]
fn extract_writes_json_file_and_checks_extension() {
    let temp = TempDir::new().expect("tempdir should be created");
    let file = temp.path().join("channel_sd_day.txt");
    write_file(&file, CHANNEL_DAY);
    let json_file = temp.path().join("out/flow.json");
    fs::create_dir_all(json_file.parent().unwrap()).expect("out dir should be created");

    let output = swatplus(&[
        "extract",
        "--file",
        file.to_str().unwrap(),
        "--has-units",
        "--json-file",
        json_file.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let saved: Value =
        serde_json::from_str(&fs::read_to_string(&json_file).expect("json should exist"))
            .expect("saved file should be JSON");
    assert_eq!(saved.as_array().map(Vec::len), Some(3));

    let output = swatplus(&[
        "extract",
        "--file",
        file.to_str().unwrap(),
        "--has-units",
        "--json-file",
        temp.path().join("flow.txt").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [CONFIG.JSON_EXTENSION]"));
    assert!(stderr(&output).contains("FATAL EXIT CODE: 2"));
}

#[test]
fn extract_applies_reference_dates_and_row_filters() {
    let temp = TempDir::new().expect("tempdir should be created");
    let yearly = temp.path().join("basin_wb_yr.txt");
    write_file(
        &yearly,
        "basin_wb_yr: written by SWAT+
jday  mon  day  yr  name  precip
365  12  31  2010  bsn1  800.5
365  12  31  2010  bsn2  640.0
365  12  31  2011  bsn1  760.0
",
    );

    let output = swatplus(&[
        "extract",
        "--file",
        yearly.to_str().unwrap(),
        "--ref-day",
        "15",
        "--ref-month",
        "6",
        "--filter",
        "name=bsn1",
        "--usecols",
        "precip",
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let records: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let records = records.as_array().expect("records should be an array");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["date"], "15-Jun-2010");
    assert_eq!(records[0]["precip"], 800.5);
    assert_eq!(records[1]["date"], "15-Jun-2011");

    let daily = temp.path().join("channel_sd_day.txt");
    write_file(&daily, CHANNEL_DAY);
    let output = swatplus(&[
        "extract",
        "--file",
        daily.to_str().unwrap(),
        "--has-units",
        "--ref-day",
        "15",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [CONFIG.REF_DAY]"));

    let output = swatplus(&[
        "extract",
        "--file",
        daily.to_str().unwrap(),
        "--filter",
        "name",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("CONFIG.CLI_USAGE"));
}

#[test]
fn extract_reports_missing_time_columns_as_format_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let file = temp.path().join("basin_wb_yr.txt");
    write_file(&file, "basin_wb: written by SWAT+\nyr  unit  precip\n2010  1  812.5\n");

    let output = swatplus(&["extract", "--file", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("FORMAT.SERIES_TIME_COLUMNS"));
    assert!(stderr(&output).contains("[\"mon\", \"day\"]"));
}

#[test]
fn run_rejects_directory_without_executable() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(&temp.path().join("time.sim"), "time.sim\n");

    let output = swatplus(&["run", "--txtinout", temp.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [CONFIG.EXECUTABLE]"));
}

#[test]
fn sensitivity_rejects_invalid_study_config() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = temp.path().join("study.json");
    write_file(
        &config,
        r#"{"parameters": [], "sample_number": 1, "extract_data": {}, "workers": 4}"#,
    );
    let sensim = temp.path().join("sensim");
    fs::create_dir_all(&sensim).expect("sensim dir should be created");

    let output = swatplus(&[
        "sensitivity",
        "--txtinout",
        temp.path().to_str().unwrap(),
        "--sensim-dir",
        sensim.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("CONFIG.CLI_CONFIG"));
}

#[test]
fn indices_rejects_unknown_indicator_as_usage_error() {
    let output = swatplus(&[
        "indices",
        "--sensim-file",
        "sensitivity_simulation.json",
        "--df-name",
        "channel_sd_day_df",
        "--sim-col",
        "flo_out",
        "--obs-file",
        "observed.csv",
        "--obs-col",
        "discharge",
        "--indicator",
        "R2",
    ]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = stderr(&output);
    assert!(stderr.contains("CONFIG.CLI_USAGE"));
    assert!(stderr.contains("supported indicators are"));
}

#[test]
fn missing_config_file_is_an_io_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = swatplus(&[
        "run",
        "--txtinout",
        temp.path().to_str().unwrap(),
        "--config",
        temp.path().join("absent.json").to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("failed to read config file"));
}
