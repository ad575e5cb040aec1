use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use swat_core::domain::{SwatResult, compact_units};
use swat_core::metrics::{Indicator, IndicatorRequest, best_scenarios, scenario_indicators};
use swat_core::numerics::SaltelliSobol;
use swat_core::sensitivity::{
    SIMULATION_FILE, SensitivityConfig, SensitivityStudy, SimulationReport,
    parameter_sensitivity_indices, simulation_by_sample_parameters, unique_rows,
};
use swat_core::table::{Cell, TextTable};
use swat_core::txtinout::calibration::render_calibration;
use swat_core::txtinout::{ModelExecutor, TxtInOut};
use tempfile::TempDir;

const OBSERVED_FLOW: [f64; 5] = [1.0, 4.0, 2.0, 6.0, 3.0];

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("file should be written");
}

fn write_txtinout(dir: &Path) {
    let exe = std::env::current_exe().expect("test binary path should resolve");
    let target = dir.join(if cfg!(windows) { "swatplus.exe" } else { "swatplus" });
    fs::copy(&exe, &target).expect("executable should be copied");

    let mut file_cio = String::from("file.cio: written by SWAT+ editor\n");
    for index in 2..=24 {
        file_cio.push_str(&format!("section{index:<10}null\n"));
    }
    write_file(&dir.join("file.cio"), &file_cio);
    write_file(
        &dir.join("cal_parms.cal"),
        "cal_parms.cal: written by SWAT+ editor\n2\nname  obj_typ  abs_min  abs_max  units\nperco  hru  0.0  1.0  frac\nesco  hru  0.0  1.0  none\n",
    );
    write_file(
        &dir.join("hru-data.hru"),
        "hru-data.hru: written by SWAT+ editor\n  id  name  topo  hydro  soil  lu_mgt\n   1  hru01  top01  hyd01  soil01  agrl_lum\n   2  hru02  top02  hyd02  soil02  frst_lum\n",
    );
}

/// Plays the model: daily flow scales with the calibrated `perco` value and
/// ignores `esco`.
struct ScalingModel {
    runs: AtomicUsize,
}

impl ModelExecutor for ScalingModel {
    fn execute(&self, txtinout: &TxtInOut) -> SwatResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let calibration = fs::read_to_string(txtinout.root_dir().join("calibration.cal"))
            .expect("calibration file should be written before the run");
        let perco: f64 = calibration
            .lines()
            .find(|line| line.starts_with("perco"))
            .and_then(|line| line.split_whitespace().nth(2))
            .and_then(|value| value.parse().ok())
            .expect("perco row should carry a value");

        let mut output = String::from(
            "channel_sd_day: written by SWAT+\njday  mon  day  yr  unit  gis_id  name  flo_out\n               ha  m^3/s\n",
        );
        for (offset, flow) in OBSERVED_FLOW.iter().enumerate() {
            output.push_str(&format!(
                "{}  1  {}  2010  1  561  cha561  {:.6}\n",
                offset + 1,
                offset + 1,
                flow * (0.5 + perco)
            ));
        }
        write_file(&txtinout.root_dir().join("channel_sd_day.txt"), &output);
        Ok(())
    }
}

#[test]
fn study_runs_unique_rows_and_feeds_indices() {
    let txtinout = TempDir::new().expect("tempdir should be created");
    write_txtinout(txtinout.path());
    let sensim = TempDir::new().expect("tempdir should be created");
    let study: SensitivityStudy = serde_json::from_str(
        r#"{
            "parameters": [
                {"name": "perco", "change_type": "absval", "lower_bound": 0.0, "upper_bound": 1.0},
                {"name": "esco", "change_type": "absval", "lower_bound": 0.0, "upper_bound": 1.0, "units": [1, 2]}
            ],
            "sample_number": 3,
            "extract_data": {"channel_sd_day.txt": {"has_units": true, "usecols": ["flo_out"]}},
            "max_workers": 3
        }"#,
    )
    .expect("study should deserialize");
    let config = SensitivityConfig {
        txtinout_dir: txtinout.path().to_path_buf(),
        sensim_dir: sensim.path().to_path_buf(),
        study,
    };
    let model = Arc::new(ScalingModel {
        runs: AtomicUsize::new(0),
    });

    let report = simulation_by_sample_parameters(&config, &SaltelliSobol::default(), model.clone())
        .expect("study should run");
    assert_eq!(report.sample.len(), 8 * 6);
    assert_eq!(report.simulation.len(), report.sample.len());
    assert_eq!(
        model.runs.load(Ordering::SeqCst),
        unique_rows(&report.sample).len()
    );
    // Clean-up is on by default; only the saved report remains.
    let remaining: Vec<_> = fs::read_dir(sensim.path())
        .expect("sensim dir should list")
        .flatten()
        .map(|entry| entry.file_name())
        .collect();
    assert_eq!(remaining, vec![std::ffi::OsString::from(SIMULATION_FILE)]);

    let saved = SimulationReport::load(&sensim.path().join(SIMULATION_FILE))
        .expect("saved report should load");
    assert_eq!(saved.problem.names, vec!["perco", "esco"]);
    let first = &saved.simulation["1"];
    assert_eq!(first.var["perco"], saved.sample[0][0]);

    let obs_file = sensim.path().join("observed.csv");
    let mut csv = String::from("date,flow\n");
    for (offset, flow) in OBSERVED_FLOW.iter().enumerate() {
        csv.push_str(&format!("2010-01-{:02},{}\n", offset + 1, flow));
    }
    write_file(&obs_file, &csv);
    let request = IndicatorRequest {
        sensim_file: sensim.path().join(SIMULATION_FILE),
        df_name: "channel_sd_day_df".to_string(),
        sim_col: "flo_out".to_string(),
        obs_file,
        date_format: "%Y-%m-%d".to_string(),
        obs_col: "flow".to_string(),
        indicators: vec![Indicator::Rmse, Indicator::Pbias],
    };

    let scored = scenario_indicators(&request).expect("scenarios should score");
    assert_eq!(scored.scenarios.len(), 48);
    let best = best_scenarios(&scored);
    let best_rmse = best
        .iter()
        .find(|entry| entry.indicator == Indicator::Rmse)
        .expect("rmse should have a best scenario");
    let best_perco = saved.simulation[&best_rmse.scenario.to_string()].var["perco"];
    // Flow matches the observations at perco = 0.5.
    assert!(saved
        .sample
        .iter()
        .all(|row| (row[0] - 0.5).abs() >= (best_perco - 0.5).abs() - 1.0e-12));

    let indices = parameter_sensitivity_indices(&request, &SaltelliSobol::default(), None)
        .expect("indices should compute");
    let pbias = &indices.sensitivity_indices[&Indicator::Pbias];
    assert!(pbias.total_order[0] > 0.5);
    assert!(pbias.total_order[1].abs() < 1.0e-9);
}

#[test]
fn table_edits_survive_a_write_and_reread() {
    let temp = TempDir::new().expect("tempdir should be created");
    let path = temp.path().join("hydrology.hyd");
    write_file(
        &path,
        "hydrology.hyd: written by SWAT+ editor\nname  lat_ttime  perco  cn3_swf\nhyd01  0.0  0.9  0.95\nhyd02  0.0  1e-3  0.5\n",
    );

    let mut table = TextTable::read(&path, false).expect("table should parse");
    let changed = table
        .apply_change("perco", swat_core::domain::ChangeType::PercentChange, -50.0, None)
        .expect("change should apply");
    assert_eq!(changed, 2);
    table.write().expect("table should write");

    let first_write = fs::read_to_string(&path).expect("written file readable");
    assert!(first_write.starts_with("hydrology.hyd: written by SWAT+ editor\n"));
    let reread = TextTable::read(&path, false).expect("rewritten table should parse");
    assert_eq!(reread.columns(), table.columns());
    assert_eq!(reread.rows(), table.rows());
    assert_eq!(reread.value(0, "perco").unwrap(), &Cell::Real(0.45));

    reread.write().expect("table should write again");
    assert_eq!(fs::read_to_string(&path).expect("file readable"), first_write);
}

#[test]
fn calibration_rows_and_unit_compaction_match_the_model_format() {
    let change: swat_core::domain::ParameterChange =
        serde_json::from_str(r#"{"name": "cn2", "change_type": "pctchg", "value": -50.0}"#)
            .expect("change should deserialize");
    let text = render_calibration(&[change]).expect("calibration should render");
    let row = text.lines().nth(3).expect("parameter row should exist");
    assert!(row.starts_with("cn2           pctchg           -50.0               0"));
    assert!(row.ends_with("       0"));

    assert_eq!(compact_units(&[1, 2, 3, 4]).unwrap(), vec![1, -4]);
    assert_eq!(compact_units(&[1, 2, 4, 6]).unwrap(), vec![1, -2, 4, 6]);
}
