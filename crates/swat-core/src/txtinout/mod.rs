//! Controller for one working copy of a SWAT+ `TxtInOut` directory.

pub mod calibration;
pub mod control;
pub mod traits;
pub mod validation;

pub use control::{PRINT_OBJECT_CATALOG, PrintFlags, PrintFlagsOverride};
pub use traits::{ModelExecutor, SubprocessExecutor};
pub use validation::ParameterRegistry;

use crate::common::dates::{DateRange, parse_date};
use crate::domain::{ParameterChange, SwatError, SwatResult};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

const IGNORED_OUTPUT_SUFFIXES: [&str; 4] = ["_day", "_mon", "_yr", "_aa"];
const IGNORED_OUTPUT_EXTENSIONS: [&str; 2] = ["txt", "csv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtInOut {
    root_dir: PathBuf,
    exe_file: PathBuf,
}

impl TxtInOut {
    pub fn new(dir: impl AsRef<Path>) -> SwatResult<Self> {
        let root_dir = absolute_dir(dir.as_ref())?;
        let executables = find_executables(&root_dir)?;
        if executables.len() != 1 {
            return Err(SwatError::configuration(
                "CONFIG.EXECUTABLE",
                format!(
                    "Expected exactly one executable file in '{}', but found {}",
                    root_dir.display(),
                    executables.len()
                ),
            ));
        }
        let exe_file = executables.into_iter().next().ok_or_else(|| {
            SwatError::internal("SYS.EXECUTABLE", "executable list emptied unexpectedly")
        })?;
        Ok(Self { root_dir, exe_file })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn exe_file(&self) -> &Path {
        &self.exe_file
    }

    /// Copies every input file into the empty directory `target`, skipping
    /// subdirectories and bulk output files (`*_{day,mon,yr,aa}.{txt,csv}`).
    pub fn copy_required_files(&self, target: impl AsRef<Path>) -> SwatResult<PathBuf> {
        let target = absolute_dir(target.as_ref())?;
        ensure_empty_dir(&target)?;

        let entries = fs::read_dir(&self.root_dir).map_err(|source| {
            SwatError::io_system(
                "IO.TXTINOUT_LIST",
                format!("failed to list '{}': {}", self.root_dir.display(), source),
            )
        })?;
        let mut copied = 0usize;
        for entry in entries {
            let entry = entry.map_err(|source| {
                SwatError::io_system(
                    "IO.TXTINOUT_LIST",
                    format!("failed to list '{}': {}", self.root_dir.display(), source),
                )
            })?;
            let source_path = entry.path();
            if source_path.is_dir() || is_bulk_output(&source_path) {
                continue;
            }
            let destination = target.join(entry.file_name());
            fs::copy(&source_path, &destination).map_err(|source| {
                SwatError::io_system(
                    "IO.TXTINOUT_COPY",
                    format!(
                        "failed to copy '{}' to '{}': {}",
                        source_path.display(),
                        destination.display(),
                        source
                    ),
                )
            })?;
            copied += 1;
        }
        debug!(from = %self.root_dir.display(), to = %target.display(), copied, "copied TxtInOut files");
        Ok(target)
    }

    /// Runs the executable with the directory as working directory. Stdout is
    /// forwarded line by line to the log; a non-zero exit carries stderr.
    pub fn run_executable(&self) -> SwatResult<()> {
        let mut child = Command::new(&self.exe_file)
            .current_dir(&self.root_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                SwatError::execution(
                    "RUN.MODEL_SPAWN",
                    format!("failed to start '{}': {}", self.exe_file.display(), source),
                )
            })?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured);
                captured
            })
        });

        if let Some(stdout) = child.stdout.take() {
            // Lines are raw bytes: the model echoes latin-1 input text.
            let mut reader = BufReader::new(stdout);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buffer);
                        let line = line.trim();
                        if !line.is_empty() {
                            info!(dir = %self.root_dir.display(), "{line}");
                        }
                    }
                    Err(source) => {
                        warn!(dir = %self.root_dir.display(), error = %source, "stopped reading model output");
                        break;
                    }
                }
            }
        }

        let status = child.wait().map_err(|source| {
            SwatError::execution(
                "RUN.MODEL_WAIT",
                format!("failed to wait for '{}': {}", self.exe_file.display(), source),
            )
        })?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "a signal".to_string(), |code| code.to_string());
            error!(dir = %self.root_dir.display(), exit = %code, "SWAT+ run failed");
            return Err(SwatError::execution(
                "RUN.MODEL_EXIT",
                format!(
                    "'{}' exited with {} in '{}': {}",
                    self.exe_file.display(),
                    code,
                    self.root_dir.display(),
                    stderr.trim()
                ),
            ));
        }
        Ok(())
    }

    /// Configures, parameterizes and runs the model, optionally inside a fresh
    /// copy at `sim_dir`. Returns the directory the model ran in.
    pub fn run_swat(&self, sim_dir: Option<&Path>, options: &RunOptions) -> SwatResult<PathBuf> {
        self.run_swat_with(sim_dir, options, &SubprocessExecutor)
    }

    pub fn run_swat_with(
        &self,
        sim_dir: Option<&Path>,
        options: &RunOptions,
        executor: &dyn ModelExecutor,
    ) -> SwatResult<PathBuf> {
        let configuration = options.resolve()?;
        if let Some(parameters) = options.parameters.as_deref() {
            validation::ensure_unique_entries(parameters)?;
            let registry = ParameterRegistry::load(&self.root_dir)?;
            registry.validate_names(parameters)?;
            if !options.skip_validation {
                registry.validate_units_and_conditions(parameters)?;
            }
        }

        let run = match sim_dir {
            Some(sim_dir) => self.fresh_copy(sim_dir)?,
            None => self.clone(),
        };

        run.apply_configuration(&configuration)?;
        if let Some(parameters) = options.parameters.as_deref() {
            run.write_calibration_file(parameters)?;
        }
        executor.execute(&run)?;
        Ok(run.root_dir)
    }

    fn fresh_copy(&self, sim_dir: &Path) -> SwatResult<Self> {
        let target = self.copy_required_files(sim_dir)?;
        TxtInOut::new(target)
    }

    fn apply_configuration(&self, configuration: &RunConfiguration) -> SwatResult<()> {
        if let Some(period) = configuration.simulation_period {
            self.set_simulation_period(period)?;
        }
        if let Some(step) = configuration.simulation_timestep {
            self.set_simulation_timestep(step)?;
        }
        if let Some(warmup) = configuration.warmup {
            self.set_warmup_year(warmup)?;
        }
        for (object, flags) in &configuration.print_objects {
            self.enable_object_in_print_prt(Some(object), *flags, false)?;
        }
        if let Some(period) = configuration.print_period {
            self.set_print_period(period)?;
        }
        if let Some(interval) = configuration.print_interval {
            self.set_print_interval(interval)?;
        }
        Ok(())
    }
}

/// Call-level options of a single model run, usually read from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunOptions {
    #[serde(default)]
    pub parameters: Option<Vec<ParameterChange>>,
    #[serde(default)]
    pub begin_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub simulation_timestep: Option<u32>,
    #[serde(default)]
    pub warmup: Option<u32>,
    #[serde(default)]
    pub print_prt_control: Option<IndexMap<String, PrintFlagsOverride>>,
    #[serde(default)]
    pub print_begin_date: Option<String>,
    #[serde(default)]
    pub print_end_date: Option<String>,
    #[serde(default)]
    pub print_interval: Option<u32>,
    #[serde(default)]
    pub skip_validation: bool,
}

#[derive(Debug, Clone, Default)]
struct RunConfiguration {
    simulation_period: Option<DateRange>,
    simulation_timestep: Option<u32>,
    warmup: Option<u32>,
    print_objects: Vec<(String, PrintFlags)>,
    print_period: Option<DateRange>,
    print_interval: Option<u32>,
}

impl RunOptions {
    /// Checks date pairing and ranges before anything on disk is touched.
    fn resolve(&self) -> SwatResult<RunConfiguration> {
        let simulation_period = paired_range(
            "begin_date",
            "end_date",
            self.begin_date.as_deref(),
            self.end_date.as_deref(),
        )?;
        let print_period = paired_range(
            "print_begin_date",
            "print_end_date",
            self.print_begin_date.as_deref(),
            self.print_end_date.as_deref(),
        )?;

        if let Some(print_period) = print_period {
            let Some(simulation_period) = simulation_period else {
                return Err(SwatError::configuration(
                    "CONFIG.PRINT_PERIOD",
                    "print_begin_date or print_end_date cannot be set unless begin_date and end_date are also provided",
                ));
            };
            for date in [print_period.begin(), print_period.end()] {
                if !simulation_period.contains(date) {
                    return Err(SwatError::configuration(
                        "CONFIG.PRINT_PERIOD",
                        format!(
                            "print date {} must be between {} and {}",
                            crate::common::dates::format_date(date),
                            crate::common::dates::format_date(simulation_period.begin()),
                            crate::common::dates::format_date(simulation_period.end())
                        ),
                    ));
                }
            }
        }

        if let Some(step) = self.simulation_timestep {
            control::validate_timestep(step)?;
        }
        if let Some(warmup) = self.warmup {
            control::validate_warmup(warmup)?;
        }

        let mut print_objects = Vec::new();
        for (object, flags) in self.print_prt_control.iter().flatten() {
            control::ensure_known_object(object)?;
            print_objects.push((object.clone(), flags.resolve()));
        }

        Ok(RunConfiguration {
            simulation_period,
            simulation_timestep: self.simulation_timestep,
            warmup: self.warmup,
            print_objects,
            print_period,
            print_interval: self.print_interval,
        })
    }
}

fn paired_range(
    begin_name: &str,
    end_name: &str,
    begin: Option<&str>,
    end: Option<&str>,
) -> SwatResult<Option<DateRange>> {
    match (begin, end) {
        (Some(begin), Some(end)) => Ok(Some(DateRange::new(parse_date(begin)?, parse_date(end)?)?)),
        (None, None) => Ok(None),
        _ => Err(SwatError::configuration(
            "CONFIG.DATE_PAIR",
            format!("{begin_name} and {end_name} must be provided together"),
        )),
    }
}

pub(crate) fn absolute_dir(dir: &Path) -> SwatResult<PathBuf> {
    if !dir.is_dir() {
        return Err(SwatError::configuration(
            "CONFIG.DIRECTORY",
            format!("Invalid directory path: '{}'", dir.display()),
        ));
    }
    dir.canonicalize().map_err(|source| {
        SwatError::io_system(
            "IO.DIRECTORY",
            format!("failed to resolve '{}': {}", dir.display(), source),
        )
    })
}

pub(crate) fn ensure_empty_dir(dir: &Path) -> SwatResult<()> {
    let mut entries = fs::read_dir(dir).map_err(|source| {
        SwatError::io_system(
            "IO.DIRECTORY",
            format!("failed to list '{}': {}", dir.display(), source),
        )
    })?;
    if entries.next().is_some() {
        return Err(SwatError::configuration(
            "CONFIG.DIRECTORY_NOT_EMPTY",
            format!("Input directory '{}' is not empty; expected an empty directory", dir.display()),
        ));
    }
    Ok(())
}

fn is_bulk_output(path: &Path) -> bool {
    let Some(extension) = path.extension().and_then(|extension| extension.to_str()) else {
        return false;
    };
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return false;
    };
    IGNORED_OUTPUT_EXTENSIONS.contains(&extension)
        && IGNORED_OUTPUT_SUFFIXES
            .iter()
            .any(|suffix| stem.ends_with(suffix))
}

fn find_executables(dir: &Path) -> SwatResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| {
        SwatError::io_system(
            "IO.DIRECTORY",
            format!("failed to list '{}': {}", dir.display(), source),
        )
    })?;
    let mut executables = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if is_native_executable(&path) {
            executables.push(path);
        }
    }
    executables.sort();
    Ok(executables)
}

fn read_magic(path: &Path, length: usize) -> Option<Vec<u8>> {
    let mut file = fs::File::open(path).ok()?;
    let mut magic = vec![0u8; length];
    file.read_exact(&mut magic).ok()?;
    Some(magic)
}

#[cfg(windows)]
fn is_native_executable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("exe"))
        && read_magic(path, 2).is_some_and(|magic| magic == b"MZ")
}

#[cfg(unix)]
fn is_native_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    const ELF_MAGIC: &[u8] = b"\x7fELF";
    const MACH_O_MAGICS: [[u8; 4]; 2] = [[0xcf, 0xfa, 0xed, 0xfe], [0xca, 0xfe, 0xba, 0xbe]];

    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return false;
    }
    read_magic(path, 4).is_some_and(|magic| {
        magic == ELF_MAGIC || MACH_O_MAGICS.iter().any(|candidate| magic == candidate)
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    /// Builds a minimal TxtInOut with a real native executable and the
    /// control/registry files the controller edits.
    pub(crate) fn write_txtinout(dir: &Path) {
        let exe = std::env::current_exe().expect("test binary path should resolve");
        let target = dir.join(if cfg!(windows) { "swatplus.exe" } else { "swatplus" });
        fs::copy(&exe, &target).expect("executable should be copied");

        let mut file_cio = String::from("file.cio: written by SWAT+ editor\n");
        for index in 2..=24 {
            file_cio.push_str(&format!("section{index:<10}null\n"));
        }
        fs::write(dir.join("file.cio"), file_cio).expect("file.cio should be written");
        fs::write(
            dir.join("time.sim"),
            "time.sim: written by SWAT+ editor\nday_start  yrc_start   day_end   yrc_end      step\n       0       1980          0      1985          0 \n",
        )
        .expect("time.sim should be written");
        fs::write(
            dir.join("print.prt"),
            "print.prt: written by SWAT+ editor\n\
             nyskip      day_start  yrc_start  day_end   yrc_end   interval\n\
             1           0          0          0         0         1         \n\
             aa_int_cnt\n\
             0\n\
             csvout    dbout     cdfout\n\
             n         n         n\n\
             crop_yld  mgtout    hydcon    fdcout\n\
             b         n         n         n\n\
             objects   daily   monthly   yearly   avann\n\
             basin_wb                     n             n             y             y\n\
             channel_sd                   n             n             y             y\n",
        )
        .expect("print.prt should be written");
        fs::write(
            dir.join("cal_parms.cal"),
            "cal_parms.cal: written by SWAT+ editor\n5\nname  obj_typ  abs_min  abs_max  units\ncn2  hru  35.0  95.0  none\nperco  hru  0.0  1.0  frac\nesco  hru  0.0  1.0  none\nflo_min  aqu  0.0  50.0  m\nchn_n  cha  0.01  0.5  none\n",
        )
        .expect("cal_parms.cal should be written");
        fs::write(
            dir.join("hru-data.hru"),
            "hru-data.hru: written by SWAT+ editor\n  id  name  topo  hydro  soil  lu_mgt\n   1  hru01  top01  hyd01  soil01  agrl_lum\n   2  hru02  top02  hyd02  soil02  frst_lum\n   3  hru03  top03  hyd03  soil01  agrl_lum\n",
        )
        .expect("hru-data.hru should be written");
        fs::write(
            dir.join("aquifer.aqu"),
            "aquifer.aqu: written by SWAT+ editor\n  id  name  flo\n   1  aqu01  0.05\n",
        )
        .expect("aquifer.aqu should be written");
        fs::write(
            dir.join("plants.plt"),
            "plants.plt: written by SWAT+ editor\nname  plnt_typ  gro_trig\nagrl  warm_annual  temp_gro\nfrst  perennial  temp_gro\n",
        )
        .expect("plants.plt should be written");
        fs::write(
            dir.join("landuse.lum"),
            "landuse.lum: written by SWAT+ editor\nname  cal_group  plnt_com  mgt\nagrl_lum  null  agrl_comm  null\nfrst_lum  null  frst_comm  null\n",
        )
        .expect("landuse.lum should be written");
        fs::write(
            dir.join("soils.sol"),
            "soils.sol: written by SWAT+ editor\nname  nly  hyd_grp  dp_tot  anion_excl  perc_crk  texture\nsoil01  1  B  1000.0  0.5  0.5  loam\n  layer  dp  bd\nsoil02  1  C  800.0  0.5  0.5  clay\n",
        )
        .expect("soils.sol should be written");
        fs::write(dir.join("channel_sd_day.txt"), "output\n").expect("output should be written");
        fs::write(dir.join("basin_wb_aa.csv"), "output\n").expect("output should be written");
    }
}
