//! Checks calibration targets against the registries of a `TxtInOut` directory.

use crate::common::serialization::read_text_artifact;
use crate::domain::{CalibrationTarget, ConditionKind, SwatError, SwatResult};
use crate::table::{ParseStrategy, TextTable};
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use tracing::debug;

const CAL_PARMS: &str = "cal_parms.cal";
const SKIP_HINT: &str = "If you want to ignore the validation, set 'skip_validation=True'";
const HSG_GROUPS: [&str; 4] = ["A", "B", "C", "D"];
const UNIT_REGISTRIES: [(&str, &str); 4] = [
    ("hru", "hru-data.hru"),
    ("sol", "hru-data.hru"),
    ("res", "reservoir.res"),
    ("aqu", "aquifer.aqu"),
];

/// Rejects parameter lists that repeat an identical entry.
pub fn ensure_unique_entries<T: PartialEq + CalibrationTarget>(entries: &[T]) -> SwatResult<()> {
    for (index, entry) in entries.iter().enumerate() {
        if entries[..index].contains(entry) {
            return Err(SwatError::configuration(
                "CONFIG.PARAMETER_DUPLICATE",
                format!(
                    "Parameter '{}' is declared more than once with identical settings (entry {})",
                    entry.target_name(),
                    index + 1
                ),
            ));
        }
    }
    Ok(())
}

/// Parameter name to object type, as declared by `cal_parms.cal`.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    root_dir: PathBuf,
    object_types: IndexMap<String, String>,
}

impl ParameterRegistry {
    pub fn load(root_dir: &Path) -> SwatResult<Self> {
        let path = root_dir.join(CAL_PARMS);
        if !path.is_file() {
            return Err(SwatError::configuration(
                "CONFIG.CAL_PARMS",
                "cal_parms.cal file does not exist in the TxtInOut folder",
            ));
        }
        let names = column_values(&path, 2, "name")?;
        let types = column_values(&path, 2, "obj_typ")?;
        let object_types: IndexMap<String, String> = names.into_iter().zip(types).collect();
        debug!(file = %path.display(), parameters = object_types.len(), "loaded parameter registry");
        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            object_types,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.object_types.contains_key(name)
    }

    pub fn object_type(&self, name: &str) -> Option<&str> {
        self.object_types.get(name).map(String::as_str)
    }

    pub fn validate_names<T: CalibrationTarget>(&self, targets: &[T]) -> SwatResult<()> {
        for target in targets {
            if !self.contains(target.target_name()) {
                return Err(SwatError::configuration(
                    "CONFIG.PARAMETER_UNKNOWN",
                    format!("The parameter '{}' is not in cal_parms.cal", target.target_name()),
                ));
            }
        }
        Ok(())
    }

    /// Checks condition values against their registries and unit ids against
    /// the row count of the file owning the parameter's object type.
    pub fn validate_units_and_conditions<T: CalibrationTarget>(
        &self,
        targets: &[T],
    ) -> SwatResult<()> {
        let mut reference_sets: IndexMap<ConditionKind, IndexSet<String>> = IndexMap::new();
        let mut registry_sizes: IndexMap<&'static str, usize> = IndexMap::new();

        for target in targets {
            let name = target.target_name();
            if let Some(conditions) = target.target_conditions() {
                for (kind, values) in conditions {
                    if !reference_sets.contains_key(kind) {
                        let loaded = self.condition_values(*kind)?;
                        reference_sets.insert(*kind, loaded);
                    }
                    let Some(valid) = reference_sets.get(kind) else {
                        continue;
                    };
                    if let Some(invalid) = values.iter().find(|value| !valid.contains(*value)) {
                        let mut sorted: Vec<&str> = valid.iter().map(String::as_str).collect();
                        sorted.sort_unstable();
                        let listed = sorted
                            .iter()
                            .map(|value| format!("'{value}'"))
                            .collect::<Vec<_>>()
                            .join(", ");
                        return Err(validation_error(
                            "CONFIG.PARAMETER_CONDITION",
                            format!(
                                "Condition '{}' for parameter '{}' has invalid value '{}'. Valid values are: [{}].",
                                kind, name, invalid, listed
                            ),
                        ));
                    }
                }
            }

            let Some(units) = target.target_units() else {
                continue;
            };
            let object_type = self.object_type(name).unwrap_or_default();
            let Some((_, file)) = UNIT_REGISTRIES
                .iter()
                .find(|(registry_type, _)| *registry_type == object_type)
            else {
                let supported = ["hru", "sol", "res", "aqu"].join(", ");
                return Err(validation_error(
                    "CONFIG.PARAMETER_UNITS",
                    format!(
                        "Parameter '{}' does not support units. Only parameters of type [{}] support units.",
                        name, supported
                    ),
                ));
            };
            let available = match registry_sizes.get(file) {
                Some(count) => *count,
                None => {
                    let count = column_values(&self.root_dir.join(file), 1, "id")?.len();
                    registry_sizes.insert(*file, count);
                    count
                }
            };
            let requested = units.iter().copied().max().unwrap_or(0) as usize;
            if requested > available {
                return Err(validation_error(
                    "CONFIG.PARAMETER_UNITS",
                    format!(
                        "Invalid units for parameter '{}'. Some ids exceed the maximum available in {} (requested up to {}, available {}).",
                        name, file, requested, available
                    ),
                ));
            }
        }
        Ok(())
    }

    fn condition_values(&self, kind: ConditionKind) -> SwatResult<IndexSet<String>> {
        let (file, column) = match kind {
            ConditionKind::Hsg => {
                return Ok(HSG_GROUPS.iter().map(|group| group.to_string()).collect());
            }
            ConditionKind::Texture => ("soils.sol", "texture"),
            ConditionKind::Plant => ("plants.plt", "name"),
            ConditionKind::Landuse => ("landuse.lum", "plnt_com"),
        };
        Ok(column_values(&self.root_dir.join(file), 1, column)?
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect())
    }
}

fn validation_error(placeholder: &'static str, message: String) -> SwatError {
    SwatError::configuration(placeholder, format!("{message}\n\n{SKIP_HINT}"))
}

/// Text of `column` for every data row, after skipping `skip` leading lines.
/// Files with nested rows (soil layers) fall back to the lines whose token
/// count matches the column row.
fn column_values(path: &Path, skip: usize, column: &str) -> SwatResult<Vec<String>> {
    if !path.is_file() {
        return Err(SwatError::io_system(
            "IO.REGISTRY_READ",
            format!("file '{}' does not exist", path.display()),
        ));
    }
    let text = read_text_artifact(path, "IO.REGISTRY_READ")?;
    let body = text
        .split_inclusive('\n')
        .skip(skip.saturating_sub(1))
        .collect::<String>();

    if let Ok(table) = TextTable::parse(path, &body, false) {
        if matches!(
            table.strategy(),
            ParseStrategy::Whitespace | ParseStrategy::MultiSpace
        ) && table.has_column(column)
        {
            return Ok(table
                .column(column)?
                .into_iter()
                .map(|cell| cell.render())
                .collect());
        }
    }

    let mut lines = body
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .map(|line| line.split_whitespace().collect())
        .unwrap_or_default();
    let index = header
        .iter()
        .position(|name| *name == column)
        .ok_or_else(|| {
            SwatError::data(
                "DATA.TABLE_COLUMN",
                format!("Column \"{}\" was not found in file \"{}\"", column, path.display()),
            )
        })?;
    Ok(lines
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|tokens| tokens.len() == header.len())
        .map(|tokens| tokens[index].to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{ParameterRegistry, ensure_unique_entries};
    use crate::domain::{BoundedParameter, ChangeType, ConditionKind, Conditions, ParameterChange};
    use crate::txtinout::test_support::write_txtinout;
    use tempfile::TempDir;

    fn change(name: &str) -> ParameterChange {
        ParameterChange::new(name, ChangeType::AbsoluteValue, 0.5).expect("change should build")
    }

    fn with_condition(name: &str, kind: ConditionKind, value: &str) -> ParameterChange {
        let mut conditions = Conditions::new();
        conditions.insert(kind, vec![value.to_string()]);
        change(name)
            .with_conditions(conditions)
            .expect("conditions should be accepted")
    }

    #[test]
    fn registry_reads_names_and_object_types() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_txtinout(temp.path());
        let registry = ParameterRegistry::load(temp.path()).expect("registry should load");
        assert_eq!(registry.object_type("cn2"), Some("hru"));
        assert_eq!(registry.object_type("flo_min"), Some("aqu"));
        assert!(!registry.contains("alpha_bf"));

        let bounded = BoundedParameter::new("chn_n", ChangeType::AbsoluteValue, 0.01, 0.3)
            .expect("bounded parameter should build");
        registry
            .validate_names(&[bounded])
            .expect("known bounded parameter should validate");
        let error = registry
            .validate_names(&[change("alpha_bf")])
            .expect_err("unknown parameter should fail");
        assert_eq!(error.message(), "The parameter 'alpha_bf' is not in cal_parms.cal");
    }

    #[test]
    fn missing_cal_parms_is_reported() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = ParameterRegistry::load(temp.path()).expect_err("missing file should fail");
        assert_eq!(error.placeholder(), "CONFIG.CAL_PARMS");
    }

    #[test]
    fn units_are_bounded_by_registry_rows() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_txtinout(temp.path());
        let registry = ParameterRegistry::load(temp.path()).expect("registry should load");

        let within = change("cn2").with_units(&[1, 3]).expect("units accepted");
        registry
            .validate_units_and_conditions(&[within])
            .expect("units within range should validate");

        let beyond = change("flo_min").with_units(&[1, 2]).expect("units accepted");
        let error = registry
            .validate_units_and_conditions(&[beyond])
            .expect_err("units beyond aquifer count should fail");
        assert!(error.message().starts_with(
            "Invalid units for parameter 'flo_min'. Some ids exceed the maximum available in aquifer.aqu (requested up to 2, available 1)."
        ));
        assert!(error.message().ends_with("set 'skip_validation=True'"));

        let unsupported = change("chn_n").with_units(&[1]).expect("units accepted");
        let error = registry
            .validate_units_and_conditions(&[unsupported])
            .expect_err("channel parameters do not take units");
        assert!(error.message().starts_with(
            "Parameter 'chn_n' does not support units. Only parameters of type [hru, sol, res, aqu] support units."
        ));
    }

    #[test]
    fn conditions_are_checked_against_reference_files() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_txtinout(temp.path());
        let registry = ParameterRegistry::load(temp.path()).expect("registry should load");

        let valid = vec![
            with_condition("cn2", ConditionKind::Hsg, "B"),
            with_condition("cn2", ConditionKind::Texture, "clay"),
            with_condition("esco", ConditionKind::Plant, "frst"),
            with_condition("perco", ConditionKind::Landuse, "agrl_comm"),
        ];
        registry
            .validate_units_and_conditions(&valid)
            .expect("known condition values should validate");

        let error = registry
            .validate_units_and_conditions(&[with_condition("cn2", ConditionKind::Hsg, "E")])
            .expect_err("unknown hydrologic group should fail");
        assert!(error.message().starts_with(
            "Condition 'hsg' for parameter 'cn2' has invalid value 'E'. Valid values are: ['A', 'B', 'C', 'D']."
        ));

        let error = registry
            .validate_units_and_conditions(&[with_condition("cn2", ConditionKind::Texture, "sand")])
            .expect_err("unknown texture should fail");
        assert!(error.message().contains("Valid values are: ['clay', 'loam']."));
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        ensure_unique_entries(&[change("cn2"), change("perco")]).expect("distinct entries pass");
        let scoped = change("cn2").with_units(&[2]).expect("units accepted");
        ensure_unique_entries(&[change("cn2"), scoped]).expect("scoped entries are distinct");

        let error = ensure_unique_entries(&[change("cn2"), change("perco"), change("cn2")])
            .expect_err("duplicate should fail");
        assert_eq!(error.placeholder(), "CONFIG.PARAMETER_DUPLICATE");
        assert!(error.message().contains("'cn2'"));
    }
}
