pub mod errors;

pub use errors::{ExitStatusMapping, SwatError, SwatErrorCategory, SwatResult};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// How a calibration value is applied to the current parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// Replace the value.
    #[serde(rename = "absval")]
    AbsoluteValue,
    /// Add a delta to the value.
    #[serde(rename = "abschg")]
    AbsoluteChange,
    /// Scale the value by a percentage.
    #[serde(rename = "pctchg")]
    PercentChange,
}

impl ChangeType {
    pub const ALL: [Self; 3] = [
        Self::AbsoluteValue,
        Self::AbsoluteChange,
        Self::PercentChange,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AbsoluteValue => "absval",
            Self::AbsoluteChange => "abschg",
            Self::PercentChange => "pctchg",
        }
    }

    pub fn apply(self, current: f64, value: f64) -> f64 {
        match self {
            Self::AbsoluteValue => value,
            Self::AbsoluteChange => current + value,
            Self::PercentChange => current * (1.0 + value / 100.0),
        }
    }
}

impl Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for ChangeType {
    type Err = SwatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value.trim())
            .ok_or_else(|| {
                SwatError::configuration(
                    "CONFIG.CHANGE_TYPE",
                    format!(
                        "Invalid change_type '{}'; expected one of absval, abschg, pctchg",
                        value
                    ),
                )
            })
    }
}

/// Condition keys accepted in `calibration.cal` condition lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Hsg,
    Texture,
    Plant,
    Landuse,
}

impl ConditionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hsg => "hsg",
            Self::Texture => "texture",
            Self::Plant => "plant",
            Self::Landuse => "landuse",
        }
    }
}

impl Display for ConditionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

pub type Conditions = IndexMap<ConditionKind, Vec<String>>;

/// A single calibration change written to `calibration.cal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameterChange")]
pub struct ParameterChange {
    name: String,
    change_type: ChangeType,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    units: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conditions: Option<Conditions>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParameterChange {
    name: String,
    change_type: ChangeType,
    value: f64,
    #[serde(default)]
    units: Option<Vec<i64>>,
    #[serde(default)]
    conditions: Option<Conditions>,
}

impl TryFrom<RawParameterChange> for ParameterChange {
    type Error = SwatError;

    fn try_from(raw: RawParameterChange) -> Result<Self, Self::Error> {
        let mut change = Self::new(raw.name, raw.change_type, raw.value)?;
        if let Some(units) = raw.units {
            change = change.with_units(&units)?;
        }
        if let Some(conditions) = raw.conditions {
            change = change.with_conditions(conditions)?;
        }
        Ok(change)
    }
}

impl ParameterChange {
    pub fn new(name: impl Into<String>, change_type: ChangeType, value: f64) -> SwatResult<Self> {
        let name = validated_name(name.into())?;
        if !value.is_finite() {
            return Err(SwatError::configuration(
                "CONFIG.PARAMETER_VALUE",
                format!("Parameter '{}' has non-finite value {}", name, value),
            ));
        }
        Ok(Self {
            name,
            change_type,
            value,
            units: None,
            conditions: None,
        })
    }

    pub fn with_units(mut self, units: &[i64]) -> SwatResult<Self> {
        self.units = Some(normalize_units(&self.name, units)?);
        Ok(self)
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> SwatResult<Self> {
        self.conditions = Some(validated_conditions(&self.name, conditions)?);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub const fn value(&self) -> f64 {
        self.value
    }

    pub fn units(&self) -> Option<&[u32]> {
        self.units.as_deref()
    }

    pub fn conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }
}

/// A parameter varied between two bounds during sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundedParameter")]
pub struct BoundedParameter {
    name: String,
    change_type: ChangeType,
    lower_bound: f64,
    upper_bound: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    units: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conditions: Option<Conditions>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBoundedParameter {
    name: String,
    change_type: ChangeType,
    lower_bound: f64,
    upper_bound: f64,
    #[serde(default)]
    units: Option<Vec<i64>>,
    #[serde(default)]
    conditions: Option<Conditions>,
}

impl TryFrom<RawBoundedParameter> for BoundedParameter {
    type Error = SwatError;

    fn try_from(raw: RawBoundedParameter) -> Result<Self, Self::Error> {
        let mut parameter =
            Self::new(raw.name, raw.change_type, raw.lower_bound, raw.upper_bound)?;
        if let Some(units) = raw.units {
            parameter = parameter.with_units(&units)?;
        }
        if let Some(conditions) = raw.conditions {
            parameter = parameter.with_conditions(conditions)?;
        }
        Ok(parameter)
    }
}

impl BoundedParameter {
    pub fn new(
        name: impl Into<String>,
        change_type: ChangeType,
        lower_bound: f64,
        upper_bound: f64,
    ) -> SwatResult<Self> {
        let name = validated_name(name.into())?;
        if !lower_bound.is_finite() || !upper_bound.is_finite() || lower_bound >= upper_bound {
            return Err(SwatError::configuration(
                "CONFIG.PARAMETER_BOUNDS",
                format!(
                    "Parameter '{}' must have lower_bound < upper_bound, got lower_bound = {} and upper_bound = {}",
                    name, lower_bound, upper_bound
                ),
            ));
        }
        Ok(Self {
            name,
            change_type,
            lower_bound,
            upper_bound,
            units: None,
            conditions: None,
        })
    }

    pub fn with_units(mut self, units: &[i64]) -> SwatResult<Self> {
        self.units = Some(normalize_units(&self.name, units)?);
        Ok(self)
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> SwatResult<Self> {
        self.conditions = Some(validated_conditions(&self.name, conditions)?);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub const fn bounds(&self) -> [f64; 2] {
        [self.lower_bound, self.upper_bound]
    }

    pub fn units(&self) -> Option<&[u32]> {
        self.units.as_deref()
    }

    pub fn conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }

    /// Concrete change for one sampled value, carrying units and conditions over.
    pub fn with_value(&self, value: f64) -> ParameterChange {
        ParameterChange {
            name: self.name.clone(),
            change_type: self.change_type,
            value,
            units: self.units.clone(),
            conditions: self.conditions.clone(),
        }
    }
}

/// Name, units and conditions shared by concrete and bounded parameters, as
/// needed for registry validation.
pub trait CalibrationTarget {
    fn target_name(&self) -> &str;
    fn target_units(&self) -> Option<&[u32]>;
    fn target_conditions(&self) -> Option<&Conditions>;
}

impl CalibrationTarget for ParameterChange {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn target_units(&self) -> Option<&[u32]> {
        self.units.as_deref()
    }

    fn target_conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }
}

impl CalibrationTarget for BoundedParameter {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn target_units(&self) -> Option<&[u32]> {
        self.units.as_deref()
    }

    fn target_conditions(&self) -> Option<&Conditions> {
        self.conditions.as_ref()
    }
}

fn validated_name(name: String) -> SwatResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return Err(SwatError::configuration(
            "CONFIG.PARAMETER_NAME",
            format!("Invalid parameter name '{}'", name),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_units(name: &str, units: &[i64]) -> SwatResult<Vec<u32>> {
    if units.is_empty() {
        return Err(SwatError::configuration(
            "CONFIG.PARAMETER_UNITS",
            format!("Parameter '{}' has an empty units list", name),
        ));
    }
    let mut normalized = Vec::with_capacity(units.len());
    for &unit in units {
        let unit = u32::try_from(unit).ok().filter(|unit| *unit >= 1).ok_or_else(|| {
            SwatError::configuration(
                "CONFIG.PARAMETER_UNITS",
                format!(
                    "Parameter '{}' has unit {}; all unit IDs must be 1-based (Fortran-style)",
                    name, unit
                ),
            )
        })?;
        normalized.push(unit);
    }
    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

fn validated_conditions(name: &str, conditions: Conditions) -> SwatResult<Conditions> {
    for (kind, values) in &conditions {
        if values.is_empty() || values.iter().any(|value| value.trim().is_empty()) {
            return Err(SwatError::configuration(
                "CONFIG.PARAMETER_CONDITIONS",
                format!(
                    "Parameter '{}' has an empty value list for condition '{}'",
                    name, kind
                ),
            ));
        }
    }
    Ok(conditions
        .into_iter()
        .map(|(kind, values)| {
            let values = values.into_iter().map(|value| value.trim().to_string()).collect();
            (kind, values)
        })
        .collect())
}

/// Compacts sorted, deduplicated 1-based unit ids into the `calibration.cal`
/// form: runs become `start, -end`, isolated ids stay as they are.
pub fn compact_units(units: &[u32]) -> SwatResult<Vec<i64>> {
    if units.contains(&0) {
        return Err(SwatError::configuration(
            "CONFIG.PARAMETER_UNITS",
            "All unit IDs must be 1-based (Fortran-style)",
        ));
    }
    let mut sorted = units.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut compacted = Vec::new();
    let mut index = 0;
    while index < sorted.len() {
        let start = sorted[index];
        let mut end = start;
        while index + 1 < sorted.len() && sorted[index + 1] == end + 1 {
            index += 1;
            end = sorted[index];
        }
        compacted.push(i64::from(start));
        if end > start {
            compacted.push(-i64::from(end));
        }
        index += 1;
    }
    Ok(compacted)
}
