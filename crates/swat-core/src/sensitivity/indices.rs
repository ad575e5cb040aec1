use crate::common::serialization::write_text_artifact;
use crate::domain::{SwatError, SwatResult};
use crate::metrics::{Indicator, IndicatorRequest, checked_indicators, scenario_indicators};
use crate::numerics::{Problem, SampleDesign, SensitivityIndices};
use crate::timeseries::ensure_json_extension;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityIndicesReport {
    pub problem: Problem,
    pub sensitivity_indices: IndexMap<Indicator, SensitivityIndices>,
}

/// Scores the scenarios of a saved study and runs the design's analysis once
/// per indicator. With `json_file`, the indices are also written there keyed
/// by indicator name.
pub fn parameter_sensitivity_indices(
    request: &IndicatorRequest,
    design: &dyn SampleDesign,
    json_file: Option<&Path>,
) -> SwatResult<SensitivityIndicesReport> {
    checked_indicators(&request.indicators)?;
    if let Some(json_file) = json_file {
        ensure_json_extension(json_file)?;
    }

    let scored = scenario_indicators(request)?;
    let mut sensitivity_indices = IndexMap::with_capacity(scored.indicators.len());
    for indicator in &scored.indicators {
        let outputs = scored.column(*indicator);
        let indices = design.analyze(&scored.problem, &outputs)?;
        info!(indicator = %indicator, "computed sensitivity indices");
        sensitivity_indices.insert(*indicator, indices);
    }

    if let Some(json_file) = json_file {
        let text = serde_json::to_string_pretty(&sensitivity_indices).map_err(|source| {
            SwatError::internal(
                "SYS.INDICES_ENCODE",
                format!("failed to encode sensitivity indices: {}", source),
            )
        })?;
        write_text_artifact(json_file, &text, "IO.INDICES_WRITE")?;
    }

    Ok(SensitivityIndicesReport {
        problem: scored.problem,
        sensitivity_indices,
    })
}
