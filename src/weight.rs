//! Cost estimates for sources and for the expected output of a calculation.
//!
//! The input weight of a source is given by the number of ruptures it generates; for point
//! sources a corrective factor (`point_source_weight`) is applied. The output weight is a pure
//! number proportional to the size of the expected output:
//!
//! * classical: `sites * imts * realizations * levels`
//! * event based: `sites * imts * realizations * investigation_time * ses * 1e-4`
use crate::model::parameters::{CalculationMode, JobParameters};
use crate::source::Source;
use crate::units::{OutputWeight, SourceWeight};
use serde::Serialize;

/// Scales the event-based output weight to numbers comparable with the classical case
pub const NORMALIZATION_FACTOR: f64 = 1e-4;

/// Get the weight of a source
pub fn source_weight(source: &Source, parameters: &JobParameters) -> SourceWeight {
    let num_ruptures = source.num_ruptures(parameters.width_of_mfd_bin) as f64;
    if source.is_point() {
        SourceWeight(num_ruptures * parameters.point_source_weight)
    } else {
        SourceWeight(num_ruptures)
    }
}

/// Get the output weight of a calculation.
///
/// # Arguments
///
/// * `parameters` - The job parameters
/// * `num_sites` - The number of sites
/// * `num_realizations` - The number of logic-tree realizations
pub fn output_weight(
    parameters: &JobParameters,
    num_sites: usize,
    num_realizations: usize,
) -> OutputWeight {
    let base = (num_sites * parameters.num_imts() * num_realizations) as f64;
    match parameters.calculation_mode {
        CalculationMode::Classical => OutputWeight(base * parameters.mean_num_levels()),
        CalculationMode::EventBased => {
            let total_time =
                parameters.investigation_time * f64::from(parameters.ses_per_logic_tree_path);
            OutputWeight(base * total_time * NORMALIZATION_FACTOR)
        }
    }
}

/// Summary of the size of a calculation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    /// The number of sites
    pub num_sites: usize,
    /// The number of realizations
    pub num_realizations: usize,
    /// The number of intensity measure types
    pub num_imts: usize,
    /// The mean number of levels per intensity measure type
    pub num_levels: f64,
    /// Total weight of the (filtered and split) sources
    pub input_weight: SourceWeight,
    /// Expected output size
    pub output_weight: OutputWeight,
}

impl JobInfo {
    /// Combine the info of two independent sub-calculations (tiles) of the same job.
    ///
    /// Sites and weights add up; the logic tree and IMTs are shared by every tile.
    pub fn merge(&self, other: &JobInfo) -> JobInfo {
        JobInfo {
            num_sites: self.num_sites + other.num_sites,
            num_realizations: self.num_realizations.max(other.num_realizations),
            num_imts: self.num_imts.max(other.num_imts),
            num_levels: self.num_levels.max(other.num_levels),
            input_weight: self.input_weight + other.input_weight,
            output_weight: self.output_weight + other.output_weight,
        }
    }
}
