//! Error kinds raised by the hazard calculation.
//!
//! Fatal kinds are returned to the caller (wrapped in an [`anyhow::Error`], from which they can be
//! recovered with `downcast_ref`). The non-fatal kinds are only ever formatted into warnings.
use crate::ground_motion::GsimID;
use crate::source::TrtModelID;
use crate::units::{OutputWeight, SourceWeight};
use thiserror::Error;

/// Boxed error returned by a failing task
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error or warning condition arising during a hazard calculation
#[derive(Debug, Error)]
pub enum HazardError {
    /// The source model is heavier than the configured limit
    #[error(
        "A limit of {limit} on the maximum source model weight was set. The weight of your model \
        is {weight}. Please reduce your model or raise the parameter max_input_weight in the \
        program settings"
    )]
    InputWeightLimitExceeded {
        /// The computed input weight
        weight: SourceWeight,
        /// The configured limit
        limit: SourceWeight,
    },
    /// The expected output is bigger than the configured limit
    #[error(
        "A limit of {limit} on the maximum output weight was set. The weight of your output is \
        {weight}. Please reduce the number of sites, the number of IMTs, the number of \
        realizations or the number of stochastic event sets; otherwise, raise the parameter \
        max_output_weight in the program settings"
    )]
    OutputWeightLimitExceeded {
        /// The computed output weight
        weight: OutputWeight,
        /// The configured limit
        limit: OutputWeight,
    },
    /// No source of a TRT model is close enough to any site
    #[error(
        "Could not find sources close to the sites for TRT model {trt_model} \
        (maximum_distance={maximum_distance} km)"
    )]
    EmptySourceGroup {
        /// The TRT model with no sources left
        trt_model: TrtModelID,
        /// The filtering distance used
        maximum_distance: f64,
    },
    /// Quantiles were requested but there are too few realizations
    #[error(
        "There is only {num_realizations} realization, the parameter quantile_hazard_curves \
        should not be set"
    )]
    DegenerateStatistics {
        /// The number of realizations
        num_realizations: usize,
    },
    /// A task raised an error
    #[error("Task #{task_no} for TRT model {trt_model}{} failed", tile_suffix(.tile.as_ref()))]
    TaskFailure {
        /// The ordinal of the failing task (from 1)
        task_no: usize,
        /// The TRT model of the block being processed
        trt_model: TrtModelID,
        /// The tile being processed (from 1), if tiling
        tile: Option<usize>,
        /// The underlying error
        #[source]
        source: TaskError,
    },
    /// A probability array had the wrong shape or values outside [0, 1]
    #[error("Inconsistent probabilities for TRT model {trt_model}, GSIM {gsim}, IMT {imt}: {detail}")]
    ShapeOrRangeInconsistency {
        /// The TRT model of the curve
        trt_model: TrtModelID,
        /// The GSIM of the curve
        gsim: GsimID,
        /// The IMT of the curve
        imt: String,
        /// What was wrong
        detail: String,
    },
}

/// Format the tile index for an error message
fn tile_suffix(tile: Option<&usize>) -> String {
    tile.map(|tile| format!(" in tile {tile}")).unwrap_or_default()
}
