//! Defines the `JobParameters` struct, which represents the contents of `job.toml`.
use crate::ground_motion::{GmmCoefficients, GsimID};
use crate::input::{input_err_msg, is_sorted_and_unique, read_toml};
use crate::tiling::TilePolicy;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use log::warn;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

/// The name of the job parameters file
pub const JOB_PARAMETERS_FILE_NAME: &str = "job.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_area_source_discretization, f64, 10.0);
define_param_default!(default_width_of_mfd_bin, f64, 0.1);
define_param_default!(default_point_source_weight, f64, 1.0 / 40.0);
define_param_default!(default_ses_per_logic_tree_path, u32, 1);
define_param_default!(default_individual_curves, bool, true);

/// Represents the contents of the entire job file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JobParameters {
    /// Free-text description of the job
    #[serde(default)]
    pub description: String,
    /// The kind of calculation
    #[serde(default)]
    pub calculation_mode: CalculationMode,
    /// Investigation time in years
    pub investigation_time: f64,
    /// Intensity measure types, each with its (increasing) intensity levels
    pub intensity_measure_types_and_levels: IndexMap<String, Vec<f64>>,
    /// Sources further than this from every site (in km) are discarded
    pub maximum_distance: f64,
    /// Grid spacing (in km) used to split area sources into point sources
    #[serde(default = "default_area_source_discretization")]
    pub area_source_discretization: f64,
    /// Bin width used to discretise truncated Gutenberg-Richter distributions
    #[serde(default = "default_width_of_mfd_bin")]
    pub width_of_mfd_bin: f64,
    /// Corrective factor applied to the weight of point sources
    #[serde(default = "default_point_source_weight")]
    pub point_source_weight: f64,
    /// Number of random logic-tree samples. Zero means full enumeration.
    #[serde(default)]
    pub number_of_logic_tree_samples: u32,
    /// Number of stochastic event sets per realization (event based only)
    #[serde(default = "default_ses_per_logic_tree_path")]
    pub ses_per_logic_tree_path: u32,
    /// Whether to compute mean curves
    #[serde(default)]
    pub mean_hazard_curves: bool,
    /// Quantiles to compute, each in (0, 1)
    #[serde(default)]
    pub quantile_hazard_curves: Vec<f64>,
    /// Probabilities of exceedance for which to compute hazard maps
    #[serde(default)]
    pub poes: Vec<f64>,
    /// Probabilities of exceedance for disaggregation. If set, bounding boxes are computed.
    #[serde(default)]
    pub poes_disagg: Vec<f64>,
    /// Whether to write the curves of every realization
    #[serde(default = "default_individual_curves")]
    pub individual_curves: bool,
    /// How to split the sites into tiles, if at all
    #[serde(default)]
    pub tiling: Option<TilePolicy>,
    /// Coefficients for each ground-motion model, per intensity measure type
    pub gsims: IndexMap<GsimID, IndexMap<String, GmmCoefficients>>,
}

/// The kind of hazard calculation
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Default)]
pub enum CalculationMode {
    /// Hazard curves computed directly from the rupture rates
    #[default]
    #[string = "classical"]
    Classical,
    /// Hazard from stochastic event sets
    #[string = "event_based"]
    EventBased,
}

/// Check a parameter is a finite number greater than zero
fn check_positive(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "{name} must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the `intensity_measure_types_and_levels` parameter is valid
fn check_intensity_measure_types_and_levels(imtls: &IndexMap<String, Vec<f64>>) -> Result<()> {
    ensure!(
        !imtls.is_empty(),
        "`intensity_measure_types_and_levels` is empty"
    );

    for (imt, levels) in imtls {
        ensure!(!levels.is_empty(), "No intensity levels given for {imt}");
        ensure!(
            levels.iter().all(|level| level.is_finite() && *level > 0.0),
            "Intensity levels for {imt} must be positive"
        );
        ensure!(
            is_sorted_and_unique(levels),
            "Intensity levels for {imt} must be strictly increasing"
        );
    }

    Ok(())
}

/// Check that every value lies in the open interval (0, 1)
fn check_quantiles(quantiles: &[f64]) -> Result<()> {
    ensure!(
        quantiles.iter().all(|q| *q > 0.0 && *q < 1.0),
        "quantile_hazard_curves must be between 0 and 1 (exclusive)"
    );

    Ok(())
}

/// Check that every value is a valid probability of exceedance
fn check_poes(name: &str, poes: &[f64]) -> Result<()> {
    ensure!(
        poes.iter().all(|poe| *poe > 0.0 && *poe <= 1.0),
        "{name} must be greater than 0 and no greater than 1"
    );

    Ok(())
}

/// Check there are coefficients for every ground-motion model and intensity measure type
fn check_gsims(
    gsims: &IndexMap<GsimID, IndexMap<String, GmmCoefficients>>,
    imtls: &IndexMap<String, Vec<f64>>,
) -> Result<()> {
    ensure!(!gsims.is_empty(), "No ground-motion models (`gsims`) given");

    for (gsim, coefficients) in gsims {
        for imt in imtls.keys() {
            let coeffs = coefficients
                .get(imt)
                .with_context(|| format!("Missing coefficients for {imt} in GSIM {gsim}"))?;
            coeffs
                .validate()
                .with_context(|| format!("Invalid coefficients for {imt} in GSIM {gsim}"))?;
        }
    }

    Ok(())
}

impl JobParameters {
    /// Read a job file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `job_dir` - Folder containing job input files
    ///
    /// # Returns
    ///
    /// The job file contents as a [`JobParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(job_dir: P) -> Result<JobParameters> {
        let file_path = job_dir.as_ref().join(JOB_PARAMETERS_FILE_NAME);
        let parameters: JobParameters = read_toml(&file_path)?;

        parameters
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(parameters)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_positive("investigation_time", self.investigation_time)?;
        check_intensity_measure_types_and_levels(&self.intensity_measure_types_and_levels)?;
        check_positive("maximum_distance", self.maximum_distance)?;
        check_positive(
            "area_source_discretization",
            self.area_source_discretization,
        )?;
        check_positive("width_of_mfd_bin", self.width_of_mfd_bin)?;
        check_positive("point_source_weight", self.point_source_weight)?;
        check_quantiles(&self.quantile_hazard_curves)?;
        check_poes("poes", &self.poes)?;
        check_poes("poes_disagg", &self.poes_disagg)?;
        check_gsims(&self.gsims, &self.intensity_measure_types_and_levels)?;

        if let Some(tiling) = &self.tiling {
            tiling.validate().context("Invalid tiling parameters")?;
        }

        if self.calculation_mode == CalculationMode::EventBased {
            ensure!(
                self.ses_per_logic_tree_path > 0,
                "ses_per_logic_tree_path cannot be zero"
            );
            warn!(
                "Event-based calculations can only be validated. Running one will fail after the \
                pre-execution step."
            );
        }

        Ok(())
    }

    /// The number of intensity measure types
    pub fn num_imts(&self) -> usize {
        self.intensity_measure_types_and_levels.len()
    }

    /// The total number of intensity levels across all intensity measure types
    pub fn num_levels(&self) -> usize {
        self.intensity_measure_types_and_levels
            .values()
            .map(Vec::len)
            .sum()
    }

    /// The mean number of intensity levels per intensity measure type
    pub fn mean_num_levels(&self) -> f64 {
        if self.num_imts() == 0 {
            return 0.0;
        }

        self.num_levels() as f64 / self.num_imts() as f64
    }

    /// Iterate over the intensity measure types and their levels
    pub fn imtls(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.intensity_measure_types_and_levels
            .iter()
            .map(|(imt, levels)| (imt.as_str(), levels.as_slice()))
    }

    /// Whether the logic tree was randomly sampled (rather than fully enumerated)
    pub fn is_sampling(&self) -> bool {
        self.number_of_logic_tree_samples > 0
    }

    /// Whether any statistics (mean or quantiles) were requested
    pub fn wants_statistics(&self) -> bool {
        self.mean_hazard_curves || !self.quantile_hazard_curves.is_empty()
    }

    /// Whether disaggregation bounding boxes should be collected
    pub fn wants_bounding_boxes(&self) -> bool {
        !self.poes_disagg.is_empty()
    }
}
