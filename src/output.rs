//! The module responsible for writing output data to disk.
use crate::curve::{BoundingBoxMap, ProbabilityArray};
use crate::hazard_map::HazardMap;
use crate::model::parameters::JobParameters;
use crate::realization::{Realization, RealizationID};
use crate::site::{Site, SiteCollection, SiteID};
use crate::source::TrtModelID;
use crate::statistics::Statistics;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which job-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "psha_results";

/// The output file name for the curves of individual realizations
const HAZARD_CURVES_FILE_NAME: &str = "hazard_curves.csv";

/// The output file name for mean curves
const MEAN_HAZARD_CURVES_FILE_NAME: &str = "mean_hazard_curves.csv";

/// The output file name for quantile curves
const QUANTILE_HAZARD_CURVES_FILE_NAME: &str = "quantile_hazard_curves.csv";

/// The output file name for hazard maps
const HAZARD_MAPS_FILE_NAME: &str = "hazard_maps.csv";

/// The output file name for disaggregation bounding boxes
const BOUNDING_BOXES_FILE_NAME: &str = "disagg_bounding_boxes.csv";

/// Get the default output directory for the job in the specified directory
pub fn get_output_dir(job_dir: &Path) -> Result<PathBuf> {
    // Canonicalise in case the user has specified "."
    let job_dir = job_dir
        .canonicalize()
        .context("Could not resolve path to job")?;

    let job_name = job_dir
        .file_name()
        .context("Job cannot be in root folder")?
        .to_str()
        .context("Invalid chars in job dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, job_name].iter().collect())
}

/// Create a new output directory.
///
/// An existing, non-empty directory is only replaced if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing directory was overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if output_dir.is_dir() {
        if output_dir.read_dir()?.next().is_none() {
            // Already exists and is empty
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use the --overwrite option or choose \
            a different folder."
        );
        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Something that accepts the results of a calculation
pub trait ResultSink {
    /// Write the curves of one realization (one per IMT)
    fn write_realization_curves(
        &mut self,
        realization: &Realization,
        curves: &[ProbabilityArray],
    ) -> Result<()>;

    /// Write the mean and quantile curves
    fn write_statistics(&mut self, statistics: &Statistics) -> Result<()>;

    /// Write hazard maps
    fn write_hazard_maps(&mut self, maps: &[HazardMap]) -> Result<()>;

    /// Write disaggregation bounding boxes
    fn write_bounding_boxes(&mut self, bounding_boxes: &BoundingBoxMap) -> Result<()>;

    /// Flush any buffered output
    fn flush(&mut self) -> Result<()>;
}

/// A row of the realization curves file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct RealizationCurveRow {
    realization_id: RealizationID,
    site_id: SiteID,
    lon: f64,
    lat: f64,
    imt: String,
    iml: f64,
    poe: f64,
}

/// A row of the mean curves file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct MeanCurveRow {
    site_id: SiteID,
    lon: f64,
    lat: f64,
    imt: String,
    iml: f64,
    poe: f64,
}

/// A row of the quantile curves file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct QuantileCurveRow {
    quantile: f64,
    site_id: SiteID,
    lon: f64,
    lat: f64,
    imt: String,
    iml: f64,
    poe: f64,
}

/// A row of the hazard maps file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct HazardMapRow {
    curve: String,
    imt: String,
    poe: f64,
    site_id: SiteID,
    lon: f64,
    lat: f64,
    iml: f64,
}

/// A row of the bounding boxes file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BoundingBoxRow {
    trt_model: TrtModelID,
    site_id: SiteID,
    min_mag: f64,
    max_mag: f64,
    min_dist: f64,
    max_dist: f64,
}

/// A point on a curve
struct CurvePoint<'a> {
    site: &'a Site,
    imt: &'a str,
    iml: f64,
    poe: f64,
}

/// Writes results to CSV files
pub struct CsvResultSink {
    sites: SiteCollection,
    imtls: Vec<(String, Vec<f64>)>,
    curves_writer: csv::Writer<File>,
    mean_writer: csv::Writer<File>,
    quantile_writer: csv::Writer<File>,
    maps_writer: csv::Writer<File>,
    bounding_boxes_writer: csv::Writer<File>,
}

impl CsvResultSink {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `sites` - The sites the curves are for
    /// * `parameters` - Job parameters
    pub fn create(
        output_path: &Path,
        sites: &SiteCollection,
        parameters: &JobParameters,
    ) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        Ok(Self {
            sites: sites.clone(),
            imtls: parameters
                .imtls()
                .map(|(imt, levels)| (imt.to_string(), levels.to_vec()))
                .collect(),
            curves_writer: new_writer(HAZARD_CURVES_FILE_NAME)?,
            mean_writer: new_writer(MEAN_HAZARD_CURVES_FILE_NAME)?,
            quantile_writer: new_writer(QUANTILE_HAZARD_CURVES_FILE_NAME)?,
            maps_writer: new_writer(HAZARD_MAPS_FILE_NAME)?,
            bounding_boxes_writer: new_writer(BOUNDING_BOXES_FILE_NAME)?,
        })
    }

    /// Iterate over every point of a set of curves (one per IMT), by IMT, then site, then level
    fn curve_points<'a>(
        sites: &'a SiteCollection,
        imtls: &'a [(String, Vec<f64>)],
        curves: &'a [ProbabilityArray],
    ) -> impl Iterator<Item = CurvePoint<'a>> {
        imtls
            .iter()
            .zip(curves)
            .flat_map(move |((imt, levels), curve)| {
                sites.iter().enumerate().flat_map(move |(i, site)| {
                    levels
                        .iter()
                        .zip(curve.site_curve(i))
                        .map(move |(&iml, &poe)| CurvePoint {
                            site,
                            imt,
                            iml,
                            poe,
                        })
                })
            })
    }
}

impl ResultSink for CsvResultSink {
    fn write_realization_curves(
        &mut self,
        realization: &Realization,
        curves: &[ProbabilityArray],
    ) -> Result<()> {
        for point in Self::curve_points(&self.sites, &self.imtls, curves) {
            self.curves_writer.serialize(RealizationCurveRow {
                realization_id: realization.id.clone(),
                site_id: point.site.id.clone(),
                lon: point.site.location.lon,
                lat: point.site.location.lat,
                imt: point.imt.to_string(),
                iml: point.iml,
                poe: point.poe,
            })?;
        }

        Ok(())
    }

    fn write_statistics(&mut self, statistics: &Statistics) -> Result<()> {
        if let Some(mean) = &statistics.mean {
            for point in Self::curve_points(&self.sites, &self.imtls, mean) {
                self.mean_writer.serialize(MeanCurveRow {
                    site_id: point.site.id.clone(),
                    lon: point.site.location.lon,
                    lat: point.site.location.lat,
                    imt: point.imt.to_string(),
                    iml: point.iml,
                    poe: point.poe,
                })?;
            }
        }

        for (quantile, curves) in &statistics.quantiles {
            for point in Self::curve_points(&self.sites, &self.imtls, curves) {
                self.quantile_writer.serialize(QuantileCurveRow {
                    quantile: *quantile,
                    site_id: point.site.id.clone(),
                    lon: point.site.location.lon,
                    lat: point.site.location.lat,
                    imt: point.imt.to_string(),
                    iml: point.iml,
                    poe: point.poe,
                })?;
            }
        }

        Ok(())
    }

    fn write_hazard_maps(&mut self, maps: &[HazardMap]) -> Result<()> {
        for map in maps {
            for (site, iml) in self.sites.iter().zip(&map.imls) {
                self.maps_writer.serialize(HazardMapRow {
                    curve: map.kind.to_string(),
                    imt: map.imt.clone(),
                    poe: map.poe,
                    site_id: site.id.clone(),
                    lon: site.location.lon,
                    lat: site.location.lat,
                    iml: *iml,
                })?;
            }
        }

        Ok(())
    }

    fn write_bounding_boxes(&mut self, bounding_boxes: &BoundingBoxMap) -> Result<()> {
        for ((trt_model, site_index), bbox) in bounding_boxes {
            let site = self
                .sites
                .as_slice()
                .get(*site_index)
                .with_context(|| format!("Bounding box for unknown site index {site_index}"))?;
            self.bounding_boxes_writer.serialize(BoundingBoxRow {
                trt_model: trt_model.clone(),
                site_id: site.id.clone(),
                min_mag: bbox.min_mag,
                max_mag: bbox.max_mag,
                min_dist: bbox.min_dist,
                max_dist: bbox.max_dist,
            })?;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.curves_writer.flush()?;
        self.mean_writer.flush()?;
        self.quantile_writer.flush()?;
        self.maps_writer.flush()?;
        self.bounding_boxes_writer.flush()?;

        Ok(())
    }
}
