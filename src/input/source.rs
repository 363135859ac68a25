//! Code for reading the source model from a TOML file.
use super::*;
use crate::geo::Point;
use crate::source::{Mfd, Source, SourceGeometry, SourceID, TrtModelID};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;
use std::sync::Arc;

const SOURCE_MODEL_FILE_NAME: &str = "source_model.toml";

/// The contents of the source model file
#[derive(Debug, Deserialize)]
struct SourceModelFile {
    sources: Vec<SourceRaw>,
}

/// The kind of geometry a source has
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq)]
enum SourceKind {
    #[string = "point"]
    Point,
    #[string = "area"]
    Area,
}

/// A source as it appears in the source model file
#[derive(Debug, Deserialize)]
struct SourceRaw {
    id: SourceID,
    #[serde(default)]
    name: String,
    trt_model: TrtModelID,
    kind: SourceKind,
    location: Option<Point>,
    polygon: Option<Vec<Point>>,
    depth: f64,
    mfd: Mfd,
}

impl SourceRaw {
    /// Convert into a [`Source`], checking the geometry and MFD
    fn into_source(self) -> Result<Source> {
        let geometry = match self.kind {
            SourceKind::Point => {
                ensure!(self.polygon.is_none(), "Point sources cannot have a polygon");
                let location = self.location.context("Point sources must have a location")?;
                ensure!(location.is_valid(), "Invalid location");
                SourceGeometry::Point(location)
            }
            SourceKind::Area => {
                ensure!(self.location.is_none(), "Area sources cannot have a location");
                let polygon = self.polygon.context("Area sources must have a polygon")?;
                ensure!(
                    polygon.len() >= 3,
                    "A polygon must have at least three vertices"
                );
                ensure!(
                    polygon.iter().all(Point::is_valid),
                    "Invalid polygon vertex"
                );
                SourceGeometry::Area(polygon)
            }
        };
        ensure!(
            self.depth.is_finite() && self.depth >= 0.0,
            "depth must be a non-negative number"
        );
        self.mfd.validate().context("Invalid MFD")?;

        Ok(Source {
            name: if self.name.is_empty() {
                self.id.to_string()
            } else {
                self.name
            },
            id: self.id,
            trt_model: self.trt_model,
            geometry,
            depth: self.depth,
            mfd: self.mfd,
        })
    }
}

/// Group sources by TRT model, in order of first appearance
fn read_sources_from_iter<I>(iter: I) -> Result<IndexMap<TrtModelID, Vec<Arc<Source>>>>
where
    I: Iterator<Item = SourceRaw>,
{
    let sources: Vec<Source> = iter
        .map(|raw| {
            let id = raw.id.clone();
            raw.into_source()
                .with_context(|| format!("Invalid source {id}"))
        })
        .try_collect()?;
    check_unique_ids(sources.iter())?;
    ensure!(!sources.is_empty(), "The source model contains no sources");

    let mut groups: IndexMap<TrtModelID, Vec<Arc<Source>>> = IndexMap::new();
    for source in sources {
        groups
            .entry(source.trt_model.clone())
            .or_default()
            .push(Arc::new(source));
    }

    Ok(groups)
}

/// Read the source model.
///
/// # Arguments
///
/// * `job_dir` - Folder containing job input files
///
/// # Returns
///
/// The sources grouped by TRT model
pub fn read_sources(job_dir: &Path) -> Result<IndexMap<TrtModelID, Vec<Arc<Source>>>> {
    let file_path = job_dir.join(SOURCE_MODEL_FILE_NAME);
    let model: SourceModelFile = read_toml(&file_path)?;
    read_sources_from_iter(model.sources.into_iter()).with_context(|| input_err_msg(&file_path))
}
