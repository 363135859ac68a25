//! Exceedance-probability curves and their combination across tasks.
//!
//! Partial curves produced by tasks are combined in non-exceedance space: for independent
//! contributions the probability of no exceedance is the product of the individual ones, so
//!
//! ```text
//! acc = 1 - (1 - p) * (1 - acc)
//! ```
//!
//! The rule is commutative and associative, so task results can be combined in arrival order.
use crate::error::HazardError;
use crate::ground_motion::GsimID;
use crate::model::parameters::JobParameters;
use crate::source::TrtModelID;
use crate::task::TaskOutput;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// How far outside [0, 1] a probability may stray before it is treated as an error.
///
/// Values within this band are clamped.
pub const PROBABILITY_TOLERANCE: f64 = 1e-10;

/// Exceedance probabilities for a single intensity measure type, indexed by (site, level)
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityArray {
    num_sites: usize,
    num_levels: usize,
    values: Vec<f64>,
}

impl ProbabilityArray {
    /// An array where nothing is exceeded
    pub fn zeros(num_sites: usize, num_levels: usize) -> Self {
        Self {
            num_sites,
            num_levels,
            values: vec![0.0; num_sites * num_levels],
        }
    }

    /// Create an array from values stored site by site.
    ///
    /// Returns `None` if the number of values doesn't match the shape.
    pub fn from_values(num_sites: usize, num_levels: usize, values: Vec<f64>) -> Option<Self> {
        (values.len() == num_sites * num_levels).then_some(Self {
            num_sites,
            num_levels,
            values,
        })
    }

    /// The (sites, levels) shape of the array
    pub fn shape(&self) -> (usize, usize) {
        (self.num_sites, self.num_levels)
    }

    /// The number of sites
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    /// The curve for the site at the given index
    pub fn site_curve(&self, site_index: usize) -> &[f64] {
        let start = site_index * self.num_levels;
        &self.values[start..start + self.num_levels]
    }

    /// Iterate over the curves for every site
    pub fn site_curves(&self) -> impl Iterator<Item = &[f64]> {
        // `chunks` panics on a zero size
        self.values.chunks(self.num_levels.max(1))
    }

    /// All values, site by site
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable access to the values, site by site
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Whether every value is within `[0, 1]`
    pub fn is_valid(&self) -> bool {
        self.values.iter().all(|p| (0.0..=1.0).contains(p))
    }
}

/// The curves for one intensity measure type returned by a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCurves {
    /// Nothing in the block contributed
    Zero,
    /// Exceedance probabilities for every site and level
    Dense(ProbabilityArray),
}

impl TaskCurves {
    /// Get the dense form of the curves, borrowing `zeros` if there was no contribution
    pub fn expand<'a>(&'a self, zeros: &'a ProbabilityArray) -> &'a ProbabilityArray {
        match self {
            Self::Zero => zeros,
            Self::Dense(array) => array,
        }
    }
}

/// Range of magnitudes and distances of the ruptures contributing to a site
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Smallest magnitude
    pub min_mag: f64,
    /// Largest magnitude
    pub max_mag: f64,
    /// Smallest distance in km
    pub min_dist: f64,
    /// Largest distance in km
    pub max_dist: f64,
}

impl BoundingBox {
    /// A bounding box holding a single rupture
    pub fn new(mag: f64, dist: f64) -> Self {
        Self {
            min_mag: mag,
            max_mag: mag,
            min_dist: dist,
            max_dist: dist,
        }
    }

    /// Extend the box to include a rupture
    pub fn update(&mut self, mag: f64, dist: f64) {
        self.min_mag = self.min_mag.min(mag);
        self.max_mag = self.max_mag.max(mag);
        self.min_dist = self.min_dist.min(dist);
        self.max_dist = self.max_dist.max(dist);
    }

    /// Extend the box to include another box
    pub fn merge(&mut self, other: &BoundingBox) {
        self.update(other.min_mag, other.min_dist);
        self.update(other.max_mag, other.max_dist);
    }
}

/// Bounding boxes keyed by TRT model and site index
pub type BoundingBoxMap = BTreeMap<(TrtModelID, usize), BoundingBox>;

/// Check a single probability and clamp it to `[0, 1]`
fn clamp_probability(value: f64) -> Option<f64> {
    if value < -PROBABILITY_TOLERANCE || value > 1.0 + PROBABILITY_TOLERANCE || value.is_nan() {
        None
    } else {
        Some(value.clamp(0.0, 1.0))
    }
}

/// Accumulates the curves for each (TRT model, GSIM) pair as task results arrive.
///
/// Updates go through [`CurveAggregator::combine`] only. A caller should own the aggregator on a
/// single thread and feed it results one at a time.
#[derive(Debug, Clone)]
pub struct CurveAggregator {
    imts: Vec<String>,
    zeros: Vec<ProbabilityArray>,
    curves: IndexMap<(TrtModelID, GsimID), Vec<ProbabilityArray>>,
    bounding_boxes: BoundingBoxMap,
}

impl CurveAggregator {
    /// Create an empty aggregator for the given number of sites
    pub fn new(parameters: &JobParameters, num_sites: usize) -> Self {
        let (imts, zeros) = parameters
            .imtls()
            .map(|(imt, levels)| {
                (
                    imt.to_string(),
                    ProbabilityArray::zeros(num_sites, levels.len()),
                )
            })
            .unzip();

        Self {
            imts,
            zeros,
            curves: IndexMap::new(),
            bounding_boxes: BoundingBoxMap::new(),
        }
    }

    /// Combine the result of a task with the accumulated curves.
    ///
    /// The whole result is checked before anything is stored, so on error the accumulator is
    /// left as it was.
    pub fn combine(&mut self, output: TaskOutput) -> Result<(), HazardError> {
        let mut updates = Vec::new();
        for (trt_model, gsim_curves) in &output.curves {
            for gsim_curve in gsim_curves {
                let key = (trt_model.clone(), gsim_curve.gsim.clone());
                let combined = self.combine_one(&key, &gsim_curve.curves)?;
                updates.push((key, combined));
            }
        }

        for (key, combined) in updates {
            self.curves.insert(key, combined);
        }

        for (key, bbox) in output.bounding_boxes {
            self.bounding_boxes
                .entry(key)
                .and_modify(|existing| existing.merge(&bbox))
                .or_insert(bbox);
        }

        Ok(())
    }

    /// Combine the curves for one (TRT model, GSIM) pair, returning the new accumulated curves
    fn combine_one(
        &self,
        key: &(TrtModelID, GsimID),
        task_curves: &[TaskCurves],
    ) -> Result<Vec<ProbabilityArray>, HazardError> {
        let inconsistency = |imt: &str, detail: String| HazardError::ShapeOrRangeInconsistency {
            trt_model: key.0.clone(),
            gsim: key.1.clone(),
            imt: imt.to_string(),
            detail,
        };

        if task_curves.len() != self.imts.len() {
            return Err(inconsistency(
                "*",
                format!(
                    "expected curves for {} IMT(s), got {}",
                    self.imts.len(),
                    task_curves.len()
                ),
            ));
        }

        let previous = self.curves.get(key);
        let mut combined = Vec::with_capacity(self.imts.len());
        for (m, (imt, curves)) in self.imts.iter().zip(task_curves).enumerate() {
            let zeros = &self.zeros[m];
            let array = curves.expand(zeros);
            if array.shape() != zeros.shape() {
                return Err(inconsistency(
                    imt,
                    format!(
                        "expected shape {:?}, got {:?}",
                        zeros.shape(),
                        array.shape()
                    ),
                ));
            }

            let acc = previous.map_or(zeros, |curves| &curves[m]);
            let mut values = Vec::with_capacity(acc.values.len());
            for (&old, &new) in acc.values.iter().zip(&array.values) {
                let new = clamp_probability(new)
                    .ok_or_else(|| inconsistency(imt, format!("probability {new} out of range")))?;
                let value = 1.0 - (1.0 - new) * (1.0 - old);
                values.push(clamp_probability(value).ok_or_else(|| {
                    inconsistency(imt, format!("combined probability {value} out of range"))
                })?);
            }

            combined.push(ProbabilityArray {
                num_sites: zeros.num_sites,
                num_levels: zeros.num_levels,
                values,
            });
        }

        Ok(combined)
    }

    /// The intensity measure types, in order
    pub fn imts(&self) -> &[String] {
        &self.imts
    }

    /// The identity curves (no exceedance) for each intensity measure type
    pub fn zeros(&self) -> &[ProbabilityArray] {
        &self.zeros
    }

    /// Get the accumulated curves for a (TRT model, GSIM) pair, one per IMT
    pub fn get(&self, trt_model: &TrtModelID, gsim: &GsimID) -> Option<&[ProbabilityArray]> {
        self.curves
            .get(&(trt_model.clone(), gsim.clone()))
            .map(Vec::as_slice)
    }

    /// Iterate over the accumulated curves
    pub fn iter(&self) -> impl Iterator<Item = (&(TrtModelID, GsimID), &[ProbabilityArray])> {
        self.curves.iter().map(|(key, curves)| (key, curves.as_slice()))
    }

    /// The number of (TRT model, GSIM) pairs with curves
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    /// Whether no curves have been accumulated yet
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// The merged disaggregation bounding boxes
    pub fn bounding_boxes(&self) -> &BoundingBoxMap {
        &self.bounding_boxes
    }
}
