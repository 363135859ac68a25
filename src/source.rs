//! Seismic sources and their magnitude-frequency distributions.
//!
//! Sources are read-only once loaded. The only transformation applied to them is splitting area
//! sources into point sources, which produces new [`Source`]s.
use crate::geo::{Point, discretize_polygon};
use crate::id::{define_id_getter, define_id_type};
use crate::site::SiteCollection;
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::sync::Arc;

define_id_type! {SourceID}
define_id_type! {TrtModelID}

/// A magnitude-frequency distribution
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mfd {
    /// Truncated Gutenberg-Richter distribution, discretised with the job's MFD bin width
    TruncatedGr {
        /// Cumulative a-value (log10 of the annual rate of events with magnitude >= 0)
        a_val: f64,
        /// The b-value
        b_val: f64,
        /// Minimum magnitude
        min_mag: f64,
        /// Maximum magnitude
        max_mag: f64,
    },
    /// Evenly discretised distribution with explicit annual occurrence rates
    Incremental {
        /// Magnitude of the first bin
        min_mag: f64,
        /// Width of each bin
        bin_width: f64,
        /// Annual occurrence rate for each bin
        occurrence_rates: Vec<f64>,
    },
}

impl Mfd {
    /// Get the (magnitude, annual rate) pairs for this distribution.
    ///
    /// # Arguments
    ///
    /// * `width_of_mfd_bin` - Bin width used for truncated Gutenberg-Richter distributions
    pub fn annual_occurrence_rates(&self, width_of_mfd_bin: f64) -> Vec<(f64, f64)> {
        match self {
            Self::TruncatedGr {
                a_val,
                b_val,
                min_mag,
                max_mag,
            } => {
                let (first_mag, num_bins) = gr_bins(*min_mag, *max_mag, width_of_mfd_bin);
                (0..num_bins)
                    .map(|i| {
                        let mag = first_mag + i as f64 * width_of_mfd_bin;
                        let lo = mag - width_of_mfd_bin / 2.0;
                        let hi = mag + width_of_mfd_bin / 2.0;
                        let rate =
                            10f64.powf(a_val - b_val * lo) - 10f64.powf(a_val - b_val * hi);
                        (mag, rate)
                    })
                    .collect()
            }
            Self::Incremental {
                min_mag,
                bin_width,
                occurrence_rates,
            } => occurrence_rates
                .iter()
                .enumerate()
                .map(|(i, rate)| (min_mag + i as f64 * bin_width, *rate))
                .collect(),
        }
    }

    /// The number of magnitude bins, i.e. the number of ruptures generated per location
    pub fn num_bins(&self, width_of_mfd_bin: f64) -> usize {
        match self {
            Self::TruncatedGr {
                min_mag, max_mag, ..
            } => gr_bins(*min_mag, *max_mag, width_of_mfd_bin).1,
            Self::Incremental {
                occurrence_rates, ..
            } => occurrence_rates.len(),
        }
    }

    /// A copy of this distribution with all rates multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        match self {
            Self::TruncatedGr {
                a_val,
                b_val,
                min_mag,
                max_mag,
            } => Self::TruncatedGr {
                a_val: a_val + factor.log10(),
                b_val: *b_val,
                min_mag: *min_mag,
                max_mag: *max_mag,
            },
            Self::Incremental {
                min_mag,
                bin_width,
                occurrence_rates,
            } => Self::Incremental {
                min_mag: *min_mag,
                bin_width: *bin_width,
                occurrence_rates: occurrence_rates.iter().map(|r| r * factor).collect(),
            },
        }
    }

    /// Check the distribution's parameters are valid
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::TruncatedGr {
                a_val,
                b_val,
                min_mag,
                max_mag,
            } => {
                ensure!(
                    a_val.is_finite() && b_val.is_finite() && *b_val > 0.0,
                    "a_val must be finite and b_val must be positive"
                );
                ensure!(
                    min_mag.is_finite() && max_mag.is_finite() && min_mag <= max_mag,
                    "min_mag must not be greater than max_mag"
                );
            }
            Self::Incremental {
                min_mag,
                bin_width,
                occurrence_rates,
            } => {
                ensure!(min_mag.is_finite(), "min_mag must be finite");
                ensure!(
                    bin_width.is_finite() && *bin_width > 0.0,
                    "bin_width must be positive"
                );
                ensure!(
                    !occurrence_rates.is_empty(),
                    "occurrence_rates cannot be empty"
                );
                ensure!(
                    occurrence_rates.iter().all(|r| r.is_finite() && *r >= 0.0),
                    "occurrence_rates must be non-negative"
                );
            }
        }

        Ok(())
    }
}

/// Magnitude of the first bin and number of bins for a truncated Gutenberg-Richter distribution.
///
/// Magnitudes are rounded to the bin width and bins are centred within [min_mag, max_mag].
fn gr_bins(min_mag: f64, max_mag: f64, bin_width: f64) -> (f64, usize) {
    let mut min_mag = (min_mag / bin_width).round() * bin_width;
    let mut max_mag = (max_mag / bin_width).round() * bin_width;
    if min_mag < max_mag {
        min_mag += bin_width / 2.0;
        max_mag -= bin_width / 2.0;
    }
    let num_bins = ((max_mag - min_mag) / bin_width).round() as usize + 1;
    (min_mag, num_bins)
}

/// The geometry of a source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceGeometry {
    /// Seismicity concentrated at a single epicentre
    Point(Point),
    /// Seismicity spread uniformly over a polygon
    Area(Vec<Point>),
}

/// A seismic source
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Unique identifier for the source
    pub id: SourceID,
    /// Human-readable name
    pub name: String,
    /// The tectonic-region model this source belongs to
    pub trt_model: TrtModelID,
    /// Where the source is
    pub geometry: SourceGeometry,
    /// Hypocentral depth in km
    pub depth: f64,
    /// Magnitude-frequency distribution
    pub mfd: Mfd,
}
define_id_getter! {Source, SourceID}

impl Source {
    /// Whether this is a point source
    pub fn is_point(&self) -> bool {
        matches!(self.geometry, SourceGeometry::Point(_))
    }

    /// The number of ruptures the source generates
    pub fn num_ruptures(&self, width_of_mfd_bin: f64) -> usize {
        self.mfd.num_bins(width_of_mfd_bin)
    }

    /// Split the source at discretisation boundaries.
    ///
    /// Area sources are split into point sources on a grid with the given spacing (in km), with
    /// their MFD rates divided equally between the points. Point sources are returned unchanged.
    pub fn split(self: &Arc<Self>, area_source_discretization: f64) -> Vec<Arc<Source>> {
        let SourceGeometry::Area(polygon) = &self.geometry else {
            return vec![Arc::clone(self)];
        };

        let points = discretize_polygon(polygon, area_source_discretization);
        let mfd = self.mfd.scaled(1.0 / points.len() as f64);
        points
            .into_iter()
            .enumerate()
            .map(|(i, location)| {
                Arc::new(Source {
                    id: format!("{}-{i}", self.id).into(),
                    name: format!("{}-{i}", self.name),
                    trt_model: self.trt_model.clone(),
                    geometry: SourceGeometry::Point(location),
                    depth: self.depth,
                    mfd: mfd.clone(),
                })
            })
            .collect()
    }

    /// Epicentral distance to a point in km.
    ///
    /// For an area source this is zero inside the polygon and the distance to the nearest
    /// vertex otherwise.
    pub fn distance_to(&self, point: &Point) -> f64 {
        match &self.geometry {
            SourceGeometry::Point(location) => location.distance_to(point),
            SourceGeometry::Area(polygon) => {
                if crate::geo::polygon_contains(polygon, point) {
                    0.0
                } else {
                    polygon
                        .iter()
                        .map(|vertex| vertex.distance_to(point))
                        .fold(f64::INFINITY, f64::min)
                }
            }
        }
    }

    /// Whether at least one site is within `maximum_distance` km of the source
    pub fn is_close_to_any(&self, sites: &SiteCollection, maximum_distance: f64) -> bool {
        sites
            .iter()
            .any(|site| self.distance_to(&site.location) <= maximum_distance)
    }
}

/// Filter and split a list of sources.
///
/// Sources are split first, so that each resulting point source is filtered on its own location.
/// Only sources within `maximum_distance` of at least one site are kept.
pub fn filter_and_split_sources(
    sources: &[Arc<Source>],
    sites: &SiteCollection,
    maximum_distance: f64,
    area_source_discretization: f64,
) -> Vec<Arc<Source>> {
    sources
        .iter()
        .flat_map(|source| source.split(area_source_discretization))
        .filter(|source| source.is_close_to_any(sites, maximum_distance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{area_source, point_source, sites};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[test]
    fn test_gr_rates() {
        let mfd = Mfd::TruncatedGr {
            a_val: 4.0,
            b_val: 1.0,
            min_mag: 5.0,
            max_mag: 6.0,
        };
        let rates = mfd.annual_occurrence_rates(0.1);
        assert_eq!(rates.len(), 10);
        assert_eq!(mfd.num_bins(0.1), 10);
        assert_approx_eq!(f64, rates[0].0, 5.05, epsilon = 1e-9);

        // Total rate is the cumulative rate between min_mag and max_mag
        let total: f64 = rates.iter().map(|(_, rate)| rate).sum();
        assert_approx_eq!(f64, total, 10f64.powf(-1.0) - 10f64.powf(-2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_incremental_rates() {
        let mfd = Mfd::Incremental {
            min_mag: 5.0,
            bin_width: 0.5,
            occurrence_rates: vec![0.1, 0.01],
        };
        assert_eq!(
            mfd.annual_occurrence_rates(0.1),
            vec![(5.0, 0.1), (5.5, 0.01)]
        );
    }

    #[test]
    fn test_scaled_preserves_total_rate() {
        let mfd = Mfd::TruncatedGr {
            a_val: 3.0,
            b_val: 0.9,
            min_mag: 5.0,
            max_mag: 7.0,
        };
        let total = |mfd: &Mfd| -> f64 {
            mfd.annual_occurrence_rates(0.1)
                .iter()
                .map(|(_, rate)| rate)
                .sum()
        };
        assert_approx_eq!(f64, total(&mfd.scaled(0.25)), total(&mfd) * 0.25, epsilon = 1e-12);
    }

    #[rstest]
    #[case(Mfd::TruncatedGr { a_val: 3.0, b_val: 0.0, min_mag: 5.0, max_mag: 6.0 })]
    #[case(Mfd::TruncatedGr { a_val: 3.0, b_val: 1.0, min_mag: 7.0, max_mag: 6.0 })]
    #[case(Mfd::Incremental { min_mag: 5.0, bin_width: 0.1, occurrence_rates: vec![] })]
    #[case(Mfd::Incremental { min_mag: 5.0, bin_width: 0.1, occurrence_rates: vec![-1.0] })]
    fn test_mfd_validate_invalid(#[case] mfd: Mfd) {
        assert!(mfd.validate().is_err());
    }

    #[rstest]
    fn test_split_area_source(area_source: Source) {
        let source = Arc::new(area_source);
        let points = source.split(10.0);
        assert!(points.len() > 1);
        assert!(points.iter().all(|p| p.is_point() && p.trt_model == source.trt_model));
        assert_eq!(points[0].id.to_string(), "area1-0");

        // Rates are divided between the points
        let total = |source: &Source| -> f64 {
            source
                .mfd
                .annual_occurrence_rates(0.1)
                .iter()
                .map(|(_, rate)| rate)
                .sum()
        };
        let split_total: f64 = points.iter().map(|p| total(p)).sum();
        assert_approx_eq!(f64, split_total, total(&source), epsilon = 1e-12);
    }

    #[rstest]
    fn test_split_point_source(point_source: Source) {
        let source = Arc::new(point_source);
        let split = source.split(10.0);
        assert_eq!(split.len(), 1);
        assert!(Arc::ptr_eq(&split[0], &source));
    }

    #[rstest]
    fn test_filter_and_split_sources(point_source: Source, sites: SiteCollection) {
        let near = Arc::new(point_source);
        let mut far = (*near).clone();
        far.id = "far".into();
        far.geometry = SourceGeometry::Point(Point::new(100.0, 50.0));

        let kept = filter_and_split_sources(&[near.clone(), Arc::new(far)], &sites, 200.0, 10.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, near.id);
    }
}
