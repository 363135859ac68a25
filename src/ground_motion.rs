//! A simple ground-motion model and the classical hazard task built on it.
//!
//! The median ground motion is given by
//!
//! ```text
//! ln Y = c0 + c1 * M + c2 * ln(R + c3)
//! ```
//!
//! where `M` is the magnitude and `R` the hypocentral distance in km, with a lognormal scatter of
//! standard deviation `sigma`. Ruptures are assumed to follow a Poisson process, so the
//! probability of exceeding a level over the investigation time `T` is
//! `1 - prod(exp(-rate * T * P(Y > level)))` over all ruptures.
use crate::curve::{BoundingBox, ProbabilityArray, TaskCurves};
use crate::error::TaskError;
use crate::id::define_id_type;
use crate::task::{GsimCurves, HazardTask, TaskArgs, TaskOutput};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::f64::consts::SQRT_2;

define_id_type! {GsimID}

/// Coefficients of the ground-motion model for one intensity measure type
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GmmCoefficients {
    /// Constant term
    pub c0: f64,
    /// Magnitude scaling
    pub c1: f64,
    /// Geometric spreading
    pub c2: f64,
    /// Near-source saturation distance in km
    pub c3: f64,
    /// Standard deviation of ln Y
    pub sigma: f64,
}

impl GmmCoefficients {
    /// Check the coefficients are usable
    pub fn validate(&self) -> Result<()> {
        ensure!(
            [self.c0, self.c1, self.c2, self.c3].iter().all(|c| c.is_finite()),
            "Coefficients must be finite"
        );
        ensure!(self.c3 >= 0.0, "c3 cannot be negative");
        ensure!(
            self.sigma.is_finite() && self.sigma > 0.0,
            "sigma must be greater than zero"
        );

        Ok(())
    }

    /// The mean of ln Y for a rupture of magnitude `mag` at hypocentral distance `dist`
    pub fn mean_ln(&self, mag: f64, dist: f64) -> f64 {
        self.c0 + self.c1 * mag + self.c2 * (dist + self.c3).ln()
    }

    /// The probability that the ground motion exceeds `level`
    pub fn poe(&self, mag: f64, dist: f64, level: f64) -> f64 {
        normal_sf((level.ln() - self.mean_ln(mag, dist)) / self.sigma)
    }
}

/// Survival function of the standard normal distribution
pub fn normal_sf(x: f64) -> f64 {
    0.5 * libm::erfc(x / SQRT_2)
}

/// A rupture affecting a site
struct SiteRupture {
    mag: f64,
    /// Annual occurrence rate multiplied by the investigation time
    occurrences: f64,
    hypo_dist: f64,
    epi_dist: f64,
}

/// Classical PSHA on the sources of a block using the built-in ground-motion model
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicalTask;

impl ClassicalTask {
    /// Collect the ruptures within the maximum distance of each site
    fn site_ruptures(args: &TaskArgs) -> Vec<Vec<SiteRupture>> {
        let parameters = args.parameters;
        let ruptures: Vec<_> = args
            .block
            .sources
            .iter()
            .map(|source| {
                (
                    source,
                    source
                        .mfd
                        .annual_occurrence_rates(parameters.width_of_mfd_bin),
                )
            })
            .collect();

        args.sites
            .iter()
            .map(|site| {
                let mut site_ruptures = Vec::new();
                for (source, rates) in &ruptures {
                    let epi_dist = source.distance_to(&site.location);
                    if epi_dist > parameters.maximum_distance {
                        continue;
                    }

                    let hypo_dist = epi_dist.hypot(source.depth);
                    site_ruptures.extend(rates.iter().filter(|(_, rate)| *rate > 0.0).map(
                        |(mag, rate)| SiteRupture {
                            mag: *mag,
                            occurrences: rate * parameters.investigation_time,
                            hypo_dist,
                            epi_dist,
                        },
                    ));
                }
                site_ruptures
            })
            .collect()
    }

    /// Compute the curves for one IMT, or [`TaskCurves::Zero`] if no rupture contributes
    fn imt_curves(
        site_ruptures: &[Vec<SiteRupture>],
        coeffs: &GmmCoefficients,
        levels: &[f64],
    ) -> TaskCurves {
        if site_ruptures.iter().all(Vec::is_empty) {
            return TaskCurves::Zero;
        }

        let mut array = ProbabilityArray::zeros(site_ruptures.len(), levels.len());
        let values = array.values_mut();
        for (site_index, ruptures) in site_ruptures.iter().enumerate() {
            for (level_index, &level) in levels.iter().enumerate() {
                let ln_pne: f64 = ruptures
                    .iter()
                    .map(|r| -r.occurrences * coeffs.poe(r.mag, r.hypo_dist, level))
                    .sum();
                values[site_index * levels.len() + level_index] = -ln_pne.exp_m1();
            }
        }

        TaskCurves::Dense(array)
    }
}

impl HazardTask for ClassicalTask {
    fn compute(&self, args: &TaskArgs) -> Result<TaskOutput, TaskError> {
        let parameters = args.parameters;
        let site_ruptures = Self::site_ruptures(args);

        let mut gsim_curves = Vec::with_capacity(args.gsims.len());
        for gsim in args.gsims {
            let coefficients = parameters
                .gsims
                .get(gsim)
                .ok_or_else(|| format!("Unknown GSIM {gsim}"))?;

            let mut curves = Vec::with_capacity(parameters.num_imts());
            for (imt, levels) in parameters.imtls() {
                let coeffs = coefficients
                    .get(imt)
                    .ok_or_else(|| format!("No coefficients for {imt} in GSIM {gsim}"))?;
                curves.push(Self::imt_curves(&site_ruptures, coeffs, levels));
            }
            gsim_curves.push(GsimCurves {
                gsim: gsim.clone(),
                curves,
            });
        }

        let mut bounding_boxes = Vec::new();
        if parameters.wants_bounding_boxes() {
            for (site_index, ruptures) in site_ruptures.iter().enumerate() {
                let mut iter = ruptures.iter();
                let Some(first) = iter.next() else {
                    continue;
                };
                let mut bbox = BoundingBox::new(first.mag, first.epi_dist);
                for rupture in iter {
                    bbox.update(rupture.mag, rupture.epi_dist);
                }
                bounding_boxes.push(((args.block.trt_model.clone(), site_index), bbox));
            }
        }

        Ok(TaskOutput {
            curves: IndexMap::from([(args.block.trt_model.clone(), gsim_curves)]),
            bounding_boxes,
        })
    }
}
