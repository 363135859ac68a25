//! Logic-tree realizations and their hazard curves.
use crate::curve::{CurveAggregator, ProbabilityArray};
use crate::ground_motion::GsimID;
use crate::id::{define_id_getter, define_id_type};
use crate::source::TrtModelID;
use indexmap::IndexMap;

define_id_type! {RealizationID}

/// A logic-tree branch: a choice of GSIM for each TRT model
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    /// Unique identifier for the realization
    pub id: RealizationID,
    /// Weight of the branch. `None` when the logic tree was sampled.
    pub weight: Option<f64>,
    /// The GSIM chosen for each TRT model
    pub gsim_by_trt: IndexMap<TrtModelID, GsimID>,
}
define_id_getter! {Realization, RealizationID}

/// Get the GSIMs needed for each TRT model, in order of first use
pub fn gsims_by_trt(realizations: &[Realization]) -> IndexMap<TrtModelID, Vec<GsimID>> {
    let mut map: IndexMap<TrtModelID, Vec<GsimID>> = IndexMap::new();
    for realization in realizations {
        for (trt_model, gsim) in &realization.gsim_by_trt {
            let gsims = map.entry(trt_model.clone()).or_default();
            if !gsims.contains(gsim) {
                gsims.push(gsim.clone());
            }
        }
    }

    map
}

/// Build the curves of a realization from the accumulated (TRT model, GSIM) curves.
///
/// TRT models are independent, so for each IMT
///
/// ```text
/// curve = 1 - prod(1 - acc[trt_model, gsim])
/// ```
///
/// over the realization's TRT models. Those without curves (e.g. because no source was close
/// enough to the sites) contribute nothing.
pub fn build_curves(
    realization: &Realization,
    aggregator: &CurveAggregator,
) -> Vec<ProbabilityArray> {
    aggregator
        .zeros()
        .iter()
        .enumerate()
        .map(|(m, zeros)| {
            let mut curve = zeros.clone();
            for (trt_model, gsim) in &realization.gsim_by_trt {
                let Some(curves) = aggregator.get(trt_model, gsim) else {
                    continue;
                };

                for (value, p) in curve.values_mut().iter_mut().zip(curves[m].values()) {
                    *value = 1.0 - (1.0 - *value) * (1.0 - p);
                }
            }
            curve
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::TaskCurves;
    use crate::fixture::{job_parameters, realizations};
    use crate::model::parameters::JobParameters;
    use crate::task::{GsimCurves, TaskOutput};
    use float_cmp::approx_eq;
    use rstest::rstest;

    fn output(trt_model: &str, gsim: &str, poe: f64) -> TaskOutput {
        let curves = [3, 5]
            .into_iter()
            .map(|num_levels| {
                TaskCurves::Dense(
                    ProbabilityArray::from_values(1, num_levels, vec![poe; num_levels]).unwrap(),
                )
            })
            .collect();
        TaskOutput {
            curves: IndexMap::from([(
                trt_model.into(),
                vec![GsimCurves {
                    gsim: gsim.into(),
                    curves,
                }],
            )]),
            bounding_boxes: Vec::new(),
        }
    }

    #[rstest]
    fn test_build_curves(job_parameters: JobParameters) {
        let mut aggregator = CurveAggregator::new(&job_parameters, 1);
        aggregator.combine(output("active", "Simple", 0.2)).unwrap();
        aggregator.combine(output("stable", "Simple", 0.5)).unwrap();
        aggregator.combine(output("stable", "Other", 0.1)).unwrap();

        let realization = Realization {
            id: "rlz1".into(),
            weight: Some(1.0),
            gsim_by_trt: IndexMap::from([
                ("active".into(), "Simple".into()),
                ("stable".into(), "Simple".into()),
                ("subduction".into(), "Simple".into()), // no curves
            ]),
        };
        let curves = build_curves(&realization, &aggregator);
        assert_eq!(curves.len(), 2);

        // 1 - 0.8 * 0.5
        for curve in &curves {
            assert!(curve.values().iter().all(|p| approx_eq!(f64, *p, 0.6)));
        }
    }

    #[rstest]
    fn test_build_curves_nothing(job_parameters: JobParameters) {
        let aggregator = CurveAggregator::new(&job_parameters, 3);
        let realization = Realization {
            id: "rlz1".into(),
            weight: None,
            gsim_by_trt: IndexMap::from([("active".into(), "Simple".into())]),
        };
        let curves = build_curves(&realization, &aggregator);
        assert_eq!(curves, aggregator.zeros());
    }

    #[rstest]
    fn test_gsims_by_trt(realizations: Vec<Realization>) {
        let map = gsims_by_trt(&realizations);
        for realization in &realizations {
            for (trt_model, gsim) in &realization.gsim_by_trt {
                assert!(map[trt_model].contains(gsim));
            }
        }

        // No duplicates
        for gsims in map.values() {
            let mut sorted = gsims.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), gsims.len());
        }
    }
}
