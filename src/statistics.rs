//! Mean and quantile curves across logic-tree realizations.
//!
//! When the logic tree is fully enumerated, every realization carries an explicit weight and
//! quantiles are weighted order statistics. When it is randomly sampled, each realization already
//! stands for 1/N of the tree, so quantiles are plain order statistics of the sample.
use crate::curve::ProbabilityArray;
use crate::error::HazardError;
use crate::realization::Realization;
use log::warn;

/// How realizations are weighted
#[derive(Debug, Clone, PartialEq)]
pub enum Weighting {
    /// Each realization has its own weight (normalised to sum to 1)
    Explicit(Vec<f64>),
    /// Every realization has the same weight
    Implicit,
}

impl Weighting {
    /// Choose the weighting for a set of realizations.
    ///
    /// Explicit weighting is used when the tree was enumerated and every realization has a
    /// weight; otherwise weighting is implicit.
    pub fn for_realizations(realizations: &[Realization], sampling: bool) -> Self {
        if sampling {
            return Self::Implicit;
        }

        let weights: Option<Vec<f64>> = realizations.iter().map(|r| r.weight).collect();
        match weights {
            Some(weights) => {
                let total: f64 = weights.iter().sum();
                if total > 0.0 {
                    Self::Explicit(weights.iter().map(|w| w / total).collect())
                } else {
                    Self::Implicit
                }
            }
            None => Self::Implicit,
        }
    }
}

/// Linear interpolation of `x` over the increasing points `xp`, clamped at both ends.
///
/// # Panics
///
/// Panics if `xp` is empty or its length differs from `fp`.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    assert!(!xp.is_empty() && xp.len() == fp.len());

    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }

    // xp[i - 1] <= x < xp[i]
    let i = xp.partition_point(|v| *v <= x);
    let (x0, x1, y0, y1) = (xp[i - 1], xp[i], fp[i - 1], fp[i]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Weighted arithmetic mean
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
}

/// Quantile of a sample with plotting positions `(k - 0.5) / n`.
///
/// Equivalent to `scipy.stats.mstats.mquantiles` with `alphap = betap = 0.5`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let aleph = n as f64 * q + 0.5;
    let k = aleph.clamp(1.0, (n - 1) as f64).floor();
    let gamma = (aleph - k).clamp(0.0, 1.0);
    let k = k as usize;
    (1.0 - gamma) * sorted[k - 1] + gamma * sorted[k]
}

/// Weighted quantile of a sample.
///
/// Each value sits at the centre of its share of the cumulative weight, i.e. at
/// `C_i - w_i / 2`, and the quantile is interpolated between these positions. With equal weights
/// this is the same as [`quantile`]. Values with zero weight are ignored; if every weight is zero
/// the values are treated as equally likely.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    let mut pairs: Vec<_> = values
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .filter(|(_, weight)| *weight > 0.0)
        .collect();
    if pairs.is_empty() {
        return quantile(values, q);
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|(_, weight)| weight).sum();
    let mut cumulative = 0.0;
    let mut positions = Vec::with_capacity(pairs.len());
    for (_, weight) in &pairs {
        let weight = weight / total;
        positions.push(cumulative + weight / 2.0);
        cumulative += weight;
    }
    let sorted: Vec<_> = pairs.into_iter().map(|(value, _)| value).collect();

    interp(q, &positions, &sorted)
}

/// Apply `f` to the values of every realization at each (site, level)
fn reduce_curves<F>(curves: &[&ProbabilityArray], f: F) -> ProbabilityArray
where
    F: Fn(&[f64]) -> f64,
{
    let mut result = curves[0].clone();
    let mut column = vec![0.0; curves.len()];
    for (i, value) in result.values_mut().iter_mut().enumerate() {
        for (slot, curve) in column.iter_mut().zip(curves) {
            *slot = curve.values()[i];
        }
        *value = f(&column);
    }

    result
}

/// The mean of the curves of several realizations.
///
/// # Panics
///
/// Panics if `curves` is empty.
pub fn mean_curve(curves: &[&ProbabilityArray], weighting: &Weighting) -> ProbabilityArray {
    match weighting {
        Weighting::Explicit(weights) => {
            reduce_curves(curves, |values| weighted_mean(values, weights))
        }
        Weighting::Implicit => {
            reduce_curves(curves, |values| values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// A quantile of the curves of several realizations.
///
/// # Panics
///
/// Panics if `curves` is empty.
pub fn quantile_curve(
    curves: &[&ProbabilityArray],
    q: f64,
    weighting: &Weighting,
) -> ProbabilityArray {
    match weighting {
        Weighting::Explicit(weights) => {
            reduce_curves(curves, |values| weighted_quantile(values, weights, q))
        }
        Weighting::Implicit => reduce_curves(curves, |values| quantile(values, q)),
    }
}

/// Summary curves, one entry per IMT in each case
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    /// The mean curves, if requested
    pub mean: Option<Vec<ProbabilityArray>>,
    /// The quantile curves for each requested quantile
    pub quantiles: Vec<(f64, Vec<ProbabilityArray>)>,
}

impl Statistics {
    /// Whether there are no statistics
    pub fn is_empty(&self) -> bool {
        self.mean.is_none() && self.quantiles.is_empty()
    }
}

/// Compute the statistics of the realization curves.
///
/// # Arguments
///
/// * `rlz_curves` - The curves for each realization, one per IMT
/// * `weighting` - How to weight the realizations
/// * `mean` - Whether to compute the mean curves
/// * `quantiles` - The quantiles to compute
pub fn compute_statistics(
    rlz_curves: &[Vec<ProbabilityArray>],
    weighting: &Weighting,
    mean: bool,
    quantiles: &[f64],
) -> Statistics {
    let num_realizations = rlz_curves.len();
    if num_realizations == 0 {
        warn!("There are no realizations: no statistics will be computed");
        return Statistics::default();
    }

    let mut quantiles = quantiles;
    if num_realizations == 1 && !quantiles.is_empty() {
        warn!("{}", HazardError::DegenerateStatistics { num_realizations });
        quantiles = &[];
    }

    let num_imts = rlz_curves[0].len();
    let imt_curves = |m: usize| rlz_curves.iter().map(|curves| &curves[m]).collect::<Vec<_>>();

    Statistics {
        mean: mean.then(|| {
            (0..num_imts)
                .map(|m| mean_curve(&imt_curves(m), weighting))
                .collect()
        }),
        quantiles: quantiles
            .iter()
            .map(|&q| {
                let curves = (0..num_imts)
                    .map(|m| quantile_curve(&imt_curves(m), q, weighting))
                    .collect();
                (q, curves)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::{approx_eq, assert_approx_eq};
    use indexmap::IndexMap;
    use rstest::rstest;

    fn array(values: &[f64]) -> ProbabilityArray {
        ProbabilityArray::from_values(1, values.len(), values.to_vec()).unwrap()
    }

    fn realization(weight: Option<f64>) -> Realization {
        Realization {
            id: "rlz".into(),
            weight,
            gsim_by_trt: IndexMap::new(),
        }
    }

    #[test]
    fn test_weighted_mean() {
        assert_approx_eq!(f64, weighted_mean(&[0.1, 0.2], &[0.3, 0.7]), 0.17);
    }

    #[rstest]
    #[case(0.5, 0.5)]
    #[case(0.25, 0.1)] // At a plotting position
    #[case(0.1, 0.1)] // Clamped
    #[case(0.9, 0.9)] // Clamped
    fn test_weighted_quantile(#[case] q: f64, #[case] expected: f64) {
        assert_approx_eq!(f64, weighted_quantile(&[0.9, 0.1], &[0.5, 0.5], q), expected);
    }

    #[test]
    fn test_weighted_quantile_uneven() {
        // Positions 0.1, 0.6
        assert_approx_eq!(
            f64,
            weighted_quantile(&[0.1, 0.9], &[0.2, 0.8], 0.35),
            0.5,
            epsilon = 1e-12
        );
    }

    #[rstest]
    #[case(&[0.1, 0.2, 0.9], &[0.5, 0.0, 0.5], 0.5)] // Zero-weight value in the middle
    #[case(&[0.0, 0.1, 0.9], &[0.0, 0.5, 0.5], 0.5)] // ...and at the bottom
    #[case(&[0.1, 0.9, 1.0], &[0.5, 0.5, 0.0], 0.5)] // ...and at the top
    #[case(&[0.1, 0.9], &[0.0, 0.0], 0.5)] // All zero: equally likely
    fn test_weighted_quantile_zero_weight(
        #[case] values: &[f64],
        #[case] weights: &[f64],
        #[case] expected: f64,
    ) {
        assert_approx_eq!(
            f64,
            weighted_quantile(values, weights, 0.5),
            expected,
            epsilon = 1e-12
        );
    }

    #[rstest]
    #[case(&[0.1, 0.9], 0.5, 0.5)]
    #[case(&[0.3, 0.1, 0.2], 0.5, 0.2)]
    #[case(&[1.0, 2.0, 3.0, 4.0], 0.25, 1.5)]
    #[case(&[1.0, 2.0, 3.0, 4.0], 0.01, 1.0)]
    #[case(&[0.7], 0.15, 0.7)]
    fn test_quantile(#[case] values: &[f64], #[case] q: f64, #[case] expected: f64) {
        assert_approx_eq!(f64, quantile(values, q), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_equals_equal_weights() {
        let values = [0.05, 0.4, 0.2, 0.3, 0.11];
        for q in [0.15, 0.5, 0.85] {
            assert_approx_eq!(
                f64,
                quantile(&values, q),
                weighted_quantile(&values, &[0.2; 5], q),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_interp() {
        let xp = [0.0, 1.0, 3.0];
        let fp = [10.0, 20.0, 40.0];
        assert_approx_eq!(f64, interp(-1.0, &xp, &fp), 10.0);
        assert_approx_eq!(f64, interp(0.5, &xp, &fp), 15.0);
        assert_approx_eq!(f64, interp(2.0, &xp, &fp), 30.0);
        assert_approx_eq!(f64, interp(3.0, &xp, &fp), 40.0);
    }

    #[test]
    fn test_weighting_for_realizations() {
        let enumerated = [realization(Some(1.0)), realization(Some(3.0))];
        assert_eq!(
            Weighting::for_realizations(&enumerated, false),
            Weighting::Explicit(vec![0.25, 0.75])
        );
        assert_eq!(
            Weighting::for_realizations(&enumerated, true),
            Weighting::Implicit
        );

        let sampled = [realization(None), realization(None)];
        assert_eq!(
            Weighting::for_realizations(&sampled, false),
            Weighting::Implicit
        );
    }

    #[test]
    fn test_mean_curve() {
        let curves = [array(&[0.1, 0.01]), array(&[0.2, 0.02])];
        let refs: Vec<_> = curves.iter().collect();

        let mean = mean_curve(&refs, &Weighting::Explicit(vec![0.3, 0.7]));
        assert_approx_eq!(f64, mean.values()[0], 0.17);
        assert_approx_eq!(f64, mean.values()[1], 0.017);

        let mean = mean_curve(&refs, &Weighting::Implicit);
        assert_approx_eq!(f64, mean.values()[0], 0.15);
    }

    /// Both modes give the median of two curves, each by its own algorithm
    #[rstest]
    #[case(Weighting::Explicit(vec![0.5, 0.5]))]
    #[case(Weighting::Implicit)]
    fn test_quantile_curve_median(#[case] weighting: Weighting) {
        let curves = [array(&[0.1]), array(&[0.9])];
        let refs: Vec<_> = curves.iter().collect();
        let median = quantile_curve(&refs, 0.5, &weighting);
        assert_approx_eq!(f64, median.values()[0], 0.5);
    }

    #[test]
    fn test_compute_statistics() {
        let rlz_curves = vec![
            vec![array(&[0.1, 0.05]), array(&[0.3])],
            vec![array(&[0.2, 0.06]), array(&[0.4])],
            vec![array(&[0.3, 0.07]), array(&[0.5])],
        ];
        let stats = compute_statistics(&rlz_curves, &Weighting::Implicit, true, &[0.5]);

        let mean = stats.mean.unwrap();
        assert_eq!(mean.len(), 2);
        assert_approx_eq!(f64, mean[0].values()[0], 0.2);
        assert_approx_eq!(f64, mean[1].values()[0], 0.4);

        assert_eq!(stats.quantiles.len(), 1);
        let (q, curves) = &stats.quantiles[0];
        assert_approx_eq!(f64, *q, 0.5);
        assert!(approx_eq!(f64, curves[0].values()[1], 0.06));
    }

    #[test]
    fn test_compute_statistics_single_realization() {
        let rlz_curves = vec![vec![array(&[0.1, 0.05])]];
        let stats = compute_statistics(&rlz_curves, &Weighting::Implicit, true, &[0.15, 0.85]);
        assert!(stats.quantiles.is_empty());
        assert_eq!(stats.mean.unwrap()[0], array(&[0.1, 0.05]));
    }

    #[test]
    fn test_compute_statistics_no_realizations() {
        let stats = compute_statistics(&[], &Weighting::Implicit, true, &[0.5]);
        assert!(stats.is_empty());
    }
}
