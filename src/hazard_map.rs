//! Hazard maps: the intensity level reached at a given probability of exceedance.
use crate::curve::ProbabilityArray;
use crate::realization::RealizationID;
use crate::statistics::interp;
use derive_more::Display;

/// PoEs are floored at this value before taking logarithms
pub const EPSILON: f64 = 1e-30;

/// Find the intensity level with the given probability of exceedance on a single curve.
///
/// Interpolation is linear in log-log space. If `poe` is above every value of the curve, no level
/// reaches it and 0 is returned.
///
/// # Arguments
///
/// * `levels` - Increasing intensity levels
/// * `curve` - The probability of exceeding each level
/// * `poe` - The target probability of exceedance
pub fn compute_iml(levels: &[f64], curve: &[f64], poe: f64) -> f64 {
    let max_poe = curve.iter().copied().fold(0.0, f64::max);
    if poe > max_poe {
        return 0.0;
    }

    // Reverse so that PoEs are increasing
    let log_poes: Vec<_> = curve.iter().rev().map(|p| p.max(EPSILON).ln()).collect();
    let log_levels: Vec<_> = levels.iter().rev().map(|l| l.ln()).collect();
    interp(poe.max(EPSILON).ln(), &log_poes, &log_levels).exp()
}

/// Compute the hazard map for each PoE: one intensity level per site
pub fn compute_hazard_maps(
    curves: &ProbabilityArray,
    levels: &[f64],
    poes: &[f64],
) -> Vec<Vec<f64>> {
    poes.iter()
        .map(|&poe| {
            curves
                .site_curves()
                .map(|curve| compute_iml(levels, curve, poe))
                .collect()
        })
        .collect()
}

/// Which curve a hazard map was computed from
#[derive(Debug, Clone, PartialEq, Display)]
pub enum CurveKind {
    /// The curve of a single realization
    #[display("{_0}")]
    Realization(RealizationID),
    /// The mean curve
    #[display("mean")]
    Mean,
    /// A quantile curve
    #[display("quantile-{_0}")]
    Quantile(f64),
}

/// The intensity levels reached at one PoE for one IMT, at every site
#[derive(Debug, Clone, PartialEq)]
pub struct HazardMap {
    /// The curve the map was computed from
    pub kind: CurveKind,
    /// The intensity measure type
    pub imt: String,
    /// The probability of exceedance
    pub poe: f64,
    /// The intensity level for each site
    pub imls: Vec<f64>,
}

/// Compute the hazard maps of a set of curves (one per IMT) for every PoE
pub fn build_hazard_maps<'a, I>(
    kind: &CurveKind,
    curves: &[ProbabilityArray],
    imtls: I,
    poes: &[f64],
) -> Vec<HazardMap>
where
    I: IntoIterator<Item = (&'a str, &'a [f64])>,
{
    imtls
        .into_iter()
        .zip(curves)
        .flat_map(|((imt, levels), curve)| {
            poes.iter()
                .zip(compute_hazard_maps(curve, levels, poes))
                .map(move |(&poe, imls)| HazardMap {
                    kind: kind.clone(),
                    imt: imt.to_string(),
                    poe,
                    imls,
                })
        })
        .collect()
}
