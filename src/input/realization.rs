//! Code for reading logic-tree realizations from a CSV file.
use super::*;
use crate::ground_motion::GsimID;
use crate::id::IDCollection;
use crate::model::parameters::JobParameters;
use crate::realization::{Realization, RealizationID};
use crate::source::TrtModelID;
use anyhow::{Context, Result, ensure};
use float_cmp::approx_eq;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::Deserialize;
use std::path::Path;

const REALIZATIONS_FILE_NAME: &str = "realizations.csv";

/// Tolerance on the sum of realization weights
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// One (realization, TRT model) choice retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct RealizationRaw {
    realization_id: RealizationID,
    weight: Option<f64>,
    trt_model: String,
    gsim: String,
}

/// Read realizations from an iterator of raw records.
///
/// Rows belonging to the same realization are combined, in order of first appearance.
fn read_realizations_from_iter<I>(
    iter: I,
    parameters: &JobParameters,
    trt_models: &IndexSet<TrtModelID>,
) -> Result<Vec<Realization>>
where
    I: Iterator<Item = RealizationRaw>,
{
    let gsim_ids: IndexSet<GsimID> = parameters.gsims.keys().cloned().collect();
    let mut realizations: IndexMap<RealizationID, Realization> = IndexMap::new();
    for raw in iter {
        let trt_model = trt_models
            .get_id_by_str(&raw.trt_model)
            .with_context(|| format!("Unknown TRT model for realization {}", raw.realization_id))?;
        let gsim = gsim_ids
            .get_id_by_str(&raw.gsim)
            .with_context(|| format!("Unknown GSIM for realization {}", raw.realization_id))?;

        let realization = realizations
            .entry(raw.realization_id.clone())
            .or_insert_with(|| Realization {
                id: raw.realization_id.clone(),
                weight: raw.weight,
                gsim_by_trt: IndexMap::new(),
            });
        ensure!(
            realization.weight == raw.weight,
            "Inconsistent weights given for realization {}",
            realization.id
        );
        ensure!(
            realization
                .gsim_by_trt
                .insert(trt_model.clone(), gsim)
                .is_none(),
            "More than one GSIM given for TRT model {trt_model} in realization {}",
            realization.id
        );
    }

    let realizations = realizations.into_values().collect_vec();
    ensure!(!realizations.is_empty(), "No realizations were imported!");
    for realization in &realizations {
        for trt_model in trt_models {
            ensure!(
                realization.gsim_by_trt.contains_key(trt_model),
                "Realization {} has no GSIM for TRT model {trt_model}",
                realization.id
            );
        }
    }

    if parameters.is_sampling() {
        check_sampled(&realizations, parameters.number_of_logic_tree_samples)?;
    } else {
        check_weights(&realizations)?;
    }

    Ok(realizations)
}

/// Sampled realizations have no weights and there is one per sample
fn check_sampled(realizations: &[Realization], num_samples: u32) -> Result<()> {
    ensure!(
        realizations.iter().all(|rlz| rlz.weight.is_none()),
        "Realizations cannot have weights when the logic tree is sampled"
    );
    ensure!(
        realizations.len() == num_samples as usize,
        "Expected {num_samples} sampled realizations but found {}",
        realizations.len()
    );

    Ok(())
}

/// Enumerated realizations all have weights, which sum to one
fn check_weights(realizations: &[Realization]) -> Result<()> {
    let mut sum = 0.0;
    for realization in realizations {
        let weight = realization
            .weight
            .with_context(|| format!("Missing weight for realization {}", realization.id))?;
        ensure!(
            weight.is_finite() && weight >= 0.0,
            "Invalid weight for realization {}: {weight}",
            realization.id
        );
        sum += weight;
    }
    ensure!(
        approx_eq!(f64, sum, 1.0, epsilon = WEIGHT_SUM_TOLERANCE),
        "Realization weights must sum to one (sum: {sum})"
    );

    Ok(())
}

/// Read the logic-tree realizations.
///
/// # Arguments
///
/// * `job_dir` - Folder containing job input files
/// * `parameters` - Job parameters
/// * `trt_models` - TRT models in the source model. Every realization must choose a GSIM for
///   each.
pub fn read_realizations<'a, I>(
    job_dir: &Path,
    parameters: &JobParameters,
    trt_models: I,
) -> Result<Vec<Realization>>
where
    I: IntoIterator<Item = &'a TrtModelID>,
{
    let file_path = job_dir.join(REALIZATIONS_FILE_NAME);
    let trt_models: IndexSet<TrtModelID> = trt_models.into_iter().cloned().collect();
    let realizations_csv = read_csv(&file_path)?;
    read_realizations_from_iter(realizations_csv, parameters, &trt_models)
        .with_context(|| input_err_msg(&file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, job_parameters};
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[fixture]
    fn trt_models() -> IndexSet<TrtModelID> {
        ["active".into(), "stable".into()].into_iter().collect()
    }

    fn raw(rlz: &str, weight: Option<f64>, trt_model: &str) -> RealizationRaw {
        RealizationRaw {
            realization_id: rlz.into(),
            weight,
            trt_model: trt_model.into(),
            gsim: "Simple".into(),
        }
    }

    fn enumerated() -> Vec<RealizationRaw> {
        vec![
            raw("rlz1", Some(0.6), "active"),
            raw("rlz1", Some(0.6), "stable"),
            raw("rlz2", Some(0.4), "stable"),
            raw("rlz2", Some(0.4), "active"),
        ]
    }

    #[rstest]
    fn test_read_realizations(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(REALIZATIONS_FILE_NAME)).unwrap();
            writeln!(
                file,
                "realization_id,weight,trt_model,gsim\n\
                 rlz1,0.6,active,Simple\n\
                 rlz1,0.6,stable,Simple\n\
                 rlz2,0.4,active,Simple\n\
                 rlz2,0.4,stable,Simple"
            )
            .unwrap();
        }

        let realizations =
            read_realizations(dir.path(), &job_parameters, trt_models.iter()).unwrap();
        assert_eq!(realizations.len(), 2);
        assert_eq!(realizations[0].id, "rlz1".into());
        assert_approx_eq!(f64, realizations[0].weight.unwrap(), 0.6);
        assert_eq!(realizations[1].gsim_by_trt.len(), 2);
        assert_eq!(realizations[1].gsim_by_trt["stable"], "Simple".into());
    }

    #[rstest]
    fn test_enumerated_ok(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let realizations =
            read_realizations_from_iter(enumerated().into_iter(), &job_parameters, &trt_models)
                .unwrap();
        assert_eq!(
            realizations.iter().map(|rlz| rlz.id.to_string()).collect_vec(),
            ["rlz1", "rlz2"]
        );
    }

    #[rstest]
    fn test_bad_weight_sum(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let mut rows = enumerated();
        rows[2].weight = Some(0.3);
        rows[3].weight = Some(0.3);
        let err = read_realizations_from_iter(rows.into_iter(), &job_parameters, &trt_models)
            .unwrap_err();
        assert!(
            err.to_string()
                .starts_with("Realization weights must sum to one")
        );
    }

    #[rstest]
    fn test_inconsistent_weight(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let mut rows = enumerated();
        rows[1].weight = Some(0.5);
        assert_error!(
            read_realizations_from_iter(rows.into_iter(), &job_parameters, &trt_models),
            "Inconsistent weights given for realization rlz1"
        );
    }

    #[rstest]
    fn test_missing_trt_model(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let mut rows = enumerated();
        rows.pop();
        assert_error!(
            read_realizations_from_iter(rows.into_iter(), &job_parameters, &trt_models),
            "Realization rlz2 has no GSIM for TRT model active"
        );
    }

    #[rstest]
    fn test_duplicate_trt_model(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let mut rows = enumerated();
        rows.push(raw("rlz2", Some(0.4), "active"));
        assert_error!(
            read_realizations_from_iter(rows.into_iter(), &job_parameters, &trt_models),
            "More than one GSIM given for TRT model active in realization rlz2"
        );
    }

    #[rstest]
    fn test_unknown_gsim(job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        let mut rows = enumerated();
        rows[0].gsim = "Missing".into();
        assert_error!(
            read_realizations_from_iter(rows.into_iter(), &job_parameters, &trt_models),
            "Unknown GSIM for realization rlz1"
        );
    }

    #[rstest]
    fn test_sampled(mut job_parameters: JobParameters, trt_models: IndexSet<TrtModelID>) {
        job_parameters.number_of_logic_tree_samples = 2;
        let rows = || {
            ["s1", "s2"]
                .into_iter()
                .flat_map(|rlz| [raw(rlz, None, "active"), raw(rlz, None, "stable")])
        };
        let realizations =
            read_realizations_from_iter(rows(), &job_parameters, &trt_models).unwrap();
        assert!(realizations.iter().all(|rlz| rlz.weight.is_none()));

        // Wrong number of samples
        job_parameters.number_of_logic_tree_samples = 3;
        assert_error!(
            read_realizations_from_iter(rows(), &job_parameters, &trt_models),
            "Expected 3 sampled realizations but found 2"
        );

        // Weights given
        job_parameters.number_of_logic_tree_samples = 2;
        let weighted = enumerated();
        assert_error!(
            read_realizations_from_iter(weighted.into_iter(), &job_parameters, &trt_models),
            "Realizations cannot have weights when the logic tree is sampled"
        );
    }
}
