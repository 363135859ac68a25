//! Common routines for handling input data.
use crate::id::{HasID, IDLike};
use crate::model::Model;
use crate::model::parameters::JobParameters;
use anyhow::{Context, Result, bail, ensure};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub mod realization;
use realization::read_realizations;
pub mod site;
use site::read_sites;
pub mod source;
use source::read_sources;

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = read_csv_internal(file_path)?;
    if vec.is_empty() {
        bail!("CSV file {} cannot be empty", file_path.display());
    }
    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file, allowing it to contain no records.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_optional<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    Ok(read_csv_internal(file_path)?.into_iter())
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Check whether an iterator contains values that are sorted and unique
pub fn is_sorted_and_unique<T, I>(iter: I) -> bool
where
    T: PartialOrd + Clone,
    I: IntoIterator<Item = T>,
{
    iter.into_iter().tuple_windows().all(|(a, b)| a < b)
}

/// Check that the IDs of a series of items are unique, returning them as a set
pub fn check_unique_ids<'a, ID, T, I>(items: I) -> Result<HashSet<ID>>
where
    ID: IDLike,
    T: HasID<ID> + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut ids = HashSet::new();
    for item in items {
        let id = item.get_id();
        ensure!(ids.insert(id.clone()), "Duplicate ID found: {id}");
    }

    Ok(ids)
}

/// Read a job from the specified directory.
///
/// # Arguments
///
/// * `job_dir` - Folder containing job input files
///
/// # Returns
///
/// The job contents as a [`Model`] or an error if any input file is invalid
pub fn load_model<P: AsRef<Path>>(job_dir: P) -> Result<Model> {
    let job_dir = job_dir.as_ref();
    let parameters = JobParameters::from_path(job_dir)?;
    let source_groups = read_sources(job_dir)?;
    let sites = read_sites(job_dir)?;
    let realizations = read_realizations(job_dir, &parameters, source_groups.keys())?;

    Ok(Model {
        job_dir: job_dir.to_path_buf(),
        parameters,
        source_groups,
        sites,
        realizations,
    })
}
