//! Code for reading sites from a CSV file.
use super::*;
use crate::geo::Point;
use crate::site::{Site, SiteCollection, SiteID};
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const SITES_FILE_NAME: &str = "sites.csv";

/// A site record retrieved from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct SiteRaw {
    id: SiteID,
    lon: f64,
    lat: f64,
}

/// Read sites from an iterator of raw site records, preserving their order
fn read_sites_from_iter<I>(iter: I) -> Result<SiteCollection>
where
    I: Iterator<Item = SiteRaw>,
{
    let sites: SiteCollection = iter
        .map(|raw| {
            let location = Point::new(raw.lon, raw.lat);
            ensure!(
                location.is_valid(),
                "Invalid coordinates for site {}: ({}, {})",
                raw.id,
                raw.lon,
                raw.lat
            );
            Ok(Site {
                id: raw.id,
                location,
            })
        })
        .collect::<Result<_>>()?;
    ensure!(!sites.is_empty(), "No sites were imported!");
    check_unique_ids(sites.iter())?;

    Ok(sites)
}

/// Read the sites at which hazard is computed.
///
/// # Arguments
///
/// * `job_dir` - Folder containing job input files
pub fn read_sites(job_dir: &Path) -> Result<SiteCollection> {
    let file_path = job_dir.join(SITES_FILE_NAME);
    let sites_csv = read_csv_optional(&file_path)?;
    read_sites_from_iter(sites_csv).with_context(|| input_err_msg(&file_path))
}
