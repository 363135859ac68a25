//! The contents of a hazard job, as read from its input files.
use crate::realization::Realization;
use crate::site::SiteCollection;
use crate::source::{Source, TrtModelID};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;

pub mod parameters;
use parameters::JobParameters;

/// A fully loaded hazard job
#[derive(Debug, Clone)]
pub struct Model {
    /// Path to the job folder
    pub job_dir: PathBuf,
    /// Parameters from the job file
    pub parameters: JobParameters,
    /// Sources, grouped by TRT model in the order they first appear in the source model
    pub source_groups: IndexMap<TrtModelID, Vec<Arc<Source>>>,
    /// The sites at which hazard is computed
    pub sites: SiteCollection,
    /// Logic-tree realizations
    pub realizations: Vec<Realization>,
}

impl Model {
    /// The total number of sources across all groups
    pub fn num_sources(&self) -> usize {
        self.source_groups.values().map(Vec::len).sum()
    }
}
