//! Dispatching blocks of sources to the worker pool and collecting the results.
use crate::curve::{BoundingBox, CurveAggregator, TaskCurves};
use crate::error::{HazardError, TaskError};
use crate::ground_motion::GsimID;
use crate::model::parameters::JobParameters;
use crate::partition::Block;
use crate::pool::apply_reduce;
use crate::site::SiteCollection;
use crate::source::TrtModelID;
use indexmap::IndexMap;
use log::{debug, info};

/// The curves computed with one GSIM, one entry per IMT
#[derive(Debug, Clone, PartialEq)]
pub struct GsimCurves {
    /// The ground-motion model used
    pub gsim: GsimID,
    /// Curves for each intensity measure type, in job order
    pub curves: Vec<TaskCurves>,
}

/// What a task returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    /// Curves for each TRT model
    pub curves: IndexMap<TrtModelID, Vec<GsimCurves>>,
    /// Disaggregation bounding boxes, keyed by TRT model and site index
    pub bounding_boxes: Vec<((TrtModelID, usize), BoundingBox)>,
}

/// The arguments passed to a task
#[derive(Debug, Clone, Copy)]
pub struct TaskArgs<'a> {
    /// The ordinal of the task (from 1)
    pub task_no: usize,
    /// The sources to process
    pub block: &'a Block,
    /// The sites at which to compute hazard
    pub sites: &'a SiteCollection,
    /// The GSIMs used for the block's TRT model
    pub gsims: &'a [GsimID],
    /// The job parameters
    pub parameters: &'a JobParameters,
}

/// A computation run on a block of sources.
///
/// Implementations must be pure functions of their arguments: running a task twice gives the
/// same result.
pub trait HazardTask: Sync {
    /// Compute the exceedance probabilities due to the sources of a block
    fn compute(&self, args: &TaskArgs) -> Result<TaskOutput, TaskError>;
}

/// Tracks how many blocks of each TRT model are still pending
#[derive(Debug, Default)]
struct Progress {
    pending: IndexMap<TrtModelID, usize>,
    num_done: usize,
    num_sources_done: usize,
}

impl Progress {
    fn new(blocks: &[Block]) -> Self {
        let mut pending = IndexMap::new();
        for block in blocks {
            *pending.entry(block.trt_model.clone()).or_default() += 1;
        }

        Self {
            pending,
            ..Default::default()
        }
    }

    /// Record a completed block, returning whether its TRT model is now finished
    fn complete(&mut self, block: &Block) -> bool {
        self.num_done += 1;
        self.num_sources_done += block.len();
        match self.pending.get_mut(&block.trt_model) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        }
    }
}

/// Sends blocks to a worker pool and combines the results as they arrive
pub struct TaskCoordinator<'a, T: HazardTask> {
    task: &'a T,
    pool_size: usize,
    tile: Option<usize>,
}

impl<'a, T: HazardTask> TaskCoordinator<'a, T> {
    /// Create a new [`TaskCoordinator`]
    ///
    /// # Arguments
    ///
    /// * `task` - The computation to run on each block
    /// * `pool_size` - Maximum number of tasks to run at once
    /// * `tile` - The tile being processed (from 1), if tiling
    pub fn new(task: &'a T, pool_size: usize, tile: Option<usize>) -> Self {
        Self {
            task,
            pool_size,
            tile,
        }
    }

    /// Run a task for every block and combine the results into `aggregator`.
    ///
    /// The first failure, either in a task or while combining, aborts the whole batch.
    pub fn run(
        &self,
        blocks: &[Block],
        sites: &SiteCollection,
        gsims_by_trt: &IndexMap<TrtModelID, Vec<GsimID>>,
        parameters: &JobParameters,
        aggregator: &mut CurveAggregator,
    ) -> Result<(), HazardError> {
        for (i, block) in blocks.iter().enumerate() {
            info!(
                "Submitting task #{}, {} source(s), weight={}",
                i + 1,
                block.len(),
                block.weight
            );
        }

        let mut progress = Progress::new(blocks);
        apply_reduce(
            blocks,
            self.pool_size,
            |index, block| {
                let args = TaskArgs {
                    task_no: index + 1,
                    block,
                    sites,
                    gsims: gsims_by_trt
                        .get(&block.trt_model)
                        .map(Vec::as_slice)
                        .unwrap_or_default(),
                    parameters,
                };
                self.task
                    .compute(&args)
                    .map_err(|source| HazardError::TaskFailure {
                        task_no: args.task_no,
                        trt_model: block.trt_model.clone(),
                        tile: self.tile,
                        source,
                    })
            },
            |index, output| {
                let block = &blocks[index];
                aggregator.combine(output)?;

                debug!(
                    "Task #{} done ({}/{})",
                    index + 1,
                    progress.num_done + 1,
                    blocks.len()
                );
                if progress.complete(block) {
                    info!("All sources for TRT model {} processed", block.trt_model);
                }

                Ok(())
            },
        )?;

        info!(
            "Processed {} sources for {} TRT models",
            progress.num_sources_done,
            progress.pending.len()
        );

        Ok(())
    }
}
