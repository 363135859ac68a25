//! Running a hazard calculation from a loaded job.
//!
//! A calculation goes through the following steps:
//!
//! 1. Pre-execution: sources are filtered and split for the sites and weighted, and the size of
//!    the calculation is estimated ([`JobInfo`])
//! 2. Execution: the sources are partitioned into blocks and dispatched to the worker pool, with
//!    the results combined into one curve per TRT model and GSIM
//! 3. Post-execution: the curves of every realization are built
//! 4. Post-processing: statistics and hazard maps
//! 5. Export
//!
//! When the job sets a tiling policy, the sites are split into tiles, each of which goes through
//! the steps above on its own. All tiles are pre-executed first so that the limits can be checked
//! against the size of the whole job.
use crate::curve::{BoundingBoxMap, CurveAggregator, ProbabilityArray};
use crate::error::HazardError;
use crate::ground_motion::{ClassicalTask, GsimID};
use crate::hazard_map::{CurveKind, HazardMap, build_hazard_maps};
use crate::limits::WeightLimits;
use crate::model::Model;
use crate::model::parameters::CalculationMode;
use crate::output::metadata::write_metadata;
use crate::output::{CsvResultSink, ResultSink};
use crate::partition::AllSources;
use crate::pool::map_collect;
use crate::realization::{build_curves, gsims_by_trt};
use crate::site::SiteCollection;
use crate::source::{Source, TrtModelID, filter_and_split_sources};
use crate::statistics::{Statistics, Weighting, compute_statistics};
use crate::task::TaskCoordinator;
use crate::tiling::{
    SiteTile, concurrent_tasks_per_tile, estimated_weight, split_sites, workers_per_tile,
};
use crate::weight::{JobInfo, output_weight, source_weight};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use log::{info, warn};
use std::convert::Infallible;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Above this number of source-site pairs, sources are filtered on the worker pool
const PARALLEL_FILTERING_THRESHOLD: usize = 10_000;

/// How much of the machine a job may use, and how big it may be
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalculationSettings {
    /// Maximum number of tasks run at once
    pub pool_size: usize,
    /// The number of blocks to aim for when partitioning the sources
    pub concurrent_tasks: usize,
    /// Maximum number of tiles run at once
    pub tile_pool_size: usize,
    /// Ceilings on the size of the job
    pub limits: WeightLimits,
}

/// The output of pre-execution
#[derive(Debug, Clone)]
pub struct PreparedCalculation {
    /// The filtered and split sources, with their weights
    pub sources: AllSources,
    /// The GSIMs needed for each TRT model
    pub gsims_by_trt: IndexMap<TrtModelID, Vec<GsimID>>,
    /// The size of the calculation
    pub job_info: JobInfo,
}

/// Everything computed for a set of sites
#[derive(Debug, Clone, Default)]
pub struct HazardResults {
    /// The curves of each realization, one per IMT
    pub rlz_curves: Vec<Vec<ProbabilityArray>>,
    /// Disaggregation bounding boxes
    pub bounding_boxes: BoundingBoxMap,
    /// Mean and quantile curves
    pub statistics: Statistics,
    /// Hazard maps for every curve that is exported
    pub hazard_maps: Vec<HazardMap>,
}

/// A hazard calculation over a set of sites (all of the job's or a tile's)
#[derive(Debug, Clone)]
pub struct HazardCalculator<'a> {
    model: &'a Model,
    sites: SiteCollection,
    tile: Option<usize>,
    pool_size: usize,
    concurrent_tasks: usize,
}

impl<'a> HazardCalculator<'a> {
    /// Create a calculator for every site of the job
    pub fn new(model: &'a Model, pool_size: usize, concurrent_tasks: usize) -> Self {
        Self {
            model,
            sites: model.sites.clone(),
            tile: None,
            pool_size,
            concurrent_tasks,
        }
    }

    /// Create a calculator for the sites of a tile
    pub fn for_tile(model: &'a Model, tile: SiteTile, pool_size: usize) -> Self {
        Self {
            model,
            sites: tile.sites,
            tile: Some(tile.index),
            pool_size,
            concurrent_tasks: 1,
        }
    }

    /// The sites of the calculation
    pub fn sites(&self) -> &SiteCollection {
        &self.sites
    }

    /// Filter and split the sources of a TRT model, sorted by ID
    fn prepare_group(&self, sources: &[Arc<Source>]) -> Vec<Arc<Source>> {
        let parameters = &self.model.parameters;
        let filter = |sources: &[Arc<Source>]| {
            filter_and_split_sources(
                sources,
                &self.sites,
                parameters.maximum_distance,
                parameters.area_source_discretization,
            )
        };

        let mut prepared = if sources.len() * self.sites.len() > PARALLEL_FILTERING_THRESHOLD {
            let chunk_size = sources.len().div_ceil(self.pool_size.max(1));
            let chunks: Vec<_> = sources.chunks(chunk_size).collect();
            let Ok(parts) =
                map_collect(&chunks, self.pool_size, |_, chunk| Ok::<_, Infallible>(filter(*chunk)));
            parts.concat()
        } else {
            filter(sources)
        };

        prepared.sort_by(|a, b| a.id.cmp(&b.id));
        prepared
    }

    /// Filter, split and weight the sources and estimate the size of the calculation
    pub fn pre_execute(&self) -> Result<PreparedCalculation> {
        let model = self.model;
        let parameters = &model.parameters;

        let mut sources = AllSources::default();
        for (trt_model, group) in &model.source_groups {
            let prepared = self.prepare_group(group);
            if prepared.is_empty() {
                warn!(
                    "{}",
                    HazardError::EmptySourceGroup {
                        trt_model: trt_model.clone(),
                        maximum_distance: parameters.maximum_distance,
                    }
                );
                continue;
            }

            info!(
                "TRT model {trt_model}: {} source(s) after filtering and splitting {}",
                prepared.len(),
                group.len()
            );
            for source in prepared {
                let weight = source_weight(&source, parameters);
                sources.append(source, weight);
            }
        }

        if sources.is_empty() {
            warn!("No source is close enough to any site: every curve will be zero");
        }

        let num_realizations = model.realizations.len();
        let job_info = JobInfo {
            num_sites: self.sites.len(),
            num_realizations,
            num_imts: parameters.num_imts(),
            num_levels: parameters.mean_num_levels(),
            input_weight: sources.total_weight(),
            output_weight: output_weight(parameters, self.sites.len(), num_realizations),
        };

        Ok(PreparedCalculation {
            sources,
            gsims_by_trt: gsims_by_trt(&model.realizations),
            job_info,
        })
    }

    /// Dispatch the sources to the worker pool and combine the results
    pub fn execute(&self, prepared: &PreparedCalculation) -> Result<CurveAggregator> {
        let parameters = &self.model.parameters;
        if parameters.calculation_mode == CalculationMode::EventBased {
            bail!("Event-based calculations are not supported. Use the validate command instead.");
        }

        let blocks = prepared.sources.split(self.concurrent_tasks);
        info!(
            "Dispatching {} source(s) in {} block(s) with {} worker(s)",
            prepared.sources.len(),
            blocks.len(),
            self.pool_size
        );

        let task = ClassicalTask;
        let coordinator = TaskCoordinator::new(&task, self.pool_size, self.tile);
        let mut aggregator = CurveAggregator::new(parameters, self.sites.len());
        coordinator.run(
            &blocks,
            &self.sites,
            &prepared.gsims_by_trt,
            parameters,
            &mut aggregator,
        )?;

        Ok(aggregator)
    }

    /// Build the curves of every realization
    pub fn post_execute(&self, aggregator: &CurveAggregator) -> HazardResults {
        HazardResults {
            rlz_curves: self
                .model
                .realizations
                .iter()
                .map(|realization| build_curves(realization, aggregator))
                .collect(),
            bounding_boxes: aggregator.bounding_boxes().clone(),
            ..Default::default()
        }
    }

    /// Whether the curves of individual realizations are exported.
    ///
    /// A job with a single realization always exports it.
    fn exports_realizations(&self) -> bool {
        self.model.parameters.individual_curves || self.model.realizations.len() == 1
    }

    /// Compute the statistics and hazard maps
    pub fn post_process(&self, results: &mut HazardResults) {
        let parameters = &self.model.parameters;
        if parameters.wants_statistics() {
            let weighting =
                Weighting::for_realizations(&self.model.realizations, parameters.is_sampling());
            results.statistics = compute_statistics(
                &results.rlz_curves,
                &weighting,
                parameters.mean_hazard_curves,
                &parameters.quantile_hazard_curves,
            );
        }

        if parameters.poes.is_empty() {
            return;
        }

        let mut maps = Vec::new();
        let mut add_maps = |kind: CurveKind, curves: &[ProbabilityArray]| {
            maps.extend(build_hazard_maps(
                &kind,
                curves,
                parameters.imtls(),
                &parameters.poes,
            ));
        };
        if self.exports_realizations() {
            for (realization, curves) in self.model.realizations.iter().zip(&results.rlz_curves) {
                add_maps(CurveKind::Realization(realization.id.clone()), curves);
            }
        }
        if let Some(mean) = &results.statistics.mean {
            add_maps(CurveKind::Mean, mean);
        }
        for (q, curves) in &results.statistics.quantiles {
            add_maps(CurveKind::Quantile(*q), curves);
        }
        results.hazard_maps = maps;
    }

    /// Write the results to `sink`
    pub fn export<S: ResultSink>(&self, results: &HazardResults, sink: &mut S) -> Result<()> {
        if self.exports_realizations() {
            for (realization, curves) in self.model.realizations.iter().zip(&results.rlz_curves) {
                sink.write_realization_curves(realization, curves)?;
            }
        }
        if !results.statistics.is_empty() {
            sink.write_statistics(&results.statistics)?;
        }
        if !results.hazard_maps.is_empty() {
            sink.write_hazard_maps(&results.hazard_maps)?;
        }
        if !results.bounding_boxes.is_empty() {
            sink.write_bounding_boxes(&results.bounding_boxes)?;
        }

        sink.flush()
    }

    /// Run every step after pre-execution, writing CSV files to `output_path`
    pub fn run(&self, prepared: &PreparedCalculation, output_path: &Path) -> Result<HazardResults> {
        let aggregator = self.execute(prepared)?;
        let mut results = self.post_execute(&aggregator);
        self.post_process(&mut results);

        let mut sink = CsvResultSink::create(output_path, &self.sites, &self.model.parameters)?;
        self.export(&results, &mut sink)?;

        Ok(results)
    }
}

/// Log the size of a calculation
fn log_job_info(job_info: &JobInfo) {
    info!(
        "{} site(s), {} realization(s), {} IMT(s) with {} level(s) on average",
        job_info.num_sites, job_info.num_realizations, job_info.num_imts, job_info.num_levels
    );
    info!(
        "Input weight: {}; output weight: {}",
        job_info.input_weight, job_info.output_weight
    );
}

/// Pre-execute the job, returning a calculator for each tile (or just one when not tiling) along
/// with the total size of the job
fn prepare<'a>(
    model: &'a Model,
    settings: &CalculationSettings,
) -> Result<(Vec<(HazardCalculator<'a>, PreparedCalculation)>, JobInfo)> {
    let parameters = &model.parameters;
    let Some(policy) = parameters.tiling else {
        let calculator = HazardCalculator::new(model, settings.pool_size, settings.concurrent_tasks);
        let prepared = calculator.pre_execute()?;
        let job_info = prepared.job_info.clone();
        return Ok((vec![(calculator, prepared)], job_info));
    };

    let weight = estimated_weight(
        model.sites.len(),
        parameters.num_levels(),
        model.realizations.len(),
    );
    let tiles = split_sites(&model.sites, policy.compute_tile_count(weight));
    info!(
        "Splitting {} site(s) into {} tile(s)",
        model.sites.len(),
        tiles.len()
    );

    let mut calculations = Vec::with_capacity(tiles.len());
    let mut job_info: Option<JobInfo> = None;
    for tile in tiles {
        let index = tile.index;
        let calculator = HazardCalculator::for_tile(model, tile, settings.pool_size);
        let prepared = calculator
            .pre_execute()
            .with_context(|| format!("Failed to prepare tile {index}"))?;
        job_info = Some(match job_info {
            Some(info) => info.merge(&prepared.job_info),
            None => prepared.job_info.clone(),
        });
        calculations.push((calculator, prepared));
    }

    let job_info = job_info.context("There are no sites to split into tiles")?;

    // Share the worker pool between the tiles running at once
    let tile_pool_size = settings.tile_pool_size.clamp(1, calculations.len());
    let workers = workers_per_tile(settings.pool_size, tile_pool_size);
    for (calculator, prepared) in &mut calculations {
        calculator.pool_size = workers;
        calculator.concurrent_tasks = concurrent_tasks_per_tile(
            settings.concurrent_tasks,
            prepared.job_info.input_weight.value(),
            job_info.input_weight.value(),
        );
    }

    Ok((calculations, job_info))
}

/// Pre-execute a job and check it against the limits, without running it.
///
/// # Returns
///
/// The size of the whole job
pub fn validate_job(model: &Model, settings: &CalculationSettings) -> Result<JobInfo> {
    let (_, job_info) = prepare(model, settings)?;
    log_job_info(&job_info);
    settings.limits.check(&job_info)?;

    Ok(job_info)
}

/// Run a job, writing the results to `output_path`.
///
/// Limits are checked before anything is dispatched. When tiling, each tile writes its results to
/// its own `tile<i>` folder.
pub fn run_job(model: &Model, output_path: &Path, settings: &CalculationSettings) -> Result<()> {
    let (calculations, job_info) = prepare(model, settings)?;
    log_job_info(&job_info);
    settings.limits.check(&job_info)?;
    write_metadata(output_path, &model.job_dir, &job_info)?;

    if model.parameters.tiling.is_none() {
        for (calculator, prepared) in &calculations {
            calculator.run(prepared, output_path)?;
        }
        return Ok(());
    }

    let num_tiles = calculations.len();
    let tile_pool_size = settings.tile_pool_size.clamp(1, num_tiles);
    map_collect(&calculations, tile_pool_size, |_, (calculator, prepared)| {
        let index = calculator.tile.unwrap_or_default();
        info!(
            "Running tile {index}/{num_tiles} ({} site(s))",
            calculator.sites().len()
        );
        let tile_path = output_path.join(format!("tile{index}"));
        fs::create_dir_all(&tile_path).with_context(|| {
            format!("Failed to create output directory: {}", tile_path.display())
        })?;
        calculator
            .run(prepared, &tile_path)
            .with_context(|| format!("Tile {index} failed"))?;
        info!("Tile {index} complete");

        Ok::<_, anyhow::Error>(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{model, sites};
    use crate::geo::Point;
    use crate::site::Site;
    use crate::tiling::TilePolicy;
    use crate::units::SourceWeight;
    use float_cmp::approx_eq;
    use rstest::{fixture, rstest};
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[fixture]
    fn settings() -> CalculationSettings {
        CalculationSettings {
            pool_size: 2,
            concurrent_tasks: 4,
            tile_pool_size: 2,
            limits: WeightLimits::default(),
        }
    }

    #[rstest]
    fn test_pre_execute(model: Model) {
        let calculator = HazardCalculator::new(&model, 2, 4);
        let prepared = calculator.pre_execute().unwrap();
        assert!(!prepared.sources.is_empty());
        assert_eq!(prepared.job_info.num_sites, model.sites.len());
        assert_eq!(prepared.job_info.num_realizations, model.realizations.len());
        assert!(prepared.job_info.input_weight > SourceWeight(0.0));

        // Sources are sorted by ID within a TRT model
        for trt_model in model.source_groups.keys() {
            let ids: Vec<_> = prepared
                .sources
                .iter()
                .filter(|ws| &ws.source.trt_model == trt_model)
                .map(|ws| ws.source.id.clone())
                .collect();
            assert!(ids.is_sorted());
        }
    }

    #[rstest]
    fn test_pre_execute_empty_group(mut model: Model) {
        // Nothing is close to the only site
        model.sites = SiteCollection::new(vec![Site {
            id: "far".into(),
            location: Point::new(100.0, 50.0),
        }]);
        let calculator = HazardCalculator::new(&model, 2, 4);
        let prepared = calculator.pre_execute().unwrap();
        assert!(prepared.sources.is_empty());
        assert_eq!(prepared.job_info.input_weight, SourceWeight(0.0));
    }

    #[rstest]
    fn test_calculation_steps(mut model: Model) {
        model.parameters.mean_hazard_curves = true;
        model.parameters.quantile_hazard_curves = vec![0.5];
        model.parameters.poes = vec![0.01];

        let calculator = HazardCalculator::new(&model, 2, 4);
        let prepared = calculator.pre_execute().unwrap();
        let aggregator = calculator.execute(&prepared).unwrap();
        let mut results = calculator.post_execute(&aggregator);
        assert_eq!(results.rlz_curves.len(), model.realizations.len());
        for curves in &results.rlz_curves {
            assert_eq!(curves.len(), model.parameters.num_imts());
            assert!(curves.iter().all(ProbabilityArray::is_valid));
        }

        calculator.post_process(&mut results);
        assert!(results.statistics.mean.is_some());
        assert_eq!(results.statistics.quantiles.len(), 1);

        // One map per IMT for each realization, the mean and the quantile
        let num_curves = model.realizations.len() + 2;
        assert_eq!(
            results.hazard_maps.len(),
            num_curves * model.parameters.num_imts()
        );
    }

    #[rstest]
    fn test_execute_event_based(mut model: Model) {
        model.parameters.calculation_mode = CalculationMode::EventBased;
        let calculator = HazardCalculator::new(&model, 1, 1);
        let prepared = calculator.pre_execute().unwrap();
        assert!(calculator.execute(&prepared).is_err());
    }

    #[rstest]
    fn test_run_job(model: Model, settings: CalculationSettings) {
        let dir = tempdir().unwrap();
        run_job(&model, dir.path(), &settings).unwrap();
        assert!(dir.path().join("hazard_curves.csv").is_file());
        assert!(dir.path().join("metadata.toml").is_file());
    }

    #[rstest]
    fn test_run_job_limit_exceeded(model: Model, mut settings: CalculationSettings) {
        settings.limits.max_input_weight = Some(SourceWeight(1e-9));
        let dir = tempdir().unwrap();
        let err = run_job(&model, dir.path(), &settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HazardError>(),
            Some(HazardError::InputWeightLimitExceeded { .. })
        ));

        // Nothing was written
        assert!(!dir.path().join("hazard_curves.csv").exists());
    }

    /// The PoE of each (realization, site, IMT, IML) in a hazard curves file
    fn read_poes(path: &Path) -> HashMap<(String, String, String, String), f64> {
        csv::Reader::from_path(path)
            .unwrap()
            .records()
            .map(|record| {
                let record = record.unwrap();
                let key = (
                    record[0].to_string(),
                    record[1].to_string(),
                    record[4].to_string(),
                    record[5].to_string(),
                );
                (key, record[6].parse().unwrap())
            })
            .collect()
    }

    #[rstest]
    fn test_run_job_tiled(mut model: Model, settings: CalculationSettings, sites: SiteCollection) {
        let dir = tempdir().unwrap();
        run_job(&model, dir.path(), &settings).unwrap();
        let whole = read_poes(&dir.path().join("hazard_curves.csv"));

        model.parameters.tiling = Some(TilePolicy::Fixed { num_tiles: 2 });
        let dir = tempdir().unwrap();
        run_job(&model, dir.path(), &settings).unwrap();
        assert!(dir.path().join("tile1").join("hazard_curves.csv").is_file());
        assert!(dir.path().join("tile2").join("hazard_curves.csv").is_file());
        assert!(!dir.path().join("tile3").exists());

        // The tiles together give the same curves as the whole job
        let mut tiled = HashMap::new();
        for i in 1..=2 {
            let poes = read_poes(&dir.path().join(format!("tile{i}")).join("hazard_curves.csv"));
            let num_before = tiled.len();
            let num_rows = poes.len();
            tiled.extend(poes);

            // No site appears in more than one tile
            assert_eq!(tiled.len(), num_before + num_rows);
        }
        assert!(whole.len() > sites.len());
        assert_eq!(tiled.len(), whole.len());
        for (key, poe) in &whole {
            assert!(
                approx_eq!(f64, tiled[key], *poe, epsilon = 1e-12),
                "PoE differs for {key:?}: {} != {poe}",
                tiled[key]
            );
        }
        assert!(whole.values().any(|poe| *poe > 0.0));
    }

    #[rstest]
    fn test_validate_job_tiled(mut model: Model, settings: CalculationSettings) {
        let untiled = validate_job(&model, &settings).unwrap();
        model.parameters.tiling = Some(TilePolicy::Fixed { num_tiles: 3 });
        let tiled = validate_job(&model, &settings).unwrap();

        assert_eq!(tiled.num_sites, untiled.num_sites);
        assert!(approx_eq!(
            f64,
            tiled.output_weight.value(),
            untiled.output_weight.value(),
            epsilon = 1e-9
        ));
    }
}
