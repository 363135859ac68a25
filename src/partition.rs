//! Partitioning of weighted sources into balanced blocks of work.
//!
//! Sources are grouped by TRT model and each group is split into contiguous blocks so that the
//! total number of blocks is close to a hint (the number of concurrent tasks). Groups get a share
//! of the blocks proportional to their weight and, within a group, blocks are cut on the
//! cumulative weight so that each has close to `group weight / blocks for group`.
use crate::source::{Source, TrtModelID};
use crate::units::SourceWeight;
use indexmap::IndexMap;
use std::mem;
use std::sync::Arc;

/// A source paired with its weight
#[derive(Debug, Clone)]
pub struct WeightedSource {
    /// The source
    pub source: Arc<Source>,
    /// The cost of processing the source
    pub weight: SourceWeight,
}

/// A contiguous subset of the sources of one TRT model, processed by a single task
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// The TRT model shared by all the sources in the block
    pub trt_model: TrtModelID,
    /// The sources in the block
    pub sources: Vec<Arc<Source>>,
    /// Total weight of the sources in the block
    pub weight: SourceWeight,
}

impl Block {
    fn new(trt_model: TrtModelID) -> Self {
        Self {
            trt_model,
            sources: Vec::new(),
            weight: SourceWeight::default(),
        }
    }

    fn push(&mut self, source: &WeightedSource) {
        self.sources.push(Arc::clone(&source.source));
        self.weight += source.weight;
    }

    /// The number of sources in the block
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the block has no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A container for sources of different TRT models
#[derive(Debug, Clone, Default)]
pub struct AllSources {
    sources: Vec<WeightedSource>,
}

impl AllSources {
    /// Collect a source, together with its weight
    pub fn append(&mut self, source: Arc<Source>, weight: SourceWeight) {
        self.sources.push(WeightedSource { source, weight });
    }

    /// The number of sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether there are no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The total weight of the sources
    pub fn total_weight(&self) -> SourceWeight {
        self.sources.iter().map(|s| s.weight).sum()
    }

    /// Iterate over the sources with their weights
    pub fn iter(&self) -> impl Iterator<Item = &WeightedSource> {
        self.sources.iter()
    }

    /// Split the sources in a number of blocks close to the given `hint`
    pub fn split(&self, hint: usize) -> Vec<Block> {
        split_in_blocks(&self.sources, hint)
    }
}

/// Split sources into blocks, never mixing TRT models within a block.
///
/// Groups appear in the order of their first source and the relative order of sources is
/// preserved. Every source ends up in exactly one block. An empty input gives no blocks.
///
/// # Arguments
///
/// * `sources` - The sources with their weights
/// * `hint` - The desired number of blocks (values below 1 are treated as 1)
pub fn split_in_blocks(sources: &[WeightedSource], hint: usize) -> Vec<Block> {
    if sources.is_empty() {
        return Vec::new();
    }

    let hint = hint.max(1);
    let mut groups: IndexMap<&TrtModelID, Vec<&WeightedSource>> = IndexMap::new();
    for source in sources {
        groups
            .entry(&source.source.trt_model)
            .or_default()
            .push(source);
    }

    // If no source has any weight, fall back on balancing by number of sources
    let total_weight: SourceWeight = sources.iter().map(|s| s.weight).sum();
    let share_of = |members: &[&WeightedSource]| {
        if total_weight.value() > 0.0 {
            members.iter().map(|s| s.weight).sum::<SourceWeight>() / total_weight
        } else {
            members.len() as f64 / sources.len() as f64
        }
    };

    let mut blocks = Vec::new();
    for (trt_model, members) in groups {
        let num_blocks = ((hint as f64 * share_of(&members)).round() as usize).clamp(1, members.len());
        split_group(trt_model, &members, num_blocks, &mut blocks);
    }

    blocks
}

/// Split the sources of one group into `num_blocks` contiguous blocks of near-equal weight.
///
/// Each source goes to the block in which the midpoint of its weight falls, which keeps blocks
/// contiguous and their weights within one source of the target.
fn split_group(
    trt_model: &TrtModelID,
    members: &[&WeightedSource],
    num_blocks: usize,
    blocks: &mut Vec<Block>,
) {
    let use_counts = members.iter().all(|s| s.weight.value() <= 0.0);
    let weight_of = |source: &WeightedSource| {
        if use_counts {
            1.0
        } else {
            source.weight.value()
        }
    };
    let group_weight: f64 = members.iter().map(|s| weight_of(s)).sum();
    let target = group_weight / num_blocks as f64;

    let mut current = Block::new(trt_model.clone());
    let mut slot = 0;
    let mut cumulative = 0.0;
    for source in members {
        let weight = weight_of(source);
        let source_slot = (((cumulative + weight / 2.0) / target) as usize).min(num_blocks - 1);
        if source_slot > slot {
            if !current.is_empty() {
                blocks.push(mem::replace(&mut current, Block::new(trt_model.clone())));
            }
            slot = source_slot;
        }
        current.push(source);
        cumulative += weight;
    }

    if !current.is_empty() {
        blocks.push(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::point_source;
    use float_cmp::assert_approx_eq;
    use itertools::Itertools;
    use rstest::{fixture, rstest};

    /// Create sources for the given (TRT model, weight) pairs
    fn make_sources(template: &Source, layout: &[(&str, f64)]) -> Vec<WeightedSource> {
        layout.iter()
            .enumerate()
            .map(|(i, (trt_model, weight))| {
                let mut source = template.clone();
                source.id = format!("src{i}").into();
                source.trt_model = (*trt_model).into();
                WeightedSource {
                    source: Arc::new(source),
                    weight: SourceWeight(*weight),
                }
            })
            .collect()
    }

    #[fixture]
    fn mixed_sources(point_source: Source) -> Vec<WeightedSource> {
        let layout = [
            ("active", 4.0),
            ("stable", 1.0),
            ("active", 2.0),
            ("active", 6.0),
            ("stable", 3.0),
            ("subduction", 0.5),
            ("active", 1.0),
            ("stable", 2.0),
            ("active", 3.0),
            ("stable", 2.0),
        ];
        make_sources(&point_source, &layout)
    }

    /// Check every source appears exactly once and no block mixes TRT models
    fn assert_complete(sources: &[WeightedSource], blocks: &[Block]) {
        let ids_in = sources.iter().map(|s| s.source.id.clone()).sorted().collect_vec();
        let ids_out = blocks
            .iter()
            .flat_map(|b| b.sources.iter().map(|s| s.id.clone()))
            .sorted()
            .collect_vec();
        assert_eq!(ids_in, ids_out);

        for block in blocks {
            assert!(!block.is_empty());
            assert!(block.sources.iter().all(|s| s.trt_model == block.trt_model));
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(4)]
    #[case(7)]
    #[case(100)]
    fn test_split_in_blocks_complete(mixed_sources: Vec<WeightedSource>, #[case] hint: usize) {
        let blocks = split_in_blocks(&mixed_sources, hint);
        assert_complete(&mixed_sources, &blocks);
    }

    #[rstest]
    fn test_split_in_blocks_preserves_order(mixed_sources: Vec<WeightedSource>) {
        let blocks = split_in_blocks(&mixed_sources, 5);

        // Groups in order of first appearance
        let trt_models = blocks.iter().map(|b| b.trt_model.to_string()).dedup().collect_vec();
        assert_eq!(trt_models, ["active", "stable", "subduction"]);

        // Sources within a group keep their relative order
        let active = blocks
            .iter()
            .filter(|b| b.trt_model.to_string() == "active")
            .flat_map(|b| b.sources.iter().map(|s| s.id.to_string()))
            .collect_vec();
        assert_eq!(active, ["src0", "src2", "src3", "src6", "src8"]);
    }

    #[rstest]
    fn test_split_in_blocks_weights(mixed_sources: Vec<WeightedSource>) {
        let blocks = split_in_blocks(&mixed_sources, 4);

        // Block weights add up to the group weights
        for trt_model in ["active", "stable", "subduction"] {
            let group_weight: f64 = mixed_sources
                .iter()
                .filter(|s| s.source.trt_model.to_string() == trt_model)
                .map(|s| s.weight.value())
                .sum();
            let block_weight: f64 = blocks
                .iter()
                .filter(|b| b.trt_model.to_string() == trt_model)
                .map(|b| b.weight.value())
                .sum();
            assert_approx_eq!(f64, group_weight, block_weight);
        }

        // The heaviest group (active, weight 16 of 24.5) gets more than one block
        let num_active = blocks
            .iter()
            .filter(|b| b.trt_model.to_string() == "active")
            .count();
        assert!(num_active >= 2);
    }

    #[rstest]
    fn test_split_group_balanced(point_source: Source) {
        let sources = make_sources(&point_source, &[("active", 1.0); 12]);
        let blocks = split_in_blocks(&sources, 4);
        assert_eq!(blocks.len(), 4);
        assert!(blocks.iter().all(|b| b.len() == 3));
    }

    #[rstest]
    fn test_split_in_blocks_zero_weight(point_source: Source) {
        let sources = make_sources(&point_source, &[("active", 0.0); 6]);
        let blocks = split_in_blocks(&sources, 3);
        assert_complete(&sources, &blocks);
        assert_eq!(blocks.len(), 3);
    }

    #[rstest]
    fn test_split_in_blocks_hint_zero(mixed_sources: Vec<WeightedSource>) {
        let blocks = split_in_blocks(&mixed_sources, 0);
        assert_complete(&mixed_sources, &blocks);

        // One block per group
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn test_split_in_blocks_empty() {
        assert!(split_in_blocks(&[], 10).is_empty());
        assert!(AllSources::default().split(10).is_empty());
    }

    #[rstest]
    fn test_all_sources(point_source: Source) {
        let mut all_sources = AllSources::default();
        all_sources.append(Arc::new(point_source.clone()), SourceWeight(2.0));
        all_sources.append(Arc::new(point_source), SourceWeight(3.0));
        assert_eq!(all_sources.len(), 2);
        assert_eq!(all_sources.total_weight(), SourceWeight(5.0));
        assert_eq!(all_sources.split(1).len(), 1);
    }
}
