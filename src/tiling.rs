//! Splitting large site collections into tiles processed as independent calculations.
use crate::site::SiteCollection;
use anyhow::{Result, ensure};
use serde::Deserialize;

/// How many tiles to split the sites into
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TilePolicy {
    /// A fixed number of tiles
    Fixed {
        /// The number of tiles
        num_tiles: usize,
    },
    /// As many tiles as needed to keep the weight of each below a threshold
    Dynamic {
        /// Maximum weight of a tile
        max_tile_weight: f64,
    },
}

impl TilePolicy {
    /// Check the policy's parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed { num_tiles } => ensure!(*num_tiles > 0, "num_tiles cannot be zero"),
            Self::Dynamic { max_tile_weight } => ensure!(
                max_tile_weight.is_finite() && *max_tile_weight > 0.0,
                "max_tile_weight must be a finite number greater than zero"
            ),
        }

        Ok(())
    }

    /// The number of tiles for a calculation of the given total weight (at least 1)
    pub fn compute_tile_count(&self, estimated_weight: f64) -> usize {
        match self {
            Self::Fixed { num_tiles } => (*num_tiles).max(1),
            Self::Dynamic { max_tile_weight } => {
                ((estimated_weight / max_tile_weight).ceil() as usize).max(1)
            }
        }
    }
}

/// Estimate the weight of a calculation for tiling purposes
pub fn estimated_weight(num_sites: usize, num_levels: usize, num_realizations: usize) -> f64 {
    num_sites as f64 * num_levels as f64 * num_realizations as f64
}

/// A subset of the sites, processed on its own
#[derive(Debug, Clone, PartialEq)]
pub struct SiteTile {
    /// The position of the tile (from 1)
    pub index: usize,
    /// The sites in the tile
    pub sites: SiteCollection,
}

/// Split the sites into at most `num_tiles` contiguous tiles of near-equal size.
///
/// Site order is preserved and sizes differ by at most one. There are never more tiles than
/// sites.
pub fn split_sites(sites: &SiteCollection, num_tiles: usize) -> Vec<SiteTile> {
    let num_sites = sites.len();
    if num_sites == 0 {
        return Vec::new();
    }

    let num_tiles = num_tiles.clamp(1, num_sites);
    let base = num_sites / num_tiles;
    let extra = num_sites % num_tiles;

    let mut tiles = Vec::with_capacity(num_tiles);
    let mut start = 0;
    for i in 0..num_tiles {
        let size = base + usize::from(i < extra);
        tiles.push(SiteTile {
            index: i + 1,
            sites: sites.as_slice()[start..start + size].iter().cloned().collect(),
        });
        start += size;
    }

    tiles
}

/// Number of workers available to each tile when `tile_pool_size` tiles run at once
pub fn workers_per_tile(pool_size: usize, tile_pool_size: usize) -> usize {
    (pool_size / tile_pool_size.max(1)).max(1)
}

/// Scale the number of concurrent tasks down to a tile's share of the total weight
pub fn concurrent_tasks_per_tile(
    concurrent_tasks: usize,
    tile_weight: f64,
    total_weight: f64,
) -> usize {
    if total_weight <= 0.0 {
        return concurrent_tasks.max(1);
    }

    ((concurrent_tasks as f64 * tile_weight / total_weight).ceil() as usize).max(1)
}
