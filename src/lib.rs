//! Common functionality for the PSHA engine.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod calculation;
pub mod cli;
pub mod curve;
pub mod error;
pub mod geo;
pub mod ground_motion;
pub mod hazard_map;
pub mod id;
pub mod input;
pub mod limits;
pub mod log;
pub mod model;
pub mod output;
pub mod partition;
pub mod pool;
pub mod realization;
pub mod settings;
pub mod site;
pub mod source;
pub mod statistics;
pub mod task;
pub mod tiling;
pub mod units;
pub mod weight;

#[cfg(test)]
mod fixture;

/// Get the path to the configuration directory for the program.
///
/// Falls back on the current directory if the platform has no notion of a config directory.
pub fn get_psha_config_dir() -> PathBuf {
    let Some(mut dir) = dirs::config_dir() else {
        return PathBuf::new();
    };
    dir.push("psha");
    dir
}
