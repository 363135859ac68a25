//! Code for loading program settings.
use crate::calculation::CalculationSettings;
use crate::get_psha_config_dir;
use crate::input::read_toml;
use crate::limits::WeightLimits;
use crate::log::DEFAULT_LOG_LEVEL;
use crate::pool::default_pool_size;
use crate::units::{OutputWeight, SourceWeight};
use anyhow::{Context, Result, ensure};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# This file contains the program settings for the PSHA \
engine.
# Uncomment a line to change the corresponding setting.
";

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Default number of blocks to split the sources into
const fn default_concurrent_tasks() -> usize {
    64
}

/// Default number of tiles run at once
const fn default_tile_pool_size() -> usize {
    16
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_psha_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to overwrite output files by default
    #[serde(default)]
    pub overwrite: bool,
    /// Abort if the total weight of the sources is above this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_weight: Option<f64>,
    /// Abort if the expected output weight is above this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_weight: Option<f64>,
    /// The maximum number of tasks to run at once (defaults to the number of CPUs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
    /// The number of blocks to aim for when splitting the sources
    #[serde(default = "default_concurrent_tasks")]
    pub concurrent_tasks: usize,
    /// The maximum number of tiles to run at once
    #[serde(default = "default_tile_pool_size")]
    pub tile_pool_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            max_input_weight: None,
            max_output_weight: None,
            pool_size: None,
            concurrent_tasks: default_concurrent_tasks(),
            tile_pool_size: default_tile_pool_size(),
        }
    }
}

impl Settings {
    /// Read the contents of the settings file.
    ///
    /// If the file is not present, default values for settings will be used
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    /// Read from the specified path, falling back on defaults if there is no file
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        settings.validate().context("Invalid program settings")?;

        Ok(settings)
    }

    /// Check the values of the settings
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_input_weight", self.max_input_weight),
            ("max_output_weight", self.max_output_weight),
        ] {
            if let Some(value) = value {
                ensure!(
                    value.is_finite() && value > 0.0,
                    "{name} must be a finite number greater than zero"
                );
            }
        }
        ensure!(self.pool_size != Some(0), "pool_size cannot be zero");
        ensure!(self.concurrent_tasks > 0, "concurrent_tasks cannot be zero");
        ensure!(self.tile_pool_size > 0, "tile_pool_size cannot be zero");

        Ok(())
    }

    /// The ceilings on the size of a job
    pub fn limits(&self) -> WeightLimits {
        WeightLimits {
            max_input_weight: self.max_input_weight.map(SourceWeight),
            max_output_weight: self.max_output_weight.map(OutputWeight),
        }
    }

    /// The settings used to run a calculation
    pub fn calculation_settings(&self) -> CalculationSettings {
        CalculationSettings {
            pool_size: self.pool_size.unwrap_or_else(default_pool_size),
            concurrent_tasks: self.concurrent_tasks,
            tile_pool_size: self.tile_pool_size,
            limits: self.limits(),
        }
    }

    /// The contents of the default settings file
    pub fn default_file_contents() -> String {
        // Convert default settings to TOML
        let settings_raw = toml::to_string(&Settings::default()).unwrap_or_default();

        // Iterate through the generated TOML, commenting out lines and adding docs
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.split('\n') {
            if let Some(last) = line.find('=') {
                // Add documentation from doc comments
                let field = line[..last].trim();

                // Use doc comment to document parameter. All fields have doc comments.
                let docs = Settings::get_field_docs(field).unwrap_or_default();
                for line in docs.split('\n') {
                    let _ = write!(&mut out, "\n# # {}\n", line.trim());
                }

                let _ = writeln!(&mut out, "# {}", line.trim());
            }
        }

        out
    }
}
