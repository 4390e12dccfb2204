//! Code for loading solver settings.
use crate::commodity::CommodityID;
use crate::log::{DEFAULT_LOG_LEVEL, parse_log_level};
use crate::registry::StrategyKind;
use crate::solver::Backend;
use crate::tolerance::{DEFAULT_TOLERANCE, Tolerance};
use crate::units::MoneyPerVolume;
use anyhow::{Context, Result, ensure};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// The conventional name for a settings file
pub const SETTINGS_FILE_NAME: &str = "tradeflow.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# Solver settings for tradeflow
# Every setting is optional; uncomment a line to override the default.
";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_log_level, String, DEFAULT_LOG_LEVEL.to_string());
define_param_default!(default_tolerance, Tolerance, Tolerance(DEFAULT_TOLERANCE));
define_param_default!(default_max_iterations, usize, 100_000);
define_param_default!(default_value_of_lost_load, MoneyPerVolume, MoneyPerVolume(1e9));
define_param_default!(
    default_primary_products,
    Vec<CommodityID>,
    vec!["steel".into(), "iron".into()]
);

/// Settings for a solve
#[derive(Debug, Clone, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct SolverSettings {
    /// The program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// The solver strategy (baseline, parallel, gasplan or parallel_gasplan)
    #[serde(default)]
    pub strategy: StrategyKind,
    /// The algorithm used for each partition (network or highs)
    #[serde(default)]
    pub backend: Backend,
    /// Number of workers for parallel strategies (defaults to the number of CPUs)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Time limit for a solve, in seconds (defaults to no limit)
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
    /// Relative tolerance for feasibility checks and strategy comparisons
    #[serde(default = "default_tolerance")]
    pub tolerance: Tolerance,
    /// Maximum number of improving steps for the network solver, per partition
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// The cost applied to unmet demand by the highs backend.
    ///
    /// Must be greater than any delivered cost.
    #[serde(default = "default_value_of_lost_load")]
    pub value_of_lost_load: MoneyPerVolume,
    /// Products which must be producible by some enabled technology
    #[serde(default = "default_primary_products")]
    pub primary_products: Vec<CommodityID>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            strategy: StrategyKind::default(),
            backend: Backend::default(),
            workers: None,
            timeout_seconds: None,
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            value_of_lost_load: default_value_of_lost_load(),
            primary_products: default_primary_products(),
        }
    }
}

/// Check that the `log_level` parameter is valid
fn check_log_level(value: &str) -> Result<()> {
    parse_log_level(value)?;

    Ok(())
}

/// Check that the `workers` parameter is valid
fn check_workers(value: Option<usize>) -> Result<()> {
    ensure!(value != Some(0), "workers cannot be zero");

    Ok(())
}

/// Check that the `timeout_seconds` parameter is valid
fn check_timeout_seconds(value: Option<f64>) -> Result<()> {
    if let Some(value) = value {
        ensure!(
            value.is_finite() && value > 0.0,
            "timeout_seconds must be a finite number greater than zero"
        );
    }

    Ok(())
}

/// Check that the `tolerance` parameter is valid
fn check_tolerance(value: Tolerance) -> Result<()> {
    ensure!(
        value.0.is_finite() && value.0 >= 0.0,
        "tolerance must be a finite, non-negative number"
    );

    Ok(())
}

/// Check that the `max_iterations` parameter is valid
fn check_max_iterations(value: usize) -> Result<()> {
    ensure!(value > 0, "max_iterations cannot be zero");

    Ok(())
}

/// Check that the `value_of_lost_load` parameter is valid
fn check_value_of_lost_load(value: MoneyPerVolume) -> Result<()> {
    ensure!(
        value.is_finite() && value > MoneyPerVolume(0.0),
        "value_of_lost_load must be a finite number greater than zero"
    );

    Ok(())
}

impl SolverSettings {
    /// Read settings from the specified file.
    ///
    /// If the file is not present, default values for settings will be used.
    ///
    /// # Returns
    ///
    /// The settings or an error if the file is invalid
    pub fn load_from_path(file_path: &Path) -> Result<SolverSettings> {
        if !file_path.is_file() {
            return Ok(SolverSettings::default());
        }

        let settings: SolverSettings = read_toml(file_path)?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", file_path.display()))?;

        Ok(settings)
    }

    /// The result of checking each parameter
    fn checks(&self) -> [Result<()>; 6] {
        [
            check_log_level(&self.log_level),
            check_workers(self.workers),
            check_timeout_seconds(self.timeout_seconds),
            check_tolerance(self.tolerance),
            check_max_iterations(self.max_iterations),
            check_value_of_lost_load(self.value_of_lost_load),
        ]
    }

    /// Check the settings, failing on the first invalid parameter
    pub fn validate(&self) -> Result<()> {
        for result in self.checks() {
            result?;
        }

        Ok(())
    }

    /// Messages for every invalid parameter
    pub fn validation_errors(&self) -> Vec<String> {
        self.checks()
            .into_iter()
            .filter_map(Result::err)
            .map(|err| err.to_string())
            .collect()
    }

    /// The number of workers to use for parallel strategies
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(available_workers)
    }

    /// The solve time limit, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// The contents of the default settings file
    pub fn default_file_contents() -> String {
        // Settings object with default values set by serde
        let settings: SolverSettings =
            toml::from_str("").expect("Cannot create settings from empty TOML file");

        // Convert to TOML
        let settings_raw = toml::to_string(&settings).expect("Could not convert settings to TOML");

        // Iterate through the generated TOML, commenting out lines and adding docs
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.split('\n') {
            if let Some(last) = line.find('=') {
                let field = line[..last].trim();

                // All fields should have doc comments
                let docs =
                    SolverSettings::get_field_docs(field).expect("Missing doc comment for field");
                for line in docs.split('\n') {
                    write!(&mut out, "\n# # {}\n", line.trim()).unwrap();
                }

                writeln!(&mut out, "# {}", line.trim()).unwrap();
            }
        }

        out
    }
}

/// The number of CPUs available, or one if this is unknown
pub fn available_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Read and deserialise a TOML file
fn read_toml<T: serde::de::DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path)
        .with_context(|| format!("Could not read file {}", file_path.display()))?;
    let toml_data = toml::from_str(&toml_str)
        .with_context(|| format!("Could not parse TOML in {}", file_path.display()))?;

    Ok(toml_data)
}
