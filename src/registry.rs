//! The registry of solver strategies.
//!
//! Describes which strategies exist and whether they are implemented, validates a requested
//! configuration and reports metadata for it. The solver consults the registry before solving;
//! the CLI uses it for diagnostics.
use crate::settings::{SolverSettings, available_workers};
use crate::solver::Backend;
use crate::tolerance::Tolerance;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::fmt;
use std::time::Duration;
use strum::IntoEnumIterator;

/// A strategy for solving the allocation problem.
///
/// All implemented strategies give the same total cost and volume, within tolerance.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    DeserializeLabeledStringEnum,
    SerializeLabeledStringEnum,
    strum::EnumIter,
)]
pub enum StrategyKind {
    /// A single solve over the whole graph
    #[default]
    #[string = "baseline"]
    Baseline,
    /// Independent partitions solved concurrently on a worker pool
    #[string = "parallel"]
    Parallel,
    /// Commodity layers solved in sequence
    #[string = "gasplan"]
    Gasplan,
    /// Commodity layers in sequence, with each layer's partitions solved concurrently
    #[string = "parallel_gasplan"]
    ParallelGasplan,
    /// Partitions solved on remote workers
    #[string = "distributed"]
    Distributed,
}

/// Whether a strategy can be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Availability {
    /// The strategy can be used
    Implemented,
    /// The strategy is recognised but cannot be used yet
    Planned,
}

/// What dominates a strategy's memory use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryProfile {
    /// One problem covering the whole graph
    WholeGraph,
    /// One problem per worker, each covering a single partition
    PerWorkerPartition,
    /// One problem covering the largest commodity layer
    LargestLayer,
}

impl fmt::Display for MemoryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::WholeGraph => "whole graph in one problem",
            Self::PerWorkerPartition => "one partition per worker",
            Self::LargestLayer => "largest commodity layer",
        };
        write!(f, "{description}")
    }
}

impl StrategyKind {
    /// Whether the strategy can be used
    pub fn availability(self) -> Availability {
        match self {
            Self::Distributed => Availability::Planned,
            _ => Availability::Implemented,
        }
    }

    /// Whether the strategy solves partitions on a worker pool
    pub fn is_parallel(self) -> bool {
        matches!(self, Self::Parallel | Self::ParallelGasplan | Self::Distributed)
    }

    /// What dominates the strategy's memory use
    pub fn memory_profile(self) -> MemoryProfile {
        match self {
            Self::Baseline => MemoryProfile::WholeGraph,
            Self::Parallel | Self::ParallelGasplan | Self::Distributed => {
                MemoryProfile::PerWorkerPartition
            }
            Self::Gasplan => MemoryProfile::LargestLayer,
        }
    }

    /// A one-line description of the strategy
    pub fn description(self) -> &'static str {
        match self {
            Self::Baseline => "single solve over the whole graph",
            Self::Parallel => "independent commodity partitions solved on a worker pool",
            Self::Gasplan => "commodity layers solved in sequence",
            Self::ParallelGasplan => "commodity layers in sequence, partitions on a worker pool",
            Self::Distributed => "partitions solved on remote workers",
        }
    }
}

/// A registry entry
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// The strategy
    pub strategy: StrategyKind,
    /// Whether it can be used
    pub availability: Availability,
    /// Whether it uses a worker pool
    pub parallel: bool,
    /// What dominates its memory use
    pub memory_profile: MemoryProfile,
    /// Short description
    pub description: &'static str,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<18}{:<13}{}",
            self.strategy.to_string(),
            self.availability.to_string(),
            self.description
        )
    }
}

/// All known strategies, implemented or not
pub fn capabilities() -> Vec<Capability> {
    StrategyKind::iter()
        .map(|strategy| Capability {
            strategy,
            availability: strategy.availability(),
            parallel: strategy.is_parallel(),
            memory_profile: strategy.memory_profile(),
            description: strategy.description(),
        })
        .collect()
}

/// The outcome of validating a solver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigReport {
    /// The requested strategy
    pub strategy: StrategyKind,
    /// Whether the strategy is implemented
    pub implemented: bool,
    /// Problems which do not prevent a solve
    pub warnings: Vec<String>,
    /// Problems which prevent a solve
    pub errors: Vec<String>,
}

impl ConfigReport {
    /// Whether a solve can go ahead with this configuration
    pub fn is_valid(&self) -> bool {
        self.implemented && self.errors.is_empty()
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_valid() { "valid" } else { "invalid" };
        writeln!(f, "Configuration for strategy {}: {status}", self.strategy)?;
        if !self.implemented {
            writeln!(f, "  error: strategy is planned but not yet implemented")?;
        }
        for error in &self.errors {
            writeln!(f, "  error: {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {warning}")?;
        }

        Ok(())
    }
}

/// Validate a solver configuration
pub fn validate_config(settings: &SolverSettings) -> ConfigReport {
    let strategy = settings.strategy;
    let mut warnings = Vec::new();
    if let Some(workers) = settings.workers {
        if !strategy.is_parallel() {
            warnings.push(format!(
                "workers is set to {workers} but the {strategy} strategy runs on a single thread"
            ));
        } else if workers > available_workers() {
            warnings.push(format!(
                "workers is set to {workers}, more than the {} CPUs available",
                available_workers()
            ));
        }
    }

    ConfigReport {
        strategy,
        implemented: strategy.availability() == Availability::Implemented,
        warnings,
        errors: settings.validation_errors(),
    }
}

/// Descriptive metadata for a solver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SolverMetadata {
    /// The strategy
    pub strategy: StrategyKind,
    /// The per-partition backend
    pub backend: Backend,
    /// Number of threads used to solve partitions
    pub workers: usize,
    /// What dominates memory use
    pub memory_profile: MemoryProfile,
    /// The solve time limit, if any
    pub timeout: Option<Duration>,
    /// The numeric tolerance
    pub tolerance: Tolerance,
}

impl fmt::Display for SolverMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "strategy:       {}", self.strategy)?;
        writeln!(f, "backend:        {}", self.backend)?;
        writeln!(f, "workers:        {}", self.workers)?;
        writeln!(f, "memory profile: {}", self.memory_profile)?;
        match self.timeout {
            Some(timeout) => writeln!(f, "timeout:        {}s", timeout.as_secs_f64())?,
            None => writeln!(f, "timeout:        none")?,
        }
        writeln!(f, "tolerance:      {:e}", self.tolerance.0)
    }
}

/// Describe how a solve would run with the given settings
pub fn describe(settings: &SolverSettings) -> SolverMetadata {
    let strategy = settings.strategy;
    SolverMetadata {
        strategy,
        backend: settings.backend,
        workers: if strategy.is_parallel() {
            settings.workers()
        } else {
            1
        },
        memory_profile: strategy.memory_profile(),
        timeout: settings.timeout(),
        tolerance: settings.tolerance,
    }
}
