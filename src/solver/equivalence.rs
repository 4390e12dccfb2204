//! Checks that a strategy agrees with the baseline on total delivered cost and volume.
use super::{SolveError, solve};
use crate::graph::FlowGraph;
use crate::registry::StrategyKind;
use crate::settings::SolverSettings;
use crate::tolerance::Tolerance;
use crate::units::{Money, Volume};
use log::warn;
use std::fmt;

/// The outcome of comparing a candidate strategy against the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct EquivalenceReport {
    /// The candidate strategy
    pub strategy: StrategyKind,
    /// Total delivered cost with the baseline strategy
    pub baseline_cost: Money,
    /// Total delivered cost with the candidate strategy
    pub candidate_cost: Money,
    /// Total volume with the baseline strategy
    pub baseline_volume: Volume,
    /// Total volume with the candidate strategy
    pub candidate_volume: Volume,
    /// Relative difference in cost
    pub cost_difference: f64,
    /// Relative difference in volume
    pub volume_difference: f64,
    /// The tolerance the differences were checked against
    pub tolerance: Tolerance,
}

impl EquivalenceReport {
    /// Whether both differences are within tolerance
    pub fn is_equivalent(&self) -> bool {
        self.cost_difference <= self.tolerance.0 && self.volume_difference <= self.tolerance.0
    }
}

impl fmt::Display for EquivalenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs baseline: cost {} vs {} (relative difference {:e}), volume {} vs {} \
            (relative difference {:e})",
            self.strategy,
            self.candidate_cost,
            self.baseline_cost,
            self.cost_difference,
            self.candidate_volume,
            self.baseline_volume,
            self.volume_difference
        )
    }
}

/// Solve with the baseline and with `candidate`, and compare the results.
///
/// All other settings are shared between the two solves. A difference beyond tolerance is a
/// defect in the candidate strategy; it is logged and reported rather than returned as an error.
pub fn check_equivalence(
    graph: &FlowGraph,
    settings: &SolverSettings,
    candidate: StrategyKind,
) -> Result<EquivalenceReport, SolveError> {
    let baseline_settings = SolverSettings {
        strategy: StrategyKind::Baseline,
        workers: None,
        ..settings.clone()
    };
    let candidate_settings = SolverSettings {
        strategy: candidate,
        ..settings.clone()
    };
    let baseline = solve(graph, &baseline_settings)?;
    let result = solve(graph, &candidate_settings)?;

    let (baseline_cost, candidate_cost) = (baseline.total_cost(), result.total_cost());
    let (baseline_volume, candidate_volume) = (baseline.total_volume(), result.total_volume());
    let report = EquivalenceReport {
        strategy: candidate,
        baseline_cost,
        candidate_cost,
        baseline_volume,
        candidate_volume,
        cost_difference: Tolerance::relative_difference(
            baseline_cost.value(),
            candidate_cost.value(),
        ),
        volume_difference: Tolerance::relative_difference(
            baseline_volume.value(),
            candidate_volume.value(),
        ),
        tolerance: settings.tolerance,
    };
    if !report.is_equivalent() {
        warn!("Strategy results differ beyond tolerance: {report}");
    }

    Ok(report)
}
