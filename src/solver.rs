//! The allocation solver: computes a minimum-cost feasible allocation of supply to demand for one
//! year, using one of several interchangeable strategies.
//!
//! Every strategy splits the flow graph into [`Partition`]s, solves each with the selected
//! backend and merges the fragments. Strategies differ only in how they partition and whether
//! partitions run on the worker pool; the economic outcome is the same.
use crate::allocation::{AllocationResult, MergeError};
use crate::graph::FlowGraph;
use crate::registry::{StrategyKind, validate_config};
use crate::settings::SolverSettings;
use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod equivalence;
pub mod lp;
pub mod network;
pub mod partition;
pub use equivalence::{EquivalenceReport, check_equivalence};
pub use partition::Partition;

/// Errors which can occur during a solve
#[derive(Debug, Error)]
pub enum SolveError {
    /// The requested configuration is invalid or not implemented
    #[error("Invalid solver configuration: {0}")]
    Configuration(String),
    /// The solve did not finish within the configured time limit
    #[error("Solve exceeded time limit of {}s", limit.as_secs_f64())]
    Timeout {
        /// The configured limit
        limit: Duration,
    },
    /// Solving one partition failed
    #[error("Failed to solve partition {partition}")]
    Partition {
        /// Name of the failed partition
        partition: String,
        /// Why it failed
        #[source]
        source: Box<SolveError>,
    },
    /// The LP backend did not return an optimal solution
    #[error("LP backend could not solve: {0}")]
    Backend(String),
    /// The native solver did not converge within the iteration limit
    #[error("Solver did not converge within {0} iterations")]
    IterationLimit(usize),
    /// A solution violated a constraint
    #[error("Solution is infeasible: {0}")]
    Infeasible(String),
    /// Partition fragments overlapped when merged
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// The worker pool could not be created
    #[error("Could not create worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl SolveError {
    /// Whether the caller may retry (e.g. with the baseline strategy)
    pub fn is_recoverable(&self) -> bool {
        match self {
            SolveError::Timeout { .. } => true,
            SolveError::Partition { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

/// The algorithm used to solve each partition
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    DeserializeLabeledStringEnum,
    SerializeLabeledStringEnum,
)]
pub enum Backend {
    /// Native transportation solver (least-cost seeding, then optimality refinement)
    #[default]
    #[string = "network"]
    Network,
    /// Linear programme solved with HiGHS
    #[string = "highs"]
    Highs,
}

/// A solve deadline.
///
/// Backends check this periodically and abandon the solve once it has passed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// A deadline `limit` from now (or none)
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    /// The configured time limit
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.start.elapsed()))
    }

    /// Fail if the deadline has passed
    pub fn check(&self) -> Result<(), SolveError> {
        match self.limit {
            Some(limit) if self.start.elapsed() >= limit => Err(SolveError::Timeout { limit }),
            _ => Ok(()),
        }
    }
}

/// Solves a single partition, returning the flow along each of its routes
pub trait PartitionSolver: Sync {
    /// Solve the partition
    fn solve(&self, partition: &Partition, deadline: &Deadline) -> Result<Vec<f64>, SolveError>;
}

/// Solve the allocation problem for one year.
///
/// The configuration is validated first; a planned or invalid strategy fails here, before any
/// worker is spawned. If any partition fails the whole solve fails, and no partial result is
/// returned.
pub fn solve(graph: &FlowGraph, settings: &SolverSettings) -> Result<AllocationResult, SolveError> {
    let report = validate_config(settings);
    if !report.implemented {
        return Err(SolveError::Configuration(format!(
            "strategy {} is planned but not yet implemented",
            settings.strategy
        )));
    }
    if !report.errors.is_empty() {
        return Err(SolveError::Configuration(report.errors.join("; ")));
    }

    let deadline = Deadline::new(settings.timeout());
    let stages = plan_stages(graph, settings.strategy);
    let pool = if settings.strategy.is_parallel() {
        Some(
            ThreadPoolBuilder::new()
                .num_threads(settings.workers())
                .build()?,
        )
    } else {
        None
    };

    let backend = backend_for(settings);
    let mut result = AllocationResult::new();
    for (i, stage) in stages.iter().enumerate() {
        deadline.check()?;
        debug!("Solving stage {i} ({} partitions)", stage.len());
        let fragments = solve_stage(
            graph,
            stage,
            backend.as_ref(),
            settings,
            &deadline,
            pool.as_ref(),
        )?;
        for fragment in fragments {
            result.merge(fragment)?;
        }
    }

    for allocations in result.iter() {
        let shortfall = result.total_shortfall(allocations.commodity());
        if shortfall.value() > 0.0 {
            info!(
                "Unmet demand for {} in {}: {shortfall}",
                allocations.commodity(),
                graph.year()
            );
        }
    }
    info!(
        "Solved {} commodities for {} with {} strategy: volume {}, cost {}",
        graph.commodities().len(),
        graph.year(),
        settings.strategy,
        result.total_volume(),
        result.total_cost()
    );

    Ok(result)
}

/// The backend selected by the settings
fn backend_for(settings: &SolverSettings) -> Box<dyn PartitionSolver> {
    match settings.backend {
        Backend::Network => Box::new(network::NetworkSolver {
            tolerance: settings.tolerance,
            max_iterations: settings.max_iterations,
        }),
        Backend::Highs => Box::new(lp::LpSolver {
            value_of_lost_load: settings.value_of_lost_load,
        }),
    }
}

/// Split the graph into stages of partitions. Stages are solved in order; the partitions within a
/// stage are independent.
fn plan_stages(graph: &FlowGraph, strategy: StrategyKind) -> Vec<Vec<Partition>> {
    let commodities: Vec<_> = graph.commodities().into_iter().collect();
    match strategy {
        StrategyKind::Baseline => {
            vec![vec![Partition::for_commodities(graph, "all", &commodities)]]
        }
        StrategyKind::Parallel => vec![
            commodities
                .iter()
                .flat_map(|commodity| partition::components(graph, commodity))
                .collect(),
        ],
        StrategyKind::Gasplan => graph
            .commodity_layers()
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                vec![Partition::for_commodities(
                    graph,
                    &format!("layer{i}"),
                    layer,
                )]
            })
            .collect(),
        StrategyKind::ParallelGasplan => graph
            .commodity_layers()
            .iter()
            .map(|layer| {
                layer
                    .iter()
                    .flat_map(|commodity| partition::components(graph, commodity))
                    .collect()
            })
            .collect(),
        StrategyKind::Distributed => unreachable!("Planned strategies are rejected before solving"),
    }
}

/// Solve every partition in a stage, on the worker pool if there is one.
///
/// Workers only read the graph and their own partition. All results are collected before any
/// are inspected, and the first failure (in partition order) fails the stage.
fn solve_stage(
    graph: &FlowGraph,
    stage: &[Partition],
    backend: &dyn PartitionSolver,
    settings: &SolverSettings,
    deadline: &Deadline,
    pool: Option<&ThreadPool>,
) -> Result<Vec<AllocationResult>, SolveError> {
    let solve_one = |partition: &Partition| {
        solve_partition(graph, partition, backend, settings, deadline).map_err(|err| {
            SolveError::Partition {
                partition: partition.name.clone(),
                source: Box::new(err),
            }
        })
    };

    let results: Vec<_> = match pool {
        Some(pool) => pool.install(|| stage.par_iter().map(solve_one).collect()),
        None => stage.iter().map(solve_one).collect(),
    };

    results.into_iter().collect()
}

fn solve_partition(
    graph: &FlowGraph,
    partition: &Partition,
    backend: &dyn PartitionSolver,
    settings: &SolverSettings,
    deadline: &Deadline,
) -> Result<AllocationResult, SolveError> {
    let start = Instant::now();
    let flows = backend.solve(partition, deadline)?;
    partition.check_feasible(&flows, settings.tolerance)?;
    let result = partition.to_result(graph, &flows, settings.tolerance)?;
    debug!(
        "Solved partition {} ({} routes) in {:?}",
        partition.name,
        partition.routes.len(),
        start.elapsed()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::DemandCenter;
    use crate::fixture::{
        FIXTURE_YEAR, ScenarioInputs, demand_center, scrap_scenario, steel_scenario, supplier,
    };
    use crate::graph::NodeRef;
    use crate::id::into_id_map;
    use crate::region::Location;
    use crate::supplier::Supplier;
    use crate::trade::TransportKPI;
    use crate::units::{EmissionsPerVolume, Money, MoneyPerVolume, Volume};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn settings(strategy: StrategyKind, backend: Backend) -> SolverSettings {
        SolverSettings {
            strategy,
            backend,
            workers: strategy.is_parallel().then_some(2),
            ..Default::default()
        }
    }

    #[rstest]
    fn test_scrap_example(
        scrap_scenario: ScenarioInputs,
        #[values(Backend::Network, Backend::Highs)] backend: Backend,
    ) {
        let result = solve(
            &scrap_scenario.graph(),
            &settings(StrategyKind::Baseline, backend),
        )
        .unwrap();

        let scrap = result.allocations(&"scrap".into()).unwrap();
        let (a, b, d) = (
            NodeRef::Supplier("A".into()),
            NodeRef::Supplier("B".into()),
            NodeRef::Demand("D".into()),
        );
        assert_approx_eq!(f64, scrap.get(&a, &d).unwrap().volume.value(), 100.0, epsilon = 1e-6);
        assert_approx_eq!(f64, scrap.get(&b, &d).unwrap().volume.value(), 20.0, epsilon = 1e-6);
        assert_approx_eq!(f64, result.total_cost().value(), 400.0, epsilon = 1e-6);
        assert_eq!(result.total_shortfall(&"scrap".into()), Volume(0.0));
    }

    #[rstest]
    fn test_scrap_shortfall(
        mut scrap_scenario: ScenarioInputs,
        #[values(Backend::Network, Backend::Highs)] backend: Backend,
    ) {
        scrap_scenario.demand_centers[0]
            .demand
            .insert((2030, "scrap".into()), Volume(200.0));
        let result = solve(
            &scrap_scenario.graph(),
            &settings(StrategyKind::Baseline, backend),
        )
        .unwrap();

        let scrap = result.allocations(&"scrap".into()).unwrap();
        assert_approx_eq!(f64, scrap.total_volume().value(), 150.0, epsilon = 1e-6);
        assert_approx_eq!(
            f64,
            result.total_shortfall(&"scrap".into()).value(),
            50.0,
            epsilon = 1e-6
        );
        assert_approx_eq!(f64, result.total_cost().value(), 550.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_strategies_agree(
        steel_scenario: ScenarioInputs,
        #[values(
            StrategyKind::Parallel,
            StrategyKind::Gasplan,
            StrategyKind::ParallelGasplan
        )]
        strategy: StrategyKind,
    ) {
        let graph = steel_scenario.graph();
        let baseline = solve(&graph, &settings(StrategyKind::Baseline, Backend::Network)).unwrap();
        let candidate = solve(&graph, &settings(strategy, Backend::Network)).unwrap();

        assert_approx_eq!(
            f64,
            baseline.total_cost().value(),
            candidate.total_cost().value(),
            epsilon = 1e-6
        );
        assert_approx_eq!(
            f64,
            baseline.total_volume().value(),
            candidate.total_volume().value(),
            epsilon = 1e-6
        );
    }

    #[rstest]
    fn test_planned_strategy_rejected(scrap_scenario: ScenarioInputs) {
        let err = solve(
            &scrap_scenario.graph(),
            &settings(StrategyKind::Distributed, Backend::Network),
        )
        .unwrap_err();
        assert!(matches!(err, SolveError::Configuration(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_is_recoverable() {
        let timeout = SolveError::Timeout {
            limit: Duration::from_secs(1),
        };
        assert!(timeout.is_recoverable());
        let wrapped = SolveError::Partition {
            partition: "scrap".into(),
            source: Box::new(timeout),
        };
        assert!(wrapped.is_recoverable());
        assert_eq!(wrapped.to_string(), "Failed to solve partition scrap");
        assert!(!SolveError::IterationLimit(10).is_recoverable());
    }

    /// Two independent copies of a market where least-cost seeding leaves a negative cycle, so the
    /// native solver needs two cancellations
    fn crossed_markets(mut scenario: ScenarioInputs) -> ScenarioInputs {
        let costs = [
            [1.0, 2.0, 100.0, 100.0],
            [2.0, 10.0, 100.0, 100.0],
            [100.0, 100.0, 1.0, 2.0],
            [100.0, 100.0, 2.0, 10.0],
        ];
        let located = |id: String| Location::in_region(&id.to_uppercase());
        scenario.suppliers = into_id_map((0..4).map(|i| Supplier {
            location: located(format!("s{i}")),
            ..supplier(&format!("s{i}"), "scrap", FIXTURE_YEAR, 10.0, 0.0)
        }))
        .unwrap();
        scenario.demand_centers = into_id_map((0..4).map(|i| DemandCenter {
            location: located(format!("k{i}")),
            ..demand_center(&format!("k{i}"), "scrap", FIXTURE_YEAR, 10.0)
        }))
        .unwrap();
        for (i, row) in costs.iter().enumerate() {
            for (j, &cost) in row.iter().enumerate() {
                scenario.transport_kpis.insert(
                    format!("S{i}").into(),
                    format!("K{j}").into(),
                    "scrap".into(),
                    TransportKPI {
                        ghg_factor: EmissionsPerVolume(0.0),
                        transportation_cost: MoneyPerVolume(cost),
                    },
                );
            }
        }

        scenario
    }

    #[rstest]
    fn test_crossed_markets(scrap_scenario: ScenarioInputs) {
        let graph = crossed_markets(scrap_scenario).graph();
        let result = solve(&graph, &settings(StrategyKind::Baseline, Backend::Network)).unwrap();
        assert_approx_eq!(f64, result.total_cost().value(), 80.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_worker_failure_fails_solve(scrap_scenario: ScenarioInputs) {
        let graph = crossed_markets(scrap_scenario).graph();
        let settings = SolverSettings {
            max_iterations: 1,
            ..settings(StrategyKind::Parallel, Backend::Network)
        };

        let Err(SolveError::Partition { partition, source }) = solve(&graph, &settings) else {
            panic!("Expected the solve to fail with a partition error");
        };
        assert_eq!(partition, "scrap");
        assert!(matches!(*source, SolveError::IterationLimit(1)));
    }

    #[test]
    fn test_deadline() {
        assert!(Deadline::new(None).check().is_ok());
        assert_eq!(Deadline::new(None).remaining(), None);

        let deadline = Deadline::new(Some(Duration::ZERO));
        assert!(matches!(deadline.check(), Err(SolveError::Timeout { .. })));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[rstest]
    fn test_empty_graph(mut scrap_scenario: ScenarioInputs) {
        scrap_scenario.demand_centers.clear();
        let result = solve(
            &scrap_scenario.graph(),
            &settings(StrategyKind::Baseline, Backend::Network),
        )
        .unwrap();
        assert_eq!(result.total_cost(), Money(0.0));
    }
}
