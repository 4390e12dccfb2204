//! Linear programming backend, using HiGHS.
//!
//! Variables are the flow along each route plus the unmet demand at each sink. Unmet demand is
//! penalised at the value of lost load, which must exceed any delivered cost for the solution to
//! be a maximum flow.
use super::{Deadline, Partition, PartitionSolver, SolveError};
use crate::units::MoneyPerVolume;
use highs::{HighsModelStatus, RowProblem as Problem, Sense};

type Variable = highs::Col;

/// Solves each partition as an LP with HiGHS
#[derive(Debug, Clone, Copy)]
pub struct LpSolver {
    /// Cost per unit of unmet demand
    pub value_of_lost_load: MoneyPerVolume,
}

impl PartitionSolver for LpSolver {
    fn solve(&self, partition: &Partition, deadline: &Deadline) -> Result<Vec<f64>, SolveError> {
        deadline.check()?;
        if partition.routes.is_empty() {
            return Ok(Vec::new());
        }

        let mut problem = Problem::default();
        let flow_vars: Vec<Variable> = partition
            .routes
            .iter()
            .map(|route| problem.add_column(route.unit_cost, 0.0..=route.capacity))
            .collect();
        let unmet_vars: Vec<Variable> = partition
            .sinks
            .iter()
            .map(|sink| problem.add_column(self.value_of_lost_load.value(), 0.0..=sink.demand))
            .collect();

        add_capacity_constraints(&mut problem, partition, &flow_vars);
        add_demand_constraints(&mut problem, partition, &flow_vars, &unmet_vars);

        let mut model = problem.optimise(Sense::Minimise);
        model.set_option("output_flag", false);
        if let Some(remaining) = deadline.remaining() {
            model.set_option("time_limit", remaining.as_secs_f64());
        }

        let solved = model
            .try_solve()
            .map_err(|status| SolveError::Backend(format!("{status:?}")))?;
        match solved.status() {
            HighsModelStatus::Optimal => {}
            HighsModelStatus::ReachedTimeLimit => {
                return Err(SolveError::Timeout {
                    limit: deadline.limit().unwrap_or_default(),
                });
            }
            status => return Err(SolveError::Backend(format!("{status:?}"))),
        }

        let solution = solved.get_solution();
        Ok(solution.columns()[..flow_vars.len()]
            .iter()
            .map(|&flow| flow.max(0.0))
            .collect())
    }
}

/// Limit the outflow of each source and each capacity group
fn add_capacity_constraints(problem: &mut Problem, partition: &Partition, flow_vars: &[Variable]) {
    let mut source_terms = vec![Vec::new(); partition.sources.len()];
    let mut group_terms = vec![Vec::new(); partition.groups.len()];
    for (route, &var) in partition.routes.iter().zip(flow_vars) {
        source_terms[route.source].push((var, 1.0));
        if let Some(group) = partition.sources[route.source].group {
            group_terms[group].push((var, 1.0));
        }
    }

    for (source, terms) in partition.sources.iter().zip(source_terms) {
        if !terms.is_empty() {
            problem.add_row(..=source.capacity, terms);
        }
    }
    for (&limit, terms) in partition.groups.iter().zip(group_terms) {
        if !terms.is_empty() {
            problem.add_row(..=limit, terms);
        }
    }
}

/// Inflow plus unmet demand must equal demand at each sink
fn add_demand_constraints(
    problem: &mut Problem,
    partition: &Partition,
    flow_vars: &[Variable],
    unmet_vars: &[Variable],
) {
    let mut sink_terms: Vec<Vec<_>> = unmet_vars.iter().map(|&var| vec![(var, 1.0)]).collect();
    for (route, &var) in partition.routes.iter().zip(flow_vars) {
        sink_terms[route.sink].push((var, 1.0));
    }

    for (sink, terms) in partition.sinks.iter().zip(sink_terms) {
        problem.add_row(sink.demand..=sink.demand, terms);
    }
}
