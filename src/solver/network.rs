//! The native transportation solver.
//!
//! Each partition is solved as a min-cost max-flow problem on a small residual network:
//!
//! ```text
//! SOURCE -> [cap group] -> source -> sink -> SINK
//! ```
//!
//! The solve has three steps:
//!
//! 1. Seed a feasible flow greedily, taking routes in order of unit cost. Ties are broken by source
//!    then sink identity, so the result is reproducible.
//! 2. Cancel negative-cost cycles in the residual network until none remain. The flow is then the
//!    cheapest possible for its volume.
//! 3. Augment along shortest paths from `SOURCE` to `SINK` until no path remains. Each step keeps
//!    the flow optimal for its volume, so the final flow is the cheapest maximum flow.
use super::{Deadline, Partition, PartitionSolver, SolveError};
use crate::tolerance::Tolerance;

/// Index of the super source in the residual network
const SOURCE: usize = 0;

/// Index of the super sink in the residual network
const SINK: usize = 1;

/// The native transportation solver
#[derive(Debug, Clone, Copy)]
pub struct NetworkSolver {
    /// Flows and cost improvements smaller than this are ignored
    pub tolerance: Tolerance,
    /// Maximum number of cycle cancellations plus augmentations
    pub max_iterations: usize,
}

impl PartitionSolver for NetworkSolver {
    fn solve(&self, partition: &Partition, deadline: &Deadline) -> Result<Vec<f64>, SolveError> {
        deadline.check()?;
        let mut network = ResidualNetwork::new(partition);
        let mut iterations = 0;
        let mut step = || {
            deadline.check()?;
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(SolveError::IterationLimit(self.max_iterations));
            }
            Ok(())
        };

        let eps = self.tolerance.0;
        network.seed(partition, eps);
        while let Some(cycle) = network.find_negative_cycle(eps) {
            step()?;
            network.push_along(&cycle);
        }
        while let Some(path) = network.find_shortest_path(eps) {
            step()?;
            network.push_along(&path);
        }

        Ok(network.route_flows(eps))
    }
}

/// A residual network. Arcs are stored in pairs, so the reverse of arc `a` is `a ^ 1`.
struct ResidualNetwork {
    tails: Vec<usize>,
    heads: Vec<usize>,
    residual: Vec<f64>,
    cost: Vec<f64>,
    node_count: usize,
    /// Arc from `SOURCE` (or the source's cap group) into each source
    supply_arcs: Vec<usize>,
    /// Arc from `SOURCE` into each cap group
    group_arcs: Vec<usize>,
    /// Arc for each route
    route_arcs: Vec<usize>,
    /// Arc from each sink into `SINK`
    demand_arcs: Vec<usize>,
}

impl ResidualNetwork {
    fn new(partition: &Partition) -> Self {
        let group_offset = 2;
        let source_offset = group_offset + partition.groups.len();
        let sink_offset = source_offset + partition.sources.len();
        let mut network = Self {
            tails: Vec::new(),
            heads: Vec::new(),
            residual: Vec::new(),
            cost: Vec::new(),
            node_count: sink_offset + partition.sinks.len(),
            supply_arcs: Vec::new(),
            group_arcs: Vec::new(),
            route_arcs: Vec::new(),
            demand_arcs: Vec::new(),
        };

        for &limit in &partition.groups {
            let arc = network.add_arc(SOURCE, network.group_arcs.len() + group_offset, limit, 0.0);
            network.group_arcs.push(arc);
        }
        for (i, source) in partition.sources.iter().enumerate() {
            let from = source.group.map_or(SOURCE, |group| group + group_offset);
            let arc = network.add_arc(from, source_offset + i, source.capacity, 0.0);
            network.supply_arcs.push(arc);
        }
        for route in &partition.routes {
            let arc = network.add_arc(
                source_offset + route.source,
                sink_offset + route.sink,
                route.capacity,
                route.unit_cost,
            );
            network.route_arcs.push(arc);
        }
        for (i, sink) in partition.sinks.iter().enumerate() {
            let arc = network.add_arc(sink_offset + i, SINK, sink.demand, 0.0);
            network.demand_arcs.push(arc);
        }

        network
    }

    fn add_arc(&mut self, from: usize, to: usize, capacity: f64, cost: f64) -> usize {
        let arc = self.heads.len();
        self.tails.extend([from, to]);
        self.heads.extend([to, from]);
        self.residual.extend([capacity, 0.0]);
        self.cost.extend([cost, -cost]);
        arc
    }

    fn push(&mut self, arc: usize, amount: f64) {
        self.residual[arc] -= amount;
        self.residual[arc ^ 1] += amount;
    }

    /// Push the largest possible amount along a path or cycle of arcs
    fn push_along(&mut self, arcs: &[usize]) {
        let amount = arcs
            .iter()
            .map(|&arc| self.residual[arc])
            .fold(f64::INFINITY, f64::min);
        for &arc in arcs {
            self.push(arc, amount);
        }
    }

    /// Greedy least-cost seeding
    fn seed(&mut self, partition: &Partition, eps: f64) {
        let mut order: Vec<_> = (0..partition.routes.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&partition.routes[a], &partition.routes[b]);
            ra.unit_cost
                .total_cmp(&rb.unit_cost)
                .then(ra.source.cmp(&rb.source))
                .then(ra.sink.cmp(&rb.sink))
        });

        for i in order {
            let route = &partition.routes[i];
            let mut path = vec![
                self.supply_arcs[route.source],
                self.route_arcs[i],
                self.demand_arcs[route.sink],
            ];
            if let Some(group) = partition.sources[route.source].group {
                path.insert(0, self.group_arcs[group]);
            }

            let amount = path
                .iter()
                .map(|&arc| self.residual[arc])
                .fold(f64::INFINITY, f64::min);
            if amount > eps {
                for arc in path {
                    self.push(arc, amount);
                }
            }
        }
    }

    /// Find a cycle of negative cost using Bellman-Ford from a virtual root joined to every node
    fn find_negative_cycle(&self, eps: f64) -> Option<Vec<usize>> {
        let mut dist = vec![0.0; self.node_count];
        let mut pred: Vec<Option<usize>> = vec![None; self.node_count];
        let mut last_relaxed = None;
        for _ in 0..self.node_count {
            last_relaxed = self.relax_all(&mut dist, &mut pred, eps);
            last_relaxed?;
        }

        // Still relaxing after n passes: walk back n steps to land on the cycle
        let mut node = last_relaxed?;
        for _ in 0..self.node_count {
            node = self.tails[pred[node]?];
        }

        let start = node;
        let mut cycle = Vec::new();
        loop {
            let arc = pred[node]?;
            cycle.push(arc);
            node = self.tails[arc];
            if node == start {
                break;
            }
        }
        cycle.reverse();

        Some(cycle)
    }

    /// Find the cheapest path from `SOURCE` to `SINK` with spare residual capacity
    fn find_shortest_path(&self, eps: f64) -> Option<Vec<usize>> {
        let mut dist = vec![f64::INFINITY; self.node_count];
        let mut pred: Vec<Option<usize>> = vec![None; self.node_count];
        dist[SOURCE] = 0.0;
        for _ in 0..self.node_count {
            if self.relax_all(&mut dist, &mut pred, eps).is_none() {
                break;
            }
        }
        if dist[SINK].is_infinite() {
            return None;
        }

        let mut path = Vec::new();
        let mut node = SINK;
        while node != SOURCE {
            let arc = pred[node]?;
            path.push(arc);
            node = self.tails[arc];
            if path.len() > self.node_count {
                return None;
            }
        }
        path.reverse();

        Some(path)
    }

    /// One Bellman-Ford pass over every arc with spare capacity, returning the last node relaxed
    fn relax_all(&self, dist: &mut [f64], pred: &mut [Option<usize>], eps: f64) -> Option<usize> {
        let mut relaxed = None;
        for arc in 0..self.heads.len() {
            if self.residual[arc] <= eps {
                continue;
            }
            let (u, v) = (self.tails[arc], self.heads[arc]);
            if dist[u].is_infinite() {
                continue;
            }
            let candidate = dist[u] + self.cost[arc];
            if candidate < dist[v] - eps {
                dist[v] = candidate;
                pred[v] = Some(arc);
                relaxed = Some(v);
            }
        }

        relaxed
    }

    /// Flow along each route, with negligible flows set to zero
    fn route_flows(&self, eps: f64) -> Vec<f64> {
        self.route_arcs
            .iter()
            .map(|&arc| {
                let flow = self.residual[arc ^ 1];
                if flow > eps { flow } else { 0.0 }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::partition::{Route, Sink, Source};
    use petgraph::graph::{EdgeIndex, NodeIndex};
    use rstest::rstest;

    fn solver() -> NetworkSolver {
        NetworkSolver {
            tolerance: Tolerance::default(),
            max_iterations: 1000,
        }
    }

    /// A partition from (capacity, group) sources, demands and (source, sink, cost) routes
    fn partition(
        sources: &[(f64, Option<usize>)],
        groups: &[f64],
        demands: &[f64],
        routes: &[(usize, usize, f64)],
    ) -> Partition {
        Partition {
            name: "test".into(),
            sources: sources
                .iter()
                .enumerate()
                .map(|(i, &(capacity, group))| Source {
                    node: NodeIndex::new(i),
                    capacity,
                    group,
                })
                .collect(),
            groups: groups.to_vec(),
            sinks: demands
                .iter()
                .enumerate()
                .map(|(i, &demand)| Sink {
                    node: NodeIndex::new(100 + i),
                    commodity: "scrap".into(),
                    demand,
                })
                .collect(),
            routes: routes
                .iter()
                .enumerate()
                .map(|(i, &(source, sink, unit_cost))| Route {
                    edge: EdgeIndex::new(i),
                    source,
                    sink,
                    capacity: f64::INFINITY,
                    unit_cost,
                })
                .collect(),
        }
    }

    #[rstest]
    #[case(120.0, [100.0, 20.0])]
    #[case(200.0, [100.0, 50.0])]
    #[case(0.0, [0.0, 0.0])]
    fn test_two_suppliers(#[case] demand: f64, #[case] expected: [f64; 2]) {
        let partition = partition(
            &[(100.0, None), (50.0, None)],
            &[],
            &[demand],
            &[(0, 0, 3.0), (1, 0, 5.0)],
        );
        let flows = solver().solve(&partition, &Deadline::new(None)).unwrap();
        assert_eq!(flows, expected);
    }

    #[test]
    fn test_greedy_is_refined() {
        // Greedy sends the cheap source to the first sink, leaving the second sink with only the
        // expensive route. Rerouting gives a cheaper total.
        //   s0 -> k0: 1, s0 -> k1: 2, s1 -> k0: 2, s1 -> k1: 10
        let partition = partition(
            &[(10.0, None), (10.0, None)],
            &[],
            &[10.0, 10.0],
            &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 10.0)],
        );
        let flows = solver().solve(&partition, &Deadline::new(None)).unwrap();
        let cost: f64 = flows
            .iter()
            .zip(&partition.routes)
            .map(|(flow, route)| flow * route.unit_cost)
            .sum();
        assert_eq!(cost, 10.0 * 2.0 + 10.0 * 2.0);
        assert_eq!(flows, [0.0, 10.0, 10.0, 0.0]);
    }

    #[test]
    fn test_maximises_flow() {
        // Greedy fills k0 from s0, stranding k1 which only s0 can reach. Max flow reroutes.
        let partition = partition(
            &[(10.0, None), (10.0, None)],
            &[],
            &[10.0, 10.0],
            &[(0, 0, 1.0), (0, 1, 5.0), (1, 0, 3.0)],
        );
        let flows = solver().solve(&partition, &Deadline::new(None)).unwrap();
        assert_eq!(flows, [0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_shared_cap() {
        let partition = partition(
            &[(100.0, Some(0)), (50.0, Some(0)), (50.0, None)],
            &[80.0],
            &[120.0],
            &[(0, 0, 3.0), (1, 0, 4.0), (2, 0, 5.0)],
        );
        let flows = solver().solve(&partition, &Deadline::new(None)).unwrap();
        assert_eq!(flows, [80.0, 0.0, 40.0]);
    }

    #[test]
    fn test_tie_break_by_source() {
        let partition = partition(
            &[(100.0, None), (100.0, None)],
            &[],
            &[50.0],
            &[(0, 0, 3.0), (1, 0, 3.0)],
        );
        let flows = solver().solve(&partition, &Deadline::new(None)).unwrap();
        assert_eq!(flows, [50.0, 0.0]);
    }

    #[test]
    fn test_iteration_limit() {
        let partition = partition(
            &[(10.0, None), (10.0, None)],
            &[],
            &[10.0, 10.0],
            &[(0, 0, 1.0), (0, 1, 5.0), (1, 0, 3.0)],
        );
        let solver = NetworkSolver {
            max_iterations: 0,
            ..solver()
        };
        assert!(matches!(
            solver.solve(&partition, &Deadline::new(None)),
            Err(SolveError::IterationLimit(0))
        ));
    }

    #[test]
    fn test_timeout() {
        let partition = partition(
            &[(10.0, None), (10.0, None)],
            &[],
            &[10.0, 10.0],
            &[(0, 0, 1.0), (0, 1, 5.0), (1, 0, 3.0)],
        );
        let deadline = Deadline::new(Some(std::time::Duration::ZERO));
        assert!(matches!(
            solver().solve(&partition, &deadline),
            Err(SolveError::Timeout { .. })
        ));
    }
}
