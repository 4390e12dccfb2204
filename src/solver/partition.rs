//! Partitions of the flow graph into independent transportation problems.
//!
//! A partition holds the sources, sinks and routes for some set of commodities, in a stable order
//! derived from node identities. Sources may belong to a capacity group (a shared cap).
use super::SolveError;
use crate::allocation::{Allocation, AllocationResult, CommodityAllocations};
use crate::commodity::CommodityID;
use crate::graph::FlowGraph;
use crate::tolerance::Tolerance;
use crate::units::Volume;
use itertools::Itertools;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::unionfind::UnionFind;
use std::collections::{BTreeMap, HashMap};

/// A node supplying a commodity
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// The node in the flow graph
    pub node: NodeIndex,
    /// Maximum outflow
    pub capacity: f64,
    /// Index of the capacity group this source belongs to, if any
    pub group: Option<usize>,
}

/// A node's demand for one commodity
#[derive(Debug, Clone, PartialEq)]
pub struct Sink {
    /// The node in the flow graph
    pub node: NodeIndex,
    /// The commodity demanded
    pub commodity: CommodityID,
    /// Maximum inflow
    pub demand: f64,
}

/// A permitted flow from a source to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// The edge in the flow graph
    pub edge: EdgeIndex,
    /// Index into [`Partition::sources`]
    pub source: usize,
    /// Index into [`Partition::sinks`]
    pub sink: usize,
    /// Maximum flow
    pub capacity: f64,
    /// Delivered cost per unit
    pub unit_cost: f64,
}

/// An independent transportation problem
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// A name identifying the partition in errors and logs
    pub name: String,
    /// Sources, ordered by node identity
    pub sources: Vec<Source>,
    /// Limits for each capacity group
    pub groups: Vec<f64>,
    /// Sinks, ordered by commodity then node identity
    pub sinks: Vec<Sink>,
    /// Routes, ordered by source then sink
    pub routes: Vec<Route>,
}

impl Partition {
    /// A partition covering the given commodities in full
    pub fn for_commodities(graph: &FlowGraph, name: &str, commodities: &[CommodityID]) -> Self {
        Self::from_graph(graph, name, commodities, |_| true)
    }

    /// A partition covering the given commodities, restricted to the selected nodes
    fn from_graph<F>(graph: &FlowGraph, name: &str, commodities: &[CommodityID], include: F) -> Self
    where
        F: Fn(NodeIndex) -> bool,
    {
        let nodes: Vec<_> = graph
            .node_indices()
            .filter(|&idx| include(idx))
            .sorted_by(|&a, &b| graph.node(a).node.cmp(&graph.node(b).node))
            .collect();

        // Capacity groups
        let mut groups = Vec::new();
        let mut group_of = HashMap::new();
        for cap in graph
            .shared_caps()
            .iter()
            .filter(|cap| commodities.contains(&cap.commodity))
        {
            let members: Vec<_> = cap.members.iter().filter(|&&idx| include(idx)).collect();
            if members.is_empty() {
                continue;
            }
            for &member in members {
                group_of.insert(member, groups.len());
            }
            groups.push(cap.limit.value());
        }

        let mut source_index = HashMap::new();
        let mut sources = Vec::new();
        for &idx in &nodes {
            let Some(supply) = &graph.node(idx).supply else {
                continue;
            };
            if commodities.contains(&supply.commodity) {
                source_index.insert(idx, sources.len());
                sources.push(Source {
                    node: idx,
                    capacity: supply.capacity.value(),
                    group: group_of.get(&idx).copied(),
                });
            }
        }

        let mut sinks: Vec<_> = nodes
            .iter()
            .flat_map(|&idx| {
                graph
                    .node(idx)
                    .demand
                    .iter()
                    .filter(|(commodity, _)| commodities.contains(commodity))
                    .map(move |(commodity, demand)| Sink {
                        node: idx,
                        commodity: commodity.clone(),
                        demand: demand.value(),
                    })
            })
            .collect();
        sinks.sort_by(|a, b| {
            a.commodity
                .cmp(&b.commodity)
                .then_with(|| graph.node(a.node).node.cmp(&graph.node(b.node).node))
        });
        let sink_index: HashMap<_, _> = sinks
            .iter()
            .enumerate()
            .map(|(i, sink)| ((sink.node, sink.commodity.clone()), i))
            .collect();

        let mut routes: Vec<_> = graph
            .iter_edges()
            .filter_map(|(edge_idx, from, to, edge)| {
                let source = *source_index.get(&from)?;
                let sink = *sink_index.get(&(to, edge.commodity.clone()))?;
                Some(Route {
                    edge: edge_idx,
                    source,
                    sink,
                    capacity: edge.capacity.value(),
                    unit_cost: edge.unit_cost.total().value(),
                })
            })
            .collect();
        routes.sort_by_key(|route| (route.source, route.sink));

        Self {
            name: name.to_string(),
            sources,
            groups,
            sinks,
            routes,
        }
    }

    /// Check that the flows satisfy every capacity and demand bound
    pub fn check_feasible(&self, flows: &[f64], tolerance: Tolerance) -> Result<(), SolveError> {
        if flows.len() != self.routes.len() {
            return Err(SolveError::Infeasible(format!(
                "expected {} flows, got {}",
                self.routes.len(),
                flows.len()
            )));
        }

        let mut outflow = vec![0.0; self.sources.len()];
        let mut group_outflow = vec![0.0; self.groups.len()];
        let mut inflow = vec![0.0; self.sinks.len()];
        for (route, &flow) in self.routes.iter().zip(flows) {
            if !flow.is_finite() || !tolerance.le(0.0, flow) || !tolerance.le(flow, route.capacity)
            {
                return Err(SolveError::Infeasible(format!(
                    "flow {flow} on route {} is outside [0, {}]",
                    route.edge.index(),
                    route.capacity
                )));
            }
            outflow[route.source] += flow;
            if let Some(group) = self.sources[route.source].group {
                group_outflow[group] += flow;
            }
            inflow[route.sink] += flow;
        }

        for (source, total) in self.sources.iter().zip(outflow) {
            if !tolerance.le(total, source.capacity) {
                return Err(SolveError::Infeasible(format!(
                    "outflow {total} exceeds capacity {} of source {}",
                    source.capacity,
                    source.node.index()
                )));
            }
        }
        for (limit, total) in self.groups.iter().zip(group_outflow) {
            if !tolerance.le(total, *limit) {
                return Err(SolveError::Infeasible(format!(
                    "outflow {total} exceeds shared cap {limit}"
                )));
            }
        }
        for (sink, total) in self.sinks.iter().zip(inflow) {
            if !tolerance.le(total, sink.demand) {
                return Err(SolveError::Infeasible(format!(
                    "inflow {total} of {} exceeds demand {} of sink {}",
                    sink.commodity,
                    sink.demand,
                    sink.node.index()
                )));
            }
        }

        Ok(())
    }

    /// Convert solved flows into allocations and shortfall.
    ///
    /// Flows indistinguishable from zero are dropped.
    pub fn to_result(
        &self,
        graph: &FlowGraph,
        flows: &[f64],
        tolerance: Tolerance,
    ) -> Result<AllocationResult, SolveError> {
        let mut by_commodity: BTreeMap<CommodityID, CommodityAllocations> = BTreeMap::new();
        let mut inflow = vec![0.0; self.sinks.len()];
        for (route, &flow) in self.routes.iter().zip(flows) {
            if tolerance.is_zero(flow) {
                continue;
            }
            let sink = &self.sinks[route.sink];
            let from = graph.node(self.sources[route.source].node).node.clone();
            let to = graph.node(sink.node).node.clone();
            by_commodity
                .entry(sink.commodity.clone())
                .or_insert_with(|| CommodityAllocations::new(sink.commodity.clone()))
                .insert(from, to, Allocation::new(Volume(flow), graph.edge(route.edge)))?;
            inflow[route.sink] += flow;
        }

        let mut result = AllocationResult::new();
        for allocations in by_commodity.into_values() {
            result.add_allocations(allocations)?;
        }
        for (sink, received) in self.sinks.iter().zip(inflow) {
            let unmet = sink.demand - received;
            if unmet > tolerance.margin(sink.demand) {
                result.add_shortfall(
                    sink.commodity.clone(),
                    graph.node(sink.node).node.clone(),
                    Volume(unmet),
                )?;
            }
        }

        Ok(result)
    }
}

/// Split one commodity's part of the graph into its connected components.
///
/// Sources and sinks are connected by routes, and sources sharing a cap are connected to each
/// other. Components without any demand have nothing to allocate and are omitted.
pub fn components(graph: &FlowGraph, commodity: &CommodityID) -> Vec<Partition> {
    let node_count = graph.node_indices().count();
    let mut sets = UnionFind::<usize>::new(node_count);
    for (_, from, to, _) in graph.iter_edges_for(commodity) {
        sets.union(from.index(), to.index());
    }
    for cap in graph
        .shared_caps()
        .iter()
        .filter(|cap| cap.commodity == *commodity)
    {
        for (a, b) in cap.members.iter().tuple_windows() {
            sets.union(a.index(), b.index());
        }
    }

    // Group the nodes demanding this commodity, in order of first appearance
    let mut component_of_root: HashMap<usize, usize> = HashMap::new();
    let mut members: Vec<Vec<NodeIndex>> = Vec::new();
    for idx in graph.node_indices() {
        if graph.node(idx).demand.contains_key(commodity) {
            let root = sets.find_mut(idx.index());
            let component = *component_of_root.entry(root).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[component].push(idx);
        }
    }

    let count = members.len();
    let commodities = [commodity.clone()];
    members
        .iter()
        .enumerate()
        .map(|(i, nodes)| {
            let root = sets.find(nodes[0].index());
            let name = if count == 1 {
                commodity.to_string()
            } else {
                format!("{commodity}#{}", i + 1)
            };
            Partition::from_graph(graph, &name, &commodities, |idx| {
                sets.find(idx.index()) == root
            })
        })
        .collect()
}
