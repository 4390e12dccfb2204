//! Layering of commodities by the producer input -> output graph, used by the gasplan strategies
use super::{FlowGraph, NodeRef};
use crate::commodity::CommodityID;
use petgraph::algo::{condensation, toposort};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::{Directed, Direction};
use std::collections::HashMap;

/// Graph with commodities as nodes and an edge from each producer input to its output
type CommodityGraph = Graph<CommodityID, (), Directed>;

/// Group the flow graph's commodities into layers.
///
/// Raw inputs (e.g. iron ore, natural gas) come first, then the commodities made from them (e.g.
/// iron from a DRI or BF producer), and so on downstream to finished products. Commodities which
/// feed each other in a cycle end up in the same layer. A layer only depends on earlier layers, so
/// layers can be solved in order, with the commodities in each layer solved independently.
///
/// Layers and the commodities within them are returned in a deterministic order.
pub fn commodity_layers(graph: &FlowGraph) -> Vec<Vec<CommodityID>> {
    let commodity_graph = build_commodity_graph(graph);

    // Condense strongly connected components so that what remains is acyclic
    let condensed = condensation(commodity_graph, true);

    // Cannot fail, as cycles were compressed above
    let Ok(order) = toposort(&condensed, None) else {
        unreachable!("Condensed commodity graph contains a cycle")
    };

    let mut ranks: HashMap<NodeIndex, usize> = condensed.node_indices().map(|n| (n, 0)).collect();
    for &u in &order {
        let rank = ranks[&u];
        for v in condensed.neighbors_directed(u, Direction::Outgoing) {
            if let Some(r) = ranks.get_mut(&v) {
                *r = (*r).max(rank + 1);
            }
        }
    }

    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<CommodityID>> = vec![Vec::new(); max_rank + 1];
    for node in condensed.node_indices() {
        layers[ranks[&node]].extend(condensed[node].iter().cloned());
    }
    for layer in &mut layers {
        layer.sort();
    }
    layers.retain(|layer| !layer.is_empty());

    layers
}

fn build_commodity_graph(graph: &FlowGraph) -> CommodityGraph {
    let mut commodity_graph = CommodityGraph::new();
    let indices: HashMap<CommodityID, NodeIndex> = graph
        .commodities()
        .into_iter()
        .map(|commodity| (commodity.clone(), commodity_graph.add_node(commodity)))
        .collect();

    for idx in graph.node_indices() {
        let node = graph.node(idx);
        if !matches!(node.node, NodeRef::Producer(_)) {
            continue;
        }
        let Some(supply) = &node.supply else {
            continue;
        };

        let output = indices[&supply.commodity];
        for input in node.demand.keys() {
            commodity_graph.update_edge(indices[input], output, ());
        }
    }

    commodity_graph
}
