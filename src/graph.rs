//! Module for building the commodity flow graph for a single year's solve.
//!
//! Nodes are suppliers (real or virtual), producers and demand centres; edges are legal commodity
//! transfers annotated with their delivered unit cost and a capacity bound. The graph is stored in
//! an arena (a petgraph [`Graph`]) and nodes are referred to by index, so cycles in the process
//! network pose no problem.
use crate::commodity::CommodityID;
use crate::connector::{ConnectorSet, LegalProcessConnector, ProcessNode};
use crate::demand::{DemandCenterID, DemandCenterMap};
use crate::producer::{ProducerID, ProducerMap};
use crate::region::{Location, RegionID};
use crate::supplier::{Supplier, SupplierID, SupplierMap};
use crate::technology::{EnabledTechnologies, TechnologyMap};
use crate::trade::{
    CarbonCostSchedule, FeedstockConstraint, Tariff, TransportKPIMap, tariff_effect,
};
use crate::units::{EmissionsPerVolume, MoneyPerVolume, Volume};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info};
use petgraph::Directed;
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;

mod layering;

/// The underlying arena graph
type FlowArena = Graph<FlowNode, FlowEdge, Directed>;

/// The stable identity of a node in the flow graph.
///
/// The ordering of this type is used to break ties between otherwise equal alternatives, so that
/// repeated solves on identical input give identical results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    /// A modelled supplier
    Supplier(SupplierID),
    /// A supplier synthesised for a secondary-feedstock constraint, existing for one solve only
    VirtualSupplier(SupplierID),
    /// A producer
    Producer(ProducerID),
    /// A demand centre
    Demand(DemandCenterID),
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRef::Supplier(id) => write!(f, "supplier:{id}"),
            NodeRef::VirtualSupplier(id) => write!(f, "virtual:{id}"),
            NodeRef::Producer(id) => write!(f, "producer:{id}"),
            NodeRef::Demand(id) => write!(f, "demand:{id}"),
        }
    }
}

/// What a node can supply
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSupply {
    /// The commodity supplied
    pub commodity: CommodityID,
    /// Maximum volume for the year
    pub capacity: Volume,
    /// Cost of producing one unit
    pub production_cost: MoneyPerVolume,
}

/// A node in the flow graph
#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    /// The node's identity
    pub node: NodeRef,
    /// Where the node is located
    pub region: RegionID,
    /// The process this node represents, for matching against connectors
    pub process: ProcessNode,
    /// What the node supplies, if anything
    pub supply: Option<NodeSupply>,
    /// Volume required of each commodity
    pub demand: IndexMap<CommodityID, Volume>,
}

/// Breakdown of the delivered cost of one unit along an edge
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnitCost {
    /// Production cost at the source
    pub production: MoneyPerVolume,
    /// Transport cost between regions
    pub transport: MoneyPerVolume,
    /// Tariff adder
    pub tariff: MoneyPerVolume,
    /// Carbon cost of transport emissions
    pub carbon: MoneyPerVolume,
}

impl UnitCost {
    /// Total delivered cost per unit
    pub fn total(&self) -> MoneyPerVolume {
        self.production + self.transport + self.tariff + self.carbon
    }
}

/// An edge in the flow graph: a permitted transfer of one commodity
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    /// The commodity transferred
    pub commodity: CommodityID,
    /// Delivered cost per unit
    pub unit_cost: UnitCost,
    /// Maximum volume which may flow along this edge
    pub capacity: Volume,
    /// Transport emissions per unit
    pub ghg_factor: EmissionsPerVolume,
}

/// A capacity shared between several suppliers (from a secondary-feedstock constraint)
#[derive(Debug, Clone, PartialEq)]
pub struct SharedCap {
    /// The capped commodity
    pub commodity: CommodityID,
    /// The region the cap applies to
    pub region: RegionID,
    /// Maximum combined outflow of the members
    pub limit: Volume,
    /// The capped supplier nodes
    pub members: Vec<NodeIndex>,
}

/// Everything needed to build the flow graph for one year.
///
/// All records are borrowed read-only: the engine never mutates the surrounding simulation's
/// state during a solve.
pub struct FlowGraphInputs<'a> {
    /// The year being solved
    pub year: u32,
    /// Technology enablement settings
    pub technologies: &'a TechnologyMap,
    /// External suppliers
    pub suppliers: &'a SupplierMap,
    /// Demand centres
    pub demand_centers: &'a DemandCenterMap,
    /// Producers
    pub producers: &'a ProducerMap,
    /// Legal process connectors
    pub connectors: &'a [LegalProcessConnector],
    /// Trade tariffs
    pub tariffs: &'a [Tariff],
    /// Carbon prices
    pub carbon_costs: &'a CarbonCostSchedule,
    /// Secondary-feedstock capacity constraints
    pub feedstock_constraints: &'a [FeedstockConstraint],
    /// Transport KPIs
    pub transport_kpis: &'a TransportKPIMap,
}

/// The multi-commodity flow graph for one year
#[derive(Debug, Clone)]
pub struct FlowGraph {
    year: u32,
    graph: FlowArena,
    caps: Vec<SharedCap>,
    virtual_suppliers: Vec<Supplier>,
}

impl FlowGraph {
    /// The year this graph was built for
    pub fn year(&self) -> u32 {
        self.year
    }

    /// Get a node by index
    pub fn node(&self, idx: NodeIndex) -> &FlowNode {
        &self.graph[idx]
    }

    /// Get an edge by index
    pub fn edge(&self, idx: EdgeIndex) -> &FlowEdge {
        &self.graph[idx]
    }

    /// The endpoints of an edge
    pub fn edge_endpoints(&self, idx: EdgeIndex) -> (NodeIndex, NodeIndex) {
        // An EdgeIndex handed out by this graph always has endpoints
        self.graph
            .edge_endpoints(idx)
            .expect("Edge index does not belong to this graph")
    }

    /// Find a node by its identity
    pub fn find_node(&self, node: &NodeRef) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].node == *node)
    }

    /// Iterate over all node indices
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Iterate over all edges
    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeIndex, NodeIndex, NodeIndex, &FlowEdge)> {
        self.graph
            .edge_references()
            .map(|edge| (edge.id(), edge.source(), edge.target(), edge.weight()))
    }

    /// Iterate over the edges carrying the given commodity
    pub fn iter_edges_for<'a>(
        &'a self,
        commodity: &'a CommodityID,
    ) -> impl Iterator<Item = (EdgeIndex, NodeIndex, NodeIndex, &'a FlowEdge)> {
        self.iter_edges()
            .filter(move |(_, _, _, edge)| edge.commodity == *commodity)
    }

    /// The number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All commodities which are either supplied or demanded, in sorted order
    pub fn commodities(&self) -> BTreeSet<CommodityID> {
        self.graph
            .node_weights()
            .flat_map(|node| {
                node.supply
                    .iter()
                    .map(|supply| supply.commodity.clone())
                    .chain(node.demand.keys().cloned())
            })
            .collect()
    }

    /// Total supply capacity of a commodity (before shared caps are applied)
    pub fn total_supply(&self, commodity: &CommodityID) -> Volume {
        self.graph
            .node_weights()
            .filter_map(|node| node.supply.as_ref())
            .filter(|supply| supply.commodity == *commodity)
            .map(|supply| supply.capacity)
            .sum()
    }

    /// Total demand for a commodity
    pub fn total_demand(&self, commodity: &CommodityID) -> Volume {
        self.graph
            .node_weights()
            .filter_map(|node| node.demand.get(commodity))
            .copied()
            .sum()
    }

    /// Capacities shared between several suppliers
    pub fn shared_caps(&self) -> &[SharedCap] {
        &self.caps
    }

    /// Suppliers synthesised for this solve only
    pub fn virtual_suppliers(&self) -> &[Supplier] {
        &self.virtual_suppliers
    }

    /// Group commodities into layers for sequential solving.
    ///
    /// See [`layering::commodity_layers`].
    pub fn commodity_layers(&self) -> Vec<Vec<CommodityID>> {
        layering::commodity_layers(self)
    }
}

/// Builds the flow graph for one year.
///
/// Producers whose technology is disabled (or whose operating window excludes the year) are left
/// out entirely, as are connectors referencing disabled technologies, so nothing downstream ever
/// sees them. For each secondary-feedstock constraint with no modelled supplier or active producer
/// of the commodity in its region, a virtual supplier bound to the cap is synthesised; where such
/// sources do exist, the cap is recorded as a [`SharedCap`] over them.
///
/// # Returns
///
/// The built graph, or an error if any input record is invalid (e.g. a negative capacity).
pub fn build_flow_graph(inputs: &FlowGraphInputs) -> Result<FlowGraph> {
    let year = inputs.year;
    let technologies = EnabledTechnologies::for_year(inputs.technologies, year);
    let connectors = ConnectorSet::filter(inputs.connectors, &technologies);

    let mut builder = Builder {
        year,
        graph: FlowArena::new(),
        caps: Vec::new(),
        virtual_suppliers: Vec::new(),
    };

    builder.add_suppliers(inputs.suppliers)?;
    builder.add_producers(inputs.producers, &technologies)?;
    builder.add_feedstock_constraints(inputs.feedstock_constraints)?;
    builder.add_demand_centers(inputs.demand_centers)?;
    builder.add_edges(&connectors, inputs);

    info!(
        "Built flow graph for {year}: {} nodes, {} edges, {} virtual suppliers, {} connectors \
        filtered",
        builder.graph.node_count(),
        builder.graph.edge_count(),
        builder.virtual_suppliers.len(),
        connectors.filtered().len()
    );

    Ok(FlowGraph {
        year,
        graph: builder.graph,
        caps: builder.caps,
        virtual_suppliers: builder.virtual_suppliers,
    })
}

/// Check that a volume read from an input record is usable
fn check_volume(volume: Volume, what: &str) -> Result<()> {
    ensure!(
        volume.is_finite() && volume >= Volume(0.0),
        "Invalid {what} ({volume}): must be a finite, non-negative number"
    );
    Ok(())
}

/// Check that a unit cost read from an input record is usable
fn check_cost(cost: MoneyPerVolume, what: &str) -> Result<()> {
    ensure!(cost.is_finite(), "Invalid {what} ({cost}): must be finite");
    Ok(())
}

/// Mutable state while building a [`FlowGraph`]
struct Builder {
    year: u32,
    graph: FlowArena,
    caps: Vec<SharedCap>,
    virtual_suppliers: Vec<Supplier>,
}

impl Builder {
    fn add_suppliers(&mut self, suppliers: &SupplierMap) -> Result<()> {
        for supplier in suppliers.values().sorted_by(|a, b| a.id.cmp(&b.id)) {
            let capacity = supplier.capacity(self.year);
            check_volume(capacity, "capacity")
                .and_then(|()| check_cost(supplier.production_cost, "production cost"))
                .with_context(|| format!("Invalid supplier {}", supplier.id))?;

            if capacity > Volume(0.0) {
                self.add_supplier_node(NodeRef::Supplier(supplier.id.clone()), supplier, capacity);
            }
        }

        Ok(())
    }

    fn add_supplier_node(&mut self, node: NodeRef, supplier: &Supplier, capacity: Volume) {
        self.graph.add_node(FlowNode {
            node,
            region: supplier.location.region.clone(),
            process: ProcessNode::Supply(supplier.commodity.clone()),
            supply: Some(NodeSupply {
                commodity: supplier.commodity.clone(),
                capacity,
                production_cost: supplier.production_cost,
            }),
            demand: IndexMap::new(),
        });
    }

    fn add_feedstock_constraints(&mut self, constraints: &[FeedstockConstraint]) -> Result<()> {
        let mut seen = HashSet::new();
        for constraint in constraints {
            let key = (constraint.commodity.clone(), constraint.region.clone());
            ensure!(
                seen.insert(key),
                "Feedstock constraint for {} in {} defined more than once",
                constraint.commodity,
                constraint.region
            );
            check_volume(constraint.limit, "limit")
                .and_then(|()| check_cost(constraint.unit_cost, "unit cost"))
                .with_context(|| {
                    format!(
                        "Invalid feedstock constraint for {} in {}",
                        constraint.commodity, constraint.region
                    )
                })?;

            let members: Vec<_> = self
                .graph
                .node_indices()
                .filter(|&idx| {
                    let node = &self.graph[idx];
                    matches!(node.node, NodeRef::Supplier(_) | NodeRef::Producer(_))
                        && node.region == constraint.region
                        && node
                            .supply
                            .as_ref()
                            .is_some_and(|s| s.commodity == constraint.commodity)
                })
                .collect();

            if members.is_empty() {
                self.add_virtual_supplier(constraint);
            } else {
                self.caps.push(SharedCap {
                    commodity: constraint.commodity.clone(),
                    region: constraint.region.clone(),
                    limit: constraint.limit,
                    members,
                });
            }
        }

        Ok(())
    }

    /// Synthesise a supplier standing in for a capped external pool
    fn add_virtual_supplier(&mut self, constraint: &FeedstockConstraint) {
        let id: SupplierID =
            format!("virtual_{}_{}", constraint.commodity, constraint.region).into();
        info!(
            "Creating virtual supplier {id} for {} in {} (limit {})",
            constraint.commodity, constraint.region, constraint.limit
        );

        let supplier = Supplier {
            id: id.clone(),
            location: Location {
                region: constraint.region.clone(),
                lat: 0.0,
                lon: 0.0,
            },
            commodity: constraint.commodity.clone(),
            capacity_by_year: [(self.year, constraint.limit)].into_iter().collect(),
            production_cost: constraint.unit_cost,
        };
        if constraint.limit > Volume(0.0) {
            self.add_supplier_node(NodeRef::VirtualSupplier(id), &supplier, constraint.limit);
        }
        self.virtual_suppliers.push(supplier);
    }

    fn add_producers(
        &mut self,
        producers: &ProducerMap,
        technologies: &EnabledTechnologies,
    ) -> Result<()> {
        for producer in producers.values().sorted_by(|a, b| a.id.cmp(&b.id)) {
            if !producer.is_active(technologies) {
                debug!(
                    "Producer {} ({}) is not active in {}",
                    producer.id, producer.technology, self.year
                );
                continue;
            }

            let production = producer.production();
            check_volume(production, "production")
                .and_then(|()| check_cost(producer.unit_production_cost, "unit production cost"))
                .with_context(|| format!("Invalid producer {}", producer.id))?;

            let mut demand = IndexMap::new();
            for (commodity, volume) in producer.iter_input_demand() {
                check_volume(volume, "input demand")
                    .with_context(|| format!("Invalid producer {}", producer.id))?;
                demand.insert(commodity.clone(), volume);
            }

            let supply = producer
                .output
                .as_ref()
                .filter(|_| production > Volume(0.0))
                .map(|commodity| NodeSupply {
                    commodity: commodity.clone(),
                    capacity: production,
                    production_cost: producer.unit_production_cost,
                });

            self.graph.add_node(FlowNode {
                node: NodeRef::Producer(producer.id.clone()),
                region: producer.location.region.clone(),
                process: ProcessNode::Technology(producer.technology.clone()),
                supply,
                demand,
            });
        }

        Ok(())
    }

    fn add_demand_centers(&mut self, demand_centers: &DemandCenterMap) -> Result<()> {
        for centre in demand_centers.values().sorted_by(|a, b| a.id.cmp(&b.id)) {
            let mut demand = IndexMap::new();
            for (commodity, volume) in centre.iter_demand(self.year) {
                check_volume(volume, "demand")
                    .with_context(|| format!("Invalid demand centre {}", centre.id))?;
                demand.insert(commodity.clone(), volume);
            }
            if demand.is_empty() {
                continue;
            }

            self.graph.add_node(FlowNode {
                node: NodeRef::Demand(centre.id.clone()),
                region: centre.location.region.clone(),
                process: ProcessNode::Demand,
                supply: None,
                demand,
            });
        }

        Ok(())
    }

    /// Add an edge for every (source, destination, commodity) combination permitted by the
    /// connectors
    fn add_edges(&mut self, connectors: &ConnectorSet, inputs: &FlowGraphInputs) {
        let nodes: Vec<_> = self.graph.node_indices().collect();
        let mut new_edges = Vec::new();
        for &from in &nodes {
            let source = &self.graph[from];
            let Some(supply) = &source.supply else {
                continue;
            };

            for &to in &nodes {
                let destination = &self.graph[to];
                if from == to {
                    continue;
                }
                let Some(&demand) = destination.demand.get(&supply.commodity) else {
                    continue;
                };
                if !connectors.permits(&source.process, &destination.process, &supply.commodity) {
                    continue;
                }

                new_edges.push((from, to, edge_for(source, supply, destination, demand, inputs)));
            }
        }

        for (from, to, edge) in new_edges {
            self.graph.add_edge(from, to, edge);
        }
    }
}

/// Compute the delivered cost and capacity of an edge
fn edge_for(
    source: &FlowNode,
    supply: &NodeSupply,
    destination: &FlowNode,
    demand: Volume,
    inputs: &FlowGraphInputs,
) -> FlowEdge {
    let commodity = &supply.commodity;
    let kpi = inputs
        .transport_kpis
        .get(&source.region, &destination.region, commodity);
    let tariff = tariff_effect(
        inputs.tariffs,
        &source.region,
        &destination.region,
        commodity,
        inputs.year,
        supply.production_cost,
    );
    let carbon_price = inputs.carbon_costs.price(&destination.region, inputs.year);

    let mut capacity = supply.capacity.min(demand);
    if let Some(quota) = tariff.quota {
        capacity = capacity.min(quota);
    }

    FlowEdge {
        commodity: commodity.clone(),
        unit_cost: UnitCost {
            production: supply.production_cost,
            transport: kpi.transportation_cost,
            tariff: tariff.adder,
            carbon: kpi.ghg_factor * carbon_price,
        },
        capacity,
        ghg_factor: kpi.ghg_factor,
    }
}
