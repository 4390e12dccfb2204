//! The output of a solve: allocated volumes and costs for each (commodity, source, destination),
//! plus unmet demand.
//!
//! Everything is keyed on stable identities in ordered maps, so merging fragments from parallel
//! workers gives the same result whatever order they complete in.
use crate::commodity::CommodityID;
use crate::graph::{FlowEdge, NodeRef, UnitCost};
use crate::units::{Emissions, Money, MoneyPerVolume, Volume};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use thiserror::Error;

/// An allocated flow along one edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    /// Volume allocated
    pub volume: Volume,
    /// Delivered cost per unit, broken down by component
    pub unit_cost: UnitCost,
    /// Total delivered cost
    pub cost: Money,
    /// Transport emissions
    pub emissions: Emissions,
}

impl Allocation {
    /// An allocation of `volume` along `edge`
    pub fn new(volume: Volume, edge: &FlowEdge) -> Self {
        Self {
            volume,
            unit_cost: edge.unit_cost,
            cost: edge.unit_cost.total() * volume,
            emissions: edge.ghg_factor * volume,
        }
    }

    /// Total delivered cost per unit
    pub fn delivered_unit_cost(&self) -> MoneyPerVolume {
        self.unit_cost.total()
    }
}

/// Two fragments allocated the same flow or shortfall
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    /// The same (commodity, source, destination) appeared twice
    #[error("Duplicate allocation of {commodity} from {from} to {to}")]
    DuplicateAllocation {
        /// The commodity
        commodity: CommodityID,
        /// The source node
        from: NodeRef,
        /// The destination node
        to: NodeRef,
    },
    /// The same (commodity, destination) shortfall appeared twice
    #[error("Duplicate shortfall of {commodity} at {node}")]
    DuplicateShortfall {
        /// The commodity
        commodity: CommodityID,
        /// The destination node
        node: NodeRef,
    },
}

/// Allocations of a single commodity, keyed by (source, destination)
#[derive(Debug, Clone, PartialEq)]
pub struct CommodityAllocations {
    commodity: CommodityID,
    flows: BTreeMap<(NodeRef, NodeRef), Allocation>,
}

impl CommodityAllocations {
    /// Create an empty set of allocations
    pub fn new(commodity: CommodityID) -> Self {
        Self {
            commodity,
            flows: BTreeMap::new(),
        }
    }

    /// The commodity allocated
    pub fn commodity(&self) -> &CommodityID {
        &self.commodity
    }

    /// Add an allocation, failing if there is already one for this pair
    pub fn insert(
        &mut self,
        from: NodeRef,
        to: NodeRef,
        allocation: Allocation,
    ) -> Result<(), MergeError> {
        match self.flows.entry((from, to)) {
            Entry::Vacant(entry) => {
                entry.insert(allocation);
                Ok(())
            }
            Entry::Occupied(entry) => {
                let (from, to) = entry.key().clone();
                Err(MergeError::DuplicateAllocation {
                    commodity: self.commodity.clone(),
                    from,
                    to,
                })
            }
        }
    }

    /// Get the allocation between two nodes
    pub fn get(&self, from: &NodeRef, to: &NodeRef) -> Option<&Allocation> {
        self.flows.get(&(from.clone(), to.clone()))
    }

    /// Iterate over allocations in (source, destination) order
    pub fn iter(&self) -> impl Iterator<Item = (&NodeRef, &NodeRef, &Allocation)> {
        self.flows.iter().map(|((from, to), a)| (from, to, a))
    }

    /// The number of allocated pairs
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Whether nothing was allocated
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Total allocated volume
    pub fn total_volume(&self) -> Volume {
        self.flows.values().map(|a| a.volume).sum()
    }

    /// Total delivered cost
    pub fn total_cost(&self) -> Money {
        self.flows.values().map(|a| a.cost).sum()
    }

    /// Total volume leaving a source
    pub fn outgoing(&self, from: &NodeRef) -> Volume {
        self.iter()
            .filter(|(f, _, _)| *f == from)
            .map(|(_, _, a)| a.volume)
            .sum()
    }

    /// Total volume arriving at a destination
    pub fn incoming(&self, to: &NodeRef) -> Volume {
        self.iter()
            .filter(|(_, t, _)| *t == to)
            .map(|(_, _, a)| a.volume)
            .sum()
    }
}

/// The result of one year's solve
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationResult {
    allocations: BTreeMap<CommodityID, CommodityAllocations>,
    shortfall: BTreeMap<CommodityID, BTreeMap<NodeRef, Volume>>,
}

impl AllocationResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the allocations for a commodity, merging with any already present
    pub fn add_allocations(&mut self, allocations: CommodityAllocations) -> Result<(), MergeError> {
        match self.allocations.entry(allocations.commodity.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(allocations);
            }
            Entry::Occupied(mut entry) => {
                for ((from, to), allocation) in allocations.flows {
                    entry.get_mut().insert(from, to, allocation)?;
                }
            }
        }

        Ok(())
    }

    /// Record unmet demand at a destination
    pub fn add_shortfall(
        &mut self,
        commodity: CommodityID,
        node: NodeRef,
        volume: Volume,
    ) -> Result<(), MergeError> {
        let by_node = self.shortfall.entry(commodity.clone()).or_default();
        match by_node.entry(node) {
            Entry::Vacant(entry) => {
                entry.insert(volume);
                Ok(())
            }
            Entry::Occupied(entry) => Err(MergeError::DuplicateShortfall {
                commodity,
                node: entry.key().clone(),
            }),
        }
    }

    /// Merge another result into this one.
    ///
    /// The merge is keyed on (commodity, source, destination), so the outcome is independent of
    /// the order in which fragments are merged. Overlapping fragments are an error.
    pub fn merge(&mut self, other: AllocationResult) -> Result<(), MergeError> {
        for allocations in other.allocations.into_values() {
            self.add_allocations(allocations)?;
        }
        for (commodity, by_node) in other.shortfall {
            for (node, volume) in by_node {
                self.add_shortfall(commodity.clone(), node, volume)?;
            }
        }

        Ok(())
    }

    /// The allocations for a commodity, if any
    pub fn allocations(&self, commodity: &CommodityID) -> Option<&CommodityAllocations> {
        self.allocations.get(commodity)
    }

    /// Iterate over the allocations for every commodity, in commodity order
    pub fn iter(&self) -> impl Iterator<Item = &CommodityAllocations> {
        self.allocations.values()
    }

    /// Unmet demand for a commodity, keyed by destination
    pub fn shortfall(&self, commodity: &CommodityID) -> impl Iterator<Item = (&NodeRef, Volume)> {
        self.shortfall
            .get(commodity)
            .into_iter()
            .flatten()
            .map(|(node, volume)| (node, *volume))
    }

    /// Total unmet demand for a commodity
    pub fn total_shortfall(&self, commodity: &CommodityID) -> Volume {
        self.shortfall(commodity).map(|(_, volume)| volume).sum()
    }

    /// Total allocated volume over all commodities
    pub fn total_volume(&self) -> Volume {
        self.iter().map(CommodityAllocations::total_volume).sum()
    }

    /// Total delivered cost over all commodities
    pub fn total_cost(&self) -> Money {
        self.iter().map(CommodityAllocations::total_cost).sum()
    }
}
