//! Producer nodes are technology-bearing furnaces/process units. They consume input commodities and
//! produce an output commodity, so they act as both sinks and sources in the flow graph.
use crate::commodity::CommodityID;
use crate::id::{define_id_getter, define_id_type};
use crate::region::Location;
use crate::technology::{EnabledTechnologies, TechnologyID};
use crate::units::{Dimensionless, Money, MoneyPerVolume, Volume};
use indexmap::IndexMap;
use std::ops::RangeInclusive;

define_id_type! {ProducerID}

/// A map of [`ProducerNode`]s, keyed by producer ID
pub type ProducerMap = IndexMap<ProducerID, ProducerNode>;

/// A furnace or process unit operating a single technology
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerNode {
    /// Unique identifier for the producer
    pub id: ProducerID,
    /// The technology operated by this producer
    pub technology: TechnologyID,
    /// Where the producer is located
    pub location: Location,
    /// The years in which the producer operates
    pub enabled_years: RangeInclusive<u32>,
    /// Annual production capacity of the output commodity
    pub capacity: Volume,
    /// The fraction of capacity used this year
    pub utilisation: Dimensionless,
    /// The output commodity, if any
    pub output: Option<CommodityID>,
    /// Cost of producing one unit of output, excluding purchased inputs
    pub unit_production_cost: MoneyPerVolume,
    /// Input required per unit of output, for each input commodity
    pub input_intensity: IndexMap<CommodityID, Dimensionless>,
    /// The bill of materials from the most recent reconciliation
    pub bill_of_materials: BillOfMaterials,
}
define_id_getter! {ProducerNode, ProducerID}

impl ProducerNode {
    /// Whether the producer takes part in the solve for the given year
    pub fn is_active(&self, technologies: &EnabledTechnologies) -> bool {
        self.enabled_years.contains(&technologies.year())
            && technologies.contains(&self.technology)
    }

    /// Planned production volume for the year
    pub fn production(&self) -> Volume {
        self.capacity * self.utilisation
    }

    /// Iterate over the volume required of each input commodity
    pub fn iter_input_demand(&self) -> impl Iterator<Item = (&CommodityID, Volume)> {
        let production = self.production();
        self.input_intensity
            .iter()
            .map(move |(commodity, intensity)| (commodity, production * *intensity))
            .filter(|(_, volume)| volume.value() > 0.0)
    }
}

/// A single line in a bill of materials
#[derive(Debug, Clone, PartialEq)]
pub struct BomLine {
    /// Volume of the commodity routed into the producer
    pub demand: Volume,
    /// Average delivered cost per unit
    pub unit_cost: MoneyPerVolume,
    /// Total delivered cost
    pub total_cost: Money,
}

/// The material and energy inputs of a producer with their costs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BillOfMaterials {
    /// Lines for material commodities (iron ore, scrap, pellets, ...)
    pub materials: IndexMap<CommodityID, BomLine>,
    /// Lines for energy commodities (hydrogen, natural gas, electricity, ...)
    pub energy: IndexMap<CommodityID, BomLine>,
}

impl BillOfMaterials {
    /// Whether the bill of materials has no lines
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty() && self.energy.is_empty()
    }

    /// Total cost over all lines
    pub fn total_cost(&self) -> Money {
        self.materials
            .values()
            .chain(self.energy.values())
            .map(|line| line.total_cost)
            .sum()
    }
}
