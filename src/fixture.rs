//! Fixtures for tests

use crate::connector::LegalProcessConnector;
use crate::demand::{DemandCenter, DemandCenterMap};
use crate::graph::{FlowGraph, FlowGraphInputs, build_flow_graph};
use crate::id::into_id_map;
use crate::producer::{BillOfMaterials, ProducerMap, ProducerNode};
use crate::region::Location;
use crate::supplier::{Supplier, SupplierMap};
use crate::technology::{Technology, TechnologyMap};
use crate::trade::{CarbonCostSchedule, FeedstockConstraint, Tariff, TransportKPIMap};
use crate::units::{Dimensionless, MoneyPerVolume, Volume};
use indexmap::{IndexMap, indexmap};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// The region every fixture record is located in
pub const FIXTURE_REGION: &str = "DEU";

/// The year used by the scenario fixtures
pub const FIXTURE_YEAR: u32 = 2030;

/// A supplier with capacity in a single year
pub fn supplier(id: &str, commodity: &str, year: u32, capacity: f64, cost: f64) -> Supplier {
    Supplier {
        id: id.into(),
        location: Location::in_region(FIXTURE_REGION),
        commodity: commodity.into(),
        capacity_by_year: [(year, Volume(capacity))].into_iter().collect(),
        production_cost: MoneyPerVolume(cost),
    }
}

/// A demand centre requiring one commodity in a single year
pub fn demand_center(id: &str, commodity: &str, year: u32, demand: f64) -> DemandCenter {
    DemandCenter {
        id: id.into(),
        location: Location::in_region(FIXTURE_REGION),
        demand: [((year, commodity.into()), Volume(demand))]
            .into_iter()
            .collect(),
    }
}

/// A fully utilised producer with no inputs
pub fn producer(id: &str, technology: &str, output: &str, capacity: f64) -> ProducerNode {
    ProducerNode {
        id: id.into(),
        technology: technology.into(),
        location: Location::in_region(FIXTURE_REGION),
        enabled_years: 2000..=2100,
        capacity: Volume(capacity),
        utilisation: Dimensionless(1.0),
        output: Some(output.into()),
        unit_production_cost: MoneyPerVolume(0.0),
        input_intensity: IndexMap::new(),
        bill_of_materials: BillOfMaterials::default(),
    }
}

/// A connector permitting any commodity between two parsed endpoints
pub fn connector(from: &str, to: &str) -> LegalProcessConnector {
    LegalProcessConnector::new(from.parse().unwrap(), to.parse().unwrap())
}

#[fixture]
pub fn technologies() -> TechnologyMap {
    let moe = Technology {
        enabled_from: Some(2040),
        ..Technology::new("MOE", &["steel"])
    };
    indexmap! {
        "BF".into() => Technology::new("BF", &["iron"]),
        "BOF".into() => Technology::new("BOF", &["steel"]),
        "DRI".into() => Technology::new("DRI", &["iron"]),
        "EAF".into() => Technology::new("EAF", &["steel"]),
        "MOE".into() => moe,
    }
}

/// Owned records for one year's solve
#[derive(Debug, Clone, Default)]
pub struct ScenarioInputs {
    pub year: u32,
    pub technologies: TechnologyMap,
    pub suppliers: SupplierMap,
    pub demand_centers: DemandCenterMap,
    pub producers: ProducerMap,
    pub connectors: Vec<LegalProcessConnector>,
    pub tariffs: Vec<Tariff>,
    pub carbon_costs: CarbonCostSchedule,
    pub feedstock_constraints: Vec<FeedstockConstraint>,
    pub transport_kpis: TransportKPIMap,
}

impl ScenarioInputs {
    /// Borrow the records as builder inputs
    pub fn inputs(&self) -> FlowGraphInputs<'_> {
        FlowGraphInputs {
            year: self.year,
            technologies: &self.technologies,
            suppliers: &self.suppliers,
            demand_centers: &self.demand_centers,
            producers: &self.producers,
            connectors: &self.connectors,
            tariffs: &self.tariffs,
            carbon_costs: &self.carbon_costs,
            feedstock_constraints: &self.feedstock_constraints,
            transport_kpis: &self.transport_kpis,
        }
    }

    /// Build the flow graph for these records
    pub fn graph(&self) -> FlowGraph {
        build_flow_graph(&self.inputs()).unwrap()
    }
}

/// Two scrap suppliers (A: 100 at 3.0, B: 50 at 5.0) feeding one demand centre (D: 120)
#[fixture]
pub fn scrap_scenario(technologies: TechnologyMap) -> ScenarioInputs {
    ScenarioInputs {
        year: FIXTURE_YEAR,
        technologies,
        suppliers: into_id_map([
            supplier("A", "scrap", FIXTURE_YEAR, 100.0, 3.0),
            supplier("B", "scrap", FIXTURE_YEAR, 50.0, 5.0),
        ])
        .unwrap(),
        demand_centers: into_id_map([
            demand_center("D", "scrap", FIXTURE_YEAR, 120.0),
        ])
        .unwrap(),
        connectors: vec![connector("scrap", "demand")],
        ..Default::default()
    }
}

/// A small steel chain: ore and scrap suppliers feed BF/DRI (iron) and EAF/BOF (steel) producers,
/// which feed a steel demand centre. Also includes a disabled MOE producer and its connectors.
#[fixture]
pub fn steel_scenario(technologies: TechnologyMap) -> ScenarioInputs {
    let with_inputs = |producer: ProducerNode, cost: f64, inputs: &[(&str, f64)]| ProducerNode {
        unit_production_cost: MoneyPerVolume(cost),
        input_intensity: inputs
            .iter()
            .map(|&(commodity, intensity)| (commodity.into(), Dimensionless(intensity)))
            .collect(),
        ..producer
    };

    ScenarioInputs {
        year: FIXTURE_YEAR,
        technologies,
        suppliers: into_id_map([
            supplier("mine1", "iron_ore", FIXTURE_YEAR, 300.0, 2.0),
            supplier("mine2", "iron_ore", FIXTURE_YEAR, 300.0, 2.5),
            supplier("scrap1", "scrap", FIXTURE_YEAR, 40.0, 4.0),
            supplier("scrap2", "scrap", FIXTURE_YEAR, 40.0, 4.0),
            supplier("gas1", "natural_gas", FIXTURE_YEAR, 500.0, 1.0),
            supplier("power1", "electricity", FIXTURE_YEAR, 500.0, 0.5),
        ])
        .unwrap(),
        demand_centers: into_id_map([
            demand_center("city", "steel", FIXTURE_YEAR, 150.0),
        ])
        .unwrap(),
        producers: into_id_map([
            with_inputs(
                producer("bf1", "BF", "iron", 80.0),
                10.0,
                &[("iron_ore", 1.5)],
            ),
            with_inputs(
                producer("dri1", "DRI", "iron", 60.0),
                12.0,
                &[("iron_ore", 1.4), ("natural_gas", 0.5)],
            ),
            with_inputs(
                producer("bof1", "BOF", "steel", 100.0),
                20.0,
                &[("iron", 0.9), ("scrap", 0.2)],
            ),
            with_inputs(
                producer("eaf1", "EAF", "steel", 60.0),
                25.0,
                &[("scrap", 0.5), ("iron", 0.6), ("electricity", 0.4)],
            ),
            with_inputs(
                producer("moe1", "MOE", "steel", 50.0),
                30.0,
                &[("iron_ore", 1.0), ("electricity", 3.0)],
            ),
        ])
        .unwrap(),
        connectors: vec![
            connector("iron_ore", "BF"),
            connector("iron_ore", "DRI"),
            connector("natural_gas", "DRI"),
            connector("iron_ore", "MOE"),
            connector("electricity", "MOE"),
            connector("electricity", "EAF"),
            connector("scrap", "BOF"),
            connector("scrap", "EAF"),
            connector("BF", "BOF"),
            connector("BF", "EAF"),
            connector("DRI", "EAF"),
            connector("BOF", "demand"),
            connector("EAF", "demand"),
            connector("MOE", "demand"),
        ],
        ..Default::default()
    }
}
