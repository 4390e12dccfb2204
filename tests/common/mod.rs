//! Scenario builders shared by the integration tests.
#![allow(dead_code)]
use tradeflow::connector::LegalProcessConnector;
use tradeflow::demand::{DemandCenter, DemandCenterMap};
use tradeflow::graph::{FlowGraph, FlowGraphInputs, build_flow_graph};
use tradeflow::id::into_id_map;
use tradeflow::producer::{BillOfMaterials, ProducerMap, ProducerNode};
use tradeflow::region::Location;
use tradeflow::supplier::{Supplier, SupplierMap};
use tradeflow::technology::{Technology, TechnologyMap};
use tradeflow::trade::{
    CarbonCostSchedule, FeedstockConstraint, Tariff, TransportKPI, TransportKPIMap,
};
use tradeflow::units::{
    Dimensionless, EmissionsPerVolume, MoneyPerEmissions, MoneyPerVolume, Volume,
};

/// The year solved by every scenario
pub const YEAR: u32 = 2030;

/// Owned records for one year's solve
#[derive(Debug, Clone, Default)]
pub struct Scenario {
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

impl Scenario {
    /// Borrow the records as builder inputs
    pub fn inputs(&self) -> FlowGraphInputs<'_> {
        FlowGraphInputs {
            year: YEAR,
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

    /// Build the flow graph
    pub fn graph(&self) -> FlowGraph {
        build_flow_graph(&self.inputs()).unwrap()
    }

    fn add_supplier(
        &mut self,
        id: &str,
        region: &str,
        commodity: &str,
        capacity: f64,
        cost: f64,
    ) {
        self.suppliers.insert(
            id.into(),
            Supplier {
                id: id.into(),
                location: Location::in_region(region),
                commodity: commodity.into(),
                capacity_by_year: [(YEAR, Volume(capacity))].into_iter().collect(),
                production_cost: MoneyPerVolume(cost),
            },
        );
    }

    fn add_demand(&mut self, id: &str, region: &str, commodity: &str, demand: f64) {
        self.demand_centers.insert(
            id.into(),
            DemandCenter {
                id: id.into(),
                location: Location::in_region(region),
                demand: [((YEAR, commodity.into()), Volume(demand))]
                    .into_iter()
                    .collect(),
            },
        );
    }

    /// Add a producer of `output` using `technology`, with a `(capacity, unit cost)` pair
    fn add_producer(
        &mut self,
        id: &str,
        region: &str,
        (technology, output): (&str, &str),
        (capacity, cost): (f64, f64),
        inputs: &[(&str, f64)],
    ) {
        self.producers.insert(
            id.into(),
            ProducerNode {
                id: id.into(),
                technology: technology.into(),
                location: Location::in_region(region),
                enabled_years: 2020..=2050,
                capacity: Volume(capacity),
                utilisation: Dimensionless(0.9),
                output: Some(output.into()),
                unit_production_cost: MoneyPerVolume(cost),
                input_intensity: inputs
                    .iter()
                    .map(|&(commodity, intensity)| (commodity.into(), Dimensionless(intensity)))
                    .collect(),
                bill_of_materials: BillOfMaterials::default(),
            },
        );
    }
}

/// A connector permitting any commodity between two parsed endpoints
pub fn connector(from: &str, to: &str) -> LegalProcessConnector {
    LegalProcessConnector::new(from.parse().unwrap(), to.parse().unwrap())
}

/// Steelmaking technologies, with MOE only enabled from 2040
pub fn technologies() -> TechnologyMap {
    let technologies = [
        ("BF", "iron"),
        ("BOF", "steel"),
        ("DRI", "iron"),
        ("EAF", "steel"),
        ("MOE", "steel"),
    ]
    .map(|(id, product)| Technology {
        enabled_from: (id == "MOE").then_some(2040),
        ..Technology::new(id, &[product])
    });
    into_id_map(technologies).unwrap()
}

/// Two scrap suppliers (A: 100 at 3.0, B: 50 at 5.0) and one demand centre (D)
pub fn scrap_scenario(demand: f64) -> Scenario {
    let mut scenario = Scenario {
        technologies: technologies(),
        connectors: vec![connector("scrap", "demand")],
        ..Default::default()
    };
    scenario.add_supplier("A", "DEU", "scrap", 100.0, 3.0);
    scenario.add_supplier("B", "DEU", "scrap", 50.0, 5.0);
    scenario.add_demand("D", "DEU", "scrap", demand);

    scenario
}

/// A three-region steel industry with inter-regional trade.
///
/// Includes transport costs, a tariff with a quota, carbon prices, a scrap cap shared by two
/// suppliers, a charcoal pool with no modelled supplier and a disabled MOE plant.
pub fn multi_region_scenario() -> Scenario {
    let regions = ["DEU", "FRA", "ITA"];
    let mut scenario = Scenario {
        technologies: technologies(),
        connectors: vec![
            connector("iron_ore", "BF"),
            connector("charcoal", "BF"),
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
    };

    for (i, region) in regions.into_iter().enumerate() {
        let offset = i as f64;
        let lower = region.to_lowercase();
        let id = |kind: &str| format!("{kind}_{lower}");
        scenario.add_supplier(&id("mine"), region, "iron_ore", 250.0, 2.0 + 0.3 * offset);
        scenario.add_supplier(&id("gas"), region, "natural_gas", 80.0, 1.0 + 0.2 * offset);
        scenario.add_supplier(&id("power"), region, "electricity", 400.0, 0.5 + 0.1 * offset);
        scenario.add_supplier(&id("scrap_a"), region, "scrap", 35.0, 4.0);
        scenario.add_supplier(&id("scrap_b"), region, "scrap", 35.0, 4.0 + offset);

        scenario.add_producer(
            &id("bf"),
            region,
            ("BF", "iron"),
            (90.0, 10.0),
            &[("iron_ore", 1.5), ("charcoal", 0.1)],
        );
        scenario.add_producer(
            &id("dri"),
            region,
            ("DRI", "iron"),
            (50.0, 12.0),
            &[("iron_ore", 1.4), ("natural_gas", 0.5)],
        );
        scenario.add_producer(
            &id("bof"),
            region,
            ("BOF", "steel"),
            (80.0, 20.0 + offset),
            &[("iron", 0.9), ("scrap", 0.2)],
        );
        scenario.add_producer(
            &id("eaf"),
            region,
            ("EAF", "steel"),
            (60.0, 25.0),
            &[("scrap", 0.5), ("iron", 0.6), ("electricity", 0.4)],
        );

        scenario.add_demand(&id("city"), region, "steel", 110.0 + 20.0 * offset);
        scenario.carbon_costs.insert(region.into(), YEAR, MoneyPerEmissions(50.0 + 10.0 * offset));
    }
    scenario.add_producer(
        "moe_deu",
        "DEU",
        ("MOE", "steel"),
        (50.0, 30.0),
        &[("iron_ore", 1.0), ("electricity", 3.0)],
    );

    let transport = [
        ("iron_ore", 0.4, 0.02),
        ("scrap", 0.6, 0.01),
        ("iron", 1.5, 0.05),
        ("steel", 2.0, 0.04),
        ("natural_gas", 0.3, 0.0),
        ("electricity", 0.1, 0.0),
    ];
    for origin in regions {
        for destination in regions {
            if origin == destination {
                continue;
            }
            for (commodity, cost, ghg) in transport {
                scenario.transport_kpis.insert(
                    origin.into(),
                    destination.into(),
                    commodity.into(),
                    TransportKPI {
                        ghg_factor: EmissionsPerVolume(ghg),
                        transportation_cost: MoneyPerVolume(cost),
                    },
                );
            }
        }
    }

    scenario.tariffs.push(Tariff {
        name: "steel_safeguard".into(),
        from_region: "FRA".into(),
        to_region: "ITA".into(),
        commodity: Some("steel".into()),
        tax_absolute: MoneyPerVolume(1.0),
        tax_percentage: 0.05,
        quota: Some(Volume(30.0)),
        start_year: None,
        end_year: None,
    });
    scenario.feedstock_constraints = vec![
        FeedstockConstraint {
            commodity: "scrap".into(),
            region: "DEU".into(),
            limit: Volume(50.0),
            unit_cost: MoneyPerVolume(0.0),
        },
        FeedstockConstraint {
            commodity: "charcoal".into(),
            region: "ITA".into(),
            limit: Volume(20.0),
            unit_cost: MoneyPerVolume(6.0),
        },
    ];

    scenario
}
