//! Trade parameters which make up the delivered cost of moving a commodity between regions:
//! transport KPIs, tariffs and carbon prices. Also defines secondary-feedstock constraints.
use crate::commodity::CommodityID;
use crate::region::RegionID;
use crate::units::{EmissionsPerVolume, MoneyPerEmissions, MoneyPerVolume, Volume};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport cost and greenhouse gas factor for one (origin, destination, commodity) route
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct TransportKPI {
    /// Emissions per unit transported
    pub ghg_factor: EmissionsPerVolume,
    /// Cost per unit transported
    pub transportation_cost: MoneyPerVolume,
}

/// Transport KPIs keyed by (origin region, destination region, commodity)
#[derive(Debug, Clone, Default)]
pub struct TransportKPIMap(HashMap<(RegionID, RegionID, CommodityID), TransportKPI>);

impl TransportKPIMap {
    /// Create a new, empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the KPI for a route
    pub fn insert(
        &mut self,
        origin: RegionID,
        destination: RegionID,
        commodity: CommodityID,
        kpi: TransportKPI,
    ) {
        self.0.insert((origin, destination, commodity), kpi);
    }

    /// Get the KPI for a route.
    ///
    /// Routes with no entry are treated as free and emission-free.
    pub fn get(
        &self,
        origin: &RegionID,
        destination: &RegionID,
        commodity: &CommodityID,
    ) -> TransportKPI {
        let key = (origin.clone(), destination.clone(), commodity.clone());
        self.0.get(&key).copied().unwrap_or_else(|| {
            if origin != destination {
                debug!("No transport KPI for {commodity} from {origin} to {destination}");
            }
            TransportKPI::default()
        })
    }
}

/// A trade tariff applying to flows between two regions
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tariff {
    /// Name of the tariff (for logging)
    pub name: String,
    /// Region the commodity is exported from
    pub from_region: RegionID,
    /// Region the commodity is imported into
    pub to_region: RegionID,
    /// The commodity the tariff applies to (all commodities if `None`)
    #[serde(default)]
    pub commodity: Option<CommodityID>,
    /// Fixed tax per unit
    #[serde(default)]
    pub tax_absolute: MoneyPerVolume,
    /// Tax as a fraction of the production cost
    #[serde(default)]
    pub tax_percentage: f64,
    /// Maximum volume which may be traded on a single route under this tariff
    #[serde(default)]
    pub quota: Option<Volume>,
    /// First year in which the tariff applies
    #[serde(default)]
    pub start_year: Option<u32>,
    /// Last year in which the tariff applies
    #[serde(default)]
    pub end_year: Option<u32>,
}

impl Tariff {
    /// Whether the tariff applies to the given route in the given year
    pub fn applies_to(
        &self,
        from: &RegionID,
        to: &RegionID,
        commodity: &CommodityID,
        year: u32,
    ) -> bool {
        self.from_region == *from
            && self.to_region == *to
            && self.commodity.as_ref().is_none_or(|c| c == commodity)
            && self.start_year.is_none_or(|start| year >= start)
            && self.end_year.is_none_or(|end| year <= end)
    }
}

/// The combined effect of all tariffs on one route
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TariffEffect {
    /// Extra cost per unit
    pub adder: MoneyPerVolume,
    /// The tightest quota, if any
    pub quota: Option<Volume>,
}

/// Combine the tariffs active on a route in a year
pub fn tariff_effect(
    tariffs: &[Tariff],
    from: &RegionID,
    to: &RegionID,
    commodity: &CommodityID,
    year: u32,
    production_cost: MoneyPerVolume,
) -> TariffEffect {
    tariffs
        .iter()
        .filter(|tariff| tariff.applies_to(from, to, commodity, year))
        .fold(TariffEffect::default(), |effect, tariff| TariffEffect {
            adder: effect.adder
                + tariff.tax_absolute
                + MoneyPerVolume(tariff.tax_percentage * production_cost.value()),
            quota: match (effect.quota, tariff.quota) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        })
}

/// Carbon prices keyed by region and year
#[derive(Debug, Clone, Default)]
pub struct CarbonCostSchedule(HashMap<(RegionID, u32), MoneyPerEmissions>);

impl CarbonCostSchedule {
    /// Create a new, empty schedule
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the carbon price for a region in a year
    pub fn insert(&mut self, region: RegionID, year: u32, price: MoneyPerEmissions) {
        self.0.insert((region, year), price);
    }

    /// The carbon price for a region in a year (zero if not specified)
    pub fn price(&self, region: &RegionID, year: u32) -> MoneyPerEmissions {
        self.0
            .get(&(region.clone(), year))
            .copied()
            .unwrap_or_default()
    }
}

/// A cap on the volume of a secondary feedstock (e.g. charcoal, biomass) available in a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedstockConstraint {
    /// The capped commodity
    pub commodity: CommodityID,
    /// The region the cap applies to
    pub region: RegionID,
    /// Maximum volume available in the year
    pub limit: Volume,
    /// Cost per unit of drawing on the external pool (used when no supplier is modelled)
    #[serde(default)]
    pub unit_cost: MoneyPerVolume,
}
