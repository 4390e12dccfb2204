//! Demand centres are the final sinks for finished products.
use crate::commodity::CommodityID;
use crate::id::{define_id_getter, define_id_type};
use crate::region::Location;
use crate::units::Volume;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;

define_id_type! {DemandCenterID}

/// A map of [`DemandCenter`]s, keyed by ID
pub type DemandCenterMap = IndexMap<DemandCenterID, DemandCenter>;

/// Demand for each commodity, keyed by year and commodity
pub type DemandMap = HashMap<(u32, CommodityID), Volume>;

/// A demand centre requiring volumes of one or more commodities
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DemandCenter {
    /// Unique identifier for the demand centre
    pub id: DemandCenterID,
    /// Where the demand centre is located
    pub location: Location,
    /// Required volume for each year and commodity
    pub demand: DemandMap,
}
define_id_getter! {DemandCenter, DemandCenterID}

impl DemandCenter {
    /// Iterate over the commodities demanded in the given year, in a stable order
    pub fn iter_demand(&self, year: u32) -> impl Iterator<Item = (&CommodityID, Volume)> {
        let mut demand: Vec<_> = self
            .demand
            .iter()
            .filter(move |((y, _), volume)| *y == year && volume.value() > 0.0)
            .map(|((_, commodity), volume)| (commodity, *volume))
            .collect();
        demand.sort_by(|a, b| a.0.cmp(b.0));
        demand.into_iter()
    }
}
