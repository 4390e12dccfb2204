//! External suppliers of raw commodities (mines, scrap collectors, gas/hydrogen suppliers, etc.)
use crate::commodity::CommodityID;
use crate::id::{define_id_getter, define_id_type};
use crate::region::Location;
use crate::units::{MoneyPerVolume, Volume};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;

define_id_type! {SupplierID}

/// A map of [`Supplier`]s, keyed by supplier ID
pub type SupplierMap = IndexMap<SupplierID, Supplier>;

/// A supplier of a single commodity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Supplier {
    /// Unique identifier for the supplier
    pub id: SupplierID,
    /// Where the supplier is located
    pub location: Location,
    /// The commodity produced by this supplier
    pub commodity: CommodityID,
    /// Available capacity for each year
    pub capacity_by_year: HashMap<u32, Volume>,
    /// Cost of producing one unit of the commodity
    pub production_cost: MoneyPerVolume,
}
define_id_getter! {Supplier, SupplierID}

impl Supplier {
    /// The capacity available in the given year (zero if not specified)
    pub fn capacity(&self, year: u32) -> Volume {
        self.capacity_by_year
            .get(&year)
            .copied()
            .unwrap_or_default()
    }
}
