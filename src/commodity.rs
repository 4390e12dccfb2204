//! Commodities are the tradable material and energy goods routed by the allocation engine.
use crate::id::{define_id_getter, define_id_type};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;

define_id_type! {CommodityID}

/// A map of [`Commodity`]s, keyed by commodity ID
pub type CommodityMap = IndexMap<CommodityID, Commodity>;

/// A commodity within the simulation
#[derive(PartialEq, Debug, Clone, Deserialize)]
pub struct Commodity {
    /// Unique identifier for the commodity (e.g. "scrap")
    pub id: CommodityID,
    /// Text description of commodity (e.g. "steel scrap")
    pub description: String,
    /// Whether the commodity is a material or an energy carrier
    #[serde(rename = "type")]
    pub kind: CommodityKind,
}
define_id_getter! {Commodity, CommodityID}

/// Determines which part of a bill of materials a commodity is booked in
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, DeserializeLabeledStringEnum)]
pub enum CommodityKind {
    /// A physical input such as iron ore, scrap or pellets
    #[default]
    #[string = "material"]
    Material,
    /// An energy carrier such as hydrogen, natural gas or electricity
    #[string = "energy"]
    Energy,
}

impl Commodity {
    /// Create a new commodity with an empty description
    pub fn new(id: &str, kind: CommodityKind) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind,
        }
    }
}

/// Look up the kind of a commodity, treating commodities missing from the catalogue as materials
pub fn commodity_kind(commodities: &CommodityMap, commodity_id: &CommodityID) -> CommodityKind {
    commodities
        .get(commodity_id)
        .map_or(CommodityKind::Material, |commodity| commodity.kind)
}
