//! Regions represent different geographical areas in which suppliers, producers and demand centres
//! are located.
use crate::id::define_id_type;
use serde::Deserialize;

define_id_type! {RegionID}

/// The location of a supplier, producer or demand centre
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    /// The region (e.g. ISO3 country code) used for transport KPIs, tariffs and carbon prices
    pub region: RegionID,
    /// Latitude in degrees
    #[serde(default)]
    pub lat: f64,
    /// Longitude in degrees
    #[serde(default)]
    pub lon: f64,
}

impl Location {
    /// Create a location in the given region with no coordinates
    pub fn in_region(region: &str) -> Self {
        Self {
            region: region.into(),
            lat: 0.0,
            lon: 0.0,
        }
    }
}
