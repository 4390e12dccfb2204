//! Technologies are the furnace/process routes (e.g. BF, BOF, DRI, EAF) that producers operate.
//!
//! Whether a technology may be used in a given year is controlled by its enablement settings.
use crate::commodity::CommodityID;
use crate::id::{define_id_getter, define_id_type};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;

define_id_type! {TechnologyID}

/// A map of [`Technology`] settings, keyed by technology ID
pub type TechnologyMap = IndexMap<TechnologyID, Technology>;

/// Enablement settings for a technology
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Technology {
    /// Unique identifier (e.g. "EAF")
    pub id: TechnologyID,
    /// Whether the technology is allowed at all
    pub allowed: bool,
    /// The first year in which the technology is enabled (unbounded if absent)
    #[serde(default)]
    pub enabled_from: Option<u32>,
    /// The last year in which the technology is enabled (unbounded if absent)
    #[serde(default)]
    pub enabled_to: Option<u32>,
    /// The products this technology outputs (e.g. "steel")
    #[serde(default)]
    pub products: Vec<CommodityID>,
}
define_id_getter! {Technology, TechnologyID}

impl Technology {
    /// Create an allowed technology with no year restrictions
    pub fn new(id: &str, products: &[&str]) -> Self {
        Self {
            id: id.into(),
            allowed: true,
            enabled_from: None,
            enabled_to: None,
            products: products.iter().map(|&p| p.into()).collect(),
        }
    }

    /// Whether the technology may be used in the given year
    pub fn is_enabled(&self, year: u32) -> bool {
        self.allowed
            && self.enabled_from.is_none_or(|from| year >= from)
            && self.enabled_to.is_none_or(|to| year <= to)
    }
}

/// The set of technologies enabled in a given year
#[derive(Debug, Clone, Default)]
pub struct EnabledTechnologies {
    year: u32,
    enabled: HashSet<TechnologyID>,
    known: HashSet<TechnologyID>,
}

impl EnabledTechnologies {
    /// Resolve the enabled technologies for a year from their settings
    pub fn for_year(technologies: &TechnologyMap, year: u32) -> Self {
        Self {
            year,
            enabled: technologies
                .values()
                .filter(|tech| tech.is_enabled(year))
                .map(|tech| tech.id.clone())
                .collect(),
            known: technologies.keys().cloned().collect(),
        }
    }

    /// The year these settings were resolved for
    pub fn year(&self) -> u32 {
        self.year
    }

    /// Whether the technology is enabled
    pub fn contains(&self, id: &TechnologyID) -> bool {
        self.enabled.contains(id)
    }

    /// Whether the technology appears in the settings at all
    pub fn is_known(&self, id: &TechnologyID) -> bool {
        self.known.contains(id)
    }
}
