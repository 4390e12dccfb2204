//! Legal process connectors declare which commodity transfers between processes are permitted.
//!
//! Connectors referencing technologies which are disabled (or unknown) in the solve year are
//! filtered out before the flow graph is built. This is not an error: it is normal for a process
//! network definition to mention technologies that only become available in later years.
use crate::commodity::CommodityID;
use crate::technology::{EnabledTechnologies, TechnologyID};
use anyhow::{Error, Result, ensure};
use log::debug;
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

/// One end of a legal process connector
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessNode {
    /// External supply of a raw commodity
    Supply(CommodityID),
    /// A producer technology
    Technology(TechnologyID),
    /// Final demand
    Demand,
}

impl Display for ProcessNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessNode::Supply(id) => write!(f, "SUPPLY({id})"),
            ProcessNode::Technology(id) => write!(f, "{id}"),
            ProcessNode::Demand => write!(f, "DEMAND"),
        }
    }
}

/// Parses the [`Display`] form of an endpoint, plus a shorthand.
///
/// `demand` is final demand and a bare lower-case name (e.g. `scrap`) is external supply of that
/// commodity. Technology codes are upper case (e.g. `EAF`).
impl FromStr for ProcessNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ensure!(!s.is_empty(), "Empty process node");
        if s.eq_ignore_ascii_case("demand") {
            return Ok(ProcessNode::Demand);
        }
        if let Some(commodity) = s.strip_prefix("SUPPLY(").and_then(|s| s.strip_suffix(')')) {
            return Ok(ProcessNode::Supply(commodity.into()));
        }
        if s.chars().any(|c| c.is_ascii_lowercase()) {
            Ok(ProcessNode::Supply(s.into()))
        } else {
            Ok(ProcessNode::Technology(s.into()))
        }
    }
}

impl ProcessNode {
    /// The technology referenced by this endpoint, if any
    pub fn technology(&self) -> Option<&TechnologyID> {
        match self {
            ProcessNode::Technology(id) => Some(id),
            _ => None,
        }
    }
}

/// Declares that flow from one process into another is permitted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LegalProcessConnector {
    /// The process the commodity flows out of
    pub from: ProcessNode,
    /// The process the commodity flows into
    pub to: ProcessNode,
    /// Restrict the connector to a single commodity (any commodity if `None`)
    pub commodity: Option<CommodityID>,
}

impl LegalProcessConnector {
    /// Create a connector permitting any commodity
    pub fn new(from: ProcessNode, to: ProcessNode) -> Self {
        Self {
            from,
            to,
            commodity: None,
        }
    }
}

impl Display for LegalProcessConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)?;
        if let Some(commodity) = &self.commodity {
            write!(f, " [{commodity}]")?;
        }
        Ok(())
    }
}

/// Why a connector was filtered out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    /// The technology is known but not enabled in the solve year
    DisabledTechnology(TechnologyID),
    /// The technology does not appear in the technology settings
    UnknownTechnology(TechnologyID),
}

impl Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::DisabledTechnology(id) => write!(f, "technology {id} is disabled"),
            FilterReason::UnknownTechnology(id) => write!(f, "technology {id} is unknown"),
        }
    }
}

/// A connector which was dropped, along with the reason
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredConnector {
    /// The dropped connector
    pub connector: LegalProcessConnector,
    /// Why it was dropped
    pub reason: FilterReason,
}

/// Connectors split into those usable in the solve year and those filtered out
#[derive(Debug, Clone, Default)]
pub struct ConnectorSet {
    enabled: Vec<LegalProcessConnector>,
    filtered: Vec<FilteredConnector>,
    lookup: HashSet<(ProcessNode, ProcessNode)>,
    commodity_lookup: HashSet<(ProcessNode, ProcessNode, CommodityID)>,
}

impl ConnectorSet {
    /// Split connectors by whether their technologies are enabled
    pub fn filter(
        connectors: &[LegalProcessConnector],
        technologies: &EnabledTechnologies,
    ) -> Self {
        let mut set = Self::default();
        for connector in connectors {
            match check_endpoints(connector, technologies) {
                Some(reason) => {
                    debug!("Dropping connector {connector}: {reason}");
                    set.filtered.push(FilteredConnector {
                        connector: connector.clone(),
                        reason,
                    });
                }
                None => {
                    let key = (connector.from.clone(), connector.to.clone());
                    match &connector.commodity {
                        Some(commodity) => {
                            set.commodity_lookup
                                .insert((key.0, key.1, commodity.clone()));
                        }
                        None => {
                            set.lookup.insert(key);
                        }
                    }
                    set.enabled.push(connector.clone());
                }
            }
        }

        set
    }

    /// Whether flow of `commodity` from `from` to `to` is permitted
    pub fn permits(&self, from: &ProcessNode, to: &ProcessNode, commodity: &CommodityID) -> bool {
        let key = (from.clone(), to.clone());
        self.lookup.contains(&key)
            || self
                .commodity_lookup
                .contains(&(key.0, key.1, commodity.clone()))
    }

    /// The connectors usable in the solve year
    pub fn enabled(&self) -> &[LegalProcessConnector] {
        &self.enabled
    }

    /// The connectors which were dropped
    pub fn filtered(&self) -> &[FilteredConnector] {
        &self.filtered
    }
}

/// Check both endpoints of a connector, returning the reason it must be dropped (if any)
fn check_endpoints(
    connector: &LegalProcessConnector,
    technologies: &EnabledTechnologies,
) -> Option<FilterReason> {
    [&connector.from, &connector.to]
        .into_iter()
        .filter_map(ProcessNode::technology)
        .find_map(|id| {
            if !technologies.is_known(id) {
                Some(FilterReason::UnknownTechnology(id.clone()))
            } else if !technologies.contains(id) {
                Some(FilterReason::DisabledTechnology(id.clone()))
            } else {
                None
            }
        })
}
