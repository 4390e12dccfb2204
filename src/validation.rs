//! Pre-solve validation of the legal process network.
//!
//! The validator runs before any graph is built. Connectors referencing disabled or unknown
//! technologies are reported but tolerated. An enabled primary product (e.g. steel) which no
//! reachable, enabled technology can produce is a hard error, as the configuration could never
//! satisfy its demand.
use crate::commodity::CommodityID;
use crate::connector::{ConnectorSet, FilteredConnector, LegalProcessConnector, ProcessNode};
use crate::technology::{EnabledTechnologies, TechnologyID, TechnologyMap};
use anyhow::{Result, ensure};
use itertools::Itertools;
use log::{info, warn};
use petgraph::Directed;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A graph of processes, with an edge for each enabled connector
type ProcessGraph = Graph<ProcessNode, (), Directed>;

/// The outcome of validating the process network for one year
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// The year validated
    pub year: u32,
    /// Connectors dropped because they reference a disabled or unknown technology
    pub filtered: Vec<FilteredConnector>,
    /// Products of enabled technologies with no supply path
    pub unreachable_products: Vec<CommodityID>,
    /// Groups of enabled technologies which feed each other in a loop
    pub cycles: Vec<Vec<TechnologyID>>,
}

impl ValidationReport {
    /// Human-readable warnings for everything in the report
    pub fn warnings(&self) -> Vec<String> {
        let filtered = self
            .filtered
            .iter()
            .map(|f| format!("Connector {} filtered: {}", f.connector, f.reason));
        let unreachable = self
            .unreachable_products
            .iter()
            .map(|p| format!("Product {p} has no supply path from any enabled technology"));
        let cycles = self
            .cycles
            .iter()
            .map(|c| format!("Technologies form a cycle: {}", c.iter().join(" -> ")));

        filtered.chain(unreachable).chain(cycles).collect()
    }
}

/// Validate the legal process network for a year.
///
/// # Arguments
///
/// * `connectors` - All legal process connectors, before filtering
/// * `technologies` - Technology enablement settings
/// * `year` - The year to be solved
/// * `primary_products` - Products which must be producible if any technology makes them
///
/// # Returns
///
/// A report of filtered connectors, unreachable products and technology cycles, or an error if a
/// primary product cannot be produced.
pub fn validate_network(
    connectors: &[LegalProcessConnector],
    technologies: &TechnologyMap,
    year: u32,
    primary_products: &[CommodityID],
) -> Result<ValidationReport> {
    let enabled = EnabledTechnologies::for_year(technologies, year);
    let connector_set = ConnectorSet::filter(connectors, &enabled);
    let graph = build_process_graph(connector_set.enabled());

    let reachable = reachable_technologies(&graph);
    let producible: HashSet<&CommodityID> = technologies
        .values()
        .filter(|tech| reachable.contains(&tech.id))
        .flat_map(|tech| &tech.products)
        .collect();

    // Only products that some technology is configured to make are checked
    for product in primary_products {
        let configured = technologies
            .values()
            .any(|tech| tech.products.contains(product));
        ensure!(
            !configured || producible.contains(product),
            "Primary product {product} cannot be produced by any reachable enabled technology \
            in {year}"
        );
    }

    let unreachable_products: BTreeSet<_> = technologies
        .values()
        .filter(|tech| enabled.contains(&tech.id))
        .flat_map(|tech| &tech.products)
        .filter(|product| !producible.contains(product))
        .cloned()
        .collect();

    let report = ValidationReport {
        year,
        filtered: connector_set.filtered().to_vec(),
        unreachable_products: unreachable_products.into_iter().collect(),
        cycles: technology_cycles(&graph),
    };

    for warning in report.warnings() {
        warn!("{warning}");
    }
    info!(
        "Validated process network for {year}: {} connectors enabled, {} filtered",
        connector_set.enabled().len(),
        report.filtered.len()
    );

    Ok(report)
}

/// Build a graph of processes from the enabled connectors
fn build_process_graph(connectors: &[LegalProcessConnector]) -> ProcessGraph {
    let mut graph = ProcessGraph::new();
    let mut indices: HashMap<ProcessNode, NodeIndex> = HashMap::new();
    for connector in connectors {
        let [from, to] = [&connector.from, &connector.to].map(|node| {
            *indices
                .entry(node.clone())
                .or_insert_with(|| graph.add_node(node.clone()))
        });
        graph.update_edge(from, to, ());
    }

    graph
}

/// Technologies which can be reached from any raw supply
fn reachable_technologies(graph: &ProcessGraph) -> HashSet<TechnologyID> {
    let mut dfs = Dfs::empty(graph);
    let mut reachable = HashSet::new();
    for start in graph
        .node_indices()
        .filter(|&idx| matches!(graph[idx], ProcessNode::Supply(_)))
    {
        dfs.move_to(start);
        while let Some(idx) = dfs.next(graph) {
            if let Some(id) = graph[idx].technology() {
                reachable.insert(id.clone());
            }
        }
    }

    reachable
}

/// Strongly connected groups of technologies, including technologies feeding themselves
fn technology_cycles(graph: &ProcessGraph) -> Vec<Vec<TechnologyID>> {
    tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            scc.into_iter()
                .filter_map(|idx| graph[idx].technology().cloned())
                .sorted()
                .collect::<Vec<_>>()
        })
        .filter(|cycle| !cycle.is_empty())
        .sorted()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ScenarioInputs, assert_error, connector, steel_scenario};
    use crate::technology::Technology;
    use rstest::{fixture, rstest};

    #[fixture]
    fn primary_products() -> Vec<CommodityID> {
        vec!["steel".into(), "iron".into()]
    }

    #[rstest]
    fn test_filtered_not_failed(
        steel_scenario: ScenarioInputs,
        primary_products: Vec<CommodityID>,
    ) {
        let report = validate_network(
            &steel_scenario.connectors,
            &steel_scenario.technologies,
            2030,
            &primary_products,
        )
        .unwrap();

        // The three MOE connectors are dropped in 2030
        assert_eq!(report.filtered.len(), 3);
        assert!(report.unreachable_products.is_empty());
        assert!(report.cycles.is_empty());
        assert_eq!(report.warnings().len(), 3);

        // ...but not once MOE is enabled
        let report = validate_network(
            &steel_scenario.connectors,
            &steel_scenario.technologies,
            2040,
            &primary_products,
        )
        .unwrap();
        assert!(report.filtered.is_empty());
    }

    #[rstest]
    fn test_unreachable_primary_product(
        mut steel_scenario: ScenarioInputs,
        primary_products: Vec<CommodityID>,
    ) {
        let ironmaking = [
            ProcessNode::Technology("BF".into()),
            ProcessNode::Technology("DRI".into()),
        ];
        steel_scenario
            .connectors
            .retain(|c| !ironmaking.contains(&c.to));
        assert_error!(
            validate_network(
                &steel_scenario.connectors,
                &steel_scenario.technologies,
                2030,
                &primary_products,
            ),
            "Primary product iron cannot be produced by any reachable enabled technology in 2030"
        );
    }

    #[rstest]
    fn test_unconfigured_primary_product(steel_scenario: ScenarioInputs) {
        // No technology makes pig iron, so it isn't required
        let report = validate_network(
            &steel_scenario.connectors,
            &steel_scenario.technologies,
            2030,
            &["pig_iron".into()],
        );
        assert!(report.is_ok());
    }

    #[rstest]
    fn test_unreachable_product_warning(
        mut steel_scenario: ScenarioInputs,
        primary_products: Vec<CommodityID>,
    ) {
        steel_scenario
            .technologies
            .insert("HBI".into(), Technology::new("HBI", &["hbi"]));
        let report = validate_network(
            &steel_scenario.connectors,
            &steel_scenario.technologies,
            2030,
            &primary_products,
        )
        .unwrap();
        assert_eq!(report.unreachable_products, [CommodityID::new("hbi")]);
    }

    #[rstest]
    fn test_cycle_warning(mut steel_scenario: ScenarioInputs, primary_products: Vec<CommodityID>) {
        steel_scenario.connectors.push(connector("EAF", "BOF"));
        steel_scenario.connectors.push(connector("BOF", "EAF"));
        let report = validate_network(
            &steel_scenario.connectors,
            &steel_scenario.technologies,
            2030,
            &primary_products,
        )
        .unwrap();
        assert_eq!(
            report.cycles,
            [vec![TechnologyID::new("BOF"), TechnologyID::new("EAF")]]
        );
    }
}
