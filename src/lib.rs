//! Minimum-cost allocation of commodity flows for one year of a steel and iron industry model.
//!
//! A year's solve runs in four steps:
//!
//! 1. [`validation::validate_network`] checks the legal process connectors;
//! 2. [`graph::build_flow_graph`] builds the flow graph from the year's records;
//! 3. [`solver::solve`] allocates supply to demand with the configured strategy;
//! 4. [`reconcile::reconcile`] writes bills of materials back onto producers.
#![warn(missing_docs)]
pub mod allocation;
pub mod cli;
pub mod commodity;
pub mod connector;
pub mod demand;
pub mod graph;
pub mod id;
pub mod log;
pub mod producer;
pub mod reconcile;
pub mod region;
pub mod registry;
pub mod settings;
pub mod solver;
pub mod supplier;
pub mod technology;
pub mod tolerance;
pub mod trade;
pub mod units;
pub mod validation;

#[cfg(test)]
mod fixture;
