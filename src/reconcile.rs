//! Folds solved allocations back onto producers as bills of materials.
//!
//! Costs come from the allocations themselves; nothing is recomputed from the inputs.
use crate::allocation::AllocationResult;
use crate::commodity::{CommodityID, CommodityKind, CommodityMap, commodity_kind};
use crate::graph::NodeRef;
use crate::producer::{BillOfMaterials, BomLine, ProducerID, ProducerMap};
use crate::units::{Money, Volume};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use log::debug;
use std::collections::BTreeMap;

/// Build a bill of materials for every producer which receives some volume.
///
/// Producers appear in ID order and lines in commodity order. Each line is booked as material or
/// energy according to the commodity catalogue.
pub fn bills_of_materials(
    result: &AllocationResult,
    commodities: &CommodityMap,
) -> IndexMap<ProducerID, BillOfMaterials> {
    let mut totals: BTreeMap<ProducerID, BTreeMap<CommodityID, (Volume, Money)>> = BTreeMap::new();
    for allocations in result.iter() {
        for (_, to, allocation) in allocations.iter() {
            let NodeRef::Producer(producer_id) = to else {
                continue;
            };
            if allocation.volume.value() <= 0.0 {
                continue;
            }

            let (volume, cost) = totals
                .entry(producer_id.clone())
                .or_default()
                .entry(allocations.commodity().clone())
                .or_default();
            *volume += allocation.volume;
            *cost += allocation.cost;
        }
    }

    totals
        .into_iter()
        .map(|(producer_id, lines)| {
            let mut bom = BillOfMaterials::default();
            for (commodity_id, (demand, total_cost)) in lines {
                let line = BomLine {
                    demand,
                    unit_cost: total_cost / demand,
                    total_cost,
                };
                let section = match commodity_kind(commodities, &commodity_id) {
                    CommodityKind::Material => &mut bom.materials,
                    CommodityKind::Energy => &mut bom.energy,
                };
                section.insert(commodity_id, line);
            }

            (producer_id, bom)
        })
        .collect()
}

/// Overwrite the bill of materials of every producer which received volume in this solve.
///
/// Producers with no incoming volume keep their existing bill of materials.
///
/// # Returns
///
/// The number of producers updated, or an error if an allocation refers to an unknown producer
pub fn reconcile(
    result: &AllocationResult,
    producers: &mut ProducerMap,
    commodities: &CommodityMap,
) -> Result<usize> {
    let boms = bills_of_materials(result, commodities);

    // Check everything before changing anything
    for producer_id in boms.keys() {
        ensure!(
            producers.contains_key(producer_id),
            "Allocation refers to unknown producer {producer_id}"
        );
    }

    let count = boms.len();
    for (producer_id, bom) in boms {
        debug!(
            "Producer {producer_id}: {} material and {} energy lines, total cost {}",
            bom.materials.len(),
            bom.energy.len(),
            bom.total_cost()
        );
        producers[&producer_id].bill_of_materials = bom;
    }

    Ok(count)
}
