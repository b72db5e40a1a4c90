//! Per-material reconciliation across every receipt of an order.
//!
//! Everything here is a pure function of the order's items and receipt
//! history: safe to call repeatedly and concurrently, independent of the
//! order in which receipts were created.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use factoryerp_core::ValueObject;
use factoryerp_inventory::MaterialId;

use crate::order::PurchaseOrder;
use crate::receipt::{Receipt, ReceiptKind};
use crate::terms::OrderedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStatus {
    Ok,
    NeedsReplacement,
}

/// Derived reconciliation state for one (order, material) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuantitySnapshot {
    pub material_id: MaterialId,
    pub material_name: String,
    pub unit: String,
    pub total_ordered: Decimal,
    pub total_received: Decimal,
    pub total_accepted: Decimal,
    pub total_defective: Decimal,
    /// Accepted quantity that arrived on replacement receipts.
    pub accepted_from_replacements: Decimal,
    /// `max(0, total_ordered - total_accepted)`.
    pub pending_qty: Decimal,
    /// `max(0, total_defective - accepted_from_replacements)`.
    pub qty_to_replace: Decimal,
    pub replacement_status: ReplacementStatus,
}

impl ValueObject for PendingQuantitySnapshot {}

impl PendingQuantitySnapshot {
    fn empty(item: &OrderedItem) -> Self {
        Self {
            material_id: item.material_id,
            material_name: item.material_name.clone(),
            unit: item.unit.clone(),
            total_ordered: item.quantity,
            total_received: Decimal::ZERO,
            total_accepted: Decimal::ZERO,
            total_defective: Decimal::ZERO,
            accepted_from_replacements: Decimal::ZERO,
            pending_qty: item.quantity,
            qty_to_replace: Decimal::ZERO,
            replacement_status: ReplacementStatus::Ok,
        }
    }

    fn finish(&mut self) {
        self.pending_qty = floor_zero(self.total_ordered - self.total_accepted);
        self.qty_to_replace = floor_zero(self.total_defective - self.accepted_from_replacements);
        self.replacement_status = if self.qty_to_replace > Decimal::ZERO {
            ReplacementStatus::NeedsReplacement
        } else {
            ReplacementStatus::Ok
        };
    }

    pub fn needs_replacement(&self) -> bool {
        self.replacement_status == ReplacementStatus::NeedsReplacement
    }

    pub fn is_fulfilled(&self) -> bool {
        self.pending_qty.is_zero()
    }
}

fn floor_zero(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Snapshot map for every ordered item of `order`.
pub fn compute_pending_quantities(
    order: &PurchaseOrder,
) -> BTreeMap<MaterialId, PendingQuantitySnapshot> {
    aggregate_receipts(order.items(), order.receipts())
}

/// Sum receipts per ordered material. Receipt lines for materials that are not
/// on the order are ignored (the receipt engine never creates them).
///
/// Sums saturate; the order aggregate refuses receipts whose totals would not fit.
pub fn aggregate_receipts(
    items: &[OrderedItem],
    receipts: &[Receipt],
) -> BTreeMap<MaterialId, PendingQuantitySnapshot> {
    let mut snapshots: BTreeMap<MaterialId, PendingQuantitySnapshot> = items
        .iter()
        .map(|item| (item.material_id, PendingQuantitySnapshot::empty(item)))
        .collect();

    for receipt in receipts {
        for line in receipt.lines() {
            let Some(snapshot) = snapshots.get_mut(&line.material_id()) else {
                continue;
            };
            snapshot.total_received = snapshot.total_received.saturating_add(line.received_qty());
            snapshot.total_accepted = snapshot.total_accepted.saturating_add(line.accepted_qty());
            snapshot.total_defective =
                snapshot.total_defective.saturating_add(line.defective_qty());
            if receipt.kind() == ReceiptKind::Replacement {
                snapshot.accepted_from_replacements = snapshot
                    .accepted_from_replacements
                    .saturating_add(line.accepted_qty());
            }
        }
    }

    snapshots.values_mut().for_each(PendingQuantitySnapshot::finish);
    snapshots
}

/// Snapshot for a single material, if it is on the order.
pub fn pending_for_material(
    order: &PurchaseOrder,
    material_id: MaterialId,
) -> Option<PendingQuantitySnapshot> {
    let item = order.item(material_id)?;
    aggregate_receipts(std::slice::from_ref(item), order.receipts()).remove(&material_id)
}
