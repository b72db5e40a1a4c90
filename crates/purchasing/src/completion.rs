//! Order status derivation and the completion decision.
//!
//! The evaluator only decides. Crediting stock is an effect the application
//! layer performs for each outstanding [`PostingCredit`], after which it records
//! the posting and completes the order through aggregate commands.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use factoryerp_inventory::MaterialId;

use crate::order::PurchaseOrder;
use crate::pending::{PendingQuantitySnapshot, compute_pending_quantities};
use crate::status::PurchaseOrderStatus;

/// Stock credit owed for one material when the order completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingCredit {
    pub material_id: MaterialId,
    /// Total accepted quantity across every receipt of the order, as fixed
    /// when posting started.
    pub quantity: Decimal,
    /// Already credited by an earlier (interrupted) completion attempt.
    pub posted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    AlreadyCompleted,
    /// Every item is fully accepted and every line inspected.
    ReadyToComplete { credits: Vec<PostingCredit> },
    /// Not reconcilable yet; `status` is what the order should show.
    InProgress { status: PurchaseOrderStatus },
}

impl Evaluation {
    /// Credits that still have to reach the stock ledger.
    pub fn outstanding_credits(&self) -> Vec<PostingCredit> {
        match self {
            Evaluation::ReadyToComplete { credits } => {
                credits.iter().filter(|c| !c.posted).copied().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Evaluation::ReadyToComplete { .. })
    }
}

pub fn evaluate(order: &PurchaseOrder) -> Evaluation {
    if order.status() == PurchaseOrderStatus::Completed {
        return Evaluation::AlreadyCompleted;
    }

    let snapshots = compute_pending_quantities(order);
    if is_reconciled(order, &snapshots) {
        let credits = snapshots
            .values()
            .map(|s| PostingCredit {
                material_id: s.material_id,
                quantity: order
                    .planned_posting(s.material_id)
                    .unwrap_or(s.total_accepted),
                posted: order.posted_quantity(s.material_id).is_some(),
            })
            .collect();
        return Evaluation::ReadyToComplete { credits };
    }

    Evaluation::InProgress {
        status: derive_status(order, &snapshots),
    }
}

/// The non-terminal status implied by the receipt history.
///
/// Without receipts the current status (`ordered` or `arrived`) is kept.
pub fn derive_status(
    order: &PurchaseOrder,
    snapshots: &BTreeMap<MaterialId, PendingQuantitySnapshot>,
) -> PurchaseOrderStatus {
    if order.status().is_terminal() || order.receipts().is_empty() {
        return order.status();
    }
    if snapshots.values().any(PendingQuantitySnapshot::needs_replacement) {
        return PurchaseOrderStatus::ReturnedToVendor;
    }
    let any_inspected = order
        .receipts()
        .iter()
        .flat_map(|r| r.lines())
        .any(|l| l.is_inspected());
    if any_inspected {
        PurchaseOrderStatus::QcInProgress
    } else {
        PurchaseOrderStatus::GrnVerified
    }
}

fn is_reconciled(
    order: &PurchaseOrder,
    snapshots: &BTreeMap<MaterialId, PendingQuantitySnapshot>,
) -> bool {
    !order.receipts().is_empty()
        && order.receipts().iter().all(|r| r.is_fully_inspected())
        && snapshots.values().all(PendingQuantitySnapshot::is_fulfilled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Fixture, dec, material, ordered};

    #[test]
    fn no_receipts_keeps_current_status() {
        let m = material();
        let fx = Fixture::placed(vec![ordered(m, 10)]);
        assert_eq!(
            evaluate(&fx.order),
            Evaluation::InProgress {
                status: PurchaseOrderStatus::Ordered
            }
        );
    }

    #[test]
    fn fully_received_but_uninspected_is_not_ready() {
        let m = material();
        let mut fx = Fixture::placed(vec![ordered(m, 10)]);
        fx.receive(&[(m, 10)]);
        assert_eq!(
            evaluate(&fx.order),
            Evaluation::InProgress {
                status: PurchaseOrderStatus::GrnVerified
            }
        );
    }

    #[test]
    fn partial_acceptance_stays_in_qc() {
        let m = material();
        let mut fx = Fixture::placed(vec![ordered(m, 10)]);
        let grn = fx.receive(&[(m, 6)]);
        fx.inspect(grn, m, 0);
        assert_eq!(
            evaluate(&fx.order),
            Evaluation::InProgress {
                status: PurchaseOrderStatus::QcInProgress
            }
        );
    }

    #[test]
    fn replacement_need_wins_over_qc_in_progress() {
        let (a, b) = (material(), material());
        let mut fx = Fixture::placed(vec![ordered(a, 10), ordered(b, 10)]);
        let grn = fx.receive(&[(a, 10), (b, 10)]);
        fx.inspect(grn, a, 0);
        fx.inspect(grn, b, 3);
        assert_eq!(
            derive_status(&fx.order, &compute_pending_quantities(&fx.order)),
            PurchaseOrderStatus::ReturnedToVendor
        );
    }

    #[test]
    fn ready_lists_each_material_once_and_tracks_postings() {
        let (a, b) = (material(), material());
        let mut fx = Fixture::placed(vec![ordered(a, 10), ordered(b, 4)]);
        let grn = fx.receive(&[(a, 10), (b, 4)]);
        fx.inspect(grn, a, 0);
        fx.inspect(grn, b, 0);

        let eval = evaluate(&fx.order);
        assert!(eval.is_ready());
        assert_eq!(eval.outstanding_credits().len(), 2);

        fx.run(fx.start_posting_cmd()).unwrap();
        fx.run(fx.post_cmd(a, dec(10))).unwrap();
        let outstanding = evaluate(&fx.order).outstanding_credits();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].material_id, b);
        assert_eq!(outstanding[0].quantity, dec(4));
    }

    #[test]
    fn completed_order_evaluates_as_already_completed() {
        let m = material();
        let mut fx = Fixture::placed(vec![ordered(m, 10)]);
        let grn = fx.receive(&[(m, 10)]);
        fx.inspect(grn, m, 0);
        fx.run(fx.start_posting_cmd()).unwrap();
        fx.run(fx.post_cmd(m, dec(10))).unwrap();
        fx.run(fx.complete_cmd()).unwrap();

        assert_eq!(evaluate(&fx.order), Evaluation::AlreadyCompleted);
        assert!(evaluate(&fx.order).outstanding_credits().is_empty());
    }
}
