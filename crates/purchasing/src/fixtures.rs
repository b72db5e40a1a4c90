//! Builders shared by the aggregate and evaluator tests.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use factoryerp_core::{AggregateId, DomainError, TenantId};
use factoryerp_events::execute;
use factoryerp_inventory::MaterialId;

use crate::order::*;
use crate::qc::QcInputPolicy;
use crate::receipt::{ReceiptId, ReceiptLineInput};
use crate::terms::OrderedItem;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
}

pub fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

pub fn material() -> MaterialId {
    MaterialId::new(AggregateId::new())
}

pub fn ordered(material_id: MaterialId, qty: i64) -> OrderedItem {
    OrderedItem {
        material_id,
        material_name: "Steel Rod".to_string(),
        quantity: dec(qty),
        unit: "kg".to_string(),
        unit_price: dec(4),
    }
}

/// A placed order plus the tenant it belongs to.
pub struct Fixture {
    pub tenant: TenantId,
    pub order: PurchaseOrder,
    receipt_seq: u32,
}

impl Fixture {
    pub fn placed(items: Vec<OrderedItem>) -> Self {
        let tenant = TenantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let mut order = PurchaseOrder::empty(order_id);
        execute(
            &mut order,
            &PurchaseOrderCommand::PlaceOrder(PlaceOrder {
                tenant_id: tenant,
                order_id,
                order_number: "PO-1001".to_string(),
                order_date: day(),
                supplier_id: SupplierId::new(AggregateId::new()),
                items,
                tax_percent: Decimal::ZERO,
                discount_percent: Decimal::ZERO,
                occurred_at: now(),
            }),
        )
        .unwrap();
        Self {
            tenant,
            order,
            receipt_seq: 0,
        }
    }

    pub fn run(
        &mut self,
        cmd: PurchaseOrderCommand,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        execute(&mut self.order, &cmd)
    }

    fn next_number(&mut self) -> String {
        self.receipt_seq += 1;
        format!("GRN-{:03}", self.receipt_seq)
    }

    pub fn initial_cmd(
        &mut self,
        lines: &[(MaterialId, i64)],
    ) -> (ReceiptId, PurchaseOrderCommand) {
        let receipt_id = ReceiptId::new();
        let cmd = PurchaseOrderCommand::CreateInitialReceipt(CreateInitialReceipt {
            tenant_id: self.tenant,
            order_id: self.order.id_typed(),
            receipt_id,
            receipt_number: self.next_number(),
            date: day(),
            lines: lines
                .iter()
                .map(|&(material_id, qty)| ReceiptLineInput {
                    material_id,
                    received_qty: dec(qty),
                })
                .collect(),
            remarks: None,
            occurred_at: now(),
        });
        (receipt_id, cmd)
    }

    pub fn receive(&mut self, lines: &[(MaterialId, i64)]) -> ReceiptId {
        let (receipt_id, cmd) = self.initial_cmd(lines);
        self.run(cmd).unwrap();
        receipt_id
    }

    pub fn replacement_cmd(
        &mut self,
        material_id: MaterialId,
        qty: i64,
        replacement_for: ReceiptId,
    ) -> (ReceiptId, PurchaseOrderCommand) {
        let receipt_id = ReceiptId::new();
        let cmd = PurchaseOrderCommand::CreateReplacementReceipt(CreateReplacementReceipt {
            tenant_id: self.tenant,
            order_id: self.order.id_typed(),
            receipt_id,
            receipt_number: self.next_number(),
            date: day(),
            material_id,
            received_qty: dec(qty),
            remarks: Some("replacement".to_string()),
            replacement_for,
            occurred_at: now(),
        });
        (receipt_id, cmd)
    }

    pub fn replace(
        &mut self,
        material_id: MaterialId,
        qty: i64,
        replacement_for: ReceiptId,
    ) -> ReceiptId {
        let (receipt_id, cmd) = self.replacement_cmd(material_id, qty, replacement_for);
        self.run(cmd).unwrap();
        receipt_id
    }

    pub fn inspect_cmd(
        &self,
        receipt_id: ReceiptId,
        material_id: MaterialId,
        defective: i64,
        policy: QcInputPolicy,
    ) -> PurchaseOrderCommand {
        PurchaseOrderCommand::RecordInspection(RecordInspection {
            tenant_id: self.tenant,
            order_id: self.order.id_typed(),
            receipt_id,
            material_id,
            defective_qty: dec(defective),
            remarks: None,
            policy,
            occurred_at: now(),
        })
    }

    pub fn inspect(&mut self, receipt_id: ReceiptId, material_id: MaterialId, defective: i64) {
        let cmd = self.inspect_cmd(receipt_id, material_id, defective, QcInputPolicy::Reject);
        self.run(cmd).unwrap();
    }

    pub fn start_posting_cmd(&self) -> PurchaseOrderCommand {
        PurchaseOrderCommand::StartPosting(StartPosting {
            tenant_id: self.tenant,
            order_id: self.order.id_typed(),
            occurred_at: now(),
        })
    }

    pub fn post_cmd(&self, material_id: MaterialId, qty: Decimal) -> PurchaseOrderCommand {
        PurchaseOrderCommand::RecordPosting(RecordPosting {
            tenant_id: self.tenant,
            order_id: self.order.id_typed(),
            material_id,
            quantity: qty,
            occurred_at: now(),
        })
    }

    pub fn complete_cmd(&self) -> PurchaseOrderCommand {
        PurchaseOrderCommand::CompleteOrder(CompleteOrder {
            tenant_id: self.tenant,
            order_id: self.order.id_typed(),
            occurred_at: now(),
        })
    }
}
