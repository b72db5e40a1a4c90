//! Receiving service: goods receipts, quality control and order completion.
//!
//! Each mutating operation holds the order's lock from loading the stream until
//! the last event is appended, including any stock posting it triggers:
//!
//! ```text
//! lock(order)
//!   → validate against catalog
//!   → dispatch receipt / inspection command   (status re-derived by the aggregate)
//!   → evaluate: ready?  → StartPosting (fixes quantities, freezes receiving)
//!                       → credit each outstanding material (bounded by timeout)
//!                       → RecordPosting per material
//!                       → CompleteOrder
//! unlock
//! ```
//!
//! A posting failure leaves the order in its pre-completion status with every
//! successful credit recorded; the next evaluation retries the remainder with
//! the quantities fixed when posting started.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use factoryerp_core::{AggregateId, TenantId};
use factoryerp_events::{EventBus, EventEnvelope};
use factoryerp_inventory::MaterialId;
use factoryerp_purchasing::{
    CompleteOrder, CreateInitialReceipt, CreateReplacementReceipt, EvaluateStatus,
    MarkArrived, OrderedItem, PendingQuantitySnapshot, PlaceOrder, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, PurchaseOrderStatus, ReceiptId, ReceiptLineInput,
    RecordInspection, RecordPosting, StartPosting, SupplierId, compute_pending_quantities,
    evaluate,
};

use crate::catalog::{MaterialCatalog, MaterialInfo};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::ReceivingConfig;
use crate::event_store::EventStore;
use crate::locks::OrderLocks;
use crate::posting::{InventoryPoster, PostingError};

pub type ReceivingResult<T> = Result<T, ReceivingError>;

/// Aggregate type of purchase-order streams.
pub const ORDER_STREAM: &str = "purchasing.order";

#[derive(Debug, Error)]
pub enum ReceivingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Posting(#[from] PostingError),

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl From<DispatchError> for ReceivingError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) => ReceivingError::Validation(msg),
            DispatchError::InvalidState(msg) => ReceivingError::InvalidState(msg),
            DispatchError::NotFound => ReceivingError::NotFound,
            DispatchError::Concurrency(msg) => ReceivingError::Concurrency(msg),
            other => ReceivingError::Infrastructure(other.to_string()),
        }
    }
}

/// One item of a new order; name and unit come from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub material_id: MaterialId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_number: String,
    pub order_date: NaiveDate,
    pub supplier_id: SupplierId,
    pub items: Vec<NewOrderItem>,
    pub tax_percent: Decimal,
    pub discount_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialReceiptInput {
    pub receipt_number: String,
    pub date: NaiveDate,
    pub lines: Vec<ReceiptLineInput>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementReceiptInput {
    pub receipt_number: String,
    pub date: NaiveDate,
    pub material_id: MaterialId,
    pub received_qty: Decimal,
    pub remarks: Option<String>,
    pub replacement_for: ReceiptId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionInput {
    pub defective_qty: Decimal,
    pub remarks: Option<String>,
}

/// What callers get back from every receiving operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivingOutcome {
    pub order_id: PurchaseOrderId,
    pub status: PurchaseOrderStatus,
    /// Set when the operation created a receipt.
    pub receipt_id: Option<ReceiptId>,
    pub pending: Vec<PendingQuantitySnapshot>,
    pub warnings: Vec<String>,
}

impl ReceivingOutcome {
    fn of(order: &PurchaseOrder) -> Self {
        Self {
            order_id: order.id_typed(),
            status: order.status(),
            receipt_id: None,
            pending: compute_pending_quantities(order).into_values().collect(),
            warnings: Vec::new(),
        }
    }
}

/// Posting reference for one material of one order.
pub fn posting_reference(order_id: PurchaseOrderId, material_id: MaterialId) -> String {
    format!("purchase-order/{order_id}/{material_id}")
}

pub struct ReceivingService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    catalog: Arc<dyn MaterialCatalog>,
    poster: Arc<dyn InventoryPoster>,
    locks: OrderLocks,
    /// Order numbers per tenant, seeded from the store on first use.
    order_numbers: Mutex<HashMap<TenantId, HashSet<String>>>,
    config: ReceivingConfig,
}

impl<S, B> ReceivingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        catalog: Arc<dyn MaterialCatalog>,
        poster: Arc<dyn InventoryPoster>,
        config: ReceivingConfig,
    ) -> Self {
        Self {
            dispatcher,
            catalog,
            poster,
            locks: OrderLocks::new(),
            order_numbers: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ReceivingConfig {
        &self.config
    }

    #[instrument(skip(self, order), fields(tenant_id = %tenant_id, order_number = %order.order_number), err)]
    pub fn place_order(
        &self,
        tenant_id: TenantId,
        order: NewOrder,
    ) -> ReceivingResult<PurchaseOrder> {
        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let info = self.resolve_material(tenant_id, item.material_id)?;
            items.push(OrderedItem {
                material_id: item.material_id,
                material_name: info.name,
                quantity: item.quantity,
                unit: info.unit,
                unit_price: item.unit_price,
            });
        }

        // Order numbers are unique per tenant; placement is serialized per tenant
        // so the check and the append cannot interleave.
        let tenant_scope = AggregateId::from_uuid(Uuid::nil());
        self.locks.with_lock(tenant_id, tenant_scope, || -> ReceivingResult<PurchaseOrder> {
            let number = order.order_number.trim();
            if self.order_number_taken(tenant_id, number)? {
                return Err(ReceivingError::Validation(format!(
                    "order number '{number}' is already in use"
                )));
            }

            let order_id = PurchaseOrderId::new(AggregateId::new());
            let placed = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::PlaceOrder(PlaceOrder {
                    tenant_id,
                    order_id,
                    order_number: order.order_number.clone(),
                    order_date: order.order_date,
                    supplier_id: order.supplier_id,
                    items,
                    tax_percent: order.tax_percent,
                    discount_percent: order.discount_percent,
                    occurred_at: Utc::now(),
                }),
            )?;
            self.order_numbers
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .entry(tenant_id)
                .or_default()
                .insert(placed.order_number().to_string());
            info!(order_id = %order_id, "purchase order placed");
            Ok(placed)
        })
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn mark_arrived(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> ReceivingResult<ReceivingOutcome> {
        self.locks.with_lock(tenant_id, order_id.0, || -> ReceivingResult<ReceivingOutcome> {
            let order = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::MarkArrived(MarkArrived {
                    tenant_id,
                    order_id,
                    occurred_at: Utc::now(),
                }),
            )?;
            Ok(ReceivingOutcome::of(&order))
        })
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, order_id = %order_id, receipt_number = %input.receipt_number), err)]
    pub fn create_initial_receipt(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        input: InitialReceiptInput,
    ) -> ReceivingResult<ReceivingOutcome> {
        self.locks.with_lock(tenant_id, order_id.0, || -> ReceivingResult<ReceivingOutcome> {
            self.load_order(tenant_id, order_id)?;
            for line in &input.lines {
                self.resolve_material(tenant_id, line.material_id)?;
            }

            let receipt_id = ReceiptId::new();
            let order = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::CreateInitialReceipt(CreateInitialReceipt {
                    tenant_id,
                    order_id,
                    receipt_id,
                    receipt_number: input.receipt_number,
                    date: input.date,
                    lines: input.lines,
                    remarks: input.remarks,
                    occurred_at: Utc::now(),
                }),
            )?;
            info!(receipt_id = %receipt_id, status = %order.status(), "goods receipt created");

            let order = self.complete_if_ready(tenant_id, order)?;
            let mut outcome = ReceivingOutcome::of(&order);
            outcome.receipt_id = Some(receipt_id);
            Ok(outcome)
        })
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, order_id = %order_id, material_id = %input.material_id), err)]
    pub fn create_replacement_receipt(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        input: ReplacementReceiptInput,
    ) -> ReceivingResult<ReceivingOutcome> {
        self.locks.with_lock(tenant_id, order_id.0, || -> ReceivingResult<ReceivingOutcome> {
            let current = self.load_order(tenant_id, order_id)?;
            self.resolve_material(tenant_id, input.material_id)?;

            let excess = current.replacement_excess(input.material_id, input.received_qty);
            let material_id = input.material_id;
            let received_qty = input.received_qty;

            let receipt_id = ReceiptId::new();
            let order = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::CreateReplacementReceipt(CreateReplacementReceipt {
                    tenant_id,
                    order_id,
                    receipt_id,
                    receipt_number: input.receipt_number,
                    date: input.date,
                    material_id: input.material_id,
                    received_qty: input.received_qty,
                    remarks: input.remarks,
                    replacement_for: input.replacement_for,
                    occurred_at: Utc::now(),
                }),
            )?;
            info!(
                receipt_id = %receipt_id,
                status = %order.status(),
                "replacement receipt created"
            );

            let mut warnings = Vec::new();
            if let Some(excess) = excess {
                warn!(
                    excess = %excess,
                    received = %received_qty,
                    "replacement quantity exceeds outstanding defective quantity"
                );
                warnings.push(format!(
                    "replacement for material {material_id} exceeds the quantity to replace by {excess}"
                ));
            }

            let order = self.complete_if_ready(tenant_id, order)?;
            let mut outcome = ReceivingOutcome::of(&order);
            outcome.receipt_id = Some(receipt_id);
            outcome.warnings = warnings;
            Ok(outcome)
        })
    }

    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, order_id = %order_id, receipt_id = %receipt_id, material_id = %material_id), err)]
    pub fn record_inspection(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        receipt_id: ReceiptId,
        material_id: MaterialId,
        input: InspectionInput,
    ) -> ReceivingResult<ReceivingOutcome> {
        self.locks.with_lock(tenant_id, order_id.0, || -> ReceivingResult<ReceivingOutcome> {
            let order = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::RecordInspection(RecordInspection {
                    tenant_id,
                    order_id,
                    receipt_id,
                    material_id,
                    defective_qty: input.defective_qty,
                    remarks: input.remarks,
                    policy: self.config.qc_policy,
                    occurred_at: Utc::now(),
                }),
            )?;
            info!(status = %order.status(), "inspection recorded");

            let order = self.complete_if_ready(tenant_id, order)?;
            Ok(ReceivingOutcome::of(&order))
        })
    }

    /// Re-derive the status and retry completion (e.g. after a posting failure).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn evaluate(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> ReceivingResult<ReceivingOutcome> {
        self.locks.with_lock(tenant_id, order_id.0, || -> ReceivingResult<ReceivingOutcome> {
            let order = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::EvaluateStatus(EvaluateStatus {
                    tenant_id,
                    order_id,
                    occurred_at: Utc::now(),
                }),
            )?;
            let order = self.complete_if_ready(tenant_id, order)?;
            Ok(ReceivingOutcome::of(&order))
        })
    }

    /// Pure read; never takes the order lock.
    pub fn pending_quantities(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> ReceivingResult<BTreeMap<MaterialId, PendingQuantitySnapshot>> {
        let order = self.load_order(tenant_id, order_id)?;
        Ok(compute_pending_quantities(&order))
    }

    pub fn order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> ReceivingResult<PurchaseOrder> {
        self.load_order(tenant_id, order_id)
    }

    pub fn list_orders(&self, tenant_id: TenantId) -> ReceivingResult<Vec<PurchaseOrder>> {
        let ids = self
            .dispatcher
            .store()
            .stream_ids(tenant_id, ORDER_STREAM)
            .map_err(DispatchError::from)?;
        ids.into_iter()
            .map(|id| self.load_order(tenant_id, PurchaseOrderId::new(id)))
            .collect()
    }

    fn order_number_taken(&self, tenant_id: TenantId, number: &str) -> ReceivingResult<bool> {
        let mut index = self.order_numbers.lock().unwrap_or_else(|p| p.into_inner());
        if !index.contains_key(&tenant_id) {
            let known = self
                .list_orders(tenant_id)?
                .iter()
                .map(|o| o.order_number().to_string())
                .collect();
            index.insert(tenant_id, known);
        }
        Ok(index.get(&tenant_id).is_some_and(|numbers| numbers.contains(number)))
    }

    fn load_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> ReceivingResult<PurchaseOrder> {
        let order: PurchaseOrder = self
            .dispatcher
            .load(tenant_id, order_id.0, |_, id| PurchaseOrder::empty(PurchaseOrderId::new(id)))?;
        if !order.is_placed() {
            return Err(ReceivingError::NotFound);
        }
        Ok(order)
    }

    fn dispatch(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> ReceivingResult<PurchaseOrder> {
        let done = self.dispatcher.execute(tenant_id, order_id.0, ORDER_STREAM, command, |_, id| {
            PurchaseOrder::empty(PurchaseOrderId::new(id))
        })?;
        Ok(done.aggregate)
    }

    fn resolve_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> ReceivingResult<MaterialInfo> {
        self.catalog
            .lookup(tenant_id, material_id)?
            .ok_or_else(|| ReceivingError::Validation(format!("unknown material {material_id}")))
    }

    /// Post outstanding credits and complete the order once it is reconciled.
    ///
    /// Must run under the order lock.
    fn complete_if_ready(
        &self,
        tenant_id: TenantId,
        order: PurchaseOrder,
    ) -> ReceivingResult<PurchaseOrder> {
        if !evaluate(&order).is_ready() {
            return Ok(order);
        }
        let order_id = order.id_typed();

        // Quantities are fixed before the first credit leaves; retries resend them.
        let mut order = self.dispatch(
            tenant_id,
            order_id,
            PurchaseOrderCommand::StartPosting(StartPosting {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )?;

        for credit in evaluate(&order).outstanding_credits() {
            let reference = posting_reference(order_id, credit.material_id);
            if let Err(e) = self.poster.credit_material(
                tenant_id,
                credit.material_id,
                credit.quantity,
                &reference,
            ) {
                error!(
                    order_id = %order_id,
                    material_id = %credit.material_id,
                    error = %e,
                    "inventory posting failed; order left open for retry"
                );
                return Err(e.into());
            }

            order = self.dispatch(
                tenant_id,
                order_id,
                PurchaseOrderCommand::RecordPosting(RecordPosting {
                    tenant_id,
                    order_id,
                    material_id: credit.material_id,
                    quantity: credit.quantity,
                    occurred_at: Utc::now(),
                }),
            )?;
        }

        let order = self.dispatch(
            tenant_id,
            order_id,
            PurchaseOrderCommand::CompleteOrder(CompleteOrder {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )?;
        info!(order_id = %order_id, "purchase order completed and posted to inventory");
        Ok(order)
    }
}
