use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use factoryerp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use factoryerp_events::Event;
use factoryerp_inventory::MaterialId;

use crate::completion::{self, Evaluation};
use crate::pending::{compute_pending_quantities, pending_for_material};
use crate::qc::{QcInputPolicy, normalize_defective};
use crate::receipt::{Receipt, ReceiptId, ReceiptLine, ReceiptLineInput, ReplacementRef};
use crate::status::PurchaseOrderStatus;
use crate::terms::{MonetaryTerms, OrderedItem, validate_items};

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supplier reference. Supplier records live outside purchasing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

/// Aggregate root: PurchaseOrder, including every goods receipt taken against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    order_number: String,
    order_date: Option<NaiveDate>,
    supplier_id: Option<SupplierId>,
    terms: Option<MonetaryTerms>,
    status: PurchaseOrderStatus,
    items: Vec<OrderedItem>,
    receipts: Vec<Receipt>,
    posting_plan: BTreeMap<MaterialId, Decimal>,
    postings: BTreeMap<MaterialId, Decimal>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            order_number: String::new(),
            order_date: None,
            supplier_id: None,
            terms: None,
            status: PurchaseOrderStatus::Ordered,
            items: Vec::new(),
            receipts: Vec::new(),
            posting_plan: BTreeMap::new(),
            postings: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn terms(&self) -> Option<&MonetaryTerms> {
        self.terms.as_ref()
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderedItem] {
        &self.items
    }

    pub fn item(&self, material_id: MaterialId) -> Option<&OrderedItem> {
        self.items.iter().find(|i| i.material_id == material_id)
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn receipt(&self, receipt_id: ReceiptId) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.id_typed() == receipt_id)
    }

    /// Quantity already credited to stock for `material_id`, if any.
    pub fn posted_quantity(&self, material_id: MaterialId) -> Option<Decimal> {
        self.postings.get(&material_id).copied()
    }

    /// Quantity fixed for `material_id` when posting started, if it has.
    pub fn planned_posting(&self, material_id: MaterialId) -> Option<Decimal> {
        self.posting_plan.get(&material_id).copied()
    }

    /// Completion is underway: the stock credits have been fixed but the order is
    /// not completed yet. Receipts and inspections are frozen.
    pub fn posting_started(&self) -> bool {
        !self.posting_plan.is_empty() && self.status != PurchaseOrderStatus::Completed
    }

    /// Units by which a proposed replacement delivery exceeds what is still owed.
    pub fn replacement_excess(
        &self,
        material_id: MaterialId,
        received_qty: Decimal,
    ) -> Option<Decimal> {
        let snapshot = pending_for_material(self, material_id)?;
        let excess = received_qty - snapshot.qty_to_replace;
        (excess > Decimal::ZERO).then_some(excess)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub order_number: String,
    pub order_date: NaiveDate,
    pub supplier_id: SupplierId,
    pub items: Vec<OrderedItem>,
    pub tax_percent: Decimal,
    pub discount_percent: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkArrived (goods are physically at the dock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkArrived {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CreateInitialReceipt.
///
/// Lines with a zero received quantity are dropped; at least one line must remain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInitialReceipt {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub receipt_number: String,
    pub date: NaiveDate,
    pub lines: Vec<ReceiptLineInput>,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CreateReplacementReceipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReplacementReceipt {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub receipt_number: String,
    pub date: NaiveDate,
    pub material_id: MaterialId,
    pub received_qty: Decimal,
    pub remarks: Option<String>,
    /// Receipt whose defective units this delivery replaces.
    pub replacement_for: ReceiptId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInspection (QC outcome for one receipt line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInspection {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub material_id: MaterialId,
    pub defective_qty: Decimal,
    pub remarks: Option<String>,
    pub policy: QcInputPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EvaluateStatus (bring a lagging status in line with the receipts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateStatus {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartPosting (fix the stock credits and freeze receiving).
///
/// A no-op once posting has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPosting {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPosting (a material's accepted total reached the stock ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPosting {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub material_id: MaterialId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteOrder. A no-op on an already completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    PlaceOrder(PlaceOrder),
    MarkArrived(MarkArrived),
    CreateInitialReceipt(CreateInitialReceipt),
    CreateReplacementReceipt(CreateReplacementReceipt),
    RecordInspection(RecordInspection),
    EvaluateStatus(EvaluateStatus),
    StartPosting(StartPosting),
    RecordPosting(RecordPosting),
    CompleteOrder(CompleteOrder),
}

impl PurchaseOrderCommand {
    pub fn order_id(&self) -> PurchaseOrderId {
        match self {
            PurchaseOrderCommand::PlaceOrder(c) => c.order_id,
            PurchaseOrderCommand::MarkArrived(c) => c.order_id,
            PurchaseOrderCommand::CreateInitialReceipt(c) => c.order_id,
            PurchaseOrderCommand::CreateReplacementReceipt(c) => c.order_id,
            PurchaseOrderCommand::RecordInspection(c) => c.order_id,
            PurchaseOrderCommand::EvaluateStatus(c) => c.order_id,
            PurchaseOrderCommand::StartPosting(c) => c.order_id,
            PurchaseOrderCommand::RecordPosting(c) => c.order_id,
            PurchaseOrderCommand::CompleteOrder(c) => c.order_id,
        }
    }
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub order_number: String,
    pub order_date: NaiveDate,
    pub supplier_id: SupplierId,
    pub items: Vec<OrderedItem>,
    pub terms: MonetaryTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsArrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsArrived {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptCreated. Carries the full receipt as created (lines pending QC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt: Receipt,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InspectionRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecorded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub material_id: MaterialId,
    /// Already normalized into `[0, received]`.
    pub defective_qty: Decimal,
    pub accepted_qty: Decimal,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// One stock credit fixed by [`PostingStarted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCredit {
    pub material_id: MaterialId,
    pub quantity: Decimal,
}

/// Event: PostingStarted. Recorded before any credit is sent to the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingStarted {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub credits: Vec<PlannedCredit>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPosted {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub material_id: MaterialId,
    pub quantity: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    OrderPlaced(OrderPlaced),
    GoodsArrived(GoodsArrived),
    ReceiptCreated(ReceiptCreated),
    InspectionRecorded(InspectionRecorded),
    StatusChanged(StatusChanged),
    PostingStarted(PostingStarted),
    MaterialPosted(MaterialPosted),
    OrderCompleted(OrderCompleted),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::OrderPlaced(_) => "purchasing.order.placed",
            PurchaseOrderEvent::GoodsArrived(_) => "purchasing.order.goods_arrived",
            PurchaseOrderEvent::ReceiptCreated(_) => "purchasing.order.receipt_created",
            PurchaseOrderEvent::InspectionRecorded(_) => "purchasing.order.inspection_recorded",
            PurchaseOrderEvent::StatusChanged(_) => "purchasing.order.status_changed",
            PurchaseOrderEvent::PostingStarted(_) => "purchasing.order.posting_started",
            PurchaseOrderEvent::MaterialPosted(_) => "purchasing.order.material_posted",
            PurchaseOrderEvent::OrderCompleted(_) => "purchasing.order.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::OrderPlaced(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsArrived(e) => e.occurred_at,
            PurchaseOrderEvent::ReceiptCreated(e) => e.occurred_at,
            PurchaseOrderEvent::InspectionRecorded(e) => e.occurred_at,
            PurchaseOrderEvent::StatusChanged(e) => e.occurred_at,
            PurchaseOrderEvent::PostingStarted(e) => e.occurred_at,
            PurchaseOrderEvent::MaterialPosted(e) => e.occurred_at,
            PurchaseOrderEvent::OrderCompleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.order_number = e.order_number.clone();
                self.order_date = Some(e.order_date);
                self.supplier_id = Some(e.supplier_id);
                self.items = e.items.clone();
                self.terms = Some(e.terms.clone());
                self.status = PurchaseOrderStatus::Ordered;
                self.receipts.clear();
                self.posting_plan.clear();
                self.postings.clear();
                self.created = true;
            }
            PurchaseOrderEvent::GoodsArrived(_) => {
                self.status = PurchaseOrderStatus::Arrived;
            }
            PurchaseOrderEvent::ReceiptCreated(e) => {
                self.receipts.push(e.receipt.clone());
            }
            PurchaseOrderEvent::InspectionRecorded(e) => {
                if let Some(line) = self
                    .receipts
                    .iter_mut()
                    .find(|r| r.id_typed() == e.receipt_id)
                    .and_then(|r| r.line_mut(e.material_id))
                {
                    line.record_inspection(e.defective_qty, e.remarks.clone());
                }
            }
            PurchaseOrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            PurchaseOrderEvent::PostingStarted(e) => {
                self.posting_plan = e
                    .credits
                    .iter()
                    .map(|c| (c.material_id, c.quantity))
                    .collect();
            }
            PurchaseOrderEvent::MaterialPosted(e) => {
                self.postings.insert(e.material_id, e.quantity);
            }
            PurchaseOrderEvent::OrderCompleted(_) => {
                self.status = PurchaseOrderStatus::Completed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            PurchaseOrderCommand::MarkArrived(cmd) => self.handle_arrived(cmd),
            PurchaseOrderCommand::CreateInitialReceipt(cmd) => self.handle_initial_receipt(cmd),
            PurchaseOrderCommand::CreateReplacementReceipt(cmd) => {
                self.handle_replacement_receipt(cmd)
            }
            PurchaseOrderCommand::RecordInspection(cmd) => self.handle_inspection(cmd),
            PurchaseOrderCommand::EvaluateStatus(cmd) => self.handle_evaluate(cmd),
            PurchaseOrderCommand::StartPosting(cmd) => self.handle_start_posting(cmd),
            PurchaseOrderCommand::RecordPosting(cmd) => self.handle_posting(cmd),
            PurchaseOrderCommand::CompleteOrder(cmd) => self.handle_complete(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_placed(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invalid_state("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invalid_state("order_id mismatch"));
        }
        Ok(())
    }

    /// Receipts and inspections are only taken while the order is open and
    /// posting has not started.
    fn ensure_receiving_open(&self) -> Result<(), DomainError> {
        if !self.status.accepts_receipts() {
            return Err(DomainError::invalid_state(format!(
                "purchase order is {}",
                self.status
            )));
        }
        if self.posting_started() {
            return Err(DomainError::invalid_state(
                "inventory posting is in progress for this purchase order",
            ));
        }
        Ok(())
    }

    fn ensure_new_receipt(&self, receipt_id: ReceiptId, number: &str) -> Result<(), DomainError> {
        if number.trim().is_empty() {
            return Err(DomainError::validation("receipt number cannot be empty"));
        }
        if self.receipt(receipt_id).is_some() {
            return Err(DomainError::conflict(format!("receipt {receipt_id} already exists")));
        }
        if self.receipts.iter().any(|r| r.number() == number.trim()) {
            return Err(DomainError::validation(format!(
                "receipt number '{}' is already used on this order",
                number.trim()
            )));
        }
        Ok(())
    }

    /// Per-material received totals stay representable once `receipt` is added.
    fn ensure_totals_fit(&self, receipt: &Receipt) -> Result<(), DomainError> {
        for line in receipt.lines() {
            let total = self
                .receipts
                .iter()
                .filter_map(|r| r.line(line.material_id()))
                .try_fold(line.received_qty(), |acc, l| acc.checked_add(l.received_qty()));
            if total.is_none() {
                return Err(DomainError::validation(format!(
                    "received quantity for material {} is too large",
                    line.material_id()
                )));
            }
        }
        Ok(())
    }

    /// Append a `StatusChanged` event when `events` move the derived status.
    fn with_derived_status(
        &self,
        mut events: Vec<PurchaseOrderEvent>,
        tenant_id: TenantId,
        occurred_at: DateTime<Utc>,
    ) -> Vec<PurchaseOrderEvent> {
        let mut next = self.clone();
        for ev in &events {
            next.apply(ev);
        }
        let target = completion::derive_status(&next, &compute_pending_quantities(&next));
        if target != next.status {
            events.push(PurchaseOrderEvent::StatusChanged(StatusChanged {
                tenant_id,
                order_id: self.id,
                from: next.status,
                to: target,
                occurred_at,
            }));
        }
        events
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        validate_items(&cmd.items)?;
        let terms = MonetaryTerms::compute(&cmd.items, cmd.tax_percent, cmd.discount_percent)?;

        Ok(vec![PurchaseOrderEvent::OrderPlaced(OrderPlaced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            order_number: cmd.order_number.trim().to_string(),
            order_date: cmd.order_date,
            supplier_id: cmd.supplier_id,
            items: cmd.items.clone(),
            terms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_arrived(&self, cmd: &MarkArrived) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;
        if self.status != PurchaseOrderStatus::Ordered {
            return Err(DomainError::invalid_state(format!(
                "goods can only arrive for an ordered purchase order (current: {})",
                self.status
            )));
        }
        Ok(vec![PurchaseOrderEvent::GoodsArrived(GoodsArrived {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_initial_receipt(
        &self,
        cmd: &CreateInitialReceipt,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;
        self.ensure_receiving_open()?;
        self.ensure_new_receipt(cmd.receipt_id, &cmd.receipt_number)?;

        // Validate every input line before building any of them.
        let mut seen = BTreeSet::new();
        for input in &cmd.lines {
            if self.item(input.material_id).is_none() {
                return Err(DomainError::validation(format!(
                    "material {} is not on this purchase order",
                    input.material_id
                )));
            }
            if !seen.insert(input.material_id) {
                return Err(DomainError::validation(format!(
                    "material {} appears more than once in the receipt",
                    input.material_id
                )));
            }
            if input.received_qty < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "received quantity for material {} cannot be negative",
                    input.material_id
                )));
            }
        }

        let lines: Vec<ReceiptLine> = cmd
            .lines
            .iter()
            .filter(|input| input.received_qty > Decimal::ZERO)
            .filter_map(|input| {
                self.item(input.material_id).map(|item| {
                    ReceiptLine::new(
                        item.material_id,
                        item.material_name.clone(),
                        item.quantity,
                        input.received_qty,
                    )
                })
            })
            .collect();
        if lines.is_empty() {
            return Err(DomainError::validation(
                "receipt must receive a positive quantity of at least one material",
            ));
        }

        let receipt = Receipt::initial(
            cmd.receipt_id,
            cmd.receipt_number.trim(),
            cmd.date,
            cmd.remarks.clone(),
            lines,
        );
        self.ensure_totals_fit(&receipt)?;
        let events = vec![PurchaseOrderEvent::ReceiptCreated(ReceiptCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt,
            occurred_at: cmd.occurred_at,
        })];
        Ok(self.with_derived_status(events, cmd.tenant_id, cmd.occurred_at))
    }

    fn handle_replacement_receipt(
        &self,
        cmd: &CreateReplacementReceipt,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;
        self.ensure_receiving_open()?;
        self.ensure_new_receipt(cmd.receipt_id, &cmd.receipt_number)?;

        let Some(item) = self.item(cmd.material_id) else {
            return Err(DomainError::validation(format!(
                "material {} is not on this purchase order",
                cmd.material_id
            )));
        };
        if cmd.received_qty <= Decimal::ZERO {
            return Err(DomainError::validation(
                "replacement quantity must be positive",
            ));
        }
        let needs_replacement = pending_for_material(self, cmd.material_id)
            .is_some_and(|s| s.needs_replacement());
        if !needs_replacement {
            return Err(DomainError::invalid_state(format!(
                "material {} has no outstanding replacement need",
                cmd.material_id
            )));
        }
        let replaces = self
            .receipt(cmd.replacement_for)
            .filter(|r| r.line(cmd.material_id).is_some())
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "receipt {} does not carry material {}",
                    cmd.replacement_for, cmd.material_id
                ))
            })?;

        let line = ReceiptLine::new(
            item.material_id,
            item.material_name.clone(),
            item.quantity,
            cmd.received_qty,
        );
        let receipt = Receipt::replacement(
            cmd.receipt_id,
            cmd.receipt_number.trim(),
            cmd.date,
            cmd.remarks.clone(),
            ReplacementRef {
                receipt_id: replaces.id_typed(),
                material_id: cmd.material_id,
            },
            line,
        );
        self.ensure_totals_fit(&receipt)?;
        let events = vec![PurchaseOrderEvent::ReceiptCreated(ReceiptCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt,
            occurred_at: cmd.occurred_at,
        })];
        Ok(self.with_derived_status(events, cmd.tenant_id, cmd.occurred_at))
    }

    fn handle_inspection(
        &self,
        cmd: &RecordInspection,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;
        self.ensure_receiving_open()?;

        let receipt = self.receipt(cmd.receipt_id).ok_or_else(DomainError::not_found)?;
        let line = receipt
            .line(cmd.material_id)
            .ok_or_else(DomainError::not_found)?;
        let defective = normalize_defective(line.received_qty(), cmd.defective_qty, cmd.policy)?;

        let events = vec![PurchaseOrderEvent::InspectionRecorded(InspectionRecorded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt_id: cmd.receipt_id,
            material_id: cmd.material_id,
            defective_qty: defective,
            accepted_qty: line.received_qty() - defective,
            remarks: cmd.remarks.clone(),
            occurred_at: cmd.occurred_at,
        })];
        Ok(self.with_derived_status(events, cmd.tenant_id, cmd.occurred_at))
    }

    fn handle_evaluate(
        &self,
        cmd: &EvaluateStatus,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;
        Ok(self.with_derived_status(Vec::new(), cmd.tenant_id, cmd.occurred_at))
    }

    fn handle_start_posting(
        &self,
        cmd: &StartPosting,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;
        if !self.posting_plan.is_empty() {
            return Ok(vec![]);
        }

        let Evaluation::ReadyToComplete { credits } = completion::evaluate(self) else {
            return Err(DomainError::invalid_state(
                "purchase order is not ready for inventory posting",
            ));
        };
        Ok(vec![PurchaseOrderEvent::PostingStarted(PostingStarted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            credits: credits
                .iter()
                .map(|c| PlannedCredit {
                    material_id: c.material_id,
                    quantity: c.quantity,
                })
                .collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_posting(&self, cmd: &RecordPosting) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;

        if !self.posting_started() {
            return Err(DomainError::invalid_state(
                "inventory posting has not been started for this purchase order",
            ));
        }
        let planned = self.planned_posting(cmd.material_id).ok_or_else(|| {
            DomainError::validation(format!(
                "material {} is not on this purchase order",
                cmd.material_id
            ))
        })?;
        if self.postings.contains_key(&cmd.material_id) {
            return Err(DomainError::conflict(format!(
                "material {} is already posted",
                cmd.material_id
            )));
        }
        if planned != cmd.quantity {
            return Err(DomainError::validation(format!(
                "posting quantity {} does not match planned quantity {planned}",
                cmd.quantity
            )));
        }

        Ok(vec![PurchaseOrderEvent::MaterialPosted(MaterialPosted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            material_id: cmd.material_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_placed(cmd.tenant_id, cmd.order_id)?;

        match completion::evaluate(self) {
            Evaluation::AlreadyCompleted => Ok(vec![]),
            Evaluation::InProgress { .. } => Err(DomainError::invalid_state(
                "purchase order still has pending or uninspected quantities",
            )),
            Evaluation::ReadyToComplete { credits } => {
                if let Some(unposted) = credits.iter().find(|c| !c.posted) {
                    return Err(DomainError::invalid_state(format!(
                        "material {} has not been posted to inventory",
                        unposted.material_id
                    )));
                }
                Ok(vec![PurchaseOrderEvent::OrderCompleted(OrderCompleted {
                    tenant_id: cmd.tenant_id,
                    order_id: cmd.order_id,
                    from: self.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
