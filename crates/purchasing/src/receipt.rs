//! Goods receipt notes (GRNs) and their per-material lines.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use factoryerp_core::Entity;
use factoryerp_inventory::MaterialId;

/// Goods receipt identifier (unique within its purchase order).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub Uuid);

impl ReceiptId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ReceiptId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ReceiptId {
    type Err = factoryerp_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| factoryerp_core::DomainError::invalid_id(format!("ReceiptId: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Initial,
    Replacement,
}

/// Forward-only: `Pending -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Pending,
    Completed,
}

/// Audit link from a replacement receipt to the delivery whose defects it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRef {
    pub receipt_id: ReceiptId,
    pub material_id: MaterialId,
}

/// Caller input for one line of an initial receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineInput {
    pub material_id: MaterialId,
    pub received_qty: Decimal,
}

/// One material within a receipt.
///
/// `accepted_qty + defective_qty == received_qty` holds at all times; the QC
/// fields are only changed through [`ReceiptLine::record_inspection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    material_id: MaterialId,
    material_name: String,
    ordered_qty: Decimal,
    received_qty: Decimal,
    defective_qty: Decimal,
    accepted_qty: Decimal,
    qc_status: QcStatus,
    qc_remarks: Option<String>,
}

impl ReceiptLine {
    pub(crate) fn new(
        material_id: MaterialId,
        material_name: impl Into<String>,
        ordered_qty: Decimal,
        received_qty: Decimal,
    ) -> Self {
        Self {
            material_id,
            material_name: material_name.into(),
            ordered_qty,
            received_qty,
            defective_qty: Decimal::ZERO,
            accepted_qty: received_qty,
            qc_status: QcStatus::Pending,
            qc_remarks: None,
        }
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn material_name(&self) -> &str {
        &self.material_name
    }

    pub fn ordered_qty(&self) -> Decimal {
        self.ordered_qty
    }

    pub fn received_qty(&self) -> Decimal {
        self.received_qty
    }

    pub fn defective_qty(&self) -> Decimal {
        self.defective_qty
    }

    pub fn accepted_qty(&self) -> Decimal {
        self.accepted_qty
    }

    pub fn qc_status(&self) -> QcStatus {
        self.qc_status
    }

    pub fn qc_remarks(&self) -> Option<&str> {
        self.qc_remarks.as_deref()
    }

    pub fn is_inspected(&self) -> bool {
        self.qc_status == QcStatus::Completed
    }

    /// Store an inspection outcome. `defective` must already be within
    /// `[0, received_qty]` (see [`crate::qc::normalize_defective`]).
    pub(crate) fn record_inspection(&mut self, defective: Decimal, remarks: Option<String>) {
        debug_assert!(defective >= Decimal::ZERO && defective <= self.received_qty);
        let defective = defective.clamp(Decimal::ZERO, self.received_qty);
        self.defective_qty = defective;
        self.accepted_qty = self.received_qty - defective;
        self.qc_status = QcStatus::Completed;
        self.qc_remarks = remarks;
    }
}

/// Goods receipt note: one physical delivery against a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    id: ReceiptId,
    number: String,
    date: NaiveDate,
    kind: ReceiptKind,
    replacement_for: Option<ReplacementRef>,
    remarks: Option<String>,
    lines: Vec<ReceiptLine>,
}

impl Receipt {
    pub(crate) fn initial(
        id: ReceiptId,
        number: impl Into<String>,
        date: NaiveDate,
        remarks: Option<String>,
        lines: Vec<ReceiptLine>,
    ) -> Self {
        Self {
            id,
            number: number.into(),
            date,
            kind: ReceiptKind::Initial,
            replacement_for: None,
            remarks,
            lines,
        }
    }

    pub(crate) fn replacement(
        id: ReceiptId,
        number: impl Into<String>,
        date: NaiveDate,
        remarks: Option<String>,
        replacement_for: ReplacementRef,
        line: ReceiptLine,
    ) -> Self {
        Self {
            id,
            number: number.into(),
            date,
            kind: ReceiptKind::Replacement,
            replacement_for: Some(replacement_for),
            remarks,
            lines: vec![line],
        }
    }

    pub fn id_typed(&self) -> ReceiptId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn kind(&self) -> ReceiptKind {
        self.kind
    }

    pub fn replacement_for(&self) -> Option<ReplacementRef> {
        self.replacement_for
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn lines(&self) -> &[ReceiptLine] {
        &self.lines
    }

    pub fn line(&self, material_id: MaterialId) -> Option<&ReceiptLine> {
        self.lines.iter().find(|l| l.material_id == material_id)
    }

    pub(crate) fn line_mut(&mut self, material_id: MaterialId) -> Option<&mut ReceiptLine> {
        self.lines.iter_mut().find(|l| l.material_id == material_id)
    }

    pub fn is_fully_inspected(&self) -> bool {
        self.lines.iter().all(ReceiptLine::is_inspected)
    }
}

impl Entity for Receipt {
    type Id = ReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
