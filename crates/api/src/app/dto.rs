use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use factoryerp_inventory::RawMaterial;
use factoryerp_purchasing::{PendingQuantitySnapshot, PurchaseOrder};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterMaterialRequest {
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseOrderItemRequest {
    pub material_id: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderRequest {
    pub order_number: String,
    pub order_date: NaiveDate,
    pub supplier_id: String,
    pub items: Vec<PurchaseOrderItemRequest>,
    #[serde(default)]
    pub tax_percent: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptLineRequest {
    pub material_id: String,
    pub received_qty: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateReceiptRequest {
    pub receipt_number: String,
    pub date: NaiveDate,
    pub lines: Vec<ReceiptLineRequest>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReplacementRequest {
    pub receipt_number: String,
    pub date: NaiveDate,
    pub material_id: String,
    pub received_qty: Decimal,
    /// Receipt whose rejected goods this delivery replaces.
    pub replacement_for: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordInspectionRequest {
    pub material_id: String,
    pub defective_qty: Decimal,
    pub remarks: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn material_to_json(material: &RawMaterial) -> JsonValue {
    json!({
        "id": material.id_typed().to_string(),
        "name": material.name(),
        "unit": material.unit(),
        "stock": material.stock(),
    })
}

pub fn purchase_order_to_json(order: &PurchaseOrder) -> JsonValue {
    json!({
        "id": order.id_typed().to_string(),
        "order_number": order.order_number(),
        "order_date": order.order_date(),
        "supplier_id": order.supplier_id().map(|s| s.0.to_string()),
        "status": order.status(),
        "terms": order.terms(),
        "items": order.items(),
        "receipts": order.receipts(),
        "posting_started": order.posting_started(),
    })
}

pub fn pending_to_json<'a>(
    order_id: impl core::fmt::Display,
    snapshots: impl IntoIterator<Item = &'a PendingQuantitySnapshot>,
) -> JsonValue {
    json!({
        "order_id": order_id.to_string(),
        "items": snapshots.into_iter().collect::<Vec<_>>(),
    })
}
