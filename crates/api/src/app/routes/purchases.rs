use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use factoryerp_infra::receiving::{
    InitialReceiptInput, InspectionInput, NewOrder, NewOrderItem, ReceivingOutcome,
    ReceivingResult, ReplacementReceiptInput,
};
use factoryerp_inventory::MaterialId;
use factoryerp_purchasing::{PurchaseOrderId, ReceiptId, ReceiptLineInput, SupplierId};

use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/orders", post(create_purchase_order).get(list_purchase_orders))
        .route("/orders/:id", get(get_purchase_order))
        .route("/orders/:id/arrive", post(mark_arrived))
        .route("/orders/:id/receipts", post(create_initial_receipt))
        .route("/orders/:id/replacements", post(create_replacement_receipt))
        .route(
            "/orders/:id/receipts/:receipt_id/inspections",
            post(record_inspection),
        )
        .route("/orders/:id/pending", get(get_pending_quantities))
        .route("/orders/:id/evaluate", post(evaluate_order))
}

fn parse_order_id(raw: &str) -> Result<PurchaseOrderId, axum::response::Response> {
    errors::parse_id(raw, "purchase order id").map(PurchaseOrderId::new)
}

fn parse_material_id(raw: &str) -> Result<MaterialId, axum::response::Response> {
    errors::parse_id(raw, "material id").map(MaterialId::new)
}

fn parse_receipt_id(raw: &str) -> Result<ReceiptId, axum::response::Response> {
    raw.trim().parse::<ReceiptId>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid receipt id")
    })
}

fn outcome_response(
    status: StatusCode,
    result: ReceivingResult<ReceivingOutcome>,
) -> axum::response::Response {
    match result {
        Ok(outcome) => (status, Json(outcome)).into_response(),
        Err(e) => errors::receiving_error_to_response(e),
    }
}

pub async fn create_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreatePurchaseOrderRequest>,
) -> axum::response::Response {
    let supplier_id = match errors::parse_id(&body.supplier_id, "supplier_id") {
        Ok(v) => SupplierId::new(v),
        Err(resp) => return resp,
    };

    let mut items = Vec::with_capacity(body.items.len());
    for item in body.items {
        let material_id = match parse_material_id(&item.material_id) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        items.push(NewOrderItem {
            material_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
        });
    }

    let order = NewOrder {
        order_number: body.order_number,
        order_date: body.order_date,
        supplier_id,
        items,
        tax_percent: body.tax_percent,
        discount_percent: body.discount_percent,
    };

    let tenant_id = tenant.tenant_id();
    match services::run_blocking(&services, move |s| {
        s.receiving().place_order(tenant_id, order)
    })
    .await
    {
        Ok(placed) => (
            StatusCode::CREATED,
            Json(dto::purchase_order_to_json(&placed)),
        )
            .into_response(),
        Err(e) => errors::receiving_error_to_response(e),
    }
}

pub async fn list_purchase_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let tenant_id = tenant.tenant_id();
    match services::run_blocking(&services, move |s| s.receiving().list_orders(tenant_id)).await {
        Ok(orders) => {
            let items = orders
                .iter()
                .map(dto::purchase_order_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::receiving_error_to_response(e),
    }
}

pub async fn get_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    let result =
        services::run_blocking(&services, move |s| s.receiving().order(tenant_id, order_id)).await;
    match result {
        Ok(order) => (StatusCode::OK, Json(dto::purchase_order_to_json(&order))).into_response(),
        Err(e) => errors::receiving_error_to_response(e),
    }
}

pub async fn mark_arrived(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    let result = services::run_blocking(&services, move |s| {
        s.receiving().mark_arrived(tenant_id, order_id)
    })
    .await;
    outcome_response(StatusCode::OK, result)
}

pub async fn create_initial_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateReceiptRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut lines = Vec::with_capacity(body.lines.len());
    for line in body.lines {
        let material_id = match parse_material_id(&line.material_id) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        lines.push(ReceiptLineInput {
            material_id,
            received_qty: line.received_qty,
        });
    }

    let input = InitialReceiptInput {
        receipt_number: body.receipt_number,
        date: body.date,
        lines,
        remarks: body.remarks,
    };

    let tenant_id = tenant.tenant_id();
    let result = services::run_blocking(&services, move |s| {
        s.receiving().create_initial_receipt(tenant_id, order_id, input)
    })
    .await;
    outcome_response(StatusCode::CREATED, result)
}

pub async fn create_replacement_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateReplacementRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let material_id = match parse_material_id(&body.material_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let replacement_for = match parse_receipt_id(&body.replacement_for) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = ReplacementReceiptInput {
        receipt_number: body.receipt_number,
        date: body.date,
        material_id,
        received_qty: body.received_qty,
        remarks: body.remarks,
        replacement_for,
    };

    let tenant_id = tenant.tenant_id();
    let result = services::run_blocking(&services, move |s| {
        s.receiving().create_replacement_receipt(tenant_id, order_id, input)
    })
    .await;
    outcome_response(StatusCode::CREATED, result)
}

pub async fn record_inspection(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, receipt_id)): Path<(String, String)>,
    Json(body): Json<dto::RecordInspectionRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let receipt_id = match parse_receipt_id(&receipt_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let material_id = match parse_material_id(&body.material_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = InspectionInput {
        defective_qty: body.defective_qty,
        remarks: body.remarks,
    };

    let tenant_id = tenant.tenant_id();
    let result = services::run_blocking(&services, move |s| {
        s.receiving()
            .record_inspection(tenant_id, order_id, receipt_id, material_id, input)
    })
    .await;
    outcome_response(StatusCode::OK, result)
}

pub async fn get_pending_quantities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    match services::run_blocking(&services, move |s| {
        s.receiving().pending_quantities(tenant_id, order_id)
    })
    .await
    {
        Ok(pending) => (
            StatusCode::OK,
            Json(dto::pending_to_json(order_id, pending.values())),
        )
            .into_response(),
        Err(e) => errors::receiving_error_to_response(e),
    }
}

pub async fn evaluate_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    let result = services::run_blocking(&services, move |s| {
        s.receiving().evaluate(tenant_id, order_id)
    })
    .await;
    outcome_response(StatusCode::OK, result)
}
