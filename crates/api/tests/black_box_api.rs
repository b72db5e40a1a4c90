use std::str::FromStr;

use factoryerp_core::TenantId;
use factoryerp_infra::config::ReceivingConfig;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = factoryerp_api::app::build_app(ReceivingConfig::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client bound to one tenant.
struct Tenant<'a> {
    srv: &'a TestServer,
    client: reqwest::Client,
    id: TenantId,
}

impl<'a> Tenant<'a> {
    fn new(srv: &'a TestServer) -> Self {
        Self {
            srv,
            client: reqwest::Client::new(),
            id: TenantId::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.srv.base_url, path))
            .header("X-Tenant-Id", self.id.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.srv.base_url, path))
            .header("X-Tenant-Id", self.id.to_string())
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn material(&self, name: &str) -> String {
        let (status, body) = self
            .post("/inventory/materials", json!({ "name": name, "unit": "kg" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register material: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn order(&self, number: &str, items: &[(&str, &str)]) -> String {
        let items = items
            .iter()
            .map(|(material, qty)| {
                json!({ "material_id": material, "quantity": qty, "unit_price": "2.50" })
            })
            .collect::<Vec<_>>();
        let (status, body) = self
            .post(
                "/purchases/orders",
                json!({
                    "order_number": number,
                    "order_date": "2026-03-01",
                    "supplier_id": uuid_like(),
                    "items": items,
                    "tax_percent": "10",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "place order: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}

fn uuid_like() -> String {
    TenantId::new().to_string()
}

fn dec(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn pending_for<'v>(body: &'v Value, material: &str) -> &'v Value {
    body["pending"]
        .as_array()
        .or_else(|| body["items"].as_array())
        .unwrap()
        .iter()
        .find(|s| s["material_id"] == material)
        .unwrap()
}

#[tokio::test]
async fn health_does_not_need_a_tenant() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_header_is_required_for_domain_routes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/purchases/orders", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_tenant");

    let res = client
        .get(format!("{}/purchases/orders", srv.base_url))
        .header("X-Tenant-Id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_tenant");
}

#[tokio::test]
async fn defect_and_replacement_flow_completes_and_credits_stock() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);

    let steel = t.material("Steel rod").await;
    let bolts = t.material("Bolts").await;
    let order = t.order("PO-2001", &[(steel.as_str(), "100"), (bolts.as_str(), "50")]).await;

    let (status, body) = t.post(&format!("/purchases/orders/{order}/arrive"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "arrived");

    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts"),
            json!({
                "receipt_number": "GRN-1",
                "date": "2026-03-03",
                "lines": [
                    { "material_id": steel, "received_qty": "100" },
                    { "material_id": bolts, "received_qty": "50" },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "grn_verified");
    let grn = body["receipt_id"].as_str().unwrap().to_string();

    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts/{grn}/inspections"),
            json!({ "material_id": steel, "defective_qty": "10", "remarks": "bent" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "returned_to_vendor");

    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts/{grn}/inspections"),
            json!({ "material_id": bolts, "defective_qty": "0" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "returned_to_vendor");

    let (status, body) = t.get(&format!("/purchases/orders/{order}/pending")).await;
    assert_eq!(status, StatusCode::OK);
    let steel_pending = pending_for(&body, &steel);
    assert_eq!(dec(&steel_pending["pending_qty"]), Decimal::from(10));
    assert_eq!(dec(&steel_pending["qty_to_replace"]), Decimal::from(10));
    assert_eq!(steel_pending["replacement_status"], "needs_replacement");

    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/replacements"),
            json!({
                "receipt_number": "RPL-1",
                "date": "2026-03-09",
                "material_id": steel,
                "received_qty": "10",
                "replacement_for": grn,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "qc_in_progress");
    assert!(body["warnings"].as_array().unwrap().is_empty());
    let rpl = body["receipt_id"].as_str().unwrap().to_string();

    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts/{rpl}/inspections"),
            json!({ "material_id": steel, "defective_qty": "0" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");

    let (_, m) = t.get(&format!("/inventory/materials/{steel}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(100));
    let (_, m) = t.get(&format!("/inventory/materials/{bolts}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(50));

    // Completed orders are frozen; re-evaluation is a no-op.
    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts/{rpl}/inspections"),
            json!({ "material_id": steel, "defective_qty": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["error"], "invalid_state");

    let (status, body) = t.post(&format!("/purchases/orders/{order}/evaluate"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    let (_, m) = t.get(&format!("/inventory/materials/{steel}")).await;
    assert_eq!(dec(&m["stock"]), Decimal::from(100));
}

#[tokio::test]
async fn order_view_reports_terms_and_receipts() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);

    let resin = t.material("Resin").await;
    let order = t.order("PO-2002", &[(resin.as_str(), "40")]).await;

    let (status, body) = t.get(&format!("/purchases/orders/{order}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_number"], "PO-2002");
    assert_eq!(body["status"], "ordered");
    // 40 x 2.50 = 100.00, plus 10% tax.
    assert_eq!(dec(&body["terms"]["subtotal"]), Decimal::from(100));
    assert_eq!(dec(&body["terms"]["total"]), Decimal::from(110));

    let (status, _) = t
        .post(
            &format!("/purchases/orders/{order}/receipts"),
            json!({
                "receipt_number": "GRN-7",
                "date": "2026-03-04",
                "lines": [{ "material_id": resin, "received_qty": "15" }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = t.get(&format!("/purchases/orders/{order}")).await;
    assert_eq!(body["receipts"].as_array().unwrap().len(), 1);

    let (status, body) = t.get("/purchases/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_requests_map_to_client_errors() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);

    let resin = t.material("Resin").await;
    let order = t.order("PO-2003", &[(resin.as_str(), "20")]).await;

    // Duplicate order number.
    let (status, body) = t
        .post(
            "/purchases/orders",
            json!({
                "order_number": "PO-2003",
                "order_date": "2026-03-01",
                "supplier_id": uuid_like(),
                "items": [{ "material_id": resin, "quantity": "1", "unit_price": "1" }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    // Material that is not on the order.
    let stranger = t.material("Glue").await;
    let (status, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts"),
            json!({
                "receipt_number": "GRN-1",
                "date": "2026-03-02",
                "lines": [{ "material_id": stranger, "received_qty": "5" }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "validation_error");

    // Defective above received is rejected under the default policy.
    let (_, body) = t
        .post(
            &format!("/purchases/orders/{order}/receipts"),
            json!({
                "receipt_number": "GRN-2",
                "date": "2026-03-02",
                "lines": [{ "material_id": resin, "received_qty": "5" }],
            }),
        )
        .await;
    let grn = body["receipt_id"].as_str().unwrap().to_string();
    let (status, _) = t
        .post(
            &format!("/purchases/orders/{order}/receipts/{grn}/inspections"),
            json!({ "material_id": resin, "defective_qty": "6" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Replacement while nothing needs replacing.
    let (status, _) = t
        .post(
            &format!("/purchases/orders/{order}/replacements"),
            json!({
                "receipt_number": "RPL-1",
                "date": "2026-03-05",
                "material_id": resin,
                "received_qty": "1",
                "replacement_for": grn,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Malformed and unknown ids.
    let (status, body) = t.get("/purchases/orders/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
    let (status, _) = t.get(&format!("/purchases/orders/{}", uuid_like())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.get(&format!("/inventory/materials/{}", uuid_like())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_order_value_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let t = Tenant::new(&srv);
    let steel = t.material("Steel").await;

    let (status, body) = t
        .post(
            "/purchases/orders",
            json!({
                "order_number": "PO-BIG",
                "order_date": "2026-03-01",
                "supplier_id": uuid_like(),
                "items": [{
                    "material_id": steel,
                    "quantity": "1000000000000000",
                    "unit_price": "1000000000000000",
                }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "validation_error");

    // Placement keeps working for the tenant afterwards.
    t.order("PO-BIG", &[(steel.as_str(), "1")]).await;
}

#[tokio::test]
async fn tenants_cannot_see_each_others_orders() {
    let srv = TestServer::spawn().await;
    let t1 = Tenant::new(&srv);
    let t2 = Tenant::new(&srv);

    let resin = t1.material("Resin").await;
    let order = t1.order("PO-3001", &[(resin.as_str(), "10")]).await;

    let (status, _) = t2.get(&format!("/purchases/orders/{order}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t2.get(&format!("/inventory/materials/{resin}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t2.post(&format!("/purchases/orders/{order}/arrive"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Order numbers are unique per tenant only.
    let glue = t2.material("Glue").await;
    t2.order("PO-3001", &[(glue.as_str(), "3")]).await;

    let (_, body) = t2.get("/purchases/orders").await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}
