use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use factoryerp_inventory::MaterialId;

use crate::app::services::{self, AppServices};
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/materials", post(register_material))
        .route("/materials/:id", get(get_material))
}

pub async fn register_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::RegisterMaterialRequest>,
) -> axum::response::Response {
    let tenant_id = tenant.tenant_id();
    let material = match services::run_blocking(&services, move |s| {
        s.register_material(tenant_id, body.name, body.unit)
    })
    .await
    {
        Ok(m) => m,
        Err(e) => return errors::receiving_error_to_response(e),
    };

    (StatusCode::CREATED, Json(dto::material_to_json(&material))).into_response()
}

pub async fn get_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let material_id = match errors::parse_id(&id, "material id") {
        Ok(agg) => MaterialId::new(agg),
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    match services::run_blocking(&services, move |s| s.material(tenant_id, material_id)).await {
        Ok(m) => (StatusCode::OK, Json(dto::material_to_json(&m))).into_response(),
        Err(e) => errors::receiving_error_to_response(e),
    }
}
