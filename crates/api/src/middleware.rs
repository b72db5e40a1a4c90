use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use factoryerp_core::TenantId;

use crate::app::errors;
use crate::context::TenantContext;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Resolve the tenant from `X-Tenant-Id` and attach a [`TenantContext`].
pub async fn tenant_middleware(mut req: Request, next: Next) -> Response {
    let tenant_id = match extract_tenant(req.headers()) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    next.run(req).await
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, Response> {
    let header = headers.get(TENANT_HEADER).ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "missing_tenant",
            "X-Tenant-Id header is required",
        )
    })?;

    header
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<TenantId>().ok())
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_tenant",
                "X-Tenant-Id must be a UUID",
            )
        })
}
