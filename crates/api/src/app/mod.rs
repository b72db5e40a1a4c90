//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: in-memory event store/bus, dispatcher and receiving service
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use factoryerp_infra::config::ReceivingConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: ReceivingConfig) -> Router {
    let services = Arc::new(services::AppServices::in_memory(config));

    // Tenant-scoped routes: require `X-Tenant-Id`.
    let tenant_scoped = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn(middleware::tenant_middleware)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(tenant_scoped)
}
