use axum::Router;

pub mod inventory;
pub mod purchases;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/inventory", inventory::router())
        .nest("/purchases", purchases::router())
}
