use axum::Router;

pub mod orders;
pub mod products;
pub mod system;

/// Router for the versioned kiosk endpoints (mounted under `/api/v1`).
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/products", products::router())
}
