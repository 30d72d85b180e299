use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/new", post(create_product))
        .route("/selling", get(selling_products))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ProductCreateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };
    let registration = match body.into_registration() {
        Ok(registration) => registration,
        Err(message) => return errors::bad_request(message),
    };

    match services.catalog.register_product(registration).await {
        Ok(product) => dto::ApiResponse::ok(product).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn selling_products(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.catalog.selling_products().await {
        Ok(products) => dto::ApiResponse::ok(products).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}
