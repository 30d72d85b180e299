use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, rejection::JsonRejection},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/new", post(create_order))
        .route("/statistics/mail", post(send_statistics_mail))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::OrderCreateRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };
    let product_numbers = match body.product_numbers() {
        Ok(numbers) => numbers,
        Err(message) => return errors::bad_request(message),
    };

    match services.orders.create_order(&product_numbers, Utc::now()).await {
        Ok(order) => dto::ApiResponse::ok(order).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn send_statistics_mail(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::StatisticsMailRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::rejection_to_response(rejection),
    };
    if let Err(message) = body.validate() {
        return errors::bad_request(message);
    }

    match services
        .statistics
        .send_order_statistics_mail(body.order_date, &body.email)
        .await
    {
        Ok(total_revenue) => dto::ApiResponse::ok(dto::StatisticsMailResponse {
            order_date: body.order_date,
            email: body.email,
            total_revenue,
        })
        .into_response(),
        Err(e) => errors::statistics_error_to_response(e),
    }
}
