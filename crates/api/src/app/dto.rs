//! Request/response DTOs and the response envelope.

use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kiosk_infra::ProductRegistration;
use kiosk_products::{ProductNumber, ProductSellingStatus, ProductType};

// -------------------------
// Envelope
// -------------------------

/// Body of every `/api/v1` response.
///
/// `code` is the numeric HTTP status, `status` its name (`"BAD_REQUEST"`),
/// `data` is `null` on errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn of(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code: status.as_u16(),
            status: status_name(status),
            message: message.into(),
            data,
        }
    }

    pub fn ok(data: T) -> Self {
        Self::of(StatusCode::OK, "OK", Some(data))
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn status_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("UNKNOWN")
        .to_ascii_uppercase()
        .replace([' ', '-'], "_")
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateRequest {
    #[serde(default)]
    pub product_numbers: Vec<String>,
}

impl OrderCreateRequest {
    pub fn product_numbers(self) -> Result<Vec<ProductNumber>, &'static str> {
        if self.product_numbers.is_empty() {
            return Err("product numbers are required");
        }
        Ok(self.product_numbers.into_iter().map(ProductNumber::new).collect())
    }
}

/// Fields are optional so that a missing value yields a field-specific
/// message rather than a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCreateRequest {
    #[serde(rename = "type")]
    pub product_type: Option<ProductType>,
    pub selling_status: Option<ProductSellingStatus>,
    pub name: Option<String>,
    #[serde(default)]
    pub price: i64,
}

impl ProductCreateRequest {
    pub fn into_registration(self) -> Result<ProductRegistration, &'static str> {
        let product_type = self.product_type.ok_or("product type is required")?;
        let selling_status = self.selling_status.ok_or("product selling status is required")?;
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or("product name is required")?;
        let price = u64::try_from(self.price)
            .ok()
            .filter(|price| *price > 0)
            .ok_or("product price must be positive")?;

        Ok(ProductRegistration {
            product_type,
            selling_status,
            name,
            price,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsMailRequest {
    pub order_date: NaiveDate,
    pub email: String,
}

impl StatisticsMailRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.email.trim().is_empty() {
            return Err("email is required");
        }
        Ok(())
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsMailResponse {
    pub order_date: NaiveDate,
    pub email: String,
    pub total_revenue: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_request(json: serde_json::Value) -> ProductCreateRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn envelope_names_the_status() {
        let ok = ApiResponse::ok(5u64);
        assert_eq!((ok.code, ok.status.as_str(), ok.data), (200, "OK", Some(5)));

        let bad = ApiResponse::<()>::of(StatusCode::BAD_REQUEST, "nope", None);
        assert_eq!(bad.status, "BAD_REQUEST");

        let gateway = ApiResponse::<()>::of(StatusCode::BAD_GATEWAY, "mail", None);
        assert_eq!(gateway.status, "BAD_GATEWAY");
    }

    #[test]
    fn empty_order_request_is_rejected() {
        let err = OrderCreateRequest::default().product_numbers().unwrap_err();
        assert_eq!(err, "product numbers are required");
    }

    #[test]
    fn product_request_maps_to_registration() {
        let registration = product_request(serde_json::json!({
            "type": "HANDMADE",
            "sellingStatus": "SELLING",
            "name": "Americano",
            "price": 4000
        }))
        .into_registration()
        .unwrap();

        assert_eq!(registration.product_type, ProductType::Handmade);
        assert_eq!(registration.selling_status, ProductSellingStatus::Selling);
        assert_eq!(registration.price, 4000);
    }

    #[test]
    fn product_request_reports_the_first_missing_field() {
        let cases = [
            (serde_json::json!({"sellingStatus": "SELLING", "name": "a", "price": 1}), "product type is required"),
            (serde_json::json!({"type": "BOTTLE", "name": "a", "price": 1}), "product selling status is required"),
            (
                serde_json::json!({"type": "BOTTLE", "sellingStatus": "HOLD", "name": "  ", "price": 1}),
                "product name is required",
            ),
            (
                serde_json::json!({"type": "BOTTLE", "sellingStatus": "HOLD", "name": "a", "price": 0}),
                "product price must be positive",
            ),
            (
                serde_json::json!({"type": "BOTTLE", "sellingStatus": "HOLD", "name": "a", "price": -10}),
                "product price must be positive",
            ),
        ];

        for (json, expected) in cases {
            assert_eq!(product_request(json).into_registration().unwrap_err(), expected);
        }
    }
}
