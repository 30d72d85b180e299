//! Product registration and the kiosk menu.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use kiosk_core::DomainError;
use kiosk_products::{Product, ProductNumber, ProductSellingStatus, ProductType};

use crate::store::{Catalog, StoreError};

/// Product as shown to kiosk clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub product_number: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub selling_status: ProductSellingStatus,
    pub name: String,
    pub price: u64,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            product_number: product.product_number().to_string(),
            product_type: product.product_type(),
            selling_status: product.selling_status(),
            name: product.name().to_string(),
            price: product.price(),
        }
    }
}

/// Attributes of a product to register; the number is assigned on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRegistration {
    pub product_type: ProductType,
    pub selling_status: ProductSellingStatus,
    pub name: String,
    pub price: u64,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CatalogService<C> {
    catalog: C,
}

impl<C: Catalog> CatalogService<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    /// Registers a product under the number following the latest one
    /// (`"001"` for an empty catalog).
    ///
    /// Two concurrent registrations may compute the same number; the loser
    /// fails with a store `Conflict`.
    #[instrument(skip(self, registration), fields(name = %registration.name), err)]
    pub async fn register_product(
        &self,
        registration: ProductRegistration,
    ) -> Result<ProductResponse, CatalogError> {
        let latest = self.catalog.latest_product_number().await?;
        let number = ProductNumber::next_after(latest.as_ref())?;

        let product = Product::new(
            number,
            registration.product_type,
            registration.selling_status,
            registration.name,
            registration.price,
        )?;
        let response = ProductResponse::from(&product);
        self.catalog.insert_product(product).await?;

        info!(
            product_number = %response.product_number,
            kind = response.product_type.label(),
            selling = response.selling_status.label(),
            "product registered"
        );
        Ok(response)
    }

    /// Products currently on the kiosk screen.
    pub async fn selling_products(&self) -> Result<Vec<ProductResponse>, CatalogError> {
        let products = self
            .catalog
            .find_by_selling_statuses(&ProductSellingStatus::for_display())
            .await?;
        Ok(products.iter().map(ProductResponse::from).collect())
    }
}
