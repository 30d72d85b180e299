use core::str::FromStr;

use serde::{Deserialize, Serialize};

use kiosk_core::{DomainError, DomainResult, Entity};

use crate::number::ProductNumber;

/// What kind of item a product is.
///
/// Bottled drinks and bakery goods are counted stock; handmade drinks are
/// prepared to order and never run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Handmade,
    Bottle,
    Bakery,
}

impl ProductType {
    pub const ALL: [ProductType; 3] = [Self::Handmade, Self::Bottle, Self::Bakery];

    /// Whether selling this product consumes counted inventory.
    pub fn is_stock_tracked(self) -> bool {
        matches!(self, Self::Bottle | Self::Bakery)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Handmade => "Handmade drink",
            Self::Bottle => "Bottled drink",
            Self::Bakery => "Bakery",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handmade => "HANDMADE",
            Self::Bottle => "BOTTLE",
            Self::Bakery => "BAKERY",
        }
    }
}

impl FromStr for ProductType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown product type {s:?}")))
    }
}

/// Selling status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductSellingStatus {
    Selling,
    Hold,
    StopSelling,
}

impl ProductSellingStatus {
    pub const ALL: [ProductSellingStatus; 3] = [Self::Selling, Self::Hold, Self::StopSelling];

    /// Statuses shown on the kiosk screen. Held products stay visible.
    pub fn for_display() -> [ProductSellingStatus; 2] {
        [Self::Selling, Self::Hold]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Selling => "On sale",
            Self::Hold => "On hold",
            Self::StopSelling => "Discontinued",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selling => "SELLING",
            Self::Hold => "HOLD",
            Self::StopSelling => "STOP_SELLING",
        }
    }
}

impl FromStr for ProductSellingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown selling status {s:?}")))
    }
}

/// Highest accepted price; prices are stored as signed 64-bit amounts.
pub const MAX_PRICE: u64 = i64::MAX as u64;

/// Catalog entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    product_number: ProductNumber,
    product_type: ProductType,
    selling_status: ProductSellingStatus,
    name: String,
    price: u64, // smallest currency unit
}

impl Product {
    /// Validates and builds a product.
    ///
    /// The name must contain a non-whitespace character and the price must be
    /// in `1..=MAX_PRICE`.
    pub fn new(
        product_number: ProductNumber,
        product_type: ProductType,
        selling_status: ProductSellingStatus,
        name: impl Into<String>,
        price: u64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name must not be blank"));
        }
        if price == 0 {
            return Err(DomainError::validation("product price must be positive"));
        }
        if price > MAX_PRICE {
            return Err(DomainError::validation(format!(
                "product price must not exceed {MAX_PRICE}"
            )));
        }

        Ok(Self {
            product_number,
            product_type,
            selling_status,
            name,
            price,
        })
    }

    pub fn product_number(&self) -> &ProductNumber {
        &self.product_number
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    pub fn selling_status(&self) -> ProductSellingStatus {
        self.selling_status
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn is_stock_tracked(&self) -> bool {
        self.product_type.is_stock_tracked()
    }
}

impl Entity for Product {
    type Id = ProductNumber;

    fn id(&self) -> &Self::Id {
        &self.product_number
    }
}
