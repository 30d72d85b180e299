use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kiosk_core::Entity;
use kiosk_products::{Product, ProductNumber};

/// A requested quantity exceeds what is on hand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient stock for product {product_number}: required {required}, available {available}")]
pub struct InsufficientStock {
    pub product_number: ProductNumber,
    pub required: u64,
    pub available: u64,
}

/// On-hand quantity of one stock-tracked product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    product_number: ProductNumber,
    quantity: u64,
}

impl StockRecord {
    pub fn new(product_number: ProductNumber, quantity: u64) -> Self {
        Self {
            product_number,
            quantity,
        }
    }

    pub fn product_number(&self) -> &ProductNumber {
        &self.product_number
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn is_quantity_less_than(&self, quantity: u64) -> bool {
        self.quantity < quantity
    }

    /// Removes `quantity` units. Fails without changing anything when the
    /// record holds fewer.
    pub fn deduct_quantity(&mut self, quantity: u64) -> Result<(), InsufficientStock> {
        if self.is_quantity_less_than(quantity) {
            return Err(InsufficientStock {
                product_number: self.product_number.clone(),
                required: quantity,
                available: self.quantity,
            });
        }
        self.quantity -= quantity;
        Ok(())
    }
}

impl Entity for StockRecord {
    type Id = ProductNumber;

    fn id(&self) -> &Self::Id {
        &self.product_number
    }
}

/// Units needed per stock-tracked product for one order.
///
/// Iteration is in ascending product-number order, which is also the order in
/// which stores must lock stock rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockRequirements(BTreeMap<ProductNumber, u64>);

impl StockRequirements {
    /// Tallies every occurrence of a stock-tracked product. Other products are
    /// ignored.
    pub fn from_products<'a>(products: impl IntoIterator<Item = &'a Product>) -> Self {
        let mut tally = BTreeMap::new();
        for product in products.into_iter().filter(|p| p.is_stock_tracked()) {
            *tally.entry(product.product_number().clone()).or_insert(0) += 1;
        }
        Self(tally)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn quantity_for(&self, product_number: &ProductNumber) -> u64 {
        self.0.get(product_number).copied().unwrap_or(0)
    }

    /// Product numbers in lock order.
    pub fn product_numbers(&self) -> Vec<ProductNumber> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProductNumber, u64)> {
        self.0.iter().map(|(number, qty)| (number, *qty))
    }
}

impl FromIterator<(ProductNumber, u64)> for StockRequirements {
    fn from_iter<I: IntoIterator<Item = (ProductNumber, u64)>>(iter: I) -> Self {
        let mut tally = BTreeMap::new();
        for (number, qty) in iter.into_iter().filter(|(_, qty)| *qty > 0) {
            *tally.entry(number).or_insert(0) += qty;
        }
        Self(tally)
    }
}

/// Computes the stock records that result from satisfying `required`.
///
/// All-or-nothing: returns the first (lowest-numbered) product that cannot be
/// covered and no records at all in that case. A required product with no
/// record in `current` counts as zero on hand. The returned records are in
/// product-number order and only cover required products.
pub fn plan_deduction(
    current: &[StockRecord],
    required: &StockRequirements,
) -> Result<Vec<StockRecord>, InsufficientStock> {
    let on_hand: HashMap<&ProductNumber, &StockRecord> =
        current.iter().map(|r| (r.product_number(), r)).collect();

    required
        .iter()
        .map(|(number, quantity)| {
            let mut record = on_hand
                .get(number)
                .map(|r| (*r).clone())
                .unwrap_or_else(|| StockRecord::new(number.clone(), 0));
            record.deduct_quantity(quantity)?;
            Ok(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_products::{ProductSellingStatus, ProductType};

    fn test_product(number: &str, product_type: ProductType, price: u64) -> Product {
        Product::new(
            ProductNumber::from(number),
            product_type,
            ProductSellingStatus::Selling,
            format!("product {number}"),
            price,
        )
        .unwrap()
    }

    fn stock(number: &str, quantity: u64) -> StockRecord {
        StockRecord::new(ProductNumber::from(number), quantity)
    }

    #[test]
    fn quantity_less_than_request_is_detected() {
        let record = stock("001", 1);
        assert!(record.is_quantity_less_than(2));
        assert!(!record.is_quantity_less_than(1));
    }

    #[test]
    fn deduct_reduces_quantity() {
        let mut record = stock("001", 1);
        record.deduct_quantity(1).unwrap();
        assert_eq!(record.quantity(), 0);
    }

    #[test]
    fn deduct_more_than_on_hand_fails_and_keeps_quantity() {
        let mut record = stock("001", 1);
        let err = record.deduct_quantity(2).unwrap_err();

        assert_eq!(err.required, 2);
        assert_eq!(err.available, 1);
        assert_eq!(record.quantity(), 1);
    }

    #[test]
    fn requirements_count_duplicates_and_skip_handmade() {
        let products = vec![
            test_product("001", ProductType::Bottle, 1000),
            test_product("001", ProductType::Bottle, 1000),
            test_product("002", ProductType::Bakery, 3000),
            test_product("003", ProductType::Handmade, 5000),
        ];

        let required = StockRequirements::from_products(&products);

        assert_eq!(required.len(), 2);
        assert_eq!(required.quantity_for(&ProductNumber::from("001")), 2);
        assert_eq!(required.quantity_for(&ProductNumber::from("002")), 1);
        assert_eq!(required.quantity_for(&ProductNumber::from("003")), 0);
    }

    #[test]
    fn requirements_iterate_in_product_number_order() {
        let required: StockRequirements = vec![
            (ProductNumber::from("010"), 1),
            (ProductNumber::from("002"), 1),
            (ProductNumber::from("007"), 3),
        ]
        .into_iter()
        .collect();

        let numbers: Vec<_> = required.product_numbers().into_iter().map(|n| n.into_inner()).collect();
        assert_eq!(numbers, vec!["002", "007", "010"]);
    }

    #[test]
    fn plan_deducts_every_required_product() {
        let current = vec![stock("001", 2), stock("002", 2)];
        let required: StockRequirements =
            vec![(ProductNumber::from("001"), 2), (ProductNumber::from("002"), 1)]
                .into_iter()
                .collect();

        let planned = plan_deduction(&current, &required).unwrap();

        assert_eq!(planned, vec![stock("001", 0), stock("002", 1)]);
    }

    #[test]
    fn plan_fails_whole_batch_when_one_product_is_short() {
        let current = vec![stock("001", 1), stock("002", 2)];
        let required: StockRequirements =
            vec![(ProductNumber::from("001"), 2), (ProductNumber::from("002"), 1)]
                .into_iter()
                .collect();

        let err = plan_deduction(&current, &required).unwrap_err();

        assert_eq!(err.product_number.as_str(), "001");
        assert_eq!(err.required, 2);
        assert_eq!(err.available, 1);
    }

    #[test]
    fn missing_stock_record_counts_as_empty() {
        let required: StockRequirements =
            vec![(ProductNumber::from("004"), 1)].into_iter().collect();

        let err = plan_deduction(&[], &required).unwrap_err();

        assert_eq!(err.available, 0);
    }

    #[test]
    fn empty_requirements_plan_nothing() {
        let planned = plan_deduction(&[stock("001", 5)], &StockRequirements::default()).unwrap();
        assert!(planned.is_empty());
    }
}
