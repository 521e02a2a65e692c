use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// One ordered line item, immutable once the order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at order time.
    pub price: Money,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32, price: Money) -> Self {
        Self {
            product_id,
            quantity,
            price,
        }
    }

    /// Line total: unit price times quantity.
    pub fn total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

/// A line item whose reservation was rejected, with the ledger's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_scales_price() {
        let line = OrderLine::new(ProductId::new(), 3, Money::from_cents(500));
        assert_eq!(line.total(), Money::from_cents(1500));
    }

    #[test]
    fn wire_fields_are_camel_case() {
        let line = OrderLine::new(ProductId::new(), 2, Money::from_cents(1000));
        let json = serde_json::to_value(&line).unwrap();
        assert!(json.get("productId").is_some());
        assert_eq!(json["quantity"], 2);
        assert_eq!(json["price"], 1000);
    }
}
