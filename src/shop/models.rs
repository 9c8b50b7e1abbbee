//! Catalog and order data structures

use crate::models::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// An item available in the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
}

/// Product create/update request body. Optional fields let missing values be
/// reported as validation errors instead of JSON errors.
#[derive(Debug, Default, Deserialize)]
pub struct ProductInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    pub stock: Option<i64>,
}

/// Validated product fields
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
}

impl ProductInput {
    pub fn validate(self) -> Result<NewProduct, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let name = self.name.trim().to_string();

        if name.is_empty() {
            errors.push(ValidationError::new("name", "Name is required"));
        }
        match self.price {
            None => errors.push(ValidationError::new("price", "Price is required")),
            Some(p) if !p.is_finite() || p <= 0.0 => {
                errors.push(ValidationError::new("price", "Price must be greater than 0"))
            }
            Some(_) => {}
        }
        match self.stock {
            None => errors.push(ValidationError::new("stock", "Stock is required")),
            Some(s) if s < 0 => errors.push(ValidationError::new("stock", "Stock cannot be negative")),
            Some(_) => {}
        }

        match (errors.is_empty(), self.price, self.stock) {
            (true, Some(price), Some(stock)) => Ok(NewProduct {
                name,
                description: self.description.trim().to_string(),
                price,
                stock,
            }),
            _ => Err(errors),
        }
    }
}

/// Order lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Completed => "Completed",
            OrderStatus::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Completed" => Ok(OrderStatus::Completed),
            "Canceled" => Ok(OrderStatus::Canceled),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// A user's order with its line items
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub created_at: String,
    pub items: Vec<OrderItem>,
}

/// One product line within an order
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    /// `None` once the product has been deleted from the catalog.
    pub product: Option<Product>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub quantity: i64,
}

/// Place-order request body
#[derive(Debug, Default, Deserialize)]
pub struct PlaceOrderInput {
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
}

impl PlaceOrderInput {
    /// Parsed `(product_id, quantity)` lines.
    pub fn validate(&self) -> Result<Vec<(Uuid, i64)>, Vec<ValidationError>> {
        if self.items.is_empty() {
            return Err(vec![ValidationError::new(
                "items",
                "At least one item is required",
            )]);
        }

        let mut lines = Vec::with_capacity(self.items.len());
        let mut errors = Vec::new();

        for (i, item) in self.items.iter().enumerate() {
            match Uuid::parse_str(item.product_id.trim()) {
                Ok(id) => lines.push((id, item.quantity)),
                Err(_) => errors.push(ValidationError::new(
                    format!("items[{}].product_id", i),
                    "Invalid product ID",
                )),
            }
            if item.quantity < 1 {
                errors.push(ValidationError::new(
                    format!("items[{}].quantity", i),
                    "Quantity must be at least 1",
                ));
            }
        }

        if errors.is_empty() {
            Ok(lines)
        } else {
            Err(errors)
        }
    }
}

/// Order status update request body
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusInput {
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_input_validation() {
        let ok = ProductInput {
            name: " Lamp ".into(),
            description: "Desk lamp".into(),
            price: Some(19.99),
            stock: Some(0),
        }
        .validate()
        .unwrap();
        assert_eq!(ok.name, "Lamp");
        assert_eq!(ok.stock, 0);

        let errors = ProductInput::default().validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "price", "stock"]);

        let errors = ProductInput {
            name: "Lamp".into(),
            price: Some(0.0),
            stock: Some(-1),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_order_status_round_trip_is_exact() {
        assert_eq!("Pending".parse::<OrderStatus>(), Ok(OrderStatus::Pending));
        assert!("pending".parse::<OrderStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&OrderStatus::Canceled).unwrap(),
            r#""Canceled""#
        );
    }

    #[test]
    fn test_place_order_validation() {
        let id = Uuid::new_v4();
        let input = PlaceOrderInput {
            items: vec![OrderItemInput {
                product_id: id.to_string(),
                quantity: 2,
            }],
        };
        assert_eq!(input.validate().unwrap(), vec![(id, 2)]);

        assert!(PlaceOrderInput::default().validate().is_err());

        let bad = PlaceOrderInput {
            items: vec![OrderItemInput {
                product_id: "not-a-uuid".into(),
                quantity: 0,
            }],
        };
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors[0].field, "items[0].product_id");
        assert_eq!(errors[1].field, "items[0].quantity");
    }
}
