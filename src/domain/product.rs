use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub image: String,
    pub category: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a product or replacing its attributes.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub image: String,
    pub category: String,
    pub stock: i32,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "Product name must not be empty".to_string(),
            ));
        }
        if self.price < BigDecimal::from(0) {
            return Err(DomainError::InvalidInput(
                "Product price must not be negative".to_string(),
            ));
        }
        if self.stock < 0 {
            return Err(DomainError::InvalidInput(
                "Product stock must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listing filter: case-insensitive substring match on name or description,
/// optional exact category.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    fn input() -> ProductInput {
        ProductInput {
            name: "Laptop".to_string(),
            description: "High-performance laptop with 16GB RAM".to_string(),
            price: BigDecimal::from_str("999.90").unwrap(),
            image: "/images/laptop.jpeg".to_string(),
            category: "Electronics".to_string(),
            stock: 10,
        }
    }

    #[test]
    fn valid_input_passes() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut bad = input();
        bad.name = "  ".to_string();
        assert!(matches!(
            bad.validate(),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn negative_price_and_stock_are_rejected() {
        let mut bad = input();
        bad.price = BigDecimal::from(-1);
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.stock = -1;
        assert!(bad.validate().is_err());
    }
}
