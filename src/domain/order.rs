use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Administrator-driven transitions. Orders move forward one step at a
    /// time; cancellation is reachable until delivery. `delivered` and
    /// `cancelled` are terminal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::{Cancelled, Delivered, Pending, Processing, Shipped};
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::InvalidInput(format!(
                "Unknown order status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderLineView {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    /// Joined from the catalog for display; `None` if the product has been
    /// deleted since the order was placed.
    pub product_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
}

#[derive(Debug, Clone)]
pub struct OrderListPage {
    pub items: Vec<OrderView>,
    pub total: i64,
}

/// Server-computed order total: the sum of each line's price snapshot times
/// its quantity. Client-supplied totals are never consulted.
pub fn order_total<'a, I>(lines: I) -> BigDecimal
where
    I: IntoIterator<Item = (&'a BigDecimal, i32)>,
{
    lines
        .into_iter()
        .fold(BigDecimal::from(0), |acc, (price, quantity)| {
            acc + price.clone() * BigDecimal::from(quantity)
        })
}
