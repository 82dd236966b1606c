use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The identity a cart is keyed by: an anonymous, client-generated session
/// id before authentication, the user id afterwards. At most one cart
/// exists per owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    Guest(String),
    User(Uuid),
}

/// Catalog data joined onto a cart line for display. `None` when the
/// product row has been deleted since the line was created.
#[derive(Debug, Clone)]
pub struct ProductSummary {
    pub name: String,
    pub price: BigDecimal,
    pub image: String,
    pub stock: i32,
}

#[derive(Debug, Clone)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price captured when the line was created. Not re-priced when the
    /// catalog price changes; checkout charges this snapshot.
    pub price_snapshot: BigDecimal,
    pub product: Option<ProductSummary>,
}

#[derive(Debug, Clone)]
pub struct CartView {
    pub owner: CartOwner,
    pub lines: Vec<CartLineView>,
    pub updated_at: DateTime<Utc>,
}

impl CartView {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, product_id: Uuid) -> Option<&CartLineView> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }
}

/// Quantity for a line that is being topped up (a duplicate add, or a
/// guest line merged into an existing user line): the sum, clamped to what
/// stock can satisfy.
pub fn clamped_line_quantity(existing: i32, added: i32, stock: i32) -> i32 {
    existing.saturating_add(added).min(stock)
}
