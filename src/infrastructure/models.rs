use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{banners, cart_lines, carts, order_lines, orders, products, users};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub image: String,
    pub category: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProductRow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub image: String,
    pub category: String,
    pub stock: i32,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = products)]
pub struct ProductChangeset {
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub image: String,
    pub category: String,
    pub stock: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartRow {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = carts)]
pub struct NewCartRow {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = cart_lines)]
#[diesel(belongs_to(CartRow, foreign_key = cart_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartLineRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_snapshot: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cart_lines)]
pub struct NewCartLineRow {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_snapshot: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_lines)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_lines)]
pub struct NewOrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = banners)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BannerRow {
    pub id: Uuid,
    pub message: String,
    pub link: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = banners)]
pub struct NewBannerRow {
    pub id: Uuid,
    pub message: String,
    pub link: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

// Clearing the expiry must write NULL, not skip the column.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = banners)]
#[diesel(treat_none_as_null = true)]
pub struct BannerChangeset {
    pub message: String,
    pub link: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}
