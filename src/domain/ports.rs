use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::banner::{BannerInput, BannerView};
use super::cart::{CartOwner, CartView};
use super::errors::DomainError;
use super::order::{OrderListPage, OrderStatus, OrderView};
use super::product::{ProductFilter, ProductInput, ProductView};
use super::user::Role;

/// Cart store plus the cart engine's transactional operations. Every
/// mutation re-reads stock at validation time inside the same transaction
/// that performs the write.
pub trait CartRepository: Send + Sync + 'static {
    /// Returns the owner's cart, lazily creating an empty one.
    fn fetch(&self, owner: &CartOwner) -> Result<CartView, DomainError>;

    /// Adds `quantity` of a product. Duplicate adds top up the existing
    /// line, clamped to stock.
    fn add_line(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
        price_hint: Option<BigDecimal>,
    ) -> Result<CartView, DomainError>;

    /// Sets an existing line's quantity; rejects quantities above stock.
    fn set_quantity(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, DomainError>;

    /// Removes a line if present; an absent line is not an error.
    fn remove_line(&self, owner: &CartOwner, product_id: Uuid) -> Result<CartView, DomainError>;

    /// Empties a user cart; deletes a guest cart outright.
    fn clear(&self, owner: &CartOwner) -> Result<CartView, DomainError>;

    /// Folds the guest cart into the user's cart and retires the guest
    /// cart. Stale guest lines are skipped, never fatal.
    fn merge_guest_into_user(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<CartView, DomainError>;
}

pub trait OrderRepository: Send + Sync + 'static {
    /// Consumes the user's cart into a new `pending` order, decrementing
    /// stock atomically. All-or-nothing.
    fn place(&self, user_id: Uuid) -> Result<OrderView, DomainError>;

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError>;

    /// A user's orders, newest first, with their lines.
    fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, DomainError>;

    /// All orders, paginated, without lines.
    fn list_all(&self, page: i64, limit: i64) -> Result<OrderListPage, DomainError>;

    /// Applies an administrator status transition; illegal edges are
    /// rejected with the order unchanged.
    fn update_status(&self, id: Uuid, next: OrderStatus) -> Result<OrderView, DomainError>;
}

pub trait ProductRepository: Send + Sync + 'static {
    fn list(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, DomainError>;
    fn categories(&self) -> Result<Vec<String>, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<ProductView>, DomainError>;
    fn create(&self, input: &ProductInput) -> Result<ProductView, DomainError>;
    fn update(&self, id: Uuid, input: &ProductInput) -> Result<ProductView, DomainError>;
    fn delete(&self, id: Uuid) -> Result<(), DomainError>;
}

pub trait BannerRepository: Send + Sync + 'static {
    fn list(&self) -> Result<Vec<BannerView>, DomainError>;
    /// The latest active, unexpired banner, if any.
    fn active(&self) -> Result<Option<BannerView>, DomainError>;
    fn create(&self, input: &BannerInput) -> Result<BannerView, DomainError>;
    fn update(&self, id: Uuid, input: &BannerInput) -> Result<BannerView, DomainError>;
    fn delete(&self, id: Uuid) -> Result<(), DomainError>;
}

/// Read side of the user directory maintained by the auth collaborator.
/// Roles are always re-read from the durable record, never trusted from a
/// token claim.
pub trait UserRepository: Send + Sync + 'static {
    fn role_of(&self, user_id: Uuid) -> Result<Option<Role>, DomainError>;

    fn require_admin(&self, user_id: Uuid) -> Result<(), DomainError> {
        match self.role_of(user_id)? {
            Some(Role::Admin) => Ok(()),
            Some(Role::User) => Err(DomainError::Forbidden),
            None => Err(DomainError::Unauthorized),
        }
    }
}
