use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{
    clamped_line_quantity, CartLineView, CartOwner, CartView, ProductSummary,
};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;
use crate::schema::{cart_lines, carts, products};

use super::models::{CartLineRow, CartRow, NewCartLineRow, NewCartRow, ProductRow};

pub struct DieselCartRepository {
    pool: DbPool,
}

impl DieselCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn find_cart(conn: &mut PgConnection, owner: &CartOwner) -> Result<Option<CartRow>, DomainError> {
    let mut query = carts::table.select(CartRow::as_select()).into_boxed();
    query = match owner {
        CartOwner::Guest(session_id) => query.filter(carts::session_id.eq(session_id)),
        CartOwner::User(user_id) => query.filter(carts::user_id.eq(user_id)),
    };
    Ok(query.first(conn).optional()?)
}

fn get_or_create_cart(conn: &mut PgConnection, owner: &CartOwner) -> Result<CartRow, DomainError> {
    if let Some(cart) = find_cart(conn, owner)? {
        return Ok(cart);
    }
    let new_cart = NewCartRow {
        id: Uuid::new_v4(),
        session_id: match owner {
            CartOwner::Guest(session_id) => Some(session_id.clone()),
            CartOwner::User(_) => None,
        },
        user_id: match owner {
            CartOwner::Guest(_) => None,
            CartOwner::User(user_id) => Some(*user_id),
        },
    };
    // A concurrent request may have created the cart between the lookup and
    // the insert; the unique owner index makes the loser's insert a no-op.
    diesel::insert_into(carts::table)
        .values(&new_cart)
        .on_conflict_do_nothing()
        .execute(conn)?;
    find_cart(conn, owner)?
        .ok_or_else(|| DomainError::Internal("cart vanished during creation".to_string()))
}

fn find_line(
    conn: &mut PgConnection,
    cart_id: Uuid,
    product_id: Uuid,
) -> Result<Option<CartLineRow>, DomainError> {
    Ok(cart_lines::table
        .filter(cart_lines::cart_id.eq(cart_id))
        .filter(cart_lines::product_id.eq(product_id))
        .select(CartLineRow::as_select())
        .first(conn)
        .optional()?)
}

/// Loads a product row locked for the rest of the transaction, so the stock
/// read used for validation stays valid until the write commits.
fn lock_product(
    conn: &mut PgConnection,
    product_id: Uuid,
) -> Result<Option<ProductRow>, DomainError> {
    Ok(products::table
        .find(product_id)
        .for_update()
        .select(ProductRow::as_select())
        .first(conn)
        .optional()?)
}

fn touch_cart(conn: &mut PgConnection, cart_id: Uuid) -> Result<(), DomainError> {
    diesel::update(carts::table.find(cart_id))
        .set(carts::updated_at.eq(Utc::now()))
        .execute(conn)?;
    Ok(())
}

fn load_view(
    conn: &mut PgConnection,
    cart_id: Uuid,
    owner: &CartOwner,
) -> Result<CartView, DomainError> {
    let cart: CartRow = carts::table
        .find(cart_id)
        .select(CartRow::as_select())
        .first(conn)?;
    let lines: Vec<CartLineRow> = cart_lines::table
        .filter(cart_lines::cart_id.eq(cart.id))
        .order(cart_lines::created_at.asc())
        .select(CartLineRow::as_select())
        .load(conn)?;

    let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let catalog: HashMap<Uuid, ProductRow> = products::table
        .filter(products::id.eq_any(&product_ids))
        .select(ProductRow::as_select())
        .load(conn)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(CartView {
        owner: owner.clone(),
        updated_at: cart.updated_at,
        lines: lines
            .into_iter()
            .map(|line| CartLineView {
                product_id: line.product_id,
                quantity: line.quantity,
                price_snapshot: line.price_snapshot,
                product: catalog.get(&line.product_id).map(|p| ProductSummary {
                    name: p.name.clone(),
                    price: p.price.clone(),
                    image: p.image.clone(),
                    stock: p.stock,
                }),
            })
            .collect(),
    })
}

impl CartRepository for DieselCartRepository {
    fn fetch(&self, owner: &CartOwner) -> Result<CartView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = get_or_create_cart(conn, owner)?;
            load_view(conn, cart.id, owner)
        })
    }

    fn add_line(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
        price_hint: Option<BigDecimal>,
    ) -> Result<CartView, DomainError> {
        if quantity < 1 {
            return Err(DomainError::InvalidInput(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let product = lock_product(conn, product_id)?.ok_or(DomainError::NotFound)?;
            if quantity > product.stock {
                return Err(DomainError::InsufficientStock {
                    product: product.name,
                });
            }

            let cart = get_or_create_cart(conn, owner)?;
            match find_line(conn, cart.id, product_id)? {
                Some(line) => {
                    // Duplicate add tops up the existing line, clamped to
                    // stock rather than rejected, matching the merge policy.
                    let quantity = clamped_line_quantity(line.quantity, quantity, product.stock);
                    diesel::update(cart_lines::table.find(line.id))
                        .set(cart_lines::quantity.eq(quantity))
                        .execute(conn)?;
                }
                None => {
                    diesel::insert_into(cart_lines::table)
                        .values(&NewCartLineRow {
                            id: Uuid::new_v4(),
                            cart_id: cart.id,
                            product_id,
                            quantity,
                            price_snapshot: price_hint.unwrap_or_else(|| product.price.clone()),
                        })
                        .execute(conn)?;
                }
            }
            touch_cart(conn, cart.id)?;
            load_view(conn, cart.id, owner)
        })
    }

    fn set_quantity(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, DomainError> {
        // Setting a line below 1 is the same as removing it, absent line
        // included.
        if quantity < 1 {
            return self.remove_line(owner, product_id);
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = find_cart(conn, owner)?.ok_or(DomainError::NotFound)?;
            let line = find_line(conn, cart.id, product_id)?.ok_or(DomainError::NotFound)?;
            let product = lock_product(conn, product_id)?.ok_or(DomainError::NotFound)?;
            // A direct edit of an existing line is rejected outright instead
            // of clamped; the failed request leaves the line untouched.
            if quantity > product.stock {
                return Err(DomainError::InsufficientStock {
                    product: product.name,
                });
            }
            diesel::update(cart_lines::table.find(line.id))
                .set(cart_lines::quantity.eq(quantity))
                .execute(conn)?;
            touch_cart(conn, cart.id)?;
            load_view(conn, cart.id, owner)
        })
    }

    fn remove_line(&self, owner: &CartOwner, product_id: Uuid) -> Result<CartView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = get_or_create_cart(conn, owner)?;
            diesel::delete(
                cart_lines::table
                    .filter(cart_lines::cart_id.eq(cart.id))
                    .filter(cart_lines::product_id.eq(product_id)),
            )
            .execute(conn)?;
            touch_cart(conn, cart.id)?;
            load_view(conn, cart.id, owner)
        })
    }

    fn clear(&self, owner: &CartOwner) -> Result<CartView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| match owner {
            CartOwner::Guest(_) => {
                // A cleared guest cart is gone for good; the session id is
                // free to start a fresh cart later.
                if let Some(cart) = find_cart(conn, owner)? {
                    diesel::delete(carts::table.find(cart.id)).execute(conn)?;
                }
                Ok(CartView {
                    owner: owner.clone(),
                    lines: Vec::new(),
                    updated_at: Utc::now(),
                })
            }
            CartOwner::User(_) => {
                let cart = get_or_create_cart(conn, owner)?;
                diesel::delete(cart_lines::table.filter(cart_lines::cart_id.eq(cart.id)))
                    .execute(conn)?;
                touch_cart(conn, cart.id)?;
                load_view(conn, cart.id, owner)
            }
        })
    }

    fn merge_guest_into_user(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<CartView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let user_owner = CartOwner::User(user_id);
            let user_cart = get_or_create_cart(conn, &user_owner)?;

            let guest_owner = CartOwner::Guest(session_id.to_string());
            let Some(guest_cart) = find_cart(conn, &guest_owner)? else {
                // Already consumed (or never existed): merging again is a
                // no-op returning the user cart unchanged.
                return load_view(conn, user_cart.id, &user_owner);
            };

            let guest_lines: Vec<CartLineRow> = cart_lines::table
                .filter(cart_lines::cart_id.eq(guest_cart.id))
                .order(cart_lines::created_at.asc())
                .select(CartLineRow::as_select())
                .load(conn)?;
            if guest_lines.is_empty() {
                return load_view(conn, user_cart.id, &user_owner);
            }

            for guest_line in guest_lines {
                // Stale guest lines must not block the rest of the merge:
                // vanished or sold-out products are dropped silently.
                let Some(product) = lock_product(conn, guest_line.product_id)? else {
                    continue;
                };
                if product.stock <= 0 {
                    continue;
                }

                match find_line(conn, user_cart.id, guest_line.product_id)? {
                    Some(user_line) => {
                        let quantity = clamped_line_quantity(
                            user_line.quantity,
                            guest_line.quantity,
                            product.stock,
                        );
                        diesel::update(cart_lines::table.find(user_line.id))
                            .set(cart_lines::quantity.eq(quantity))
                            .execute(conn)?;
                    }
                    None => {
                        diesel::insert_into(cart_lines::table)
                            .values(&NewCartLineRow {
                                id: Uuid::new_v4(),
                                cart_id: user_cart.id,
                                product_id: guest_line.product_id,
                                quantity: guest_line.quantity.min(product.stock),
                                price_snapshot: guest_line.price_snapshot,
                            })
                            .execute(conn)?;
                    }
                }
            }

            // The guest identity is retired, not just emptied.
            diesel::delete(carts::table.find(guest_cart.id)).execute(conn)?;
            touch_cart(conn, user_cart.id)?;
            load_view(conn, user_cart.id, &user_owner)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use bigdecimal::BigDecimal;
    use diesel::prelude::*;
    use uuid::Uuid;

    use super::DieselCartRepository;
    use crate::domain::cart::CartOwner;
    use crate::domain::errors::DomainError;
    use crate::domain::ports::CartRepository;
    use crate::infrastructure::test_support::{seed_product, setup_db};
    use crate::schema::carts;

    fn guest(session_id: &str) -> CartOwner {
        CartOwner::Guest(session_id.to_string())
    }

    fn guest_cart_count(pool: &crate::db::DbPool, session_id: &str) -> i64 {
        let mut conn = pool.get().expect("Failed to get connection");
        carts::table
            .filter(carts::session_id.eq(session_id))
            .count()
            .get_result(&mut conn)
            .expect("count failed")
    }

    #[tokio::test]
    async fn fetch_lazily_creates_an_empty_cart() {
        let (_container, pool) = setup_db().await;
        let repo = DieselCartRepository::new(pool);

        let cart = repo.fetch(&guest("s-lazy")).expect("fetch failed");

        assert!(cart.is_empty());
        assert_eq!(cart.owner, guest("s-lazy"));
    }

    #[tokio::test]
    async fn duplicate_adds_top_up_a_single_line() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Mouse", "100.00", 5);
        let repo = DieselCartRepository::new(pool);
        let owner = guest("s-dup");

        repo.add_line(&owner, product_id, 3, None).expect("first add failed");
        let cart = repo
            .add_line(&owner, product_id, 4, None)
            .expect("second add failed");

        // 3 + 4 requested, clamped to the 5 in stock; still one line.
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 5);
    }

    #[tokio::test]
    async fn add_rejects_unknown_product() {
        let (_container, pool) = setup_db().await;
        let repo = DieselCartRepository::new(pool);

        let err = repo
            .add_line(&guest("s-missing"), Uuid::new_v4(), 1, None)
            .expect_err("add should fail");

        assert!(matches!(err, DomainError::NotFound));
    }

    #[tokio::test]
    async fn add_rejects_a_non_positive_quantity() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Mouse", "100.00", 5);
        let repo = DieselCartRepository::new(pool);

        for quantity in [0, -1] {
            let err = repo
                .add_line(&guest("s-zero"), product_id, quantity, None)
                .expect_err("add should fail");
            assert!(matches!(err, DomainError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn add_rejects_quantity_beyond_stock() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Camera", "120.22", 2);
        let repo = DieselCartRepository::new(pool);
        let owner = guest("s-over");

        let err = repo
            .add_line(&owner, product_id, 3, None)
            .expect_err("add should fail");

        assert!(matches!(
            err,
            DomainError::InsufficientStock { ref product } if product == "Camera"
        ));
        assert!(repo.fetch(&owner).expect("fetch failed").is_empty());
    }

    #[tokio::test]
    async fn price_snapshot_prefers_the_client_hint() {
        let (_container, pool) = setup_db().await;
        let hinted = seed_product(&pool, "Remote", "499.99", 10);
        let unhinted = seed_product(&pool, "Headphones", "79.99", 10);
        let repo = DieselCartRepository::new(pool);
        let owner = guest("s-price");

        let hint = BigDecimal::from_str("449.99").expect("valid decimal");
        repo.add_line(&owner, hinted, 1, Some(hint.clone()))
            .expect("add failed");
        let cart = repo.add_line(&owner, unhinted, 1, None).expect("add failed");

        assert_eq!(cart.line(hinted).expect("line").price_snapshot, hint);
        assert_eq!(
            cart.line(unhinted).expect("line").price_snapshot,
            BigDecimal::from_str("79.99").expect("valid decimal")
        );
    }

    #[tokio::test]
    async fn set_quantity_rejects_beyond_stock_and_leaves_line_unchanged() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Smart Tv", "300.55", 4);
        let repo = DieselCartRepository::new(pool);
        let owner = guest("s-set");

        repo.add_line(&owner, product_id, 2, None).expect("add failed");
        let err = repo
            .set_quantity(&owner, product_id, 10)
            .expect_err("set should fail");

        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        let cart = repo.fetch(&owner).expect("fetch failed");
        assert_eq!(cart.line(product_id).expect("line").quantity, 2);
    }

    #[tokio::test]
    async fn set_quantity_requires_an_existing_line() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "999.90", 10);
        let repo = DieselCartRepository::new(pool);

        // No cart at all.
        let err = repo
            .set_quantity(&guest("s-none"), product_id, 1)
            .expect_err("set should fail");
        assert!(matches!(err, DomainError::NotFound));

        // Cart exists, line does not.
        let owner = guest("s-noline");
        repo.fetch(&owner).expect("fetch failed");
        let err = repo
            .set_quantity(&owner, product_id, 1)
            .expect_err("set should fail");
        assert!(matches!(err, DomainError::NotFound));
    }

    #[tokio::test]
    async fn set_quantity_below_one_removes_the_line() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Headphones", "79.99", 15);
        let repo = DieselCartRepository::new(pool);
        let owner = guest("s-zero-set");

        repo.add_line(&owner, product_id, 2, None).expect("add failed");
        let cart = repo
            .set_quantity(&owner, product_id, 0)
            .expect("set failed");
        assert!(cart.is_empty());

        // Like remove, it tolerates an absent line.
        assert!(repo
            .set_quantity(&owner, product_id, 0)
            .expect("set failed")
            .is_empty());
    }

    #[tokio::test]
    async fn remove_line_is_a_no_op_when_absent() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Computer", "400.44", 30);
        let repo = DieselCartRepository::new(pool);
        let owner = guest("s-rm");

        repo.add_line(&owner, product_id, 1, None).expect("add failed");
        let cart = repo.remove_line(&owner, product_id).expect("remove failed");
        assert!(cart.is_empty());

        // Removing again, and removing from a cart that never existed.
        assert!(repo.remove_line(&owner, product_id).expect("remove failed").is_empty());
        assert!(repo
            .remove_line(&guest("s-rm-fresh"), product_id)
            .expect("remove failed")
            .is_empty());
    }

    #[tokio::test]
    async fn clear_deletes_a_guest_cart_but_only_empties_a_user_cart() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Smartphone", "499.99", 20);
        let repo = DieselCartRepository::new(pool.clone());

        let guest_owner = guest("s-clear");
        repo.add_line(&guest_owner, product_id, 1, None).expect("add failed");
        repo.clear(&guest_owner).expect("clear failed");
        assert_eq!(guest_cart_count(&pool, "s-clear"), 0);

        let user_owner = CartOwner::User(Uuid::new_v4());
        repo.add_line(&user_owner, product_id, 1, None).expect("add failed");
        let cart = repo.clear(&user_owner).expect("clear failed");
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn merge_moves_guest_lines_into_an_empty_user_cart() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "999.90", 5);
        let repo = DieselCartRepository::new(pool.clone());
        let user_id = Uuid::new_v4();

        repo.add_line(&guest("s-a"), product_id, 3, None).expect("add failed");
        let merged = repo
            .merge_guest_into_user("s-a", user_id)
            .expect("merge failed");

        assert_eq!(merged.lines.len(), 1);
        assert_eq!(merged.line(product_id).expect("line").quantity, 3);
        assert_eq!(guest_cart_count(&pool, "s-a"), 0);
    }

    #[tokio::test]
    async fn merge_sums_duplicate_lines_clamped_to_stock() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Mouse", "100.00", 4);
        let repo = DieselCartRepository::new(pool);
        let user_id = Uuid::new_v4();
        let user_owner = CartOwner::User(user_id);

        repo.add_line(&user_owner, product_id, 2, None).expect("add failed");
        repo.add_line(&guest("s-b"), product_id, 3, None).expect("add failed");

        let merged = repo
            .merge_guest_into_user("s-b", user_id)
            .expect("merge failed");

        // 2 + 3 requested, clamped to the 4 in stock.
        assert_eq!(merged.lines.len(), 1);
        assert_eq!(merged.line(product_id).expect("line").quantity, 4);
    }

    #[tokio::test]
    async fn merge_keeps_the_user_lines_price_snapshot() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Camera", "120.22", 10);
        let repo = DieselCartRepository::new(pool);
        let user_id = Uuid::new_v4();
        let user_owner = CartOwner::User(user_id);

        let user_price = BigDecimal::from_str("110.00").expect("valid decimal");
        let guest_price = BigDecimal::from_str("120.22").expect("valid decimal");
        repo.add_line(&user_owner, product_id, 1, Some(user_price.clone()))
            .expect("add failed");
        repo.add_line(&guest("s-snap"), product_id, 1, Some(guest_price))
            .expect("add failed");

        let merged = repo
            .merge_guest_into_user("s-snap", user_id)
            .expect("merge failed");

        assert_eq!(
            merged.line(product_id).expect("line").price_snapshot,
            user_price
        );
    }

    #[tokio::test]
    async fn merge_skips_vanished_and_sold_out_products() {
        let (_container, pool) = setup_db().await;
        let vanishing = seed_product(&pool, "Remote", "499.99", 5);
        let selling_out = seed_product(&pool, "Smart Tv", "300.55", 5);
        let healthy = seed_product(&pool, "Headphones", "79.99", 5);
        let repo = DieselCartRepository::new(pool.clone());
        let user_id = Uuid::new_v4();

        let owner = guest("s-stale");
        repo.add_line(&owner, vanishing, 1, None).expect("add failed");
        repo.add_line(&owner, selling_out, 2, None).expect("add failed");
        repo.add_line(&owner, healthy, 3, None).expect("add failed");

        {
            let mut conn = pool.get().expect("Failed to get connection");
            diesel::delete(crate::schema::products::table.find(vanishing))
                .execute(&mut conn)
                .expect("delete failed");
            diesel::update(crate::schema::products::table.find(selling_out))
                .set(crate::schema::products::stock.eq(0))
                .execute(&mut conn)
                .expect("update failed");
        }

        let merged = repo
            .merge_guest_into_user("s-stale", user_id)
            .expect("merge failed");

        // The two stale lines are dropped without blocking the healthy one.
        assert_eq!(merged.lines.len(), 1);
        assert_eq!(merged.line(healthy).expect("line").quantity, 3);
        assert_eq!(guest_cart_count(&pool, "s-stale"), 0);
    }

    #[tokio::test]
    async fn merge_with_a_consumed_session_is_a_no_op() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "999.90", 5);
        let repo = DieselCartRepository::new(pool);
        let user_id = Uuid::new_v4();

        repo.add_line(&guest("s-idem"), product_id, 2, None).expect("add failed");
        repo.merge_guest_into_user("s-idem", user_id).expect("merge failed");
        let again = repo
            .merge_guest_into_user("s-idem", user_id)
            .expect("re-merge failed");

        assert_eq!(again.lines.len(), 1);
        assert_eq!(again.line(product_id).expect("line").quantity, 2);
    }

    #[tokio::test]
    async fn merge_leaves_an_empty_guest_cart_untouched() {
        let (_container, pool) = setup_db().await;
        let repo = DieselCartRepository::new(pool.clone());
        let user_id = Uuid::new_v4();

        repo.fetch(&guest("s-empty")).expect("fetch failed");
        let merged = repo
            .merge_guest_into_user("s-empty", user_id)
            .expect("merge failed");

        assert!(merged.is_empty());
        // Zero guest lines means steps 3-5 are skipped, including deletion.
        assert_eq!(guest_cart_count(&pool, "s-empty"), 1);
    }
}
