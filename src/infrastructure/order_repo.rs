use std::collections::HashMap;
use std::str::FromStr as _;

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{order_total, OrderLineView, OrderListPage, OrderStatus, OrderView};
use crate::domain::ports::OrderRepository;
use crate::schema::{cart_lines, carts, order_lines, orders, products};

use super::models::{
    CartLineRow, CartRow, NewOrderLineRow, NewOrderRow, OrderLineRow, OrderRow, ProductRow,
};

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(order: &OrderRow) -> Result<OrderStatus, DomainError> {
    OrderStatus::from_str(&order.status).map_err(|_| {
        DomainError::InvariantViolation(format!(
            "order {} has corrupt status '{}'",
            order.id, order.status
        ))
    })
}

fn product_names(
    conn: &mut PgConnection,
    product_ids: &[Uuid],
) -> Result<HashMap<Uuid, String>, DomainError> {
    Ok(products::table
        .filter(products::id.eq_any(product_ids))
        .select((products::id, products::name))
        .load::<(Uuid, String)>(conn)?
        .into_iter()
        .collect())
}

fn assemble_view(
    order: OrderRow,
    lines: Vec<OrderLineRow>,
    names: &HashMap<Uuid, String>,
) -> Result<OrderView, DomainError> {
    let status = parse_status(&order)?;
    Ok(OrderView {
        id: order.id,
        user_id: order.user_id,
        status,
        total_amount: order.total_amount,
        created_at: order.created_at,
        lines: lines
            .into_iter()
            .map(|line| OrderLineView {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                product_name: names.get(&line.product_id).cloned(),
            })
            .collect(),
    })
}

fn load_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderView>, DomainError> {
    let order = orders::table
        .find(id)
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;
    let Some(order) = order else {
        return Ok(None);
    };

    let lines: Vec<OrderLineRow> = order_lines::table
        .filter(order_lines::order_id.eq(order.id))
        .order(order_lines::created_at.asc())
        .select(OrderLineRow::as_select())
        .load(conn)?;
    let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let names = product_names(conn, &product_ids)?;

    Ok(Some(assemble_view(order, lines, &names)?))
}

impl OrderRepository for DieselOrderRepository {
    fn place(&self, user_id: Uuid) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let cart: Option<CartRow> = carts::table
                .filter(carts::user_id.eq(user_id))
                .select(CartRow::as_select())
                .first(conn)
                .optional()?;
            let Some(cart) = cart else {
                return Err(DomainError::EmptyCart);
            };

            let lines: Vec<CartLineRow> = cart_lines::table
                .filter(cart_lines::cart_id.eq(cart.id))
                .order(cart_lines::created_at.asc())
                .select(CartLineRow::as_select())
                .load(conn)?;
            if lines.is_empty() {
                return Err(DomainError::EmptyCart);
            }

            // Lock every product row up front, in id order so that two
            // concurrent checkouts over the same products cannot deadlock.
            let mut product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
            product_ids.sort_unstable();
            let catalog: HashMap<Uuid, ProductRow> = products::table
                .filter(products::id.eq_any(&product_ids))
                .order(products::id.asc())
                .for_update()
                .select(ProductRow::as_select())
                .load(conn)?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();

            // All-or-nothing: the first offending line fails the whole
            // transition before anything is written.
            for line in &lines {
                let product = catalog.get(&line.product_id).ok_or(DomainError::NotFound)?;
                if line.quantity > product.stock {
                    return Err(DomainError::InsufficientStock {
                        product: product.name.clone(),
                    });
                }
            }

            let total = order_total(lines.iter().map(|l| (&l.price_snapshot, l.quantity)));
            let order_id = Uuid::new_v4();
            diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: order_id,
                    user_id,
                    status: OrderStatus::Pending.as_str().to_string(),
                    total_amount: total,
                })
                .execute(conn)?;

            let new_lines: Vec<NewOrderLineRow> = lines
                .iter()
                .map(|line| NewOrderLineRow {
                    id: Uuid::new_v4(),
                    order_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.price_snapshot.clone(),
                })
                .collect();
            diesel::insert_into(order_lines::table)
                .values(&new_lines)
                .execute(conn)?;

            for line in &lines {
                let updated = diesel::update(
                    products::table
                        .filter(products::id.eq(line.product_id))
                        .filter(products::stock.ge(line.quantity)),
                )
                .set((
                    products::stock.eq(products::stock - line.quantity),
                    products::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
                // The rows are locked, so a zero-row update means the
                // validation above was wrong; refuse to commit.
                if updated == 0 {
                    return Err(DomainError::InvariantViolation(format!(
                        "stock underflow for product {}",
                        line.product_id
                    )));
                }
            }

            diesel::delete(cart_lines::table.filter(cart_lines::cart_id.eq(cart.id)))
                .execute(conn)?;
            diesel::update(carts::table.find(cart.id))
                .set(carts::updated_at.eq(Utc::now()))
                .execute(conn)?;

            load_order(conn, order_id)?
                .ok_or_else(|| DomainError::Internal("order vanished after insert".to_string()))
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;
        load_order(&mut conn, id)
    }

    fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows: Vec<OrderRow> = orders::table
            .filter(orders::user_id.eq(user_id))
            .order(orders::created_at.desc())
            .select(OrderRow::as_select())
            .load(&mut conn)?;

        let order_ids: Vec<Uuid> = rows.iter().map(|o| o.id).collect();
        let mut lines_by_order: HashMap<Uuid, Vec<OrderLineRow>> = HashMap::new();
        let all_lines: Vec<OrderLineRow> = order_lines::table
            .filter(order_lines::order_id.eq_any(&order_ids))
            .order(order_lines::created_at.asc())
            .select(OrderLineRow::as_select())
            .load(&mut conn)?;
        let product_ids: Vec<Uuid> = all_lines.iter().map(|l| l.product_id).collect();
        let names = product_names(&mut conn, &product_ids)?;
        for line in all_lines {
            lines_by_order.entry(line.order_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|order| {
                let lines = lines_by_order.remove(&order.id).unwrap_or_default();
                assemble_view(order, lines, &names)
            })
            .collect()
    }

    fn list_all(&self, page: i64, limit: i64) -> Result<OrderListPage, DomainError> {
        let mut conn = self.pool.get()?;

        let offset = (page - 1) * limit;
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = orders::table.count().get_result(conn)?;

            let rows = orders::table
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load::<OrderRow>(conn)?;

            let items = rows
                .into_iter()
                .map(|order| assemble_view(order, Vec::new(), &HashMap::new()))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(OrderListPage { items, total })
        })
    }

    fn update_status(&self, id: Uuid, next: OrderStatus) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let order: Option<OrderRow> = orders::table
                .find(id)
                .for_update()
                .select(OrderRow::as_select())
                .first(conn)
                .optional()?;
            let order = order.ok_or(DomainError::NotFound)?;

            let current = parse_status(&order)?;
            if !current.can_transition_to(next) {
                return Err(DomainError::InvalidInput(format!(
                    "Illegal status transition {current} -> {next}"
                )));
            }

            diesel::update(orders::table.find(order.id))
                .set((
                    orders::status.eq(next.as_str()),
                    orders::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            load_order(conn, order.id)?
                .ok_or_else(|| DomainError::Internal("order vanished during update".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;
    use std::sync::Arc;

    use bigdecimal::BigDecimal;
    use diesel::prelude::*;
    use uuid::Uuid;

    use super::DieselOrderRepository;
    use crate::domain::cart::CartOwner;
    use crate::domain::errors::DomainError;
    use crate::domain::order::OrderStatus;
    use crate::domain::ports::{CartRepository, OrderRepository};
    use crate::infrastructure::cart_repo::DieselCartRepository;
    use crate::infrastructure::test_support::{product_stock, seed_product, setup_db};
    use crate::schema::{orders, products};

    #[tokio::test]
    async fn checkout_creates_a_pending_order_and_settles_stock() {
        let (_container, pool) = setup_db().await;
        let product_a = seed_product(&pool, "Laptop", "10.00", 5);
        let product_b = seed_product(&pool, "Mouse", "5.00", 5);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let user_id = Uuid::new_v4();
        let owner = CartOwner::User(user_id);

        carts.add_line(&owner, product_a, 2, None).expect("add failed");
        carts.add_line(&owner, product_b, 1, None).expect("add failed");

        let order = repo.place(user_id).expect("place failed");

        assert_eq!(order.user_id, user_id);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(
            order.total_amount,
            BigDecimal::from_str("25.00").expect("valid decimal")
        );
        assert_eq!(order.lines.len(), 2);
        assert_eq!(product_stock(&pool, product_a), 3);
        assert_eq!(product_stock(&pool, product_b), 4);
        assert!(carts.fetch(&owner).expect("fetch failed").is_empty());
    }

    #[tokio::test]
    async fn checkout_requires_a_non_empty_cart() {
        let (_container, pool) = setup_db().await;
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);
        let user_id = Uuid::new_v4();

        // No cart at all.
        assert!(matches!(
            repo.place(user_id).expect_err("place should fail"),
            DomainError::EmptyCart
        ));

        // A cart with zero lines.
        carts
            .fetch(&CartOwner::User(user_id))
            .expect("fetch failed");
        assert!(matches!(
            repo.place(user_id).expect_err("place should fail"),
            DomainError::EmptyCart
        ));
    }

    #[tokio::test]
    async fn checkout_is_all_or_nothing_when_stock_shrank() {
        let (_container, pool) = setup_db().await;
        let plentiful = seed_product(&pool, "Mouse", "5.00", 10);
        let scarce = seed_product(&pool, "Camera", "120.22", 5);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let user_id = Uuid::new_v4();
        let owner = CartOwner::User(user_id);

        carts.add_line(&owner, plentiful, 2, None).expect("add failed");
        carts.add_line(&owner, scarce, 3, None).expect("add failed");

        // Someone else buys the cameras down to one unit.
        {
            let mut conn = pool.get().expect("Failed to get connection");
            diesel::update(products::table.find(scarce))
                .set(products::stock.eq(1))
                .execute(&mut conn)
                .expect("update failed");
        }

        let err = repo.place(user_id).expect_err("place should fail");
        assert!(matches!(
            err,
            DomainError::InsufficientStock { ref product } if product == "Camera"
        ));

        // Nothing was committed: no order, untouched stock, intact cart.
        let mut conn = pool.get().expect("Failed to get connection");
        let order_count: i64 = orders::table
            .count()
            .get_result(&mut conn)
            .expect("count failed");
        assert_eq!(order_count, 0);
        assert_eq!(product_stock(&pool, plentiful), 10);
        assert_eq!(product_stock(&pool, scarce), 1);
        assert_eq!(carts.fetch(&owner).expect("fetch failed").lines.len(), 2);
    }

    #[tokio::test]
    async fn checkout_charges_the_snapshot_not_the_live_price() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "10.00", 5);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool.clone());
        let user_id = Uuid::new_v4();

        carts
            .add_line(&CartOwner::User(user_id), product_id, 2, None)
            .expect("add failed");

        // The catalog price changes after the line was created.
        {
            let mut conn = pool.get().expect("Failed to get connection");
            diesel::update(products::table.find(product_id))
                .set(products::price.eq(BigDecimal::from_str("99.00").expect("valid decimal")))
                .execute(&mut conn)
                .expect("update failed");
        }

        let order = repo.place(user_id).expect("place failed");
        assert_eq!(
            order.total_amount,
            BigDecimal::from_str("20.00").expect("valid decimal")
        );
    }

    #[tokio::test]
    async fn concurrent_checkouts_cannot_oversell_the_last_unit() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Remote", "499.99", 1);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = Arc::new(DieselOrderRepository::new(pool.clone()));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        carts
            .add_line(&CartOwner::User(first), product_id, 1, None)
            .expect("add failed");
        carts
            .add_line(&CartOwner::User(second), product_id, 1, None)
            .expect("add failed");

        let handles: Vec<_> = [first, second]
            .into_iter()
            .map(|user_id| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || repo.place(user_id))
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("checkout thread panicked"))
            .collect();

        let placed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 1, "exactly one checkout wins the last unit");
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DomainError::InsufficientStock { .. })
        )));
        assert_eq!(product_stock(&pool, product_id), 0);
    }

    #[tokio::test]
    async fn status_updates_follow_the_transition_graph() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "10.00", 5);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);
        let user_id = Uuid::new_v4();

        carts
            .add_line(&CartOwner::User(user_id), product_id, 1, None)
            .expect("add failed");
        let order = repo.place(user_id).expect("place failed");

        // Skipping straight to delivered is rejected and changes nothing.
        let err = repo
            .update_status(order.id, OrderStatus::Delivered)
            .expect_err("update should fail");
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let order = repo
            .update_status(order.id, OrderStatus::Processing)
            .expect("update failed");
        assert_eq!(order.status, OrderStatus::Processing);
        let order = repo
            .update_status(order.id, OrderStatus::Shipped)
            .expect("update failed");
        let order = repo
            .update_status(order.id, OrderStatus::Delivered)
            .expect("update failed");
        assert_eq!(order.status, OrderStatus::Delivered);

        // Delivered is terminal; cancellation no longer reachable.
        assert!(repo
            .update_status(order.id, OrderStatus::Cancelled)
            .is_err());

        assert!(matches!(
            repo.update_status(Uuid::new_v4(), OrderStatus::Processing)
                .expect_err("update should fail"),
            DomainError::NotFound
        ));
    }

    #[tokio::test]
    async fn users_see_their_own_orders_newest_first() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Mouse", "5.00", 20);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let owner = CartOwner::User(user_id);

        carts.add_line(&owner, product_id, 1, None).expect("add failed");
        let first = repo.place(user_id).expect("place failed");
        carts.add_line(&owner, product_id, 2, None).expect("add failed");
        let second = repo.place(user_id).expect("place failed");

        carts
            .add_line(&CartOwner::User(other), product_id, 1, None)
            .expect("add failed");
        repo.place(other).expect("place failed");

        let mine = repo.list_for_user(user_id).expect("list failed");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.id);
        assert_eq!(mine[1].id, first.id);
        assert_eq!(mine[0].lines.len(), 1);
        assert_eq!(
            mine[0].lines[0].product_name.as_deref(),
            Some("Mouse")
        );
    }

    #[tokio::test]
    async fn admin_listing_paginates() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Mouse", "1.00", 50);
        let carts = DieselCartRepository::new(pool.clone());
        let repo = DieselOrderRepository::new(pool);

        for _ in 0..5 {
            let user_id = Uuid::new_v4();
            carts
                .add_line(&CartOwner::User(user_id), product_id, 1, None)
                .expect("add failed");
            repo.place(user_id).expect("place failed");
        }

        let page1 = repo.list_all(1, 3).expect("list page 1 failed");
        assert_eq!(page1.total, 5);
        assert_eq!(page1.items.len(), 3);

        let page2 = repo.list_all(2, 3).expect("list page 2 failed");
        assert_eq!(page2.total, 5);
        assert_eq!(page2.items.len(), 2);
    }
}
