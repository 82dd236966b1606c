use std::str::FromStr as _;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{OrderStatus, OrderView};
use crate::domain::ports::{OrderRepository, UserRepository};
use crate::errors::AppError;
use crate::infrastructure::order_repo::DieselOrderRepository;
use crate::infrastructure::user_repo::DieselUserRepository;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    /// The price the line was charged at: its cart snapshot, not the
    /// catalog price at checkout time.
    pub price: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total_amount: String,
    pub created_at: String,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderView> for OrderResponse {
    fn from(order: OrderView) -> Self {
        OrderResponse {
            id: order.id,
            user_id: order.user_id,
            status: order.status.to_string(),
            total_amount: order.total_amount.to_string(),
            created_at: order.created_at.to_rfc3339(),
            items: order
                .lines
                .into_iter()
                .map(|line| OrderItemResponse {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.unit_price.to_string(),
                    name: line.product_name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/orders
///
/// Checkout: consumes the caller's cart into a `pending` order, decrementing
/// stock atomically. The total is recomputed server-side; any client-supplied
/// body is ignored.
#[utoipa::path(
    post,
    path = "/api/orders",
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Empty cart or insufficient stock"),
        (status = 401, description = "Authentication required"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    pool: web::Data<DbPool>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let order = web::block(move || DieselOrderRepository::new(pool.get_ref().clone()).place(identity.0))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

/// GET /api/orders/user/{user_id}
///
/// A user's orders, newest first. Callable by that user or an admin.
#[utoipa::path(
    get,
    path = "/api/orders/user/{user_id}",
    params(
        ("user_id" = Uuid, Path, description = "User UUID"),
    ),
    responses(
        (status = 200, description = "The user's orders", body = [OrderResponse]),
        (status = 403, description = "Another user's orders require admin access"),
    ),
    tag = "orders"
)]
pub async fn list_user_orders(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let orders = web::block(move || {
        if user_id != identity.0 {
            DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        }
        DieselOrderRepository::new(pool.get_ref().clone()).list_for_user(user_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// GET /api/orders
///
/// Admin-only paginated list of all orders (without their lines).
#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 403, description = "Admin access required"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    pool: web::Data<DbPool>,
    identity: Identity,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);

    let result = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselOrderRepository::new(pool.get_ref().clone()).list_all(page, limit)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        items: result.items.into_iter().map(OrderResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

/// GET /api/orders/{id}
///
/// Returns the order with its lines. Callable by its owner or an admin.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 403, description = "Another user's order requires admin access"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let order = web::block(move || {
        let order = DieselOrderRepository::new(pool.get_ref().clone())
            .find_by_id(order_id)?
            .ok_or(DomainError::NotFound)?;
        if order.user_id != identity.0 {
            DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        }
        Ok::<_, DomainError>(order)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// PUT /api/orders/{id}/status
///
/// Admin-only status transition along the order's lifecycle graph; illegal
/// edges are rejected with the order unchanged.
#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "The updated order", body = OrderResponse),
        (status = 400, description = "Unknown status or illegal transition"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn update_status(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let next = OrderStatus::from_str(&body.into_inner().status)?;

    let order = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselOrderRepository::new(pool.get_ref().clone()).update_status(order_id, next)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}
