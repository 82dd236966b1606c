use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Identity, MaybeIdentity};
use crate::db::DbPool;
use crate::domain::cart::CartView;
use crate::domain::ports::CartRepository;
use crate::errors::AppError;
use crate::infrastructure::cart_repo::DieselCartRepository;

use super::{parse_decimal, resolve_owner, SessionQuery};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddLineRequest {
    pub product_id: Uuid,
    /// Defaults to 1.
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Decimal price as a string, e.g. "9.99". Captured as the line's price
    /// snapshot; omitted, the catalog price is snapshotted instead.
    pub price: Option<String>,
    pub session_id: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantityRequest {
    pub quantity: i32,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartProductResponse {
    pub name: String,
    pub price: String,
    pub image: String,
    pub stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: String,
    /// Current catalog data for display; null if the product was deleted
    /// after the line was created.
    pub product: Option<CartProductResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
    pub updated_at: String,
}

impl From<CartView> for CartResponse {
    fn from(cart: CartView) -> Self {
        CartResponse {
            updated_at: cart.updated_at.to_rfc3339(),
            items: cart
                .lines
                .into_iter()
                .map(|line| CartLineResponse {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.price_snapshot.to_string(),
                    product: line.product.map(|p| CartProductResponse {
                        name: p.name,
                        price: p.price.to_string(),
                        image: p.image,
                        stock: p.stock,
                    }),
                })
                .collect(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/cart
///
/// Returns the caller's cart, lazily creating an empty one. Guests identify
/// themselves with `?session_id=`; authenticated callers with a bearer token.
#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("session_id" = Option<String>, Query, description = "Guest cart session id"),
    ),
    responses(
        (status = 200, description = "The caller's cart", body = CartResponse),
        (status = 400, description = "Neither a token nor a session id was provided"),
    ),
    tag = "cart"
)]
pub async fn get_cart(
    pool: web::Data<DbPool>,
    identity: MaybeIdentity,
    query: web::Query<SessionQuery>,
) -> Result<HttpResponse, AppError> {
    let owner = resolve_owner(identity, query.into_inner().session_id)?;
    let cart = web::block(move || DieselCartRepository::new(pool.get_ref().clone()).fetch(&owner))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// POST /api/cart
///
/// Adds a product to the cart. A duplicate add tops up the existing line,
/// clamped to the product's stock.
#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddLineRequest,
    responses(
        (status = 200, description = "The updated cart", body = CartResponse),
        (status = 400, description = "Insufficient stock or invalid quantity"),
        (status = 404, description = "Product not found"),
    ),
    tag = "cart"
)]
pub async fn add_line(
    pool: web::Data<DbPool>,
    identity: MaybeIdentity,
    body: web::Json<AddLineRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let owner = resolve_owner(identity, body.session_id)?;
    let price_hint = body
        .price
        .as_deref()
        .map(|p| parse_decimal("price", p))
        .transpose()?;

    let cart = web::block(move || {
        DieselCartRepository::new(pool.get_ref().clone()).add_line(
            &owner,
            body.product_id,
            body.quantity,
            price_hint,
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// PUT /api/cart/{product_id}
///
/// Sets an existing line's quantity. A quantity below 1 removes the line; a
/// quantity above stock is rejected outright, leaving the line unchanged.
#[utoipa::path(
    put,
    path = "/api/cart/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = SetQuantityRequest,
    responses(
        (status = 200, description = "The updated cart", body = CartResponse),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "No such cart or cart line"),
    ),
    tag = "cart"
)]
pub async fn set_quantity(
    pool: web::Data<DbPool>,
    identity: MaybeIdentity,
    path: web::Path<Uuid>,
    body: web::Json<SetQuantityRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let body = body.into_inner();
    let owner = resolve_owner(identity, body.session_id)?;

    let cart = web::block(move || {
        DieselCartRepository::new(pool.get_ref().clone()).set_quantity(
            &owner,
            product_id,
            body.quantity,
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// DELETE /api/cart/{product_id}
///
/// Removes a line; removing an absent line is not an error.
#[utoipa::path(
    delete,
    path = "/api/cart/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
        ("session_id" = Option<String>, Query, description = "Guest cart session id"),
    ),
    responses(
        (status = 200, description = "The updated cart", body = CartResponse),
    ),
    tag = "cart"
)]
pub async fn remove_line(
    pool: web::Data<DbPool>,
    identity: MaybeIdentity,
    path: web::Path<Uuid>,
    query: web::Query<SessionQuery>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let owner = resolve_owner(identity, query.into_inner().session_id)?;

    let cart = web::block(move || {
        DieselCartRepository::new(pool.get_ref().clone()).remove_line(&owner, product_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// POST /api/cart/merge
///
/// Folds the guest cart named by `session_id` into the authenticated
/// caller's cart and retires the guest cart. Stale guest lines are dropped
/// silently; merging an already-consumed session id is a no-op.
#[utoipa::path(
    post,
    path = "/api/cart/merge",
    request_body = MergeRequest,
    responses(
        (status = 200, description = "The merged user cart", body = CartResponse),
        (status = 401, description = "Authentication required"),
    ),
    tag = "cart"
)]
pub async fn merge(
    pool: web::Data<DbPool>,
    identity: Identity,
    body: web::Json<MergeRequest>,
) -> Result<HttpResponse, AppError> {
    let session_id = body.into_inner().session_id;
    let cart = web::block(move || {
        DieselCartRepository::new(pool.get_ref().clone())
            .merge_guest_into_user(&session_id, identity.0)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}

/// POST /api/cart/clear
///
/// Empties a user cart; deletes a guest cart outright.
#[utoipa::path(
    post,
    path = "/api/cart/clear",
    params(
        ("session_id" = Option<String>, Query, description = "Guest cart session id"),
    ),
    responses(
        (status = 200, description = "The emptied cart", body = CartResponse),
    ),
    tag = "cart"
)]
pub async fn clear(
    pool: web::Data<DbPool>,
    identity: MaybeIdentity,
    query: web::Query<SessionQuery>,
) -> Result<HttpResponse, AppError> {
    let owner = resolve_owner(identity, query.into_inner().session_id)?;
    let cart = web::block(move || DieselCartRepository::new(pool.get_ref().clone()).clear(&owner))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartResponse::from(cart)))
}
