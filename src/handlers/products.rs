use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::{ProductRepository, UserRepository};
use crate::domain::product::{ProductFilter, ProductInput, ProductView};
use crate::errors::AppError;
use crate::infrastructure::product_repo::DieselProductRepository;
use crate::infrastructure::user_repo::DieselUserRepository;

use super::parse_decimal;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Decimal price as a string to avoid floating-point issues, e.g. "9.99"
    pub price: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    pub stock: i32,
}

impl ProductRequest {
    fn into_input(self) -> Result<ProductInput, AppError> {
        let price = parse_decimal("price", &self.price)?;
        let input = ProductInput {
            name: self.name,
            description: self.description,
            price,
            image: self.image,
            category: self.category,
            stock: self.stock,
        };
        input.validate()?;
        Ok(input)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListProductsParams {
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: String,
    pub image: String,
    pub category: String,
    pub stock: i32,
    pub created_at: String,
}

impl From<ProductView> for ProductResponse {
    fn from(product: ProductView) -> Self {
        ProductResponse {
            id: product.id,
            name: product.name,
            description: product.description,
            price: product.price.to_string(),
            image: product.image,
            category: product.category,
            stock: product.stock,
            created_at: product.created_at.to_rfc3339(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/products
///
/// Product listing, newest first, with a case-insensitive substring search
/// over name and description and an optional exact category filter.
#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("search" = Option<String>, Query, description = "Substring match on name or description"),
        ("category" = Option<String>, Query, description = "Exact category filter"),
    ),
    responses(
        (status = 200, description = "Matching products", body = [ProductResponse]),
    ),
    tag = "products"
)]
pub async fn list_products(
    pool: web::Data<DbPool>,
    query: web::Query<ListProductsParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let filter = ProductFilter {
        search: params.search,
        category: params.category,
    };
    let products =
        web::block(move || DieselProductRepository::new(pool.get_ref().clone()).list(&filter))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// GET /api/products/categories
#[utoipa::path(
    get,
    path = "/api/products/categories",
    responses(
        (status = 200, description = "Distinct category names, sorted", body = [String]),
    ),
    tag = "products"
)]
pub async fn list_categories(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let categories =
        web::block(move || DieselProductRepository::new(pool.get_ref().clone()).categories())
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(categories))
}

/// GET /api/products/{id}
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
    ),
    responses(
        (status = 200, description = "Product found", body = ProductResponse),
        (status = 404, description = "Product not found"),
    ),
    tag = "products"
)]
pub async fn get_product(
    pool: web::Data<DbPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let product = web::block(move || {
        DieselProductRepository::new(pool.get_ref().clone()).find_by_id(product_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??
    .ok_or(AppError::NotFound)?;

    Ok(HttpResponse::Ok().json(ProductResponse::from(product)))
}

/// POST /api/products (admin)
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid name, price, or stock"),
        (status = 403, description = "Admin access required"),
    ),
    tag = "products"
)]
pub async fn create_product(
    pool: web::Data<DbPool>,
    identity: Identity,
    body: web::Json<ProductRequest>,
) -> Result<HttpResponse, AppError> {
    let input = body.into_inner().into_input()?;
    let product = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselProductRepository::new(pool.get_ref().clone()).create(&input)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(ProductResponse::from(product)))
}

/// PUT /api/products/{id} (admin)
///
/// Full-field replacement of the product's attributes.
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "The updated product", body = ProductResponse),
        (status = 400, description = "Invalid name, price, or stock"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Product not found"),
    ),
    tag = "products"
)]
pub async fn update_product(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ProductRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let input = body.into_inner().into_input()?;
    let product = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselProductRepository::new(pool.get_ref().clone()).update(product_id, &input)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(ProductResponse::from(product)))
}

/// DELETE /api/products/{id} (admin)
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
    ),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Product not found"),
    ),
    tag = "products"
)]
pub async fn delete_product(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselProductRepository::new(pool.get_ref().clone()).delete(product_id)?;
        Ok::<_, DomainError>(())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::NoContent().finish())
}
