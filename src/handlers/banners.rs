use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::db::DbPool;
use crate::domain::banner::{BannerInput, BannerView};
use crate::domain::errors::DomainError;
use crate::domain::ports::{BannerRepository, UserRepository};
use crate::errors::AppError;
use crate::infrastructure::banner_repo::DieselBannerRepository;
use crate::infrastructure::user_repo::DieselUserRepository;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct BannerRequest {
    pub message: String,
    /// Falls back to "/products" when omitted or empty.
    pub link: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// RFC 3339 timestamp; omitted, the banner never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl BannerRequest {
    fn into_input(self) -> Result<BannerInput, AppError> {
        let input = BannerInput {
            message: self.message,
            link: self.link,
            is_active: self.is_active,
            expires_at: self.expires_at,
        };
        input.validate()?;
        Ok(input)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BannerResponse {
    pub id: Uuid,
    pub message: String,
    pub link: String,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub created_at: String,
}

impl From<BannerView> for BannerResponse {
    fn from(banner: BannerView) -> Self {
        BannerResponse {
            id: banner.id,
            message: banner.message,
            link: banner.link,
            is_active: banner.is_active,
            expires_at: banner.expires_at.map(|t| t.to_rfc3339()),
            created_at: banner.created_at.to_rfc3339(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/banners/active
///
/// The latest active, unexpired banner. With nothing to show, the body is an
/// empty object rather than a 404, so storefront clients can render
/// unconditionally.
#[utoipa::path(
    get,
    path = "/api/banners/active",
    responses(
        (status = 200, description = "The active banner, or an empty object", body = BannerResponse),
    ),
    tag = "banners"
)]
pub async fn active_banner(pool: web::Data<DbPool>) -> Result<HttpResponse, AppError> {
    let banner = web::block(move || DieselBannerRepository::new(pool.get_ref().clone()).active())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    match banner {
        Some(banner) => Ok(HttpResponse::Ok().json(BannerResponse::from(banner))),
        None => Ok(HttpResponse::Ok().json(json!({}))),
    }
}

/// GET /api/banners (admin)
#[utoipa::path(
    get,
    path = "/api/banners",
    responses(
        (status = 200, description = "All banners, newest first", body = [BannerResponse]),
        (status = 403, description = "Admin access required"),
    ),
    tag = "banners"
)]
pub async fn list_banners(
    pool: web::Data<DbPool>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let banners = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselBannerRepository::new(pool.get_ref().clone()).list()
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<BannerResponse> = banners.into_iter().map(BannerResponse::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /api/banners (admin)
#[utoipa::path(
    post,
    path = "/api/banners",
    request_body = BannerRequest,
    responses(
        (status = 201, description = "Banner created", body = BannerResponse),
        (status = 400, description = "Empty message"),
        (status = 403, description = "Admin access required"),
    ),
    tag = "banners"
)]
pub async fn create_banner(
    pool: web::Data<DbPool>,
    identity: Identity,
    body: web::Json<BannerRequest>,
) -> Result<HttpResponse, AppError> {
    let input = body.into_inner().into_input()?;
    let banner = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselBannerRepository::new(pool.get_ref().clone()).create(&input)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(BannerResponse::from(banner)))
}

/// PUT /api/banners/{id} (admin)
#[utoipa::path(
    put,
    path = "/api/banners/{id}",
    params(
        ("id" = Uuid, Path, description = "Banner UUID"),
    ),
    request_body = BannerRequest,
    responses(
        (status = 200, description = "The updated banner", body = BannerResponse),
        (status = 400, description = "Empty message"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Banner not found"),
    ),
    tag = "banners"
)]
pub async fn update_banner(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<BannerRequest>,
) -> Result<HttpResponse, AppError> {
    let banner_id = path.into_inner();
    let input = body.into_inner().into_input()?;
    let banner = web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselBannerRepository::new(pool.get_ref().clone()).update(banner_id, &input)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(BannerResponse::from(banner)))
}

/// DELETE /api/banners/{id} (admin)
#[utoipa::path(
    delete,
    path = "/api/banners/{id}",
    params(
        ("id" = Uuid, Path, description = "Banner UUID"),
    ),
    responses(
        (status = 204, description = "Banner deleted"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Banner not found"),
    ),
    tag = "banners"
)]
pub async fn delete_banner(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let banner_id = path.into_inner();
    web::block(move || {
        DieselUserRepository::new(pool.get_ref().clone()).require_admin(identity.0)?;
        DieselBannerRepository::new(pool.get_ref().clone()).delete(banner_id)?;
        Ok::<_, DomainError>(())
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::NoContent().finish())
}
