use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::banner::{BannerInput, BannerView};
use crate::domain::errors::DomainError;
use crate::domain::ports::BannerRepository;
use crate::schema::banners;

use super::models::{BannerChangeset, BannerRow, NewBannerRow};

pub struct DieselBannerRepository {
    pool: DbPool,
}

impl DieselBannerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_view(row: BannerRow) -> BannerView {
    BannerView {
        id: row.id,
        message: row.message,
        link: row.link,
        is_active: row.is_active,
        expires_at: row.expires_at,
        created_at: row.created_at,
    }
}

impl BannerRepository for DieselBannerRepository {
    fn list(&self) -> Result<Vec<BannerView>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<BannerRow> = banners::table
            .order(banners::created_at.desc())
            .select(BannerRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(to_view).collect())
    }

    fn active(&self) -> Result<Option<BannerView>, DomainError> {
        let mut conn = self.pool.get()?;
        let row: Option<BannerRow> = banners::table
            .filter(banners::is_active.eq(true))
            .filter(
                banners::expires_at
                    .is_null()
                    .or(banners::expires_at.assume_not_null().ge(Utc::now())),
            )
            .order(banners::created_at.desc())
            .select(BannerRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(to_view))
    }

    fn create(&self, input: &BannerInput) -> Result<BannerView, DomainError> {
        let mut conn = self.pool.get()?;
        let row: BannerRow = diesel::insert_into(banners::table)
            .values(&NewBannerRow {
                id: Uuid::new_v4(),
                message: input.message.clone(),
                link: input.link_or_default(),
                is_active: input.is_active,
                expires_at: input.expires_at,
            })
            .returning(BannerRow::as_returning())
            .get_result(&mut conn)?;
        Ok(to_view(row))
    }

    fn update(&self, id: Uuid, input: &BannerInput) -> Result<BannerView, DomainError> {
        let mut conn = self.pool.get()?;
        let row: Option<BannerRow> = diesel::update(banners::table.find(id))
            .set(&BannerChangeset {
                message: input.message.clone(),
                link: input.link_or_default(),
                is_active: input.is_active,
                expires_at: input.expires_at,
                updated_at: Utc::now(),
            })
            .returning(BannerRow::as_returning())
            .get_result(&mut conn)
            .optional()?;
        row.map(to_view).ok_or(DomainError::NotFound)
    }

    fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(banners::table.find(id)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}
