use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::ProductRepository;
use crate::domain::product::{ProductFilter, ProductInput, ProductView};
use crate::schema::products;

use super::models::{NewProductRow, ProductChangeset, ProductRow};

pub struct DieselProductRepository {
    pool: DbPool,
}

impl DieselProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_view(row: ProductRow) -> ProductView {
    ProductView {
        id: row.id,
        name: row.name,
        description: row.description,
        price: row.price,
        image: row.image,
        category: row.category,
        stock: row.stock,
        created_at: row.created_at,
    }
}

/// Escapes LIKE metacharacters so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl ProductRepository for DieselProductRepository {
    fn list(&self, filter: &ProductFilter) -> Result<Vec<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;

        let mut query = products::table
            .select(ProductRow::as_select())
            .into_boxed();
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            query = query.filter(
                products::name
                    .ilike(pattern.clone())
                    .or(products::description.ilike(pattern)),
            );
        }
        if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
            query = query.filter(products::category.eq(category));
        }

        let rows = query.order(products::created_at.desc()).load(&mut conn)?;
        Ok(rows.into_iter().map(to_view).collect())
    }

    fn categories(&self) -> Result<Vec<String>, DomainError> {
        let mut conn = self.pool.get()?;
        Ok(products::table
            .select(products::category)
            .distinct()
            .order(products::category.asc())
            .load(&mut conn)?)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<ProductView>, DomainError> {
        let mut conn = self.pool.get()?;
        let row = products::table
            .find(id)
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(to_view))
    }

    fn create(&self, input: &ProductInput) -> Result<ProductView, DomainError> {
        let mut conn = self.pool.get()?;
        let row: ProductRow = diesel::insert_into(products::table)
            .values(&NewProductRow {
                id: Uuid::new_v4(),
                name: input.name.clone(),
                description: input.description.clone(),
                price: input.price.clone(),
                image: input.image.clone(),
                category: input.category.clone(),
                stock: input.stock,
            })
            .returning(ProductRow::as_returning())
            .get_result(&mut conn)?;
        Ok(to_view(row))
    }

    fn update(&self, id: Uuid, input: &ProductInput) -> Result<ProductView, DomainError> {
        let mut conn = self.pool.get()?;
        let row: Option<ProductRow> = diesel::update(products::table.find(id))
            .set(&ProductChangeset {
                name: input.name.clone(),
                description: input.description.clone(),
                price: input.price.clone(),
                image: input.image.clone(),
                category: input.category.clone(),
                stock: input.stock,
                updated_at: Utc::now(),
            })
            .returning(ProductRow::as_returning())
            .get_result(&mut conn)
            .optional()?;
        row.map(to_view).ok_or(DomainError::NotFound)
    }

    fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(products::table.find(id)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}
