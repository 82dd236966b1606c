use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::UserRepository;
use crate::domain::user::Role;
use crate::schema::users;

/// Read-only view of the user directory the auth collaborator maintains.
pub struct DieselUserRepository {
    pool: DbPool,
}

impl DieselUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl UserRepository for DieselUserRepository {
    fn role_of(&self, user_id: Uuid) -> Result<Option<Role>, DomainError> {
        let mut conn = self.pool.get()?;
        let role: Option<String> = users::table
            .find(user_id)
            .select(users::role)
            .first(&mut conn)
            .optional()?;
        Ok(role.map(|r| Role::from_db(&r)))
    }
}
