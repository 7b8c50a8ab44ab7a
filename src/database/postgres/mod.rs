//! PostgreSQL implementations of the store traits

mod accounts;
mod studies;
mod study_consents;
mod subpopulations;
mod templates;
mod upload_schemas;

use sqlx::PgPool;

use crate::database::manager::DatabaseError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// After a guarded UPDATE touched no row: tell a missing row from a stale version
fn missing_or_stale(exists: bool, entity: &str) -> DatabaseError {
    if exists {
        DatabaseError::ConcurrentModification(format!(
            "{} has the wrong version number; it may have been saved in the background.",
            entity
        ))
    } else {
        DatabaseError::not_found(entity)
    }
}
