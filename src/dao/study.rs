use async_trait::async_trait;

use crate::database::manager::DatabaseError;
use crate::database::models::Study;

#[async_trait]
pub trait StudyDao: Send + Sync {
    async fn get_study(&self, identifier: &str) -> Result<Option<Study>, DatabaseError>;

    /// Insert the study unless one with the same identifier exists.
    /// Returns true if it was inserted.
    async fn create_study_if_absent(&self, study: Study) -> Result<bool, DatabaseError>;
}
