use async_trait::async_trait;

use crate::database::manager::DatabaseError;
use crate::database::models::Subpopulation;

#[async_trait]
pub trait SubpopulationDao: Send + Sync {
    /// `Conflict` if the guid is taken
    async fn create_subpopulation(&self, subpop: Subpopulation) -> Result<Subpopulation, DatabaseError>;

    /// `None` unless the guid belongs to `study_id`
    async fn get_subpopulation(&self, study_id: &str, guid: &str) -> Result<Option<Subpopulation>, DatabaseError>;

    /// Ordered by name
    async fn get_subpopulations(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Subpopulation>, DatabaseError>;

    /// `NotFound` if absent, `ConcurrentModification` on a stale version
    async fn update_subpopulation(&self, subpop: Subpopulation) -> Result<Subpopulation, DatabaseError>;

    /// Logical delete. `NotFound` if absent or already deleted.
    async fn delete_subpopulation(&self, study_id: &str, guid: &str) -> Result<(), DatabaseError>;
}
