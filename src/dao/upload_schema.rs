use async_trait::async_trait;

use crate::database::manager::DatabaseError;
use crate::database::models::UploadSchema;
use crate::types::DeleteMode;

/// How a new schema revision number is chosen. Every rule is applied
/// atomically with the insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewRevision {
    /// One past the highest revision ever allocated for the schema
    Next,
    /// This exact number, which must be above every revision ever allocated
    Exactly(i32),
    /// Like `Next`, but only if the highest stored revision is `expected`
    /// (0 when there is none); otherwise `ConcurrentModification`
    After(i32),
}

impl NewRevision {
    /// The revision after `allocated`. `Conflict` once the numbering is exhausted.
    pub fn successor(allocated: i32) -> Result<i32, DatabaseError> {
        allocated
            .checked_add(1)
            .ok_or_else(|| DatabaseError::Conflict("UploadSchema has no revision numbers left.".to_string()))
    }
}

#[async_trait]
pub trait UploadSchemaDao: Send + Sync {
    /// Store a new revision of `schema`, whose `study_id` must be set
    async fn create_schema_revision(
        &self,
        schema: UploadSchema,
        rule: NewRevision,
    ) -> Result<UploadSchema, DatabaseError>;

    /// Overwrite one existing, non-deleted revision. `NotFound` if it does
    /// not exist, `ConcurrentModification` on a stale version.
    async fn update_schema_revision(&self, schema: UploadSchema) -> Result<UploadSchema, DatabaseError>;

    /// Exact revision, deleted or not
    async fn get_schema_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
    ) -> Result<Option<UploadSchema>, DatabaseError>;

    /// Every revision of one schema, newest first
    async fn get_schema_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, DatabaseError>;

    /// Newest visible revision of each schema in the study, ordered by schema id
    async fn get_schemas_for_study(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, DatabaseError>;

    /// `NotFound` if there is nothing left to delete under `mode`
    async fn delete_schema_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
        mode: DeleteMode,
    ) -> Result<(), DatabaseError>;

    async fn delete_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        mode: DeleteMode,
    ) -> Result<(), DatabaseError>;
}
