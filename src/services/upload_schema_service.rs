use std::sync::Arc;
use tracing::info;

use crate::dao::{NewRevision, UploadSchemaDao};
use crate::database::models::UploadSchema;
use crate::error::ApiError;
use crate::types::DeleteMode;

/// Revisioned upload schemas within one study. Every method takes the
/// caller's study; schemas of other studies are invisible.
pub struct UploadSchemaService {
    schemas: Arc<dyn UploadSchemaDao>,
}

impl UploadSchemaService {
    pub fn new(schemas: Arc<dyn UploadSchemaDao>) -> Self {
        Self { schemas }
    }

    fn validate(schema: &UploadSchema) -> Result<(), ApiError> {
        let errors = schema.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("UploadSchema is invalid", Some(errors)))
        }
    }

    fn require_schema_id(schema_id: &str) -> Result<(), ApiError> {
        if schema_id.trim().is_empty() {
            return Err(ApiError::bad_request("Schema ID must be specified"));
        }
        Ok(())
    }

    fn require_revision(revision: i32) -> Result<(), ApiError> {
        if revision <= 0 {
            return Err(ApiError::bad_request("Revision must be positive"));
        }
        Ok(())
    }

    /// New revision. Revision 0 (or absent) takes the next free number; an
    /// explicit revision must be higher than any ever allocated.
    pub async fn create_schema_revision_v4(
        &self,
        study_id: &str,
        mut schema: UploadSchema,
    ) -> Result<UploadSchema, ApiError> {
        schema.study_id = Some(study_id.to_string());
        Self::validate(&schema)?;

        let rule = match schema.revision {
            0 => NewRevision::Next,
            n => NewRevision::Exactly(n),
        };
        let created = self.schemas.create_schema_revision(schema, rule).await?;
        info!("Created upload schema {} rev {} in study {}", created.schema_id, created.revision, study_id);
        Ok(created)
    }

    /// Legacy create: the submitted revision names the revision the client
    /// last saw (0 for a new schema). Anything else is a concurrent edit.
    pub async fn create_or_update_upload_schema(
        &self,
        study_id: &str,
        mut schema: UploadSchema,
    ) -> Result<UploadSchema, ApiError> {
        schema.study_id = Some(study_id.to_string());
        Self::validate(&schema)?;

        let expected = schema.revision;
        let created = self
            .schemas
            .create_schema_revision(schema, NewRevision::After(expected))
            .await?;
        info!("Created upload schema {} rev {} in study {}", created.schema_id, created.revision, study_id);
        Ok(created)
    }

    /// Overwrite one existing revision in place with a backwards-compatible change
    pub async fn update_schema_revision_v4(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
        mut schema: UploadSchema,
    ) -> Result<UploadSchema, ApiError> {
        Self::require_schema_id(schema_id)?;
        Self::require_revision(revision)?;

        schema.study_id = Some(study_id.to_string());
        schema.schema_id = schema_id.to_string();
        schema.revision = revision;
        Self::validate(&schema)?;

        let existing = self
            .schemas
            .get_schema_revision(study_id, schema_id, revision)
            .await?
            .filter(|s| !s.deleted)
            .ok_or_else(|| ApiError::entity_not_found("UploadSchema"))?;

        let incompatible = existing.incompatible_changes(&schema);
        if !incompatible.is_empty() {
            return Err(ApiError::validation_error(
                "Upload schema changes are not backwards compatible",
                Some(incompatible),
            ));
        }

        Ok(self.schemas.update_schema_revision(schema).await?)
    }

    /// Highest revision, skipping deleted ones unless asked
    pub async fn get_upload_schema(
        &self,
        study_id: &str,
        schema_id: &str,
        include_deleted: bool,
    ) -> Result<UploadSchema, ApiError> {
        Self::require_schema_id(schema_id)?;
        self.schemas
            .get_schema_all_revisions(study_id, schema_id, include_deleted)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::entity_not_found("UploadSchema"))
    }

    /// Exact revision, deleted or not
    pub async fn get_upload_schema_by_id_and_rev(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
    ) -> Result<UploadSchema, ApiError> {
        Self::require_schema_id(schema_id)?;
        Self::require_revision(revision)?;
        self.schemas
            .get_schema_revision(study_id, schema_id, revision)
            .await?
            .ok_or_else(|| ApiError::entity_not_found("UploadSchema"))
    }

    /// Newest first
    pub async fn get_upload_schema_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, ApiError> {
        Self::require_schema_id(schema_id)?;
        let revisions = self
            .schemas
            .get_schema_all_revisions(study_id, schema_id, include_deleted)
            .await?;
        if revisions.is_empty() {
            return Err(ApiError::entity_not_found("UploadSchema"));
        }
        Ok(revisions)
    }

    pub async fn get_upload_schemas_for_study(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, ApiError> {
        Ok(self.schemas.get_schemas_for_study(study_id, include_deleted).await?)
    }

    pub async fn delete_upload_schema_by_id(
        &self,
        study_id: &str,
        schema_id: &str,
        mode: DeleteMode,
    ) -> Result<(), ApiError> {
        Self::require_schema_id(schema_id)?;
        self.schemas.delete_all_revisions(study_id, schema_id, mode).await?;
        info!("Deleted all revisions of upload schema {} in study {} ({:?})", schema_id, study_id, mode);
        Ok(())
    }

    pub async fn delete_upload_schema_by_id_and_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
        mode: DeleteMode,
    ) -> Result<(), ApiError> {
        Self::require_schema_id(schema_id)?;
        Self::require_revision(revision)?;
        self.schemas
            .delete_schema_revision(study_id, schema_id, revision, mode)
            .await?;
        info!("Deleted upload schema {} rev {} in study {} ({:?})", schema_id, revision, study_id, mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::testing::sample_schema;

    fn service() -> UploadSchemaService {
        UploadSchemaService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn sequential_creates_number_revisions_and_list_newest_first() {
        let svc = service();
        let first = svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        let second = svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        assert_eq!((first.revision, second.revision), (1, 2));

        let revisions: Vec<i32> = svc
            .get_upload_schema_all_revisions("api", "s1", false)
            .await
            .unwrap()
            .iter()
            .map(|s| s.revision)
            .collect();
        assert_eq!(revisions, vec![2, 1]);
    }

    #[tokio::test]
    async fn explicit_revisions_must_be_new_and_in_range() {
        let svc = service();
        svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();

        let mut taken = sample_schema("s1");
        taken.revision = 1;
        let err = svc.create_schema_revision_v4("api", taken).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        let mut negative = sample_schema("s1");
        negative.revision = -1;
        let err = svc.create_schema_revision_v4("api", negative).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let mut top = sample_schema("s1");
        top.revision = i32::MAX;
        assert_eq!(svc.create_schema_revision_v4("api", top).await.unwrap().revision, i32::MAX);

        // Numbering is exhausted; the next automatic revision conflicts
        let err = svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        let mut legacy = sample_schema("s1");
        legacy.revision = i32::MAX;
        let err = svc.create_or_update_upload_schema("api", legacy).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn invalid_field_definitions_are_rejected() {
        let svc = service();
        let mut schema = sample_schema("s1");
        schema.field_definitions[0].name = " ".to_string();
        let err = svc.create_schema_revision_v4("api", schema).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn legacy_create_requires_the_current_revision() {
        let svc = service();
        let created = svc.create_or_update_upload_schema("api", sample_schema("s1")).await.unwrap();
        assert_eq!(created.revision, 1);

        // Client still thinks there is no schema
        let stale = svc.create_or_update_upload_schema("api", sample_schema("s1")).await.unwrap_err();
        assert!(matches!(stale, ApiError::ConcurrentModification(_)));

        let mut next = sample_schema("s1");
        next.revision = 1;
        assert_eq!(svc.create_or_update_upload_schema("api", next).await.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn update_targets_exact_revision_only() {
        let svc = service();
        let created = svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();

        let missing = svc
            .update_schema_revision_v4("api", "s1", 7, sample_schema("s1"))
            .await
            .unwrap_err();
        assert!(matches!(missing, ApiError::NotFound(_)));

        let mut changed = created.clone();
        changed.name = "Renamed".to_string();
        let updated = svc.update_schema_revision_v4("api", "s1", 1, changed).await.unwrap();
        assert_eq!(updated.revision, 1);
        assert_eq!(updated.name, "Renamed");
        assert_eq!(svc.get_upload_schema_all_revisions("api", "s1", true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_rejects_removed_fields() {
        let svc = service();
        let mut created = svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        created.field_definitions[0].name = "renamed-field".to_string();
        let err = svc.update_schema_revision_v4("api", "s1", 1, created).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn current_revision_skips_deleted_unless_included() {
        let svc = service();
        svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        svc.delete_upload_schema_by_id_and_revision("api", "s1", 2, DeleteMode::Logical)
            .await
            .unwrap();

        assert_eq!(svc.get_upload_schema("api", "s1", false).await.unwrap().revision, 1);
        assert_eq!(svc.get_upload_schema("api", "s1", true).await.unwrap().revision, 2);
        // Exact-revision reads ignore the deleted flag
        assert!(svc.get_upload_schema_by_id_and_rev("api", "s1", 2).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn permanent_delete_leaves_nothing_to_read() {
        let svc = service();
        svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        svc.delete_upload_schema_by_id("api", "s1", DeleteMode::Permanent).await.unwrap();

        for include_deleted in [false, true] {
            let err = svc
                .get_upload_schema_all_revisions("api", "s1", include_deleted)
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn other_studies_schemas_are_not_found() {
        let svc = service();
        svc.create_schema_revision_v4("api", sample_schema("s1")).await.unwrap();
        let err = svc.get_upload_schema("other", "s1", true).await.unwrap_err();
        assert_eq!(err.message(), "UploadSchema not found.");
        assert!(svc.get_upload_schemas_for_study("other", true).await.unwrap().is_empty());
    }
}
