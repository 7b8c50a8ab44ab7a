use async_trait::async_trait;
use sqlx::{types::Json, FromRow};
use tracing::warn;

use super::{missing_or_stale, PgStore};
use crate::dao::{NewRevision, UploadSchemaDao};
use crate::database::manager::DatabaseError;
use crate::database::models::{UploadFieldDefinition, UploadSchema};
use crate::types::DeleteMode;

const SCHEMA_COLUMNS: &str = "study_id, schema_id, revision, name, schema_type, field_definitions, \
     survey_guid, survey_created_on, deleted, version";

#[derive(Debug, FromRow)]
struct UploadSchemaRow {
    study_id: String,
    schema_id: String,
    revision: i32,
    name: String,
    schema_type: String,
    field_definitions: Json<Vec<UploadFieldDefinition>>,
    survey_guid: Option<String>,
    survey_created_on: Option<i64>,
    deleted: bool,
    version: i64,
}

impl From<UploadSchemaRow> for UploadSchema {
    fn from(row: UploadSchemaRow) -> Self {
        let schema_type = match row.schema_type.parse() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Upload schema {} rev {}: {}", row.schema_id, row.revision, e);
                None
            }
        };
        Self {
            study_id: Some(row.study_id),
            schema_id: row.schema_id,
            revision: row.revision,
            name: row.name,
            schema_type,
            field_definitions: row.field_definitions.0,
            survey_guid: row.survey_guid,
            survey_created_on: row.survey_created_on,
            deleted: row.deleted,
            version: row.version,
        }
    }
}

fn study_of(schema: &UploadSchema) -> Result<String, DatabaseError> {
    schema
        .study_id
        .clone()
        .ok_or_else(|| DatabaseError::QueryError("upload schema has no study".to_string()))
}

fn schema_type_of(schema: &UploadSchema) -> Result<&'static str, DatabaseError> {
    schema
        .schema_type
        .map(|t| t.as_str())
        .ok_or_else(|| DatabaseError::QueryError("upload schema has no type".to_string()))
}

#[async_trait]
impl UploadSchemaDao for PgStore {
    async fn create_schema_revision(
        &self,
        mut schema: UploadSchema,
        rule: NewRevision,
    ) -> Result<UploadSchema, DatabaseError> {
        let study_id = study_of(&schema)?;
        let schema_type = schema_type_of(&schema)?;
        let mut tx = self.pool().begin().await?;

        // The counter row lock serializes revision allocation per schema
        sqlx::query(
            "INSERT INTO upload_schema_revision_counters (study_id, schema_id, last_revision) \
             VALUES ($1, $2, 0) ON CONFLICT (study_id, schema_id) DO NOTHING",
        )
        .bind(&study_id)
        .bind(&schema.schema_id)
        .execute(&mut *tx)
        .await?;

        let allocated: i32 = sqlx::query_scalar(
            "SELECT last_revision FROM upload_schema_revision_counters \
             WHERE study_id = $1 AND schema_id = $2 FOR UPDATE",
        )
        .bind(&study_id)
        .bind(&schema.schema_id)
        .fetch_one(&mut *tx)
        .await?;

        let revision = match rule {
            NewRevision::Next => NewRevision::successor(allocated)?,
            NewRevision::Exactly(n) if n > allocated => n,
            NewRevision::Exactly(_) => {
                return Err(DatabaseError::Conflict("UploadSchema revision already exists.".to_string()));
            }
            NewRevision::After(expected) => {
                let current: i32 = sqlx::query_scalar(
                    "SELECT COALESCE(MAX(revision), 0) FROM upload_schemas WHERE study_id = $1 AND schema_id = $2",
                )
                .bind(&study_id)
                .bind(&schema.schema_id)
                .fetch_one(&mut *tx)
                .await?;
                if current != expected {
                    return Err(missing_or_stale(true, "UploadSchema"));
                }
                NewRevision::successor(allocated)?
            }
        };

        sqlx::query(
            "UPDATE upload_schema_revision_counters SET last_revision = $3 WHERE study_id = $1 AND schema_id = $2",
        )
        .bind(&study_id)
        .bind(&schema.schema_id)
        .bind(revision)
        .execute(&mut *tx)
        .await?;

        schema.revision = revision;
        schema.deleted = false;
        schema.version = 1;

        let sql = format!(
            "INSERT INTO upload_schemas ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            SCHEMA_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&study_id)
            .bind(&schema.schema_id)
            .bind(schema.revision)
            .bind(&schema.name)
            .bind(schema_type)
            .bind(Json(&schema.field_definitions))
            .bind(&schema.survey_guid)
            .bind(schema.survey_created_on)
            .bind(schema.deleted)
            .bind(schema.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_insert(e, || "UploadSchema revision already exists.".to_string()))?;

        tx.commit().await?;
        Ok(schema)
    }

    async fn update_schema_revision(&self, schema: UploadSchema) -> Result<UploadSchema, DatabaseError> {
        let study_id = study_of(&schema)?;
        let schema_type = schema_type_of(&schema)?;
        let sql = format!(
            "UPDATE upload_schemas SET name = $4, schema_type = $5, field_definitions = $6, survey_guid = $7, \
             survey_created_on = $8, version = version + 1 \
             WHERE study_id = $1 AND schema_id = $2 AND revision = $3 AND NOT deleted AND version = $9 \
             RETURNING {}",
            SCHEMA_COLUMNS
        );
        let row = sqlx::query_as::<_, UploadSchemaRow>(&sql)
            .bind(&study_id)
            .bind(&schema.schema_id)
            .bind(schema.revision)
            .bind(&schema.name)
            .bind(schema_type)
            .bind(Json(&schema.field_definitions))
            .bind(&schema.survey_guid)
            .bind(schema.survey_created_on)
            .bind(schema.version)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(UploadSchema::from(row)),
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM upload_schemas \
                     WHERE study_id = $1 AND schema_id = $2 AND revision = $3 AND NOT deleted)",
                )
                .bind(&study_id)
                .bind(&schema.schema_id)
                .bind(schema.revision)
                .fetch_one(self.pool())
                .await?;
                Err(missing_or_stale(exists, "UploadSchema"))
            }
        }
    }

    async fn get_schema_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
    ) -> Result<Option<UploadSchema>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM upload_schemas WHERE study_id = $1 AND schema_id = $2 AND revision = $3",
            SCHEMA_COLUMNS
        );
        let row = sqlx::query_as::<_, UploadSchemaRow>(&sql)
            .bind(study_id)
            .bind(schema_id)
            .bind(revision)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(UploadSchema::from))
    }

    async fn get_schema_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM upload_schemas WHERE study_id = $1 AND schema_id = $2 AND ($3 OR NOT deleted) \
             ORDER BY revision DESC",
            SCHEMA_COLUMNS
        );
        let rows = sqlx::query_as::<_, UploadSchemaRow>(&sql)
            .bind(study_id)
            .bind(schema_id)
            .bind(include_deleted)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(UploadSchema::from).collect())
    }

    async fn get_schemas_for_study(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, DatabaseError> {
        let sql = format!(
            "SELECT DISTINCT ON (schema_id) {} FROM upload_schemas WHERE study_id = $1 AND ($2 OR NOT deleted) \
             ORDER BY schema_id, revision DESC",
            SCHEMA_COLUMNS
        );
        let rows = sqlx::query_as::<_, UploadSchemaRow>(&sql)
            .bind(study_id)
            .bind(include_deleted)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(UploadSchema::from).collect())
    }

    async fn delete_schema_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
        mode: DeleteMode,
    ) -> Result<(), DatabaseError> {
        let sql = match mode {
            DeleteMode::Logical => {
                "UPDATE upload_schemas SET deleted = TRUE, version = version + 1 \
                 WHERE study_id = $1 AND schema_id = $2 AND revision = $3 AND NOT deleted"
            }
            DeleteMode::Permanent => {
                "DELETE FROM upload_schemas WHERE study_id = $1 AND schema_id = $2 AND revision = $3"
            }
        };
        let result = sqlx::query(sql)
            .bind(study_id)
            .bind(schema_id)
            .bind(revision)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("UploadSchema"));
        }
        Ok(())
    }

    async fn delete_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        mode: DeleteMode,
    ) -> Result<(), DatabaseError> {
        let sql = match mode {
            DeleteMode::Logical => {
                "UPDATE upload_schemas SET deleted = TRUE, version = version + 1 \
                 WHERE study_id = $1 AND schema_id = $2 AND NOT deleted"
            }
            DeleteMode::Permanent => "DELETE FROM upload_schemas WHERE study_id = $1 AND schema_id = $2",
        };
        let result = sqlx::query(sql)
            .bind(study_id)
            .bind(schema_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("UploadSchema"));
        }
        Ok(())
    }
}
