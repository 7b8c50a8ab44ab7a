use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use super::{missing_or_stale, PgStore};
use crate::dao::{PagedResult, TemplateDao};
use crate::database::manager::DatabaseError;
use crate::database::models::{Template, TemplateType};

const TEMPLATE_COLUMNS: &str =
    "guid, study_id, template_type, name, description, created_on, modified_on, deleted, version";

#[derive(Debug, FromRow)]
struct TemplateRow {
    guid: String,
    study_id: String,
    template_type: String,
    name: String,
    description: Option<String>,
    created_on: DateTime<Utc>,
    modified_on: DateTime<Utc>,
    deleted: bool,
    version: i64,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        let template_type = match row.template_type.parse::<TemplateType>() {
            Ok(t) => Some(t),
            Err(e) => {
                warn!("Template {}: {}", row.guid, e);
                None
            }
        };
        Self {
            guid: row.guid,
            study_id: row.study_id,
            template_type,
            name: row.name,
            description: row.description,
            created_on: row.created_on,
            modified_on: row.modified_on,
            deleted: row.deleted,
            version: row.version,
        }
    }
}

#[async_trait]
impl TemplateDao for PgStore {
    async fn get_templates(
        &self,
        study_id: &str,
        template_type: TemplateType,
        offset: i64,
        limit: i64,
        include_deleted: bool,
    ) -> Result<PagedResult<Template>, DatabaseError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM templates WHERE study_id = $1 AND template_type = $2 AND ($3 OR NOT deleted)",
        )
        .bind(study_id)
        .bind(template_type.as_str())
        .bind(include_deleted)
        .fetch_one(self.pool())
        .await?;

        let sql = format!(
            "SELECT {} FROM templates WHERE study_id = $1 AND template_type = $2 AND ($3 OR NOT deleted) \
             ORDER BY created_on DESC, guid LIMIT $4 OFFSET $5",
            TEMPLATE_COLUMNS
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(study_id)
            .bind(template_type.as_str())
            .bind(include_deleted)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;

        Ok(PagedResult {
            items: rows.into_iter().map(Template::from).collect(),
            total,
        })
    }

    async fn get_template(&self, study_id: &str, guid: &str) -> Result<Option<Template>, DatabaseError> {
        let sql = format!("SELECT {} FROM templates WHERE study_id = $1 AND guid = $2", TEMPLATE_COLUMNS);
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(study_id)
            .bind(guid)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Template::from))
    }

    async fn create_template(&self, mut template: Template) -> Result<Template, DatabaseError> {
        let template_type = template
            .template_type
            .ok_or_else(|| DatabaseError::QueryError("template has no type".to_string()))?;
        template.version = 1;

        let sql = format!(
            "INSERT INTO templates ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            TEMPLATE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&template.guid)
            .bind(&template.study_id)
            .bind(template_type.as_str())
            .bind(&template.name)
            .bind(&template.description)
            .bind(template.created_on)
            .bind(template.modified_on)
            .bind(template.deleted)
            .bind(template.version)
            .execute(self.pool())
            .await
            .map_err(|e| DatabaseError::from_insert(e, || "Template already exists.".to_string()))?;
        Ok(template)
    }

    async fn update_template(&self, template: Template) -> Result<Template, DatabaseError> {
        let sql = format!(
            "UPDATE templates SET name = $3, description = $4, modified_on = $5, deleted = $6, \
             version = version + 1 WHERE study_id = $1 AND guid = $2 AND version = $7 RETURNING {}",
            TEMPLATE_COLUMNS
        );
        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(&template.study_id)
            .bind(&template.guid)
            .bind(&template.name)
            .bind(&template.description)
            .bind(template.modified_on)
            .bind(template.deleted)
            .bind(template.version)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(Template::from(row)),
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM templates WHERE study_id = $1 AND guid = $2)",
                )
                .bind(&template.study_id)
                .bind(&template.guid)
                .fetch_one(self.pool())
                .await?;
                Err(missing_or_stale(exists, "Template"))
            }
        }
    }

    async fn delete_template_permanently(&self, study_id: &str, guid: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM templates WHERE study_id = $1 AND guid = $2")
            .bind(study_id)
            .bind(guid)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
