use async_trait::async_trait;

use super::{missing_or_stale, PgStore};
use crate::dao::SubpopulationDao;
use crate::database::manager::DatabaseError;
use crate::database::models::Subpopulation;

const SUBPOP_COLUMNS: &str =
    "guid, study_id, name, description, required, default_group, deleted, published_consent_created_on, version";

#[async_trait]
impl SubpopulationDao for PgStore {
    async fn create_subpopulation(&self, mut subpop: Subpopulation) -> Result<Subpopulation, DatabaseError> {
        subpop.version = 1;
        let sql = format!(
            "INSERT INTO subpopulations ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            SUBPOP_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&subpop.guid)
            .bind(&subpop.study_id)
            .bind(&subpop.name)
            .bind(&subpop.description)
            .bind(subpop.required)
            .bind(subpop.default_group)
            .bind(subpop.deleted)
            .bind(subpop.published_consent_created_on)
            .bind(subpop.version)
            .execute(self.pool())
            .await
            .map_err(|e| DatabaseError::from_insert(e, || "Subpopulation already exists.".to_string()))?;
        Ok(subpop)
    }

    async fn get_subpopulation(&self, study_id: &str, guid: &str) -> Result<Option<Subpopulation>, DatabaseError> {
        let sql = format!("SELECT {} FROM subpopulations WHERE study_id = $1 AND guid = $2", SUBPOP_COLUMNS);
        let subpop = sqlx::query_as::<_, Subpopulation>(&sql)
            .bind(study_id)
            .bind(guid)
            .fetch_optional(self.pool())
            .await?;
        Ok(subpop)
    }

    async fn get_subpopulations(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Subpopulation>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM subpopulations WHERE study_id = $1 AND ($2 OR NOT deleted) ORDER BY name, guid",
            SUBPOP_COLUMNS
        );
        let subpops = sqlx::query_as::<_, Subpopulation>(&sql)
            .bind(study_id)
            .bind(include_deleted)
            .fetch_all(self.pool())
            .await?;
        Ok(subpops)
    }

    async fn update_subpopulation(&self, subpop: Subpopulation) -> Result<Subpopulation, DatabaseError> {
        // publishedConsentCreatedOn only moves through publish_consent
        let sql = format!(
            "UPDATE subpopulations SET name = $3, description = $4, required = $5, default_group = $6, \
             deleted = $7, version = version + 1 WHERE study_id = $1 AND guid = $2 AND version = $8 RETURNING {}",
            SUBPOP_COLUMNS
        );
        let updated = sqlx::query_as::<_, Subpopulation>(&sql)
            .bind(&subpop.study_id)
            .bind(&subpop.guid)
            .bind(&subpop.name)
            .bind(&subpop.description)
            .bind(subpop.required)
            .bind(subpop.default_group)
            .bind(subpop.deleted)
            .bind(subpop.version)
            .fetch_optional(self.pool())
            .await?;

        match updated {
            Some(updated) => Ok(updated),
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM subpopulations WHERE study_id = $1 AND guid = $2)",
                )
                .bind(&subpop.study_id)
                .bind(&subpop.guid)
                .fetch_one(self.pool())
                .await?;
                Err(missing_or_stale(exists, "Subpopulation"))
            }
        }
    }

    async fn delete_subpopulation(&self, study_id: &str, guid: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE subpopulations SET deleted = TRUE, version = version + 1 \
             WHERE study_id = $1 AND guid = $2 AND NOT deleted",
        )
        .bind(study_id)
        .bind(guid)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Subpopulation"));
        }
        Ok(())
    }
}
