use async_trait::async_trait;

use super::PgStore;
use crate::dao::StudyDao;
use crate::database::manager::DatabaseError;
use crate::database::models::Study;

#[async_trait]
impl StudyDao for PgStore {
    async fn get_study(&self, identifier: &str) -> Result<Option<Study>, DatabaseError> {
        let study = sqlx::query_as::<_, Study>(
            "SELECT identifier, name, active, version FROM studies WHERE identifier = $1",
        )
        .bind(identifier)
        .fetch_optional(self.pool())
        .await?;
        Ok(study)
    }

    async fn create_study_if_absent(&self, study: Study) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO studies (identifier, name, active, version) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (identifier) DO NOTHING",
        )
        .bind(&study.identifier)
        .bind(&study.name)
        .bind(study.active)
        .bind(study.version)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
