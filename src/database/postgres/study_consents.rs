use async_trait::async_trait;

use super::PgStore;
use crate::dao::StudyConsentDao;
use crate::database::manager::DatabaseError;
use crate::database::models::StudyConsent;

const CONSENT_COLUMNS: &str = "subpopulation_guid, created_on, active, document_content, version";

#[async_trait]
impl StudyConsentDao for PgStore {
    async fn add_consent(
        &self,
        subpopulation_guid: &str,
        document_content: String,
        created_on: i64,
    ) -> Result<StudyConsent, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        // Locking the parent row keeps createdOn strictly increasing
        let locked: Option<String> =
            sqlx::query_scalar("SELECT guid FROM subpopulations WHERE guid = $1 FOR UPDATE")
                .bind(subpopulation_guid)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(DatabaseError::not_found("Subpopulation"));
        }

        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(created_on) FROM study_consents WHERE subpopulation_guid = $1")
                .bind(subpopulation_guid)
                .fetch_one(&mut *tx)
                .await?;
        let created_on = match latest {
            Some(latest) if latest >= created_on => latest + 1,
            _ => created_on,
        };

        let sql = format!(
            "INSERT INTO study_consents ({}) VALUES ($1, $2, FALSE, $3, 1) RETURNING {}",
            CONSENT_COLUMNS, CONSENT_COLUMNS
        );
        let consent = sqlx::query_as::<_, StudyConsent>(&sql)
            .bind(subpopulation_guid)
            .bind(created_on)
            .bind(document_content)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(consent)
    }

    async fn get_all_consents(&self, subpopulation_guid: &str) -> Result<Vec<StudyConsent>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM study_consents WHERE subpopulation_guid = $1 ORDER BY created_on DESC",
            CONSENT_COLUMNS
        );
        let consents = sqlx::query_as::<_, StudyConsent>(&sql)
            .bind(subpopulation_guid)
            .fetch_all(self.pool())
            .await?;
        Ok(consents)
    }

    async fn get_consent(
        &self,
        subpopulation_guid: &str,
        created_on: i64,
    ) -> Result<Option<StudyConsent>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM study_consents WHERE subpopulation_guid = $1 AND created_on = $2",
            CONSENT_COLUMNS
        );
        let consent = sqlx::query_as::<_, StudyConsent>(&sql)
            .bind(subpopulation_guid)
            .bind(created_on)
            .fetch_optional(self.pool())
            .await?;
        Ok(consent)
    }

    async fn get_most_recent_consent(&self, subpopulation_guid: &str) -> Result<Option<StudyConsent>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM study_consents WHERE subpopulation_guid = $1 ORDER BY created_on DESC LIMIT 1",
            CONSENT_COLUMNS
        );
        let consent = sqlx::query_as::<_, StudyConsent>(&sql)
            .bind(subpopulation_guid)
            .fetch_optional(self.pool())
            .await?;
        Ok(consent)
    }

    async fn get_active_consent(&self, subpopulation_guid: &str) -> Result<Option<StudyConsent>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM study_consents WHERE subpopulation_guid = $1 AND active",
            CONSENT_COLUMNS
        );
        let consent = sqlx::query_as::<_, StudyConsent>(&sql)
            .bind(subpopulation_guid)
            .fetch_optional(self.pool())
            .await?;
        Ok(consent)
    }

    async fn publish_consent(
        &self,
        study_id: &str,
        subpopulation_guid: &str,
        created_on: i64,
    ) -> Result<StudyConsent, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let locked: Option<String> =
            sqlx::query_scalar("SELECT guid FROM subpopulations WHERE guid = $1 AND study_id = $2 FOR UPDATE")
                .bind(subpopulation_guid)
                .bind(study_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(DatabaseError::not_found("Subpopulation"));
        }

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM study_consents WHERE subpopulation_guid = $1 AND created_on = $2)",
        )
        .bind(subpopulation_guid)
        .bind(created_on)
        .fetch_one(&mut *tx)
        .await?;
        if !exists {
            return Err(DatabaseError::not_found("StudyConsent"));
        }

        // Deactivate first so the one-active index never sees two rows
        sqlx::query(
            "UPDATE study_consents SET active = FALSE, version = version + 1 \
             WHERE subpopulation_guid = $1 AND active AND created_on <> $2",
        )
        .bind(subpopulation_guid)
        .bind(created_on)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE study_consents SET active = TRUE, version = version + 1 \
             WHERE subpopulation_guid = $1 AND created_on = $2 AND NOT active",
        )
        .bind(subpopulation_guid)
        .bind(created_on)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE subpopulations SET published_consent_created_on = $2, version = version + 1 WHERE guid = $1",
        )
        .bind(subpopulation_guid)
        .bind(created_on)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "SELECT {} FROM study_consents WHERE subpopulation_guid = $1 AND created_on = $2",
            CONSENT_COLUMNS
        );
        let published = sqlx::query_as::<_, StudyConsent>(&sql)
            .bind(subpopulation_guid)
            .bind(created_on)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(published)
    }
}
