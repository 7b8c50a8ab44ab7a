use async_trait::async_trait;

use crate::database::manager::DatabaseError;
use crate::database::models::StudyConsent;

#[async_trait]
pub trait StudyConsentDao: Send + Sync {
    /// Store a new inactive consent. Its `createdOn` is `created_on`, or one
    /// millisecond past the most recent consent if that is not later.
    async fn add_consent(
        &self,
        subpopulation_guid: &str,
        document_content: String,
        created_on: i64,
    ) -> Result<StudyConsent, DatabaseError>;

    /// Newest first
    async fn get_all_consents(&self, subpopulation_guid: &str) -> Result<Vec<StudyConsent>, DatabaseError>;

    async fn get_consent(
        &self,
        subpopulation_guid: &str,
        created_on: i64,
    ) -> Result<Option<StudyConsent>, DatabaseError>;

    /// Highest `createdOn`, active or not
    async fn get_most_recent_consent(&self, subpopulation_guid: &str) -> Result<Option<StudyConsent>, DatabaseError>;

    async fn get_active_consent(&self, subpopulation_guid: &str) -> Result<Option<StudyConsent>, DatabaseError>;

    /// In one transaction: deactivate the current active consent, activate
    /// the named one and record it on the subpopulation. Returns the newly
    /// active consent.
    async fn publish_consent(
        &self,
        study_id: &str,
        subpopulation_guid: &str,
        created_on: i64,
    ) -> Result<StudyConsent, DatabaseError>;
}
