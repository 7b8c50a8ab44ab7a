use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::dao::StudyConsentDao;
use crate::database::models::{Study, StudyConsent, StudyConsentForm, StudyConsentView, Subpopulation};
use crate::error::ApiError;

/// Consent documents of one subpopulation. Callers resolve the subpopulation
/// within the session's study first, so every method here already works on
/// an authorized parent.
pub struct StudyConsentService {
    consents: Arc<dyn StudyConsentDao>,
}

impl StudyConsentService {
    pub fn new(consents: Arc<dyn StudyConsentDao>) -> Self {
        Self { consents }
    }

    /// New draft revision; it stays inactive until published
    pub async fn add_consent(
        &self,
        subpop: &Subpopulation,
        form: StudyConsentForm,
    ) -> Result<StudyConsentView, ApiError> {
        if form.document_content.trim().is_empty() {
            let mut errors = BTreeMap::new();
            errors.insert("documentContent".to_string(), "is required".to_string());
            return Err(ApiError::validation_error("StudyConsent is invalid", Some(errors)));
        }

        let now = Utc::now().timestamp_millis();
        let consent = self
            .consents
            .add_consent(&subpop.guid, form.document_content, now)
            .await?;
        info!("Added consent {} to subpopulation {}", consent.created_on, subpop.guid);
        Ok(consent.into())
    }

    /// Newest first, without document bodies
    pub async fn get_all_consents(&self, subpop: &Subpopulation) -> Result<Vec<StudyConsent>, ApiError> {
        Ok(self.consents.get_all_consents(&subpop.guid).await?)
    }

    pub async fn get_active_consent(&self, subpop: &Subpopulation) -> Result<StudyConsentView, ApiError> {
        self.consents
            .get_active_consent(&subpop.guid)
            .await?
            .map(StudyConsentView::from)
            .ok_or_else(|| ApiError::entity_not_found("StudyConsent"))
    }

    pub async fn get_most_recent_consent(&self, subpop: &Subpopulation) -> Result<StudyConsentView, ApiError> {
        self.consents
            .get_most_recent_consent(&subpop.guid)
            .await?
            .map(StudyConsentView::from)
            .ok_or_else(|| ApiError::entity_not_found("StudyConsent"))
    }

    pub async fn get_consent(&self, subpop: &Subpopulation, created_on: i64) -> Result<StudyConsentView, ApiError> {
        self.consents
            .get_consent(&subpop.guid, created_on)
            .await?
            .map(StudyConsentView::from)
            .ok_or_else(|| ApiError::entity_not_found("StudyConsent"))
    }

    /// Make one revision the active consent, superseding the previous one
    pub async fn publish_consent(
        &self,
        study: &Study,
        subpop: &Subpopulation,
        created_on: i64,
    ) -> Result<StudyConsentView, ApiError> {
        let published = self
            .consents
            .publish_consent(&study.identifier, &subpop.guid, created_on)
            .await?;
        info!(
            "Published consent {} for subpopulation {} in study {}",
            created_on, subpop.guid, study.identifier
        );
        Ok(published.into())
    }
}

/// Parse a `createdOn` path segment
pub fn parse_created_on(value: &str) -> Result<i64, ApiError> {
    crate::types::iso_millis::parse(value).map_err(|_| {
        let mut errors = BTreeMap::new();
        errors.insert("createdOn".to_string(), format!("'{}' is not a valid timestamp", value));
        ApiError::validation_error(format!("createdOn '{}' is not a valid timestamp", value), Some(errors))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::SubpopulationDao;
    use crate::database::MemoryStore;

    async fn setup() -> (StudyConsentService, Study, Subpopulation) {
        let store = Arc::new(MemoryStore::new());
        let study = Study::new("api");
        let subpop = store
            .create_subpopulation(Subpopulation::default_for_study("api"))
            .await
            .unwrap();
        (StudyConsentService::new(store), study, subpop)
    }

    fn form(content: &str) -> StudyConsentForm {
        StudyConsentForm {
            document_content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn blank_document_is_invalid() {
        let (svc, _, subpop) = setup().await;
        let err = svc.add_consent(&subpop, form("  ")).await.unwrap_err();
        assert_eq!(err.to_json()["errors"]["documentContent"], "is required");
    }

    #[tokio::test]
    async fn nothing_published_yet_is_not_found() {
        let (svc, _, subpop) = setup().await;
        svc.add_consent(&subpop, form("<p>draft</p>")).await.unwrap();
        let err = svc.get_active_consent(&subpop).await.unwrap_err();
        assert_eq!(err.message(), "StudyConsent not found.");
    }

    #[tokio::test]
    async fn publishing_supersedes_previous_active_consent() {
        let (svc, study, subpop) = setup().await;
        let c1 = svc.add_consent(&subpop, form("<p>one</p>")).await.unwrap();
        let c2 = svc.add_consent(&subpop, form("<p>two</p>")).await.unwrap();
        assert!(c2.created_on > c1.created_on);

        svc.publish_consent(&study, &subpop, c1.created_on).await.unwrap();
        svc.publish_consent(&study, &subpop, c2.created_on).await.unwrap();

        let all = svc.get_all_consents(&subpop).await.unwrap();
        let active: Vec<i64> = all.iter().filter(|c| c.active).map(|c| c.created_on).collect();
        assert_eq!(active, vec![c2.created_on]);
        assert_eq!(svc.get_active_consent(&subpop).await.unwrap().document_content, "<p>two</p>");
    }

    #[tokio::test]
    async fn most_recent_ignores_active_flag() {
        let (svc, study, subpop) = setup().await;
        let c1 = svc.add_consent(&subpop, form("<p>one</p>")).await.unwrap();
        svc.publish_consent(&study, &subpop, c1.created_on).await.unwrap();
        let c2 = svc.add_consent(&subpop, form("<p>two</p>")).await.unwrap();

        let recent = svc.get_most_recent_consent(&subpop).await.unwrap();
        assert_eq!(recent.created_on, c2.created_on);
        assert!(!recent.active);
    }

    #[tokio::test]
    async fn publishing_unknown_timestamp_is_not_found() {
        let (svc, study, subpop) = setup().await;
        let err = svc.publish_consent(&study, &subpop, 42).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn malformed_created_on_is_a_validation_error() {
        let err = parse_created_on("yesterday").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(parse_created_on("2019-03-01T17:04:05.123Z").unwrap(), 1_551_459_845_123);
    }
}
