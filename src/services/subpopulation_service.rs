use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::{StudyConsentDao, SubpopulationDao};
use crate::database::models::{Study, Subpopulation};
use crate::error::ApiError;

/// Document every new subpopulation starts with, published immediately so
/// the group always has an active consent
pub const PLACEHOLDER_CONSENT: &str = "<p>This is a placeholder for your consent document.</p>";

pub struct SubpopulationService {
    subpops: Arc<dyn SubpopulationDao>,
    consents: Arc<dyn StudyConsentDao>,
}

impl SubpopulationService {
    pub fn new(subpops: Arc<dyn SubpopulationDao>, consents: Arc<dyn StudyConsentDao>) -> Self {
        Self { subpops, consents }
    }

    fn validate(subpop: &Subpopulation) -> Result<(), ApiError> {
        let mut errors = BTreeMap::new();
        if subpop.name.trim().is_empty() {
            errors.insert("name".to_string(), "is required".to_string());
        }
        if subpop.guid.trim().is_empty() {
            errors.insert("guid".to_string(), "is required".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("Subpopulation is invalid", Some(errors)))
        }
    }

    /// Lookup scoped to `study_id`. A guid from another study is reported
    /// exactly like one that does not exist.
    pub async fn get_subpopulation(&self, study_id: &str, guid: &str) -> Result<Subpopulation, ApiError> {
        self.subpops
            .get_subpopulation(study_id, guid)
            .await?
            .ok_or_else(|| ApiError::entity_not_found("Subpopulation"))
    }

    pub async fn get_subpopulations(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Subpopulation>, ApiError> {
        Ok(self.subpops.get_subpopulations(study_id, include_deleted).await?)
    }

    pub async fn create_subpopulation(&self, study: &Study, mut subpop: Subpopulation) -> Result<Subpopulation, ApiError> {
        subpop.guid = Uuid::new_v4().to_string();
        subpop.study_id = study.identifier.clone();
        subpop.default_group = false;
        subpop.deleted = false;
        subpop.published_consent_created_on = None;
        Self::validate(&subpop)?;

        self.create_with_placeholder(study, subpop).await
    }

    /// Create the study's default group unless it is already there
    pub async fn create_default_subpopulation(&self, study: &Study) -> Result<Subpopulation, ApiError> {
        if let Some(existing) = self
            .subpops
            .get_subpopulation(&study.identifier, &study.identifier)
            .await?
        {
            return Ok(existing);
        }
        self.create_with_placeholder(study, Subpopulation::default_for_study(&study.identifier))
            .await
    }

    async fn create_with_placeholder(&self, study: &Study, subpop: Subpopulation) -> Result<Subpopulation, ApiError> {
        let created = self.subpops.create_subpopulation(subpop).await?;

        // Not atomic with the insert: a failure here leaves a subpopulation
        // without a published consent, which publishing one later repairs
        let now = Utc::now().timestamp_millis();
        let outcome = async {
            let consent = self
                .consents
                .add_consent(&created.guid, PLACEHOLDER_CONSENT.to_string(), now)
                .await?;
            self.consents
                .publish_consent(&study.identifier, &created.guid, consent.created_on)
                .await
        }
        .await;

        match outcome {
            Ok(consent) => {
                info!("Created subpopulation {} in study {}", created.guid, study.identifier);
                Ok(Subpopulation {
                    published_consent_created_on: Some(consent.created_on),
                    version: created.version + 1,
                    ..created
                })
            }
            Err(e) => {
                warn!("Subpopulation {} created without a published consent: {}", created.guid, e);
                Err(e.into())
            }
        }
    }

    /// Path guid wins over the body. The default flag and publication
    /// timestamp cannot be changed through an update.
    pub async fn update_subpopulation(
        &self,
        study_id: &str,
        guid: &str,
        mut subpop: Subpopulation,
    ) -> Result<Subpopulation, ApiError> {
        let existing = self.get_subpopulation(study_id, guid).await?;

        subpop.guid = existing.guid;
        subpop.study_id = existing.study_id;
        subpop.default_group = existing.default_group;
        subpop.published_consent_created_on = existing.published_consent_created_on;
        Self::validate(&subpop)?;

        Ok(self.subpops.update_subpopulation(subpop).await?)
    }

    pub async fn delete_subpopulation(&self, study_id: &str, guid: &str) -> Result<(), ApiError> {
        let existing = self.get_subpopulation(study_id, guid).await?;
        if existing.default_group {
            return Err(ApiError::bad_request("Cannot delete the default subpopulation for a study."));
        }
        self.subpops.delete_subpopulation(study_id, guid).await?;
        info!("Deleted subpopulation {} in study {}", guid, study_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn service() -> (SubpopulationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SubpopulationService::new(store.clone(), store.clone()), store)
    }

    fn named(name: &str) -> Subpopulation {
        Subpopulation {
            name: name.to_string(),
            ..Subpopulation::default_for_study("ignored")
        }
    }

    #[tokio::test]
    async fn created_subpopulation_has_a_published_consent() {
        let (svc, store) = service();
        let study = Study::new("api");
        let created = svc.create_subpopulation(&study, named("Group A")).await.unwrap();

        assert_ne!(created.guid, "api");
        assert!(!created.default_group);
        let active = store.get_active_consent(&created.guid).await.unwrap().unwrap();
        assert_eq!(created.published_consent_created_on, Some(active.created_on));
        assert_eq!(active.document_content, PLACEHOLDER_CONSENT);

        let stored = svc.get_subpopulation("api", &created.guid).await.unwrap();
        assert_eq!(stored.version, created.version);
    }

    #[tokio::test]
    async fn blank_name_is_invalid() {
        let (svc, _) = service();
        let err = svc.create_subpopulation(&Study::new("api"), named(" ")).await.unwrap_err();
        assert!(matches!(err, ApiError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn other_study_guid_reads_as_missing() {
        let (svc, _) = service();
        let created = svc.create_subpopulation(&Study::new("api"), named("Group A")).await.unwrap();

        let foreign = svc.get_subpopulation("other", &created.guid).await.unwrap_err();
        let missing = svc.get_subpopulation("other", "no-such-guid").await.unwrap_err();
        assert_eq!(foreign.to_json(), missing.to_json());
    }

    #[tokio::test]
    async fn default_group_is_created_once_and_cannot_be_deleted() {
        let (svc, _) = service();
        let study = Study::new("api");
        let first = svc.create_default_subpopulation(&study).await.unwrap();
        let second = svc.create_default_subpopulation(&study).await.unwrap();
        assert_eq!(first.guid, "api");
        assert_eq!(first.version, second.version);

        let err = svc.delete_subpopulation("api", "api").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn update_keeps_publication_and_delete_hides() {
        let (svc, _) = service();
        let created = svc.create_subpopulation(&Study::new("api"), named("Group A")).await.unwrap();

        let mut changed = created.clone();
        changed.name = "Group B".to_string();
        changed.published_consent_created_on = None;
        let updated = svc.update_subpopulation("api", &created.guid, changed).await.unwrap();
        assert_eq!(updated.name, "Group B");
        assert_eq!(updated.published_consent_created_on, created.published_consent_created_on);

        svc.delete_subpopulation("api", &created.guid).await.unwrap();
        assert!(svc.get_subpopulations("api", false).await.unwrap().is_empty());
        assert_eq!(svc.get_subpopulations("api", true).await.unwrap().len(), 1);
    }
}
