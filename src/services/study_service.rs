use std::sync::Arc;
use tracing::info;

use crate::dao::StudyDao;
use crate::database::models::Study;
use crate::error::ApiError;
use crate::services::SubpopulationService;

pub struct StudyService {
    studies: Arc<dyn StudyDao>,
    subpopulations: Arc<SubpopulationService>,
}

impl StudyService {
    pub fn new(studies: Arc<dyn StudyDao>, subpopulations: Arc<SubpopulationService>) -> Self {
        Self {
            studies,
            subpopulations,
        }
    }

    pub async fn get_study(&self, identifier: &str) -> Result<Study, ApiError> {
        self.studies
            .get_study(identifier)
            .await?
            .ok_or_else(|| ApiError::entity_not_found("Study"))
    }

    /// Make sure `identifier` exists with its default subpopulation and a
    /// published consent. Safe to repeat.
    pub async fn ensure_study(&self, identifier: &str) -> Result<Study, ApiError> {
        if identifier.trim().is_empty() {
            return Err(ApiError::bad_request("Study identifier is required"));
        }
        if self.studies.create_study_if_absent(Study::new(identifier)).await? {
            info!("Created study {}", identifier);
        }
        let study = self.get_study(identifier).await?;
        self.subpopulations.create_default_subpopulation(&study).await?;
        Ok(study)
    }

    pub async fn bootstrap(&self, identifiers: &[String]) -> Result<(), ApiError> {
        for identifier in identifiers {
            self.ensure_study(identifier).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{StudyConsentDao, SubpopulationDao};
    use crate::database::MemoryStore;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let subpops = Arc::new(SubpopulationService::new(store.clone(), store.clone()));
        let svc = StudyService::new(store.clone(), subpops);

        let ids = vec!["api".to_string()];
        svc.bootstrap(&ids).await.unwrap();
        svc.bootstrap(&ids).await.unwrap();

        assert!(svc.get_study("api").await.unwrap().active);
        assert_eq!(store.get_subpopulations("api", true).await.unwrap().len(), 1);
        assert_eq!(store.get_all_consents("api").await.unwrap().len(), 1);
        assert!(store.get_active_consent("api").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_study_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let subpops = Arc::new(SubpopulationService::new(store.clone(), store.clone()));
        let svc = StudyService::new(store, subpops);
        assert_eq!(svc.get_study("nope").await.unwrap_err().message(), "Study not found.");
    }
}
